//! FITS file I/O
//!
//! Reads and writes single-HDU FITS images according to the FITS standard.
//!
//! FITS format:
//! - 2880-byte blocks
//! - Header with 80-character keyword records
//! - Data in big-endian format

use crate::{ImageData, PixelType};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

const BLOCK_SIZE: usize = 2880;
const RECORD_SIZE: usize = 80;

/// Keywords that describe the data layout. They are generated from the
/// image on write and never copied from a header.
const STRUCTURAL_KEYWORDS: [&str; 9] = [
    "SIMPLE", "BITPIX", "NAXIS", "NAXIS1", "NAXIS2", "NAXIS3", "BZERO", "BSCALE", "EXTEND",
];

/// FITS header containing all keywords
#[derive(Debug, Clone, Default)]
pub struct FitsHeader {
    /// Keyword-value pairs
    pub keywords: HashMap<String, FitsValue>,
    /// Keywords in order (for writing)
    keyword_order: Vec<String>,
    /// HISTORY cards in order
    history: Vec<String>,
    /// COMMENT cards in order
    comments: Vec<String>,
}

/// FITS value types
#[derive(Debug, Clone, PartialEq)]
pub enum FitsValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
}

impl FitsValue {
    pub fn as_string(&self) -> Option<&str> {
        match self {
            FitsValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FitsValue::Integer(i) => Some(*i),
            FitsValue::Float(f) => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FitsValue::Float(f) => Some(*f),
            FitsValue::Integer(i) => Some(*i as f64),
            // Some acquisition software writes numbers as strings
            FitsValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FitsValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Encode the value as it appears after `= ` in a header record
    fn to_card_value(&self) -> String {
        match self {
            FitsValue::String(s) => {
                // Fixed-format strings are at least 8 characters between the quotes
                format!("'{:<8}'", s.replace('\'', "''"))
            }
            FitsValue::Integer(i) => i.to_string(),
            FitsValue::Float(f) => format!("{:.10E}", f),
            FitsValue::Boolean(b) => if *b { "T".to_string() } else { "F".to_string() },
        }
    }
}

impl std::fmt::Display for FitsValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FitsValue::String(s) => write!(f, "{}", s),
            FitsValue::Integer(i) => write!(f, "{}", i),
            FitsValue::Float(v) => write!(f, "{}", v),
            FitsValue::Boolean(b) => write!(f, "{}", if *b { "True" } else { "False" }),
        }
    }
}

impl FitsHeader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a keyword, keeping its original position on replace
    pub fn set(&mut self, key: &str, value: FitsValue) {
        let key_upper = key.trim().to_uppercase();
        if !self.keyword_order.contains(&key_upper) {
            self.keyword_order.push(key_upper.clone());
        }
        self.keywords.insert(key_upper, value);
    }

    pub fn set_string(&mut self, key: &str, value: &str) {
        self.set(key, FitsValue::String(value.to_string()));
    }

    pub fn set_int(&mut self, key: &str, value: i64) {
        self.set(key, FitsValue::Integer(value));
    }

    pub fn set_float(&mut self, key: &str, value: f64) {
        self.set(key, FitsValue::Float(value));
    }

    pub fn set_bool(&mut self, key: &str, value: bool) {
        self.set(key, FitsValue::Boolean(value));
    }

    pub fn remove(&mut self, key: &str) -> Option<FitsValue> {
        let key_upper = key.trim().to_uppercase();
        self.keyword_order.retain(|k| k != &key_upper);
        self.keywords.remove(&key_upper)
    }

    pub fn get(&self, key: &str) -> Option<&FitsValue> {
        self.keywords.get(&key.trim().to_uppercase())
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|v| v.as_string())
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| v.as_i64())
    }

    pub fn get_float(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(|v| v.as_f64())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.as_bool())
    }

    /// Keywords in header order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keyword_order.iter().map(String::as_str)
    }

    pub fn add_history(&mut self, text: impl Into<String>) {
        self.history.push(text.into());
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }

    pub fn add_comment(&mut self, text: impl Into<String>) {
        self.comments.push(text.into());
    }

    pub fn comments(&self) -> &[String] {
        &self.comments
    }
}

/// FITS file reading errors
#[derive(Debug)]
pub enum FitsError {
    Io(std::io::Error),
    InvalidFormat(String),
    UnsupportedBitpix(i64),
    MissingKeyword(String),
}

impl std::fmt::Display for FitsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FitsError::Io(e) => write!(f, "IO error: {}", e),
            FitsError::InvalidFormat(s) => write!(f, "Invalid FITS format: {}", s),
            FitsError::UnsupportedBitpix(b) => write!(f, "Unsupported BITPIX: {}", b),
            FitsError::MissingKeyword(k) => write!(f, "Missing required keyword: {}", k),
        }
    }
}

impl std::error::Error for FitsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FitsError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for FitsError {
    fn from(e: std::io::Error) -> Self {
        FitsError::Io(e)
    }
}

/// Read a FITS file from disk
pub fn read_fits(path: &Path) -> Result<(ImageData, FitsHeader), FitsError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    read_fits_from_reader(&mut reader)
}

/// Read only the primary header of a FITS file
pub fn read_fits_header(path: &Path) -> Result<FitsHeader, FitsError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    read_header(&mut reader)
}

/// Read FITS from memory buffer
pub fn read_fits_from_bytes(bytes: &[u8]) -> Result<(ImageData, FitsHeader), FitsError> {
    let mut reader = std::io::Cursor::new(bytes);
    read_fits_from_reader(&mut reader)
}

fn read_fits_from_reader<R: Read>(reader: &mut R) -> Result<(ImageData, FitsHeader), FitsError> {
    let header = read_header(reader)?;

    let bitpix = header
        .get_int("BITPIX")
        .ok_or_else(|| FitsError::MissingKeyword("BITPIX".to_string()))?;
    let naxis = header
        .get_int("NAXIS")
        .ok_or_else(|| FitsError::MissingKeyword("NAXIS".to_string()))?;

    if naxis == 0 {
        return Ok((ImageData::new(0, 0, 1, PixelType::U16), header));
    }

    let width = header
        .get_int("NAXIS1")
        .ok_or_else(|| FitsError::MissingKeyword("NAXIS1".to_string()))?;
    let height = header.get_int("NAXIS2").unwrap_or(1);
    let depth = if naxis >= 3 {
        header.get_int("NAXIS3").unwrap_or(1)
    } else {
        1
    };
    if width < 0 || height < 0 || depth < 1 {
        return Err(FitsError::InvalidFormat(format!(
            "bad image dimensions {}x{}x{}",
            width, height, depth
        )));
    }
    let dimension = |name: &str, value: i64| {
        u32::try_from(value)
            .map_err(|_| FitsError::InvalidFormat(format!("{} = {} is out of range", name, value)))
    };
    let (width, height, depth) = (
        dimension("NAXIS1", width)?,
        dimension("NAXIS2", height)?,
        dimension("NAXIS3", depth)?,
    );
    let count = (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(depth as usize))
        .ok_or_else(|| {
            FitsError::InvalidFormat(format!("image of {}x{}x{} samples is too large", width, height, depth))
        })?;

    let bzero = header.get_float("BZERO").unwrap_or(0.0);
    let bscale = header.get_float("BSCALE").unwrap_or(1.0);
    let unscaled = bzero == 0.0 && bscale == 1.0;

    let (pixel_type, data) = match bitpix {
        8 => {
            let raw = read_samples::<R, 1>(reader, count)?;
            if unscaled {
                (PixelType::U8, raw.into_iter().map(|b| b[0]).collect())
            } else {
                scaled_f64(raw.iter().map(|b| b[0] as f64), bscale, bzero)
            }
        }
        16 => {
            let raw = read_samples::<R, 2>(reader, count)?;
            let values = raw.iter().map(|&b| i16::from_be_bytes(b));
            if bzero == 32768.0 && bscale == 1.0 {
                // Unsigned 16-bit stored as signed with BZERO
                let bytes = values
                    .flat_map(|v| ((v as i32 + 32768) as u16).to_le_bytes())
                    .collect();
                (PixelType::U16, bytes)
            } else {
                scaled_f64(values.map(|v| v as f64), bscale, bzero)
            }
        }
        32 => {
            let raw = read_samples::<R, 4>(reader, count)?;
            scaled_f64(raw.iter().map(|&b| i32::from_be_bytes(b) as f64), bscale, bzero)
        }
        -32 => {
            let raw = read_samples::<R, 4>(reader, count)?;
            let values = raw.iter().map(|&b| f32::from_be_bytes(b));
            if unscaled {
                (PixelType::F32, values.flat_map(|v| v.to_le_bytes()).collect())
            } else {
                scaled_f64(values.map(|v| v as f64), bscale, bzero)
            }
        }
        -64 => {
            let raw = read_samples::<R, 8>(reader, count)?;
            scaled_f64(raw.iter().map(|&b| f64::from_be_bytes(b)), bscale, bzero)
        }
        other => return Err(FitsError::UnsupportedBitpix(other)),
    };

    let image = ImageData {
        width,
        height,
        channels: depth,
        pixel_type,
        data,
    };

    Ok((image, header))
}

fn scaled_f64(values: impl Iterator<Item = f64>, bscale: f64, bzero: f64) -> (PixelType, Vec<u8>) {
    let bytes = values
        .flat_map(|v| (v * bscale + bzero).to_le_bytes())
        .collect();
    (PixelType::F64, bytes)
}

/// Read `count` big-endian samples of `N` bytes each
fn read_samples<R: Read, const N: usize>(
    reader: &mut R,
    count: usize,
) -> Result<Vec<[u8; N]>, FitsError> {
    let size = count
        .checked_mul(N)
        .ok_or_else(|| FitsError::InvalidFormat(format!("{} samples of {} bytes overflow", count, N)))?;
    // Sized by the bytes present, not by the header
    let mut buffer = Vec::new();
    reader.by_ref().take(size as u64).read_to_end(&mut buffer)?;
    if buffer.len() != size {
        return Err(FitsError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("data ends after {} of {} bytes", buffer.len(), size),
        )));
    }
    Ok(buffer
        .chunks_exact(N)
        .map(|chunk| {
            let mut sample = [0u8; N];
            sample.copy_from_slice(chunk);
            sample
        })
        .collect())
}

/// Read the FITS header (80-character records until END)
pub(crate) fn read_header<R: Read>(reader: &mut R) -> Result<FitsHeader, FitsError> {
    let mut header = FitsHeader::new();
    let mut buffer = [0u8; RECORD_SIZE];
    let mut records = 0usize;

    loop {
        reader.read_exact(&mut buffer)?;
        records += 1;

        if !buffer.is_ascii() {
            return Err(FitsError::InvalidFormat(format!(
                "non-ASCII header record {}",
                records
            )));
        }
        let record = String::from_utf8_lossy(&buffer);
        if records == 1 && !record.starts_with("SIMPLE") {
            return Err(FitsError::InvalidFormat(
                "first header record is not SIMPLE".to_string(),
            ));
        }
        let keyword = record[..8].trim();

        if keyword == "END" {
            break;
        }

        if keyword.is_empty() {
            continue;
        }

        if keyword == "HISTORY" {
            header.add_history(record[8..].trim());
        } else if keyword == "COMMENT" {
            header.add_comment(record[8..].trim());
        } else if &record[8..10] == "= " {
            let value = parse_fits_value(&record[10..]);
            header.set(keyword, value);
        }
    }

    // The header is padded with blank records to a multiple of 2880 bytes
    let header_bytes = records * RECORD_SIZE;
    let padding = (BLOCK_SIZE - (header_bytes % BLOCK_SIZE)) % BLOCK_SIZE;
    if padding > 0 {
        let mut skip = vec![0u8; padding];
        reader.read_exact(&mut skip)?;
    }

    Ok(header)
}

/// Parse a FITS value from the text after `= `
fn parse_fits_value(s: &str) -> FitsValue {
    let s = s.trim();

    // Quoted string, with '' as an escaped quote
    if let Some(rest) = s.strip_prefix('\'') {
        let mut value = String::new();
        let mut chars = rest.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '\'' {
                if chars.peek() == Some(&'\'') {
                    value.push('\'');
                    chars.next();
                } else {
                    break;
                }
            } else {
                value.push(c);
            }
        }
        return FitsValue::String(value.trim_end().to_string());
    }

    let value_part = match s.find('/') {
        Some(idx) => s[..idx].trim(),
        None => s,
    };

    match value_part {
        "T" => return FitsValue::Boolean(true),
        "F" => return FitsValue::Boolean(false),
        _ => {}
    }

    if let Ok(i) = value_part.parse::<i64>() {
        return FitsValue::Integer(i);
    }

    if let Ok(f) = value_part.replace('D', "E").replace('d', "e").parse::<f64>() {
        return FitsValue::Float(f);
    }

    FitsValue::String(value_part.to_string())
}

/// Write a FITS file to disk
pub fn write_fits(path: &Path, image: &ImageData, header: &FitsHeader) -> Result<(), FitsError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    write_fits_to_writer(&mut writer, image, header)?;
    writer.flush()?;
    Ok(())
}

/// Encode a FITS file in memory
pub fn write_fits_to_bytes(image: &ImageData, header: &FitsHeader) -> Result<Vec<u8>, FitsError> {
    let mut buffer = Vec::new();
    write_fits_to_writer(&mut buffer, image, header)?;
    Ok(buffer)
}

fn write_fits_to_writer<W: Write>(
    writer: &mut W,
    image: &ImageData,
    header: &FitsHeader,
) -> Result<(), FitsError> {
    if image.data.len() != image.pixel_count() * image.pixel_type.bytes_per_pixel() {
        return Err(FitsError::InvalidFormat(format!(
            "data size {} does not match {}x{}x{} {:?} image",
            image.data.len(),
            image.width,
            image.height,
            image.channels,
            image.pixel_type
        )));
    }

    let bitpix: i32 = match image.pixel_type {
        PixelType::U8 => 8,
        PixelType::U16 => 16,
        PixelType::F32 => -32,
        PixelType::F64 => -64,
    };

    let mut records = 0usize;
    let mut card = |writer: &mut W, keyword: &str, value: &str| -> Result<(), FitsError> {
        records += 1;
        write_keyword(writer, keyword, value)
    };

    // Mandatory keywords
    card(writer, "SIMPLE", "T")?;
    card(writer, "BITPIX", &bitpix.to_string())?;
    card(writer, "NAXIS", if image.channels > 1 { "3" } else { "2" })?;
    card(writer, "NAXIS1", &image.width.to_string())?;
    card(writer, "NAXIS2", &image.height.to_string())?;
    if image.channels > 1 {
        card(writer, "NAXIS3", &image.channels.to_string())?;
    }

    // Unsigned 16-bit is stored signed with an offset
    if image.pixel_type == PixelType::U16 {
        card(writer, "BZERO", "32768")?;
        card(writer, "BSCALE", "1")?;
    }

    for key in &header.keyword_order {
        if STRUCTURAL_KEYWORDS.contains(&key.as_str()) {
            continue;
        }
        if let Some(value) = header.keywords.get(key) {
            card(writer, key, &value.to_card_value())?;
        }
    }
    for comment in &header.comments {
        card(writer, "COMMENT", comment)?;
    }
    for history in &header.history {
        card(writer, "HISTORY", history)?;
    }

    card(writer, "END", "")?;

    // Pad header to 2880-byte boundary
    let header_bytes = records * RECORD_SIZE;
    let padding = (BLOCK_SIZE - (header_bytes % BLOCK_SIZE)) % BLOCK_SIZE;
    writer.write_all(&vec![b' '; padding])?;

    match image.pixel_type {
        PixelType::U8 => {
            writer.write_all(&image.data)?;
        }
        PixelType::U16 => {
            for chunk in image.data.chunks_exact(2) {
                let val = u16::from_le_bytes([chunk[0], chunk[1]]);
                let signed = (val as i32 - 32768) as i16;
                writer.write_all(&signed.to_be_bytes())?;
            }
        }
        PixelType::F32 => {
            for chunk in image.data.chunks_exact(4) {
                let val = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                writer.write_all(&val.to_be_bytes())?;
            }
        }
        PixelType::F64 => {
            for chunk in image.data.chunks_exact(8) {
                let val = f64::from_le_bytes([
                    chunk[0], chunk[1], chunk[2], chunk[3], chunk[4], chunk[5], chunk[6], chunk[7],
                ]);
                writer.write_all(&val.to_be_bytes())?;
            }
        }
    }

    // Pad data to 2880-byte boundary
    let data_size = image.data.len();
    let padding = (BLOCK_SIZE - (data_size % BLOCK_SIZE)) % BLOCK_SIZE;
    writer.write_all(&vec![0u8; padding])?;

    Ok(())
}

/// Write a single keyword record.
///
/// Cards that do not fit in 80 ASCII characters are rejected rather than cut.
fn write_keyword<W: Write>(writer: &mut W, keyword: &str, value: &str) -> Result<(), FitsError> {
    if keyword.is_empty() || keyword.len() > 8 || !keyword.is_ascii() {
        return Err(FitsError::InvalidFormat(format!(
            "keyword '{}' must be 1 to 8 ASCII characters",
            keyword
        )));
    }
    if !value.is_ascii() {
        return Err(FitsError::InvalidFormat(format!("{} value is not ASCII", keyword)));
    }

    let mut record = [b' '; RECORD_SIZE];
    record[..keyword.len()].copy_from_slice(keyword.as_bytes());

    if keyword == "HISTORY" || keyword == "COMMENT" {
        // Commentary text fills columns 9-80
        let text = value.as_bytes();
        if text.len() > RECORD_SIZE - 8 {
            return Err(FitsError::InvalidFormat(format!(
                "{} text longer than {} characters",
                keyword,
                RECORD_SIZE - 8
            )));
        }
        record[8..8 + text.len()].copy_from_slice(text);
    } else if keyword != "END" && !value.is_empty() {
        record[8] = b'=';
        record[9] = b' ';

        // Strings start at column 11, numbers are right-justified to column 30
        let value_bytes = value.as_bytes();
        let start = if value.starts_with('\'') {
            10
        } else {
            30_usize.saturating_sub(value_bytes.len()).max(10)
        };
        if value_bytes.len() > RECORD_SIZE - start {
            return Err(FitsError::InvalidFormat(format!(
                "{} value does not fit in one card: {}",
                keyword, value
            )));
        }
        record[start..start + value_bytes.len()].copy_from_slice(value_bytes);
    }

    writer.write_all(&record)?;
    Ok(())
}

/// Header keywords used by the calibration workflow
pub struct StandardKeywords;

impl StandardKeywords {
    pub const EXPTIME: &'static str = "EXPTIME";
    pub const FILTER: &'static str = "FILTER";
    pub const IMAGETYP: &'static str = "IMAGETYP";
    pub const COMBINED: &'static str = "COMBINED";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fits_header_set_get() {
        let mut header = FitsHeader::new();
        header.set_string("OBJECT", "M31");
        header.set_float("EXPTIME", 120.5);
        header.set_int("GAIN", 100);
        header.set_bool("combined", true);

        assert_eq!(header.get_string("OBJECT"), Some("M31"));
        assert_eq!(header.get_float("exptime"), Some(120.5));
        assert_eq!(header.get_int("GAIN"), Some(100));
        assert_eq!(header.get_bool("COMBINED"), Some(true));
        assert_eq!(header.keys().collect::<Vec<_>>(), vec!["OBJECT", "EXPTIME", "GAIN", "COMBINED"]);
    }

    #[test]
    fn test_fits_header_replace_keeps_order() {
        let mut header = FitsHeader::new();
        header.set_string("IMAGETYP", "Light");
        header.set_float("EXPTIME", 60.0);
        header.set_string("IMAGETYP", "Dark");

        assert_eq!(header.get_string("IMAGETYP"), Some("Dark"));
        assert_eq!(header.keys().collect::<Vec<_>>(), vec!["IMAGETYP", "EXPTIME"]);

        assert_eq!(header.remove("imagetyp"), Some(FitsValue::String("Dark".to_string())));
        assert_eq!(header.keys().collect::<Vec<_>>(), vec!["EXPTIME"]);
    }

    #[test]
    fn test_parse_fits_value_forms() {
        assert_eq!(parse_fits_value("'Light   '           / frame type"), FitsValue::String("Light".to_string()));
        assert_eq!(parse_fits_value("'O''Brien'"), FitsValue::String("O'Brien".to_string()));
        assert_eq!(parse_fits_value("                   T / combined"), FitsValue::Boolean(true));
        assert_eq!(parse_fits_value("                   F"), FitsValue::Boolean(false));
        assert_eq!(parse_fits_value("                 300 / seconds"), FitsValue::Integer(300));
        assert_eq!(parse_fits_value("  1.5D2"), FitsValue::Float(150.0));
        assert_eq!(parse_fits_value("-2.5000000000E1"), FitsValue::Float(-25.0));
    }

    #[test]
    fn test_numeric_string_reads_as_float() {
        let mut header = FitsHeader::new();
        header.set_string("EXPTIME", " 30.0 ");
        assert_eq!(header.get_float("EXPTIME"), Some(30.0));
    }

    #[test]
    fn test_fits_round_trip_u16() {
        let data: Vec<u16> = (0..10000).map(|i| (i * 7 % 65535) as u16).collect();
        let image = ImageData::from_u16(100, 100, 1, &data);

        let mut header = FitsHeader::new();
        header.set_string("IMAGETYP", "Light");
        header.set_float("EXPTIME", 180.0);
        header.set_string("FILTER", "R");
        header.set_bool("COMBINED", false);
        header.add_history("subtract_overscan");

        let bytes = write_fits_to_bytes(&image, &header).unwrap();
        assert_eq!(bytes.len() % BLOCK_SIZE, 0);

        let (read_image, read_header) = read_fits_from_bytes(&bytes).unwrap();
        assert_eq!(read_image.width, 100);
        assert_eq!(read_image.height, 100);
        assert_eq!(read_image.pixel_type, PixelType::U16);
        assert_eq!(read_image.data, image.data);

        assert_eq!(read_header.get_string("IMAGETYP"), Some("Light"));
        assert_eq!(read_header.get_float("EXPTIME"), Some(180.0));
        assert_eq!(read_header.get_string("FILTER"), Some("R"));
        assert_eq!(read_header.get_bool("COMBINED"), Some(false));
        assert_eq!(read_header.history(), &["subtract_overscan".to_string()]);
    }

    #[test]
    fn test_fits_round_trip_f64_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.fits");
        let pixels: Vec<f64> = vec![-1.5, 0.0, 2.25, 1.0e6, 3.0, -7.0];
        let image = ImageData::from_f64(3, 2, 1, &pixels);
        let mut header = FitsHeader::new();
        header.set_float("EXPTIME", 0.5);
        // Structural keywords in the header are regenerated from the image
        header.set_int("BITPIX", 16);
        header.set_float("BZERO", 32768.0);

        write_fits(&path, &image, &header).unwrap();

        let (read_image, read_header) = read_fits(&path).unwrap();
        assert_eq!(read_image.pixel_type, PixelType::F64);
        assert_eq!(read_image.to_f64_vec(), pixels);
        assert_eq!(read_header.get_int("BITPIX"), Some(-64));
        assert!(read_header.get("BZERO").is_none());

        let header_only = read_fits_header(&path).unwrap();
        assert_eq!(header_only.get_float("EXPTIME"), Some(0.5));
    }

    #[test]
    fn test_signed_16_bit_without_offset_is_scaled() {
        // Hand-built file: BITPIX 16, BSCALE 2, no BZERO
        let mut bytes = Vec::new();
        for (k, v) in [("SIMPLE", "T"), ("BITPIX", "16"), ("NAXIS", "2"), ("NAXIS1", "2"), ("NAXIS2", "1"), ("BSCALE", "2")] {
            write_keyword(&mut bytes, k, v).unwrap();
        }
        write_keyword(&mut bytes, "END", "").unwrap();
        bytes.resize(BLOCK_SIZE, b' ');
        bytes.extend_from_slice(&(-3i16).to_be_bytes());
        bytes.extend_from_slice(&(5i16).to_be_bytes());
        bytes.resize(2 * BLOCK_SIZE, 0);

        let (image, _) = read_fits_from_bytes(&bytes).unwrap();
        assert_eq!(image.pixel_type, PixelType::F64);
        assert_eq!(image.to_f64_vec(), vec![-6.0, 10.0]);
    }

    #[test]
    fn test_header_with_blank_records_keeps_block_alignment() {
        let mut bytes = Vec::new();
        for (k, v) in [("SIMPLE", "T"), ("BITPIX", "8"), ("NAXIS", "2"), ("NAXIS1", "2"), ("NAXIS2", "2")] {
            write_keyword(&mut bytes, k, v).unwrap();
        }
        bytes.extend_from_slice(&[b' '; RECORD_SIZE]);
        write_keyword(&mut bytes, "COMMENT", "written by hand").unwrap();
        write_keyword(&mut bytes, "END", "").unwrap();
        bytes.resize(BLOCK_SIZE, b' ');
        bytes.extend_from_slice(&[1, 2, 3, 4]);
        bytes.resize(2 * BLOCK_SIZE, 0);

        let (image, header) = read_fits_from_bytes(&bytes).unwrap();
        assert_eq!(image.data, vec![1, 2, 3, 4]);
        assert_eq!(header.comments(), &["written by hand".to_string()]);
    }

    #[test]
    fn test_not_a_fits_file() {
        let bytes = vec![b'x'; BLOCK_SIZE];
        assert!(matches!(read_fits_from_bytes(&bytes), Err(FitsError::InvalidFormat(_))));
    }

    #[test]
    fn test_truncated_data_is_io_error() {
        let image = ImageData::from_u16(10, 10, 1, &[7u16; 100]);
        let bytes = write_fits_to_bytes(&image, &FitsHeader::new()).unwrap();
        let truncated = &bytes[..BLOCK_SIZE + 50];
        assert!(matches!(read_fits_from_bytes(truncated), Err(FitsError::Io(_))));
    }

    fn header_only_file(cards: &[(&str, &str)]) -> Vec<u8> {
        let mut bytes = Vec::new();
        for (k, v) in cards {
            write_keyword(&mut bytes, k, v).unwrap();
        }
        write_keyword(&mut bytes, "END", "").unwrap();
        bytes.resize(BLOCK_SIZE, b' ');
        bytes
    }

    #[test]
    fn test_oversized_dimensions_are_rejected() {
        let bytes = header_only_file(&[
            ("SIMPLE", "T"),
            ("BITPIX", "-64"),
            ("NAXIS", "2"),
            ("NAXIS1", "4000000000"),
            ("NAXIS2", "4000000000"),
        ]);
        assert!(matches!(read_fits_from_bytes(&bytes), Err(FitsError::InvalidFormat(_))));

        let bytes = header_only_file(&[
            ("SIMPLE", "T"),
            ("BITPIX", "8"),
            ("NAXIS", "2"),
            ("NAXIS1", "4294967298"),
            ("NAXIS2", "1"),
        ]);
        assert!(matches!(read_fits_from_bytes(&bytes), Err(FitsError::InvalidFormat(_))));
    }

    #[test]
    fn test_unsigned_32_bit_reads_as_f64() {
        let mut bytes = header_only_file(&[
            ("SIMPLE", "T"),
            ("BITPIX", "32"),
            ("NAXIS", "2"),
            ("NAXIS1", "2"),
            ("NAXIS2", "1"),
            ("BZERO", "2147483648"),
        ]);
        bytes.extend_from_slice(&i32::MIN.to_be_bytes());
        bytes.extend_from_slice(&(-2_147_483_548i32).to_be_bytes());
        bytes.resize(2 * BLOCK_SIZE, 0);

        let (image, _) = read_fits_from_bytes(&bytes).unwrap();
        assert_eq!(image.pixel_type, PixelType::F64);
        assert_eq!(image.to_f64_vec(), vec![0.0, 100.0]);
    }

    #[test]
    fn test_large_header_with_missing_data_is_io_error() {
        let bytes = header_only_file(&[
            ("SIMPLE", "T"),
            ("BITPIX", "8"),
            ("NAXIS", "2"),
            ("NAXIS1", "100000"),
            ("NAXIS2", "100000"),
        ]);
        assert!(matches!(read_fits_from_bytes(&bytes), Err(FitsError::Io(_))));
    }

    #[test]
    fn test_cards_that_do_not_fit_are_rejected() {
        let image = ImageData::from_u16(1, 1, 1, &[1]);

        let mut header = FitsHeader::new();
        header.set_string("CAMERANAME", "QHY600");
        assert!(matches!(write_fits_to_bytes(&image, &header), Err(FitsError::InvalidFormat(_))));

        let mut header = FitsHeader::new();
        header.set_string("OBJECT", &"x".repeat(69));
        assert!(matches!(write_fits_to_bytes(&image, &header), Err(FitsError::InvalidFormat(_))));

        let mut header = FitsHeader::new();
        header.add_history("y".repeat(73));
        assert!(matches!(write_fits_to_bytes(&image, &header), Err(FitsError::InvalidFormat(_))));

        let mut header = FitsHeader::new();
        header.set_string("OBJECT", &"x".repeat(60));
        header.add_history("y".repeat(72));
        let (_, read_header) = read_fits_from_bytes(&write_fits_to_bytes(&image, &header).unwrap()).unwrap();
        assert_eq!(read_header.get_string("OBJECT"), Some("x".repeat(60).as_str()));
        assert_eq!(read_header.history(), &["y".repeat(72)]);
    }
}
