//! Field extraction from classified response lines
//!
//! Information replies and URCs share one shape:
//!
//! ```text
//! +CREG: 2,1,"3A9B","01A2B3C4",7
//!  ^^^^  ^^^^^^^^^^^^^^^^^^^^^^^
//!  name  comma separated fields, strings quoted
//! ```
//!
//! [`split_fields`] cuts the body after the name into fields, keeping quoted
//! strings intact even when they contain commas. The typed helpers then turn
//! single fields into numbers, hex values, strings or addresses.

use core::net::Ipv4Addr;
use core::str::FromStr;

/// Most fields any reply in the command set carries.
pub const MAX_FIELDS: usize = 16;

/// Field parsing errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldError {
    /// The line does not carry the expected name.
    WrongName,
    /// Fewer fields than required.
    Missing,
    /// A field could not be converted.
    Invalid,
    /// More fields than [`MAX_FIELDS`].
    TooMany,
}

#[cfg(feature = "defmt")]
impl defmt::Format for FieldError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            FieldError::WrongName => defmt::write!(f, "WrongName"),
            FieldError::Missing => defmt::write!(f, "Missing"),
            FieldError::Invalid => defmt::write!(f, "Invalid"),
            FieldError::TooMany => defmt::write!(f, "TooMany"),
        }
    }
}

/// Split `+NAME: a,b,"c,d"` style text into its name and body.
///
/// Accepts the text with or without the leading `+` and returns the part
/// after `NAME:` with leading spaces removed.
pub fn body<'a>(line: &'a str, name: &str) -> Result<&'a str, FieldError> {
    let line = line.strip_prefix('+').unwrap_or(line);
    let rest = line.strip_prefix(name).ok_or(FieldError::WrongName)?;
    let rest = rest.strip_prefix(':').ok_or(FieldError::WrongName)?;
    Ok(rest.trim_start_matches(' '))
}

/// Split a body into comma separated fields, honouring double quotes.
pub fn split_fields(body: &str) -> Result<heapless::Vec<&str, MAX_FIELDS>, FieldError> {
    let mut fields = heapless::Vec::new();
    if body.is_empty() {
        return Ok(fields);
    }
    let mut start = 0;
    let mut quoted = false;
    for (i, c) in body.char_indices() {
        match c {
            '"' => quoted = !quoted,
            ',' if !quoted => {
                fields
                    .push(body[start..i].trim())
                    .map_err(|_| FieldError::TooMany)?;
                start = i + 1;
            }
            _ => {}
        }
    }
    fields
        .push(body[start..].trim())
        .map_err(|_| FieldError::TooMany)?;
    Ok(fields)
}

/// Parse a named reply into its fields in one go.
pub fn named<'a>(line: &'a str, name: &str) -> Result<heapless::Vec<&'a str, MAX_FIELDS>, FieldError> {
    split_fields(body(line, name)?)
}

/// Field `index` as a decimal number.
pub fn int<T: FromStr>(fields: &[&str], index: usize) -> Result<T, FieldError> {
    let field = fields.get(index).ok_or(FieldError::Missing)?;
    field.parse::<T>().map_err(|_| FieldError::Invalid)
}

/// Field `index` as a quoted hexadecimal number, e.g. `"3A9B"`.
pub fn hex(fields: &[&str], index: usize) -> Result<u32, FieldError> {
    let field = quoted(fields, index)?;
    u32::from_str_radix(field, 16).map_err(|_| FieldError::Invalid)
}

/// Field `index` with surrounding quotes removed.
pub fn quoted<'a>(fields: &[&'a str], index: usize) -> Result<&'a str, FieldError> {
    let field = fields.get(index).ok_or(FieldError::Missing)?;
    Ok(unquote(field))
}

/// Remove one pair of surrounding double quotes if present.
pub fn unquote(field: &str) -> &str {
    field
        .strip_prefix('"')
        .and_then(|f| f.strip_suffix('"'))
        .unwrap_or(field)
}

/// Field `index` as a quoted dotted-quad address.
pub fn ipv4(fields: &[&str], index: usize) -> Result<Ipv4Addr, FieldError> {
    parse_ipv4(quoted(fields, index)?).ok_or(FieldError::Invalid)
}

/// Parse a dotted-quad address; `None` for host names and malformed input.
pub fn parse_ipv4(text: &str) -> Option<Ipv4Addr> {
    Ipv4Addr::from_str(text).ok()
}

/// Split a length-prefixed reply into its header fields and raw payload.
///
/// `unit` is the whole classified unit, e.g. `\r\n+USORD: 0,5,"a\"b\r\n"`.
/// The header holds `header_fields` fields, the last of which is the payload
/// length. The payload is taken by that length, so quotes and line
/// terminators inside it are never mistaken for the end of the reply.
pub fn payload_reply<'a>(
    unit: &'a [u8],
    name: &str,
    header_fields: usize,
) -> Result<(heapless::Vec<&'a str, MAX_FIELDS>, &'a [u8]), FieldError> {
    let start = unit
        .iter()
        .position(|b| *b != b'\r' && *b != b'\n')
        .ok_or(FieldError::Missing)?;
    let bytes = &unit[start..];

    let mut quoted = false;
    let mut commas = 0;
    let mut split = None;
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'"' => quoted = !quoted,
            b',' if !quoted => {
                commas += 1;
                if commas == header_fields {
                    split = Some(i);
                    break;
                }
            }
            _ => {}
        }
    }
    let split = split.ok_or(FieldError::Missing)?;
    let header = core::str::from_utf8(&bytes[..split]).map_err(|_| FieldError::Invalid)?;
    let fields = named(header, name)?;
    if fields.len() != header_fields {
        return Err(FieldError::Missing);
    }
    let len: usize = int(&fields, header_fields - 1)?;

    let rest = &bytes[split + 1..];
    if rest.first() != Some(&b'"') || rest.get(len + 1) != Some(&b'"') {
        return Err(FieldError::Invalid);
    }
    Ok((fields, &rest[1..len + 1]))
}
