//! XML deserialization: parsing provider XML bodies into wire shapes.
//!
//! This module provides the [`XmlDeserialize`] trait and the implementations for
//! every provider response the upload client reads, plus the finalize manifest
//! so in-process providers can parse what the client sends.

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::error::XmlError;
use crate::model::{
    CompleteMultipartUpload, CompleteMultipartUploadResult, CompletedPart, ErrorResponse,
    InitiateMultipartUploadResult,
};

/// Trait for deserializing wire shapes from XML.
///
/// Implementors parse XML elements from the reader and populate the struct fields.
/// The root element has already been consumed by the caller; the implementation
/// reads child elements until the matching end tag.
pub trait XmlDeserialize: Sized {
    /// Deserialize an instance from the given XML reader.
    ///
    /// The reader is positioned just after the opening tag of this element.
    ///
    /// # Errors
    ///
    /// Returns `XmlError` if the XML is malformed or required fields are missing.
    fn deserialize_xml(reader: &mut Reader<&[u8]>) -> Result<Self, XmlError>;
}

/// Deserialize a provider XML body into a typed value.
///
/// Finds the root element and delegates to the type's `XmlDeserialize` implementation.
///
/// # Errors
///
/// Returns `XmlError` if the XML is malformed or deserialization fails.
pub fn from_xml<T: XmlDeserialize>(xml: &[u8]) -> Result<T, XmlError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    loop {
        match reader.read_event()? {
            Event::Start(_) => {
                return T::deserialize_xml(&mut reader);
            }
            Event::Eof => {
                return Err(XmlError::MissingElement("root element".to_string()));
            }
            _ => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Helper functions for reading common XML patterns
// ---------------------------------------------------------------------------

/// Read the text content of the current element and consume its end tag.
///
/// Entity and character references arrive as separate events and are resolved
/// in place, so `&quot;abc&quot;` reads back as `"abc"`.
fn read_text_content(reader: &mut Reader<&[u8]>) -> Result<String, XmlError> {
    let mut text = String::new();
    loop {
        match reader.read_event()? {
            Event::Text(e) => {
                let decoded = e
                    .decode()
                    .map_err(|err| XmlError::ParseError(err.to_string()))?;
                let unescaped = quick_xml::escape::unescape(&decoded)
                    .map_err(|err| XmlError::ParseError(err.to_string()))?;
                text.push_str(&unescaped);
            }
            Event::CData(e) => {
                let raw = std::str::from_utf8(&e)
                    .map_err(|err| XmlError::ParseError(err.to_string()))?;
                text.push_str(raw);
            }
            Event::GeneralRef(e) => {
                let name = std::str::from_utf8(&e)
                    .map_err(|err| XmlError::ParseError(err.to_string()))?;
                text.push(resolve_reference(name)?);
            }
            Event::End(_) => {
                return Ok(text);
            }
            Event::Eof => {
                return Err(XmlError::UnexpectedElement(
                    "unexpected EOF while reading text content".to_string(),
                ));
            }
            _ => {}
        }
    }
}

/// Resolve a predefined entity (`quot`) or character reference (`#34`, `#x22`).
fn resolve_reference(name: &str) -> Result<char, XmlError> {
    let resolved = match name {
        "quot" => Some('"'),
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "apos" => Some('\''),
        _ => name.strip_prefix('#').and_then(|num| {
            let code = match num.strip_prefix('x') {
                Some(hex) => u32::from_str_radix(hex, 16).ok(),
                None => num.parse::<u32>().ok(),
            };
            code.and_then(char::from_u32)
        }),
    };
    resolved.ok_or_else(|| XmlError::ParseError(format!("unknown entity reference '&{name};'")))
}

/// Skip over an element and all its children.
fn skip_element(reader: &mut Reader<&[u8]>) -> Result<(), XmlError> {
    let mut depth: u32 = 1;
    loop {
        match reader.read_event()? {
            Event::Start(_) => depth += 1,
            Event::End(_) => {
                depth -= 1;
                if depth == 0 {
                    return Ok(());
                }
            }
            Event::Eof => {
                return Err(XmlError::UnexpectedElement(
                    "unexpected EOF while skipping element".to_string(),
                ));
            }
            _ => {}
        }
    }
}

/// Parse a part number from XML text.
fn parse_u32(s: &str) -> Result<u32, XmlError> {
    s.parse::<u32>()
        .map_err(|e| XmlError::ParseError(format!("invalid u32 '{s}': {e}")))
}

/// Name of a start tag as UTF-8.
fn tag_name(name: &[u8]) -> Result<&str, XmlError> {
    std::str::from_utf8(name).map_err(|e| XmlError::ParseError(e.to_string()))
}

/// Deserialize a list of items where each item is wrapped in the given element name.
fn deserialize_list<T: XmlDeserialize>(
    reader: &mut Reader<&[u8]>,
    item_tag: &str,
) -> Result<Vec<T>, XmlError> {
    let mut items = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = e.name();
                if tag_name(name.as_ref())? == item_tag {
                    items.push(T::deserialize_xml(reader)?);
                } else {
                    skip_element(reader)?;
                }
            }
            Event::End(_) => break,
            Event::Eof => {
                return Err(XmlError::UnexpectedElement(
                    "unexpected EOF in list".to_string(),
                ));
            }
            _ => {}
        }
    }

    Ok(items)
}

// ---------------------------------------------------------------------------
// XmlDeserialize implementations
// ---------------------------------------------------------------------------

impl XmlDeserialize for CompletedPart {
    fn deserialize_xml(reader: &mut Reader<&[u8]>) -> Result<Self, XmlError> {
        let mut part_number = None;
        let mut etag = None;

        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    let name = e.name();
                    match tag_name(name.as_ref())? {
                        "PartNumber" => part_number = Some(parse_u32(&read_text_content(reader)?)?),
                        "ETag" => etag = Some(read_text_content(reader)?),
                        _ => skip_element(reader)?,
                    }
                }
                Event::End(_) => break,
                Event::Eof => {
                    return Err(XmlError::UnexpectedElement(
                        "unexpected EOF in Part".to_string(),
                    ));
                }
                _ => {}
            }
        }

        Ok(CompletedPart {
            part_number: part_number
                .ok_or_else(|| XmlError::MissingElement("PartNumber".to_string()))?,
            etag: etag.ok_or_else(|| XmlError::MissingElement("ETag".to_string()))?,
        })
    }
}

impl XmlDeserialize for CompleteMultipartUpload {
    fn deserialize_xml(reader: &mut Reader<&[u8]>) -> Result<Self, XmlError> {
        let parts = deserialize_list::<CompletedPart>(reader, "Part")?;
        Ok(CompleteMultipartUpload { parts })
    }
}

impl XmlDeserialize for InitiateMultipartUploadResult {
    fn deserialize_xml(reader: &mut Reader<&[u8]>) -> Result<Self, XmlError> {
        let mut result = InitiateMultipartUploadResult::default();

        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    let name = e.name();
                    match tag_name(name.as_ref())? {
                        "Bucket" => result.bucket = Some(read_text_content(reader)?),
                        "Key" => result.key = Some(read_text_content(reader)?),
                        "UploadId" => result.upload_id = Some(read_text_content(reader)?),
                        _ => skip_element(reader)?,
                    }
                }
                Event::End(_) => break,
                Event::Eof => {
                    return Err(XmlError::UnexpectedElement(
                        "unexpected EOF in InitiateMultipartUploadResult".to_string(),
                    ));
                }
                _ => {}
            }
        }

        Ok(result)
    }
}

impl XmlDeserialize for CompleteMultipartUploadResult {
    fn deserialize_xml(reader: &mut Reader<&[u8]>) -> Result<Self, XmlError> {
        let mut result = CompleteMultipartUploadResult::default();

        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    let name = e.name();
                    match tag_name(name.as_ref())? {
                        "Location" => result.location = Some(read_text_content(reader)?),
                        "Bucket" => result.bucket = Some(read_text_content(reader)?),
                        "Key" => result.key = Some(read_text_content(reader)?),
                        "ETag" => result.etag = Some(read_text_content(reader)?),
                        _ => skip_element(reader)?,
                    }
                }
                Event::End(_) => break,
                Event::Eof => {
                    return Err(XmlError::UnexpectedElement(
                        "unexpected EOF in CompleteMultipartUploadResult".to_string(),
                    ));
                }
                _ => {}
            }
        }

        Ok(result)
    }
}

impl XmlDeserialize for ErrorResponse {
    fn deserialize_xml(reader: &mut Reader<&[u8]>) -> Result<Self, XmlError> {
        let mut result = ErrorResponse::default();

        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    let name = e.name();
                    match tag_name(name.as_ref())? {
                        "Code" => result.code = read_text_content(reader)?,
                        "Message" => result.message = read_text_content(reader)?,
                        "RequestId" => result.request_id = Some(read_text_content(reader)?),
                        "HostId" => result.host_id = Some(read_text_content(reader)?),
                        _ => skip_element(reader)?,
                    }
                }
                Event::End(_) => break,
                Event::Eof => {
                    return Err(XmlError::UnexpectedElement(
                        "unexpected EOF in Error".to_string(),
                    ));
                }
                _ => {}
            }
        }

        Ok(result)
    }
}
