//! The XML properties format: `<entry key="...">value</entry>` elements,
//! usually wrapped in `<properties>`. `<comment>` elements are ignored.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use quick_xml::escape::{escape, unescape};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

pub(crate) fn parse(content: &str) -> Result<BTreeMap<String, String>, String> {
    let mut reader = Reader::from_str(content);
    let mut result = BTreeMap::new();
    let mut current: Option<(String, String)> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| format!("at byte {}: {e}", reader.buffer_position()))?;
        match event {
            Event::Start(e) if e.name().as_ref() == b"entry" => {
                if current.is_some() {
                    return Err("nested <entry> element".to_string());
                }
                current = Some((entry_key(&e)?, String::new()));
            }
            Event::Empty(e) if e.name().as_ref() == b"entry" => {
                result.insert(entry_key(&e)?, String::new());
            }
            Event::Text(text) => {
                if let Some((_, value)) = current.as_mut() {
                    value.push_str(utf8(&text)?);
                }
            }
            Event::CData(data) => {
                if let Some((_, value)) = current.as_mut() {
                    value.push_str(utf8(&data)?);
                }
            }
            Event::GeneralRef(reference) => {
                if let Some((_, value)) = current.as_mut() {
                    value.push(resolve_reference(utf8(&reference)?)?);
                }
            }
            Event::End(e) if e.name().as_ref() == b"entry" => {
                if let Some((key, value)) = current.take() {
                    result.insert(key, value);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    match current {
        Some((key, _)) => Err(format!("unterminated entry '{key}'")),
        None => Ok(result),
    }
}

fn utf8(bytes: &[u8]) -> Result<&str, String> {
    std::str::from_utf8(bytes).map_err(|e| e.to_string())
}

fn entry_key(element: &BytesStart<'_>) -> Result<String, String> {
    for attr in element.attributes() {
        let attr = attr.map_err(|e| e.to_string())?;
        if attr.key.as_ref() == b"key" {
            let raw = utf8(&attr.value)?;
            return unescape(raw).map(|k| k.into_owned()).map_err(|e| e.to_string());
        }
    }
    Err("<entry> without key attribute".to_string())
}

fn resolve_reference(name: &str) -> Result<char, String> {
    let resolved = match name {
        "lt" => Some('<'),
        "gt" => Some('>'),
        "amp" => Some('&'),
        "apos" => Some('\''),
        "quot" => Some('"'),
        _ => {
            let code = if let Some(hex) = name.strip_prefix("#x") {
                u32::from_str_radix(hex, 16).ok()
            } else if let Some(dec) = name.strip_prefix('#') {
                dec.parse::<u32>().ok()
            } else {
                None
            };
            code.and_then(char::from_u32)
        }
    };
    resolved.ok_or_else(|| format!("unknown entity reference &{name};"))
}

/// Renders entries as an XML properties document.
pub(crate) fn write(entries: &BTreeMap<String, String>, comment: Option<&str>) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<properties>\n");
    if let Some(comment) = comment {
        let _ = writeln!(out, "  <comment>{}</comment>", escape(comment));
    }
    for (key, value) in entries {
        let _ = writeln!(out, "  <entry key=\"{}\">{}</entry>", escape(key), escape(value));
    }
    out.push_str("</properties>\n");
    out
}
