//! Text encoding of a [`ParseResult`] and its split into cache-sized chunks.

use serde::Serialize;
use serde_json::ser::Formatter;
use std::io;

use crate::error::CodecError;
use crate::schema::ParseResult;

/// Assumed per-entry ceiling of the backing cache.
pub const DEFAULT_MAX_ENTRY_BYTES: usize = 100 * 1024;

/// Chunk size with headroom below [`DEFAULT_MAX_ENTRY_BYTES`].
pub const DEFAULT_CHUNK_SIZE: usize = 90 * 1024;

/// Compact JSON with every non-ASCII char written as a `\uXXXX` escape.
struct AsciiFormatter;

impl Formatter for AsciiFormatter {
    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if fragment.is_ascii() {
            return writer.write_all(fragment.as_bytes());
        }
        let mut units = [0u16; 2];
        for c in fragment.chars() {
            if c.is_ascii() {
                writer.write_all(&[c as u8])?;
            } else {
                for unit in c.encode_utf16(&mut units) {
                    write!(writer, "\\u{:04x}", unit)?;
                }
            }
        }
        Ok(())
    }
}

/// Serialize to pure-ASCII JSON so that byte length equals character length.
pub fn serialize(result: &ParseResult) -> Result<String, CodecError> {
    let mut out = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut out, AsciiFormatter);
    result.serialize(&mut ser)?;
    Ok(String::from_utf8(out)?)
}

pub fn deserialize(text: &str) -> Result<ParseResult, CodecError> {
    Ok(serde_json::from_str(text)?)
}

/// Split `text` into ordered pieces of `chunk_size` characters; the last may be shorter.
///
/// Serialized results are pure ASCII, so for them characters and bytes agree.
pub fn split(text: &str, chunk_size: usize) -> Result<Vec<String>, CodecError> {
    if text.is_empty() {
        return Err(CodecError::EmptyInput);
    }
    if chunk_size == 0 {
        return Err(CodecError::InvalidChunkSize(chunk_size));
    }

    let mut chunks = Vec::with_capacity(text.len().div_ceil(chunk_size));
    let mut start = 0;
    for (count, (idx, _)) in text.char_indices().enumerate() {
        if count > 0 && count % chunk_size == 0 {
            chunks.push(text[start..idx].to_string());
            start = idx;
        }
    }
    chunks.push(text[start..].to_string());

    Ok(chunks)
}

pub fn join(chunks: &[String]) -> String {
    chunks.concat()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Element, Page};

    fn sample() -> ParseResult {
        ParseResult::new(vec![
            Page::new(1, vec![Element::text("Hello"), Element::text("第二段 — über")]),
            Page::new(
                2,
                vec![Element::image("data:image/png;base64,iVBORw0KGgo=", "diagram")],
            ),
            Page::new(3, vec![]),
        ])
    }

    #[test]
    fn test_round_trip_preserves_order() {
        let result = sample();
        let text = serialize(&result).unwrap();
        let back = deserialize(&text).unwrap();

        assert_eq!(back, result);
        assert_eq!(back.pages[0].elements[1].content, "第二段 — über");
    }

    #[test]
    fn test_serialized_text_is_ascii() {
        let text = serialize(&sample()).unwrap();
        assert!(text.is_ascii());
        assert!(text.contains("\\u7b2c"));
    }

    #[test]
    fn test_astral_chars_escape_as_surrogate_pairs() {
        let result = ParseResult::new(vec![Page::new(1, vec![Element::text("📄")])]);
        let text = serialize(&result).unwrap();

        assert!(text.contains("\\ud83d\\udcc4"));
        assert_eq!(deserialize(&text).unwrap(), result);
    }

    #[test]
    fn test_serialize_is_deterministic() {
        assert_eq!(serialize(&sample()).unwrap(), serialize(&sample()).unwrap());
    }

    #[test]
    fn test_split_join_inverse() {
        let text = "abcdefghijklmnopqrstuvwxyz0123456789";
        for size in [1, 2, 5, 7, 35, 36, 100] {
            let chunks = split(text, size).unwrap();
            assert_eq!(chunks.len(), text.len().div_ceil(size));
            assert_eq!(join(&chunks), text);
            for chunk in &chunks[..chunks.len() - 1] {
                assert_eq!(chunk.len(), size);
            }
            assert!(chunks.last().unwrap().len() <= size);
        }
    }

    #[test]
    fn test_split_large_text() {
        let text = "x".repeat(250 * 1024);
        let chunks = split(&text, DEFAULT_CHUNK_SIZE).unwrap();

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), DEFAULT_CHUNK_SIZE);
        assert_eq!(chunks[1].len(), DEFAULT_CHUNK_SIZE);
        assert_eq!(chunks[2].len(), 250 * 1024 - 2 * DEFAULT_CHUNK_SIZE);
        assert_eq!(join(&chunks), text);
    }

    #[test]
    fn test_split_counts_characters() {
        let text = "aé€b📄xyz";
        let chars = text.chars().count();
        for size in 1..=chars + 1 {
            let chunks = split(text, size).unwrap();
            assert_eq!(chunks.len(), chars.div_ceil(size));
            assert_eq!(join(&chunks), text);
            for chunk in &chunks[..chunks.len() - 1] {
                assert_eq!(chunk.chars().count(), size);
            }
        }
        assert_eq!(split("aé€", 2).unwrap(), vec!["aé", "€"]);
        assert_eq!(split("é", 1).unwrap(), vec!["é"]);
    }

    #[test]
    fn test_split_empty_input() {
        assert!(matches!(split("", 10), Err(CodecError::EmptyInput)));
    }

    #[test]
    fn test_split_invalid_size() {
        assert!(matches!(split("abc", 0), Err(CodecError::InvalidChunkSize(0))));
        assert!(matches!(split("€", 0), Err(CodecError::InvalidChunkSize(0))));
    }
}
