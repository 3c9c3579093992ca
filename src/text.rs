//! Whole-file text decoding with an ordered encoding fallback

use crate::error::LensError;
use encoding_rs::Encoding;

/// Decode `bytes` with the first candidate encoding that accepts the whole
/// input without replacement characters.
///
/// A UTF-8 byte order mark is stripped before any attempt. Unknown labels
/// are skipped with a warning.
pub fn decode_with_fallback(
    bytes: &[u8],
    labels: &[String],
    what: &str,
) -> Result<(String, &'static Encoding), LensError> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);

    for label in labels {
        let Some(encoding) = Encoding::for_label(label.as_bytes()) else {
            tracing::warn!("unknown encoding label {:?}, skipping", label);
            continue;
        };
        if let Some(text) = encoding.decode_without_bom_handling_and_without_replacement(bytes) {
            if encoding != encoding_rs::UTF_8 {
                tracing::debug!("{} decoded as {}", what, encoding.name());
            }
            return Ok((text.into_owned(), encoding));
        }
    }

    Err(LensError::EncodingFailure(what.to_string()))
}
