use std::borrow::Cow;

use encoding_rs::{Encoding, UTF_8};

/// Why a response could not be turned into a page of rows.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("results table not found in page")]
    MissingTable,
    #[error("upstream reported errors: {}", .0.join("; "))]
    Upstream(Vec<String>),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("invalid page number in pager link: {0}")]
    PageNumber(String),
    #[error("invalid selector {0}")]
    InvalidSelector(String),
}

impl DecodeError {
    /// Default soft-failure criterion: the upstream answered, but the answer
    /// says the data is temporarily unavailable.
    pub fn is_soft(&self) -> bool {
        matches!(self, DecodeError::MissingTable | DecodeError::Upstream(_))
    }
}

/// Decode a response body using the Content-Type charset: BOM -> header -> UTF-8.
///
/// Invalid sequences are replaced rather than rejected; the decoders downstream
/// treat a mangled character as ordinary text.
pub fn decode_body<'a>(bytes: &'a [u8], content_type: Option<&str>) -> Cow<'a, str> {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        let (text, _) = encoding.decode_without_bom_handling(&bytes[bom_len..]);
        return text;
    }

    let encoding = content_type
        .and_then(extract_charset)
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .unwrap_or(UTF_8);
    let (text, _) = encoding.decode_without_bom_handling(bytes);
    text
}

fn extract_charset(content_type: &str) -> Option<String> {
    content_type
        .split(';')
        .filter_map(|part| {
            let (key, value) = part.trim().split_once('=')?;
            key.trim()
                .eq_ignore_ascii_case("charset")
                .then(|| value.trim_matches([' ', '"', '\''].as_ref()).to_string())
        })
        .next()
}
