use url::Url;

use crate::decode::DecodeError;

/// Resolves a raw `href` against the site base.
///
/// Empty, fragment-only, query-only and `javascript:` references yield `None`,
/// as does any reference equal to one of `ignored` (no-op placeholder links).
pub fn resolve_link(reference: &str, base: Option<&Url>, ignored: &[String]) -> Option<Url> {
    let trimmed = reference.trim();
    if trimmed.is_empty() || ignored.iter().any(|placeholder| placeholder == trimmed) {
        return None;
    }
    let lower = trimmed.to_ascii_lowercase();
    if lower.starts_with('#') || lower.starts_with('?') || lower.starts_with("javascript:") {
        return None;
    }
    if let Ok(url) = Url::parse(trimmed) {
        return Some(url);
    }
    base.and_then(|base| base.join(trimmed).ok())
}

/// Origin (`scheme://host[:port]/`) of `url`, used as the base for relative links.
pub fn site_origin(url: &str) -> Option<Url> {
    let parsed = Url::parse(url).ok()?;
    Url::parse(&parsed.origin().ascii_serialization()).ok()
}

/// Parses a configured site base. An unparseable value is a config error.
pub(crate) fn parse_site_base(raw: Option<&str>) -> Result<Option<Url>, DecodeError> {
    raw.map(|base| {
        Url::parse(base)
            .map_err(|_| DecodeError::Malformed(format!("site base is not a valid url: {base:?}")))
    })
    .transpose()
}
