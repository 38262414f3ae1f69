use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

const MAX_STEM_LEN: usize = 80;

/// Normalized name for an index: accents stripped, lower-cased, every run of
/// non-alphanumerics collapsed to a single hyphen.
///
/// `"Assisted Immigrants (Pre-1842)"` becomes `"assisted-immigrants-pre-1842"`.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_hyphen = false;
    for c in input.nfd().filter(|c| !is_combining_mark(*c)) {
        if c.is_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_hyphen = true;
        }
    }
    if slug.len() > MAX_STEM_LEN {
        let mut end = MAX_STEM_LEN;
        while !slug.is_char_boundary(end) {
            end -= 1;
        }
        slug.truncate(end);
        let trimmed = slug.trim_end_matches('-').len();
        slug.truncate(trimmed);
    }
    if slug.is_empty() {
        slug.push_str("untitled");
    }
    slug
}

/// Deterministic CSV filename for an index: `{slugify(name)}.csv`.
pub fn csv_filename(name: &str) -> String {
    format!("{}.csv", slugify(name))
}
