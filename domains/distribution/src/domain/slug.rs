//! URL-safe slugs

use unicode_normalization::UnicodeNormalization;

/// Lowercase, hyphen-separated slug.
///
/// Decomposes to NFKD so accented letters fold to their ASCII base, keeps
/// ASCII letters, digits and underscores, turns runs of whitespace and
/// hyphens into a single `-`, drops everything else and trims leading and
/// trailing `-`/`_`.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_separator = false;

    for c in input.nfkd() {
        if c.is_ascii_alphanumeric() || c == '_' {
            if pending_separator && !slug.is_empty() {
                slug.push('-');
            }
            pending_separator = false;
            slug.push(c.to_ascii_lowercase());
        } else if c.is_whitespace() || c == '-' {
            pending_separator = true;
        }
    }

    slug.trim_matches(|c| c == '-' || c == '_').to_string()
}
