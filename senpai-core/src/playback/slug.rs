//! Title to URL slug transform for slug-addressed embed hosts

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// `"Attack on Titan: Final Season"` → `"attack-on-titan-final-season"`.
///
/// Decomposes and strips diacritics, spells out a few symbols, lowercases,
/// and collapses every non-alphanumeric run into a single hyphen.
#[must_use]
pub fn slugify(title: &str) -> String {
    let mut spelled = String::with_capacity(title.len() + 8);
    for c in title.nfd().filter(|c| !is_combining_mark(*c)) {
        match c {
            '&' => spelled.push_str(" and "),
            '@' => spelled.push_str(" at "),
            '+' => spelled.push_str(" plus "),
            '\'' | '\u{2018}' | '\u{2019}' | '`' => {}
            '\u{00d7}' => spelled.push('x'),
            other => spelled.push(other),
        }
    }

    let mut slug = String::with_capacity(spelled.len());
    let mut pending_hyphen = false;
    for c in spelled.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c);
        } else {
            pending_hyphen = true;
        }
    }
    slug
}
