use std::collections::HashMap;

/// Splits a trailing `{#custom-id}` off heading text.
///
/// The id must be non-empty and contain only ASCII alphanumerics, `-` or `_`.
///
/// ```
/// use folio_core::slug::split_custom_id;
///
/// assert_eq!(split_custom_id("Setup {#install}"), ("Setup", Some("install")));
/// assert_eq!(split_custom_id("Setup"), ("Setup", None));
/// ```
pub fn split_custom_id(text: &str) -> (&str, Option<&str>) {
    let trimmed = text.trim_end();
    let Some(inner) = trimmed.strip_suffix('}') else {
        return (text, None);
    };
    let Some(open) = inner.rfind("{#") else {
        return (text, None);
    };
    let id = &inner[open + 2..];
    if id.is_empty()
        || !id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    {
        return (text, None);
    }
    (trimmed[..open].trim_end(), Some(id))
}

/// Converts heading text to its base slug, before de-duplication.
///
/// Lowercases, turns each whitespace character into `-`, and drops anything
/// that is not alphanumeric, `-` or `_`. Unicode letters and combining marks
/// survive. Empty results fall back to `heading`.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for ch in text.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
            slug.push(ch.to_ascii_lowercase());
        } else if ch.is_whitespace() {
            slug.push('-');
        } else if !ch.is_ascii() && (ch.is_alphanumeric() || is_combining_mark(ch)) {
            slug.extend(ch.to_lowercase());
        }
    }
    if slug.is_empty() {
        slug.push_str("heading");
    }
    slug
}

/// Combining marks (diacritics, viramas, nuktas) that must stay attached to their base letter.
fn is_combining_mark(ch: char) -> bool {
    matches!(
        ch as u32,
        0x0300..=0x036F
            | 0x0591..=0x05BD
            | 0x05BF
            | 0x05C1..=0x05C2
            | 0x05C4..=0x05C5
            | 0x05C7
            | 0x0610..=0x061A
            | 0x064B..=0x065F
            | 0x0670
            | 0x0900..=0x0903
            | 0x093A..=0x094F
            | 0x0951..=0x0957
            | 0x0962..=0x0963
            | 0x0981..=0x0983
            | 0x09BC..=0x09CD
            | 0x0E31
            | 0x0E34..=0x0E3A
            | 0x0E47..=0x0E4E
            | 0x1AB0..=0x1AFF
            | 0x1DC0..=0x1DFF
            | 0x3099..=0x309A
            | 0xFE20..=0xFE2F
    )
}

/// Hands out unique heading ids for one document.
///
/// The first occurrence of a slug is used as-is; later ones get `-1`, `-2`, ...
/// and a suffixed candidate that is already taken keeps counting up, so no
/// two calls ever return the same id.
#[derive(Debug, Default)]
pub struct Slugger {
    seen: HashMap<String, usize>,
}

impl Slugger {
    /// Creates a slugger with no ids taken.
    pub fn new() -> Self {
        Self::default()
    }

    /// Slugifies `text` and makes the result unique.
    pub fn slug(&mut self, text: &str) -> String {
        self.claim(&slugify(text))
    }

    /// Makes an already-formed id unique, e.g. an author-supplied `{#id}`.
    pub fn claim(&mut self, id: &str) -> String {
        let mut candidate = id.to_string();
        while self.seen.contains_key(&candidate) {
            let count = self.seen.entry(id.to_string()).or_insert(0);
            *count += 1;
            candidate = format!("{id}-{count}");
        }
        self.seen.insert(candidate.clone(), 0);
        candidate
    }
}
