use serde_json::{Map, Value as JsonValue};
use thiserror::Error;
use time::Date;
use time::macros::format_description;

use crate::error::Diagnostics;

/// Errors emitted while delimiting front matter.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrontMatterError {
    /// Opening `---` without a closing one.
    #[error("front matter opened on line {line} is never closed with `---`")]
    Unterminated {
        /// 1-indexed line of the opening delimiter.
        line: usize,
    },
}

/// Metadata block of a post: string keys mapped to scalar values.
///
/// The raw mapping is kept as JSON so unknown keys survive untouched; the
/// accessors cover the keys the blog relies on.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct FrontMatter(Map<String, JsonValue>);

impl FrontMatter {
    /// Creates an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw value for `key`.
    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.0.get(key)
    }

    /// Inserts or replaces a value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<JsonValue>) {
        self.0.insert(key.into(), value.into());
    }

    /// Returns true when no keys are present.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrow the underlying mapping.
    pub fn as_map(&self) -> &Map<String, JsonValue> {
        &self.0
    }

    fn str_value(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(JsonValue::as_str)
    }

    /// Post title.
    pub fn title(&self) -> Option<&str> {
        self.str_value("title")
    }

    /// Post description.
    pub fn description(&self) -> Option<&str> {
        self.str_value("description")
    }

    /// Post slug; matches the storage location of the document.
    pub fn slug(&self) -> Option<&str> {
        self.str_value("slug")
    }

    /// Raw published string as authored.
    pub fn published(&self) -> Option<&str> {
        self.str_value("published")
    }

    /// Published date parsed from the leading `YYYY-MM-DD`.
    pub fn published_date(&self) -> Option<Date> {
        self.published().and_then(parse_date)
    }

    /// Post category.
    pub fn category(&self) -> Option<&str> {
        self.str_value("category")
    }

    /// Series the post belongs to, if any.
    pub fn series(&self) -> Option<String> {
        match self.0.get("series")? {
            JsonValue::String(s) => Some(s.clone()),
            JsonValue::Bool(b) => Some(b.to_string()),
            JsonValue::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Whether the post is a draft. Accepts booleans and `"true"`.
    pub fn draft(&self) -> bool {
        match self.0.get("draft") {
            Some(JsonValue::Bool(b)) => *b,
            Some(JsonValue::String(s)) => s.eq_ignore_ascii_case("true"),
            _ => false,
        }
    }

    /// Renders the mapping back into a `---` delimited YAML block.
    ///
    /// An empty mapping renders as an empty string so that re-extraction of
    /// `to_block() + body` yields the same metadata either way.
    pub fn to_block(&self) -> Result<String, serde_yaml::Error> {
        if self.0.is_empty() {
            return Ok(String::new());
        }
        let yaml = serde_yaml::to_string(&self.0)?;
        Ok(format!("---\n{yaml}---\n"))
    }
}

fn parse_date(value: &str) -> Option<Date> {
    let prefix = value.trim().get(..10)?;
    Date::parse(prefix, format_description!("[year]-[month]-[day]")).ok()
}

/// Result returned after extracting front matter from a document.
#[derive(Debug)]
pub struct FrontMatterExtraction<'a> {
    /// Parsed metadata (empty when the document has no block).
    pub front_matter: FrontMatter,
    /// Markdown content following the block.
    pub body: &'a str,
    /// Byte offset inside the original document where `body` begins.
    pub body_start: usize,
    /// Recovered problems (YAML fallback, unparsable dates).
    pub diagnostics: Diagnostics,
}

/// Splits a document into its front-matter mapping and body.
///
/// Only an opening `---` without a closing one is an error. Missing blocks
/// yield empty metadata and the full input as body; YAML that fails to parse
/// falls back to plain `key: value` lines.
pub fn extract_front_matter(input: &str) -> Result<FrontMatterExtraction<'_>, FrontMatterError> {
    let mut diagnostics = Diagnostics::new();
    let Some((block, body_start)) = find_yaml_block(input)? else {
        return Ok(FrontMatterExtraction {
            front_matter: FrontMatter::new(),
            body: input,
            body_start: 0,
            diagnostics,
        });
    };

    let front_matter = parse_block(block, &mut diagnostics);
    if let Some(published) = front_matter.published()
        && parse_date(published).is_none()
    {
        log::warn!("front matter `published` is not a date: {published:?}");
        diagnostics.warning(format!("`published` is not a date: {published:?}"), None);
    }

    Ok(FrontMatterExtraction {
        front_matter,
        body: &input[body_start..],
        body_start,
        diagnostics,
    })
}

fn parse_block(block: &str, diagnostics: &mut Diagnostics) -> FrontMatter {
    if block.trim().is_empty() {
        return FrontMatter::new();
    }

    let parsed = serde_yaml::from_str::<serde_yaml::Value>(block)
        .map_err(|err| err.to_string())
        .and_then(|yaml| serde_json::to_value(yaml).map_err(|err| err.to_string()));

    match parsed {
        Ok(JsonValue::Object(map)) => FrontMatter(map),
        Ok(JsonValue::Null) => FrontMatter::new(),
        Ok(other) => {
            log::warn!("front matter root is not a mapping: {other}");
            diagnostics.warning("front matter must be a mapping; ignoring it", None);
            FrontMatter::new()
        }
        Err(message) => {
            log::warn!("front matter is not valid YAML, reading plain key/value lines: {message}");
            diagnostics.warning(
                format!("front matter is not valid YAML ({message}); read as key/value lines"),
                None,
            );
            parse_key_value_lines(block)
        }
    }
}

/// Lenient reader for `key: value` lines.
fn parse_key_value_lines(block: &str) -> FrontMatter {
    let mut map = Map::new();
    for line in block.lines() {
        // Indented lines belong to nested values this reader cannot express.
        if line.starts_with(char::is_whitespace) {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() || key.starts_with('#') {
            continue;
        }
        let value = value.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
            .unwrap_or(value);
        map.insert(key.to_string(), JsonValue::String(value.to_string()));
    }
    FrontMatter(map)
}

fn find_yaml_block(input: &str) -> Result<Option<(&str, usize)>, FrontMatterError> {
    let bom_len = if input.starts_with('\u{feff}') {
        '\u{feff}'.len_utf8()
    } else {
        0
    };
    let mut cursor = bom_len;
    let mut line_no = 0usize;

    while let Some((line, next_cursor)) = next_line(input, cursor) {
        line_no += 1;
        if line.trim().is_empty() {
            cursor = next_cursor;
            continue;
        }
        if !is_yaml_fence(line) {
            return Ok(None);
        }

        let block_start = next_cursor;
        let mut scan_cursor = next_cursor;
        while let Some((block_line, next_line_cursor)) = next_line(input, scan_cursor) {
            if is_yaml_fence(block_line) {
                let block = input[block_start..scan_cursor].trim_end_matches(['\r', '\n']);
                return Ok(Some((block, next_line_cursor)));
            }
            scan_cursor = next_line_cursor;
        }
        return Err(FrontMatterError::Unterminated { line: line_no });
    }

    Ok(None)
}

fn next_line(input: &str, start: usize) -> Option<(&str, usize)> {
    if start >= input.len() {
        return None;
    }
    match input[start..].find('\n') {
        Some(pos) => Some((&input[start..start + pos], start + pos + 1)),
        None => Some((&input[start..], input.len())),
    }
}

fn is_yaml_fence(line: &str) -> bool {
    line.trim_end_matches('\r').trim_end() == "---"
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(input: &str) -> FrontMatterExtraction<'_> {
        extract_front_matter(input).expect("front matter extraction should succeed")
    }

    #[test]
    fn returns_full_body_when_absent() {
        let input = "# Title\nBody";
        let result = extract(input);
        assert!(result.front_matter.is_empty());
        assert_eq!(result.body, input);
        assert_eq!(result.body_start, 0);
    }

    #[test]
    fn parses_blog_keys() {
        let input = "---\ntitle: Foo\nslug: foo\npublished: 2024-03-09\ncategory: rust\ndraft: true\n---\nBody";
        let result = extract(input);
        let fm = &result.front_matter;
        assert_eq!(fm.title(), Some("Foo"));
        assert_eq!(fm.slug(), Some("foo"));
        assert_eq!(fm.category(), Some("rust"));
        assert!(fm.draft());
        assert_eq!(fm.series(), None);
        let date = fm.published_date().expect("date should parse");
        assert_eq!((date.year(), u8::from(date.month()), date.day()), (2024, 3, 9));
        assert_eq!(result.body, "Body");
        assert!(result.diagnostics.is_empty());
    }

    #[test]
    fn handles_empty_block() {
        let input = "---\n---\n# Body";
        let result = extract(input);
        assert!(result.front_matter.is_empty());
        assert_eq!(result.body, "# Body");
    }

    #[test]
    fn tolerates_bom_and_leading_blank_lines() {
        let input = "\u{feff}\n   \n---\nfoo: bar\n---\nBody";
        let result = extract(input);
        assert_eq!(
            result.front_matter.get("foo").and_then(JsonValue::as_str),
            Some("bar")
        );
        assert_eq!(result.body_start, input.find("Body").unwrap());
    }

    #[test]
    fn crlf_delimiters() {
        let result = extract("---\r\ntitle: Windows\r\n---\r\nBody");
        assert_eq!(result.front_matter.title(), Some("Windows"));
        assert_eq!(result.body, "Body");
    }

    #[test]
    fn unterminated_block_is_malformed() {
        let err = extract_front_matter("\n---\ntitle: test").unwrap_err();
        assert_eq!(err, FrontMatterError::Unterminated { line: 2 });
    }

    #[test]
    fn invalid_yaml_falls_back_to_key_values() {
        let input = "---\ntitle: A: B: [broken\ndescription: \"quoted\"\n---\nBody";
        let result = extract(input);
        assert_eq!(result.front_matter.title(), Some("A: B: [broken"));
        assert_eq!(result.front_matter.description(), Some("quoted"));
        assert_eq!(result.diagnostics.len(), 1);
    }

    #[test]
    fn non_mapping_root_is_ignored() {
        let result = extract("---\n- a\n- b\n---\nBody");
        assert!(result.front_matter.is_empty());
        assert_eq!(result.diagnostics.len(), 1);
    }

    #[test]
    fn warns_on_bad_published_date() {
        let result = extract("---\npublished: someday\n---\n");
        assert_eq!(result.front_matter.published(), Some("someday"));
        assert!(result.front_matter.published_date().is_none());
        assert_eq!(result.diagnostics.len(), 1);
    }

    #[test]
    fn string_draft_flag() {
        let result = extract("---\ndraft: \"true\"\nseries: \"rust-async\"\n---\n");
        assert!(result.front_matter.draft());
        assert_eq!(result.front_matter.series().as_deref(), Some("rust-async"));
    }

    #[test]
    fn block_round_trips() {
        let input = "---\ntitle: Round Trip\nslug: round-trip\npublished: '2023-12-01'\ndraft: false\n---\nHello\n";
        let first = extract(input);
        let rebuilt = format!(
            "{}{}",
            first.front_matter.to_block().expect("yaml"),
            first.body
        );
        let second = extract(&rebuilt);
        assert_eq!(second.front_matter, first.front_matter);
        assert_eq!(second.body, first.body);
    }

    #[test]
    fn empty_mapping_renders_no_block() {
        assert_eq!(FrontMatter::new().to_block().unwrap(), "");
    }
}
