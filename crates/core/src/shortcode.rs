//! Bracket-percent shortcode expansion.
//!
//! Shortcodes such as `{% img src="a.png" alt="A" %}` are neither markdown
//! nor HTML, so they are rewritten into literal HTML fragments on the raw body
//! before parsing. Text outside a match passes through untouched.
//!
//! Parameter values are everything between a pair of double quotes; escaped
//! quotes inside a value are not supported.

use std::borrow::Cow;
use std::fmt;
use std::ops::Range;

use html_escape::encode_double_quoted_attribute as attr;
use markdown::mdast::Node;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use thiserror::Error;

use crate::error::{Diagnostics, SourceLocation};
use crate::parse::{ParseOptions, parse_mdast};

static SHORTCODE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\{%\s*(img|video|embed|youtube)\b((?:[^%"]|"[^"]*")*?)\s*%\}"#)
        .expect("shortcode pattern is valid")
});

static PARAM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([A-Za-z_][A-Za-z0-9_-]*)\s*=\s*"([^"]*)""#).expect("param pattern is valid")
});

/// Recognised shortcode kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortcodeKind {
    /// `{% img src alt %}`
    Image,
    /// `{% video src %}`
    Video,
    /// `{% embed src title %}`
    Embed,
    /// `{% youtube id title %}`
    YouTube,
}

impl ShortcodeKind {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "img" => Some(Self::Image),
            "video" => Some(Self::Video),
            "embed" => Some(Self::Embed),
            "youtube" => Some(Self::YouTube),
            _ => None,
        }
    }

    /// Name as written in content.
    pub fn name(self) -> &'static str {
        match self {
            Self::Image => "img",
            Self::Video => "video",
            Self::Embed => "embed",
            Self::YouTube => "youtube",
        }
    }
}

impl fmt::Display for ShortcodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A shortcode that matched syntactically but cannot be expanded.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShortcodeError {
    /// A required parameter was not captured or is blank.
    #[error("`{{% {kind} %}}` is missing required parameter `{parameter}`")]
    MissingParameter {
        /// Shortcode kind
        kind: ShortcodeKind,
        /// Name of the missing parameter
        parameter: &'static str,
    },
}

/// Where relative asset paths resolve to: `<base_url>/<slug>/images/<path>`.
#[derive(Debug, Clone, Copy)]
pub struct AssetContext<'a> {
    /// Asset base URL, e.g. `https://cdn/posts`.
    pub base_url: &'a str,
    /// Post slug.
    pub slug: &'a str,
}

impl<'a> AssetContext<'a> {
    /// Creates a context for one post.
    pub fn new(base_url: &'a str, slug: &'a str) -> Self {
        Self { base_url, slug }
    }

    /// Resolves an authored asset path.
    ///
    /// Absolute and root-relative URLs are returned as written.
    pub fn resolve(&self, path: &str) -> String {
        if is_absolute(path) {
            return path.to_string();
        }
        let path = path.trim_start_matches("./");
        let base = self.base_url.trim_end_matches('/');
        let slug = self.slug.trim_matches('/');
        [base, slug, "images", path]
            .into_iter()
            .filter(|segment| !segment.is_empty())
            .collect::<Vec<_>>()
            .join("/")
    }
}

fn is_absolute(path: &str) -> bool {
    path.starts_with("http://")
        || path.starts_with("https://")
        || path.starts_with("//")
        || path.starts_with('/')
}

/// One matched shortcode and its captured parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shortcode<'a> {
    /// Kind of shortcode
    pub kind: ShortcodeKind,
    params: Vec<(&'a str, &'a str)>,
}

impl<'a> Shortcode<'a> {
    /// Parses a single shortcode occurrence, e.g. `{% video src="a.mp4" %}`.
    pub fn parse(text: &'a str) -> Option<Self> {
        let caps = SHORTCODE.captures(text)?;
        let whole = caps.get(0)?;
        if whole.start() != 0 || whole.end() != text.len() {
            return None;
        }
        Self::from_captures(&caps)
    }

    fn from_captures(caps: &Captures<'a>) -> Option<Self> {
        let kind = ShortcodeKind::from_name(caps.get(1)?.as_str())?;
        let params = caps
            .get(2)
            .map(|raw| {
                PARAM
                    .captures_iter(raw.as_str())
                    .filter_map(|p| Some((p.get(1)?.as_str(), p.get(2)?.as_str())))
                    .collect()
            })
            .unwrap_or_default();
        Some(Self { kind, params })
    }

    /// First value captured for `name`.
    pub fn param(&self, name: &str) -> Option<&'a str> {
        self.params
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| *value)
    }

    /// A blank value counts as missing.
    fn required(&self, name: &'static str) -> Result<&'a str, ShortcodeError> {
        self.param(name)
            .filter(|value| !value.trim().is_empty())
            .ok_or(ShortcodeError::MissingParameter {
                kind: self.kind,
                parameter: name,
            })
    }

    /// Expands to an HTML fragment. Depends only on kind, parameters, and assets.
    pub fn expand(&self, assets: &AssetContext<'_>) -> Result<String, ShortcodeError> {
        let html = match self.kind {
            ShortcodeKind::Image => {
                let src = assets.resolve(self.required("src")?);
                let alt = self.param("alt").unwrap_or_default();
                format!(
                    r#"<img src="{}" alt="{}" loading="lazy" />"#,
                    attr(&src),
                    attr(alt)
                )
            }
            ShortcodeKind::Video => {
                let src = assets.resolve(self.required("src")?);
                format!(
                    r#"<video controls><source src="{}" type="video/mp4" /></video>"#,
                    attr(&src)
                )
            }
            ShortcodeKind::Embed => {
                let src = self.required("src")?;
                let title = self.param("title").unwrap_or_default();
                format!(
                    r#"<iframe src="{}" title="{}" loading="lazy"></iframe>"#,
                    attr(src),
                    attr(title)
                )
            }
            ShortcodeKind::YouTube => {
                let id = self.required("id")?;
                let title = self.param("title").unwrap_or("Play video");
                format!(
                    r#"<lite-youtube videoid="{}" playlabel="{}"></lite-youtube>"#,
                    attr(id),
                    attr(title)
                )
            }
        };
        Ok(html)
    }
}

/// Options for [`rewrite_shortcodes`].
#[derive(Debug, Clone, Copy)]
pub struct ShortcodeOptions {
    /// Leave shortcodes inside code blocks literal, including blocks nested in
    /// lists and block quotes.
    pub skip_code_fences: bool,
}

impl Default for ShortcodeOptions {
    fn default() -> Self {
        Self {
            skip_code_fences: true,
        }
    }
}

/// Output of [`rewrite_shortcodes`].
#[derive(Debug)]
pub struct ShortcodeRewrite<'a> {
    /// Body with shortcodes expanded.
    pub text: Cow<'a, str>,
    /// Number of shortcodes expanded.
    pub expanded: usize,
    /// Shortcodes left unexpanded, with their location in the body.
    pub diagnostics: Diagnostics,
}

/// Replaces every recognised shortcode in `input` with its HTML expansion.
///
/// Malformed shortcodes are left as written and reported through
/// `diagnostics`; they never fail the document.
pub fn rewrite_shortcodes<'a>(
    input: &'a str,
    assets: &AssetContext<'_>,
    options: ShortcodeOptions,
) -> ShortcodeRewrite<'a> {
    let mut rewriter = Rewriter {
        assets,
        expanded: 0,
        diagnostics: Diagnostics::new(),
    };

    if !input.contains("{%") {
        return rewriter.finish(Cow::Borrowed(input));
    }
    let code = if options.skip_code_fences {
        code_block_ranges(input)
    } else {
        Vec::new()
    };
    let text = rewriter.rewrite(input, &code);
    rewriter.finish(text)
}

/// Byte ranges of fenced and indented code blocks, at any nesting depth.
fn code_block_ranges(input: &str) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    match parse_mdast(input, &ParseOptions::blog()) {
        Ok(root) => collect_code(&root, &mut ranges),
        Err(err) => log::warn!("cannot locate code blocks, expanding shortcodes everywhere: {err}"),
    }
    ranges
}

fn collect_code(node: &Node, ranges: &mut Vec<Range<usize>>) {
    if let Node::Code(code) = node {
        if let Some(position) = &code.position {
            ranges.push(position.start.offset..position.end.offset);
        }
        return;
    }
    for child in node.children().into_iter().flatten() {
        collect_code(child, ranges);
    }
}

struct Rewriter<'c> {
    assets: &'c AssetContext<'c>,
    expanded: usize,
    diagnostics: Diagnostics,
}

impl Rewriter<'_> {
    fn rewrite<'t>(&mut self, input: &'t str, code: &[Range<usize>]) -> Cow<'t, str> {
        SHORTCODE.replace_all(input, |caps: &Captures<'_>| {
            let whole = &caps[0];
            let start = caps.get(0).map_or(0, |m| m.start());
            if code.iter().any(|range| range.contains(&start)) {
                return whole.to_string();
            }
            let Some(shortcode) = Shortcode::from_captures(caps) else {
                return whole.to_string();
            };
            match shortcode.expand(self.assets) {
                Ok(html) => {
                    self.expanded += 1;
                    html
                }
                Err(err) => {
                    let location = locate(input, start);
                    log::warn!("leaving shortcode unexpanded at {location}: {err}");
                    self.diagnostics.error(err.to_string(), Some(location));
                    whole.to_string()
                }
            }
        })
    }

    fn finish<'t>(self, text: Cow<'t, str>) -> ShortcodeRewrite<'t> {
        ShortcodeRewrite {
            text,
            expanded: self.expanded,
            diagnostics: self.diagnostics,
        }
    }
}

fn locate(input: &str, byte: usize) -> SourceLocation {
    let before = &input[..byte];
    let line = 1 + before.matches('\n').count();
    let column = match before.rfind('\n') {
        Some(pos) => before[pos + 1..].chars().count() + 1,
        None => before.chars().count() + 1,
    };
    SourceLocation::new(line, column)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CDN: AssetContext<'static> = AssetContext {
        base_url: "https://cdn/posts",
        slug: "post-1",
    };

    fn rewrite(input: &str) -> ShortcodeRewrite<'_> {
        rewrite_shortcodes(input, &CDN, ShortcodeOptions::default())
    }

    #[test]
    fn expands_image() {
        let out = rewrite(r#"{% img src="a.png" alt="A" %}"#);
        insta::assert_snapshot!(out.text, @r#"<img src="https://cdn/posts/post-1/images/a.png" alt="A" loading="lazy" />"#);
        assert_eq!(out.expanded, 1);
    }

    #[test]
    fn expands_video_embed_and_youtube() {
        let input = concat!(
            "{% video src=\"clip.mp4\" %}\n",
            "{% embed src=\"https://codepen.io/x\" title=\"Pen\" %}\n",
            "{% youtube id=\"dQw4w9WgXcQ\" title=\"Talk\" %}\n",
        );
        let out = rewrite(input);
        assert_eq!(out.expanded, 3);
        let lines: Vec<&str> = out.text.lines().collect();
        assert_eq!(
            lines[0],
            r#"<video controls><source src="https://cdn/posts/post-1/images/clip.mp4" type="video/mp4" /></video>"#
        );
        assert_eq!(
            lines[1],
            r#"<iframe src="https://codepen.io/x" title="Pen" loading="lazy"></iframe>"#
        );
        assert_eq!(
            lines[2],
            r#"<lite-youtube videoid="dQw4w9WgXcQ" playlabel="Talk"></lite-youtube>"#
        );
    }

    #[test]
    fn multiple_occurrences_and_surrounding_text() {
        let input = r#"See {% img src="a.png" alt="A" %} and {% img src="b.png" alt="B" %}!"#;
        let out = rewrite(input);
        assert_eq!(out.expanded, 2);
        assert!(out.text.starts_with("See <img "));
        assert!(out.text.contains("/images/b.png\" alt=\"B\""));
        assert!(out.text.ends_with(" />!"));
    }

    #[test]
    fn expansion_ignores_surroundings() {
        let code = r#"{% img src="x.png" alt="X" %}"#;
        let alone = rewrite(code).text.into_owned();
        let embedded = rewrite(&format!("# Title\n\ntext {code} more")).text.into_owned();
        assert!(embedded.contains(&alone));
    }

    #[test]
    fn param_order_and_spacing_do_not_matter() {
        let a = rewrite(r#"{%img alt="A"   src="a.png"%}"#).text.into_owned();
        let b = rewrite(r#"{% img src="a.png" alt="A" %}"#).text.into_owned();
        assert_eq!(a, b);
    }

    #[test]
    fn unknown_shortcodes_untouched() {
        let input = "{% gallery src=\"x\" %} and {% raw %}";
        let out = rewrite(input);
        assert_eq!(out.text, input);
        assert_eq!(out.expanded, 0);
        assert!(out.diagnostics.is_empty());
    }

    #[test]
    fn missing_parameter_is_left_literal_and_reported() {
        let input = "intro\n\n  {% img alt=\"no source\" %}";
        let out = rewrite(input);
        assert_eq!(out.text, input);
        assert_eq!(out.expanded, 0);
        let diag = out.diagnostics.iter().next().expect("diagnostic");
        assert_eq!(diag.location, Some(SourceLocation::new(3, 3)));
        assert!(diag.message.contains("`src`"), "{}", diag.message);
    }

    #[test]
    fn shortcodes_inside_fences_stay_literal() {
        let input = "```md\n{% img src=\"a.png\" alt=\"A\" %}\n```\n{% img src=\"b.png\" alt=\"B\" %}\n";
        let out = rewrite(input);
        assert_eq!(out.expanded, 1);
        assert!(out.text.contains("```md\n{% img src=\"a.png\" alt=\"A\" %}\n```\n"));
        assert!(out.text.contains("/post-1/images/b.png"));

        let everywhere = rewrite_shortcodes(
            input,
            &CDN,
            ShortcodeOptions {
                skip_code_fences: false,
            },
        );
        assert_eq!(everywhere.expanded, 2);
    }

    #[test]
    fn fences_nested_in_lists_stay_literal() {
        let input = concat!(
            "1. Step one\n",
            "\n",
            "    ```md\n",
            "    {% img src=\"a.png\" alt=\"A\" %}\n",
            "    ```\n",
            "\n",
            "> ~~~\n",
            "> {% video src=\"clip.mp4\" %}\n",
            "> ~~~\n",
            "\n",
            "{% img src=\"b.png\" alt=\"B\" %}\n",
        );
        let out = rewrite(input);
        assert_eq!(out.expanded, 1);
        assert!(out.text.contains("    {% img src=\"a.png\" alt=\"A\" %}\n"));
        assert!(out.text.contains("> {% video src=\"clip.mp4\" %}\n"));
        assert!(out.text.contains("/post-1/images/b.png"));
    }

    #[test]
    fn indented_code_stays_literal() {
        let input = "Usage:\n\n    {% img src=\"a.png\" %}\n";
        let out = rewrite(input);
        assert_eq!(out.expanded, 0);
        assert_eq!(out.text, input);
    }

    #[test]
    fn blank_required_parameter_is_reported() {
        for input in [r#"{% img src="" alt="A" %}"#, r#"{% youtube id="  " %}"#] {
            let out = rewrite(input);
            assert_eq!(out.text, input);
            assert_eq!(out.expanded, 0);
            assert_eq!(out.diagnostics.len(), 1, "{input}");
        }
    }

    #[test]
    fn escapes_attribute_values() {
        let out = rewrite(r#"{% img src="a.png" alt="Tom & <Jerry>" %}"#);
        assert!(out.text.contains(r#"alt="Tom &amp; &lt;Jerry&gt;""#), "{}", out.text);
    }

    #[test]
    fn resolves_paths() {
        assert_eq!(CDN.resolve("./a.png"), "https://cdn/posts/post-1/images/a.png");
        assert_eq!(CDN.resolve("https://x.io/a.png"), "https://x.io/a.png");
        assert_eq!(CDN.resolve("/static/a.png"), "/static/a.png");
        let no_slug = AssetContext::new("/posts/", "");
        assert_eq!(no_slug.resolve("a.png"), "/posts/images/a.png");
    }

    #[test]
    fn parses_single_shortcode() {
        let shortcode = Shortcode::parse(r#"{% youtube id="abc" %}"#).expect("shortcode");
        assert_eq!(shortcode.kind, ShortcodeKind::YouTube);
        assert_eq!(shortcode.param("id"), Some("abc"));
        assert_eq!(shortcode.param("title"), None);
        assert!(Shortcode::parse(r#"x {% youtube id="abc" %}"#).is_none());
    }
}
