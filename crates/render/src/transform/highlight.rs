//! Class-based syntax highlighting for `pre > code` blocks.
//!
//! Every source line becomes a `span.line` (plus `highlighted` for lines named
//! in a `{1,3-5}` meta) holding nested spans whose classes are the scope atoms.
//! Only spans are added; the text content of the block is unchanged.

use std::collections::BTreeSet;

use folio_core::error::{Diagnostics, StageError};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use syntect::highlighting::ThemeSet;
use syntect::html::{ClassStyle, css_for_theme_with_class_style};
use syntect::parsing::{BasicScopeStackOp, ParseState, Scope, ScopeStack, SyntaxReference, SyntaxSet};
use syntect::util::LinesWithEndings;

use super::{HtmlTransform, RenderState};
use crate::hast::{Element, Node, Root};

static SYNTAXES: Lazy<SyntaxSet> = Lazy::new(SyntaxSet::load_defaults_newlines);
static THEMES: Lazy<ThemeSet> = Lazy::new(ThemeSet::load_defaults);

/// Highlighting settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HighlightOptions {
    /// Whether the pass runs at all.
    pub enabled: bool,
    /// Prefix added to every scope class, e.g. `hl-`.
    pub class_prefix: String,
}

impl Default for HighlightOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            class_prefix: String::new(),
        }
    }
}

/// The highlighting pass.
#[derive(Debug, Clone, Default)]
pub struct Highlight {
    class_prefix: String,
}

impl Highlight {
    /// Creates the pass from its options.
    pub fn new(options: &HighlightOptions) -> Self {
        Self {
            class_prefix: options.class_prefix.clone(),
        }
    }

    fn visit(&self, nodes: &mut [Node], diagnostics: &mut Diagnostics) -> Result<(), StageError> {
        for node in nodes {
            let Node::Element(element) = node else {
                continue;
            };
            if element.tag == "pre" {
                self.highlight_block(element, diagnostics)?;
            } else {
                self.visit(&mut element.children, diagnostics)?;
            }
        }
        Ok(())
    }

    fn highlight_block(&self, pre: &mut Element, diagnostics: &mut Diagnostics) -> Result<(), StageError> {
        let Some(code) = sole_code_child(pre) else {
            return Ok(());
        };
        // Already highlighted, or hand-written markup.
        if code.children.iter().any(|child| !matches!(child, Node::Text(_))) {
            return Ok(());
        }

        let text = code.text_content();
        let lang = code
            .classes()
            .find_map(|class| class.strip_prefix("language-"))
            .map(str::to_string);
        let marked = match code.remove_attr("data-meta").flatten() {
            Some(meta) => highlighted_lines(&meta, diagnostics),
            None => BTreeSet::new(),
        };

        let syntax = match lang.as_deref() {
            Some(token) => find_syntax(token),
            None => SYNTAXES.find_syntax_plain_text(),
        };

        code.children = self
            .highlight(&text, syntax, &marked)
            .map_err(|message| StageError::Highlight {
                lang: lang.unwrap_or_else(|| "text".to_string()),
                message,
            })?;
        Ok(())
    }

    fn highlight(
        &self,
        code: &str,
        syntax: &SyntaxReference,
        marked: &BTreeSet<usize>,
    ) -> Result<Vec<Node>, String> {
        let mut parser = ParseState::new(syntax);
        let mut stack = ScopeStack::new();
        let mut out = Vec::new();

        for (index, line) in LinesWithEndings::from(code).enumerate() {
            let content = line.trim_end_matches(['\n', '\r']);
            let ops = parser
                .parse_line(line, &SYNTAXES)
                .map_err(|err| err.to_string())?;

            let mut open = vec![line_span(marked.contains(&(index + 1)))];
            // Scopes still open from the previous line are reopened inside this one.
            for scope in stack.as_slice() {
                open.push(self.scope_span(*scope));
            }

            let mut cursor = 0;
            for (offset, op) in ops {
                let offset = offset.min(content.len());
                if offset > cursor {
                    push_text(&mut open, &content[cursor..offset]);
                    cursor = offset;
                }
                stack
                    .apply_with_hook(&op, |basic, _| match basic {
                        BasicScopeStackOp::Push(scope) => open.push(self.scope_span(scope)),
                        BasicScopeStackOp::Pop => close(&mut open),
                    })
                    .map_err(|err| format!("{err:?}"))?;
            }
            if cursor < content.len() {
                push_text(&mut open, &content[cursor..]);
            }

            while open.len() > 1 {
                close(&mut open);
            }
            out.extend(open.pop().map(Node::Element));

            let ending = &line[content.len()..];
            if !ending.is_empty() {
                out.push(Node::text(ending));
            }
        }

        Ok(out)
    }

    fn scope_span(&self, scope: Scope) -> Element {
        let class = scope
            .build_string()
            .split('.')
            .map(|atom| format!("{}{atom}", self.class_prefix))
            .collect::<Vec<_>>()
            .join(" ");
        Element::new("span").with_attr("class", class)
    }
}

impl HtmlTransform for Highlight {
    fn name(&self) -> &'static str {
        "highlight"
    }

    fn transform(&self, root: &mut Root, state: &mut RenderState) -> Result<(), StageError> {
        self.visit(&mut root.children, &mut state.diagnostics)
    }
}

fn sole_code_child(pre: &mut Element) -> Option<&mut Element> {
    let mut meaningful = pre
        .children
        .iter_mut()
        .filter(|child| !child.is_whitespace() && !matches!(child, Node::Comment(_)));
    let only = meaningful.next()?;
    if meaningful.next().is_some() {
        return None;
    }
    only.as_element_mut().filter(|element| element.tag == "code")
}

fn line_span(highlighted: bool) -> Element {
    let class = if highlighted { "line highlighted" } else { "line" };
    Element::new("span").with_attr("class", class)
}

fn push_text(open: &mut [Element], text: &str) {
    if let Some(innermost) = open.last_mut() {
        innermost.children.push(Node::text(text));
    }
}

/// Closes the innermost scope span; empty spans are dropped.
fn close(open: &mut Vec<Element>) {
    if open.len() <= 1 {
        return;
    }
    let Some(span) = open.pop() else {
        return;
    };
    if span.children.is_empty() {
        return;
    }
    if let Some(parent) = open.last_mut() {
        parent.children.push(span.into());
    }
}

/// Line numbers named by a `{1,3-5}` group in a code meta string.
///
/// Entries that are not a positive number or an ascending range are skipped
/// with a warning.
pub fn highlighted_lines(meta: &str, diagnostics: &mut Diagnostics) -> BTreeSet<usize> {
    let mut lines = BTreeSet::new();
    let Some(start) = meta.find('{') else {
        return lines;
    };
    let Some(len) = meta[start..].find('}') else {
        return lines;
    };

    for part in meta[start + 1..start + len].split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let range = match part.split_once('-') {
            Some((from, to)) => from.trim().parse::<usize>().ok().zip(to.trim().parse::<usize>().ok()),
            None => part.parse::<usize>().ok().map(|line| (line, line)),
        };
        match range {
            Some((from, to)) if from >= 1 && from <= to => lines.extend(from..=to),
            _ => {
                log::warn!("ignoring invalid line highlight `{part}`");
                diagnostics.warning(format!("invalid line highlight range `{part}`"), None);
            }
        }
    }
    lines
}

/// CSS for a bundled syntect theme, matching the classes this pass emits.
///
/// `prefix` must equal [`HighlightOptions::class_prefix`].
pub fn theme_css(theme: &str, prefix: &'static str) -> Result<String, StageError> {
    let Some(theme) = THEMES.themes.get(theme) else {
        return Err(StageError::InvalidOption {
            option: "theme",
            message: format!("unknown theme `{theme}`"),
        });
    };
    let style = if prefix.is_empty() {
        ClassStyle::Spaced
    } else {
        ClassStyle::SpacedPrefixed { prefix }
    };
    css_for_theme_with_class_style(theme, style).map_err(|err| StageError::InvalidOption {
        option: "theme",
        message: err.to_string(),
    })
}

/// Languages the bundled syntax set lacks, mapped to the closest one it has.
fn alias(token: &str) -> Option<&'static str> {
    let target = match token.to_ascii_lowercase().as_str() {
        "ts" | "typescript" | "tsx" | "mts" | "cts" | "jsx" | "mjs" | "cjs" => "js",
        "svelte" | "vue" | "astro" => "html",
        "shell" | "console" | "zsh" => "bash",
        "jsonc" | "json5" => "json",
        "scss" | "sass" | "less" => "css",
        _ => return None,
    };
    Some(target)
}

fn find_syntax(token: &str) -> &'static SyntaxReference {
    if let Some(syntax) = SYNTAXES.find_syntax_by_token(token) {
        return syntax;
    }
    if let Some(syntax) = alias(token).and_then(|target| SYNTAXES.find_syntax_by_token(target)) {
        log::debug!("highlighting `{token}` with the `{}` syntax", syntax.name);
        return syntax;
    }
    log::debug!("no syntax for `{token}`, using plain text");
    SYNTAXES.find_syntax_plain_text()
}
