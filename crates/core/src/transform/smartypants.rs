//! Smart punctuation over markdown text nodes (smart quotes, dashes, ellipsis).

use std::iter::Peekable;
use std::str::Chars;

use markdown::mdast::Node;

use crate::error::StageError;
use crate::parse::AstTransform;

/// Rewrites straight quotes, `--`, `---` and `...` in text nodes.
///
/// Code, inline code and raw HTML are never touched. Quote direction looks at
/// the previous visible character, which may sit in a sibling inline node of
/// the same block.
#[derive(Debug, Default, Clone, Copy)]
pub struct SmartPunctuation;

impl AstTransform for SmartPunctuation {
    fn name(&self) -> &'static str {
        "smart-punctuation"
    }

    fn transform(&self, root: &mut Node) -> Result<(), StageError> {
        let mut prev = None;
        visit(root, &mut prev);
        Ok(())
    }
}

fn visit(node: &mut Node, prev: &mut Option<char>) {
    match node {
        Node::Text(text) => {
            text.value = smarten(&text.value, *prev);
            if let Some(last) = text.value.chars().last() {
                *prev = Some(last);
            }
        }
        Node::InlineCode(code) => {
            if let Some(last) = code.value.chars().last() {
                *prev = Some(last);
            }
        }
        Node::Break(_) => *prev = Some('\n'),
        Node::Code(_) | Node::Math(_) | Node::Html(_) | Node::Image(_) | Node::ImageReference(_) => {}
        // Blocks start a fresh quote context for each child.
        Node::Root(_)
        | Node::Blockquote(_)
        | Node::List(_)
        | Node::ListItem(_)
        | Node::Table(_)
        | Node::TableRow(_)
        | Node::FootnoteDefinition(_) => {
            if let Some(children) = node.children_mut() {
                for child in children {
                    let mut fresh = None;
                    visit(child, &mut fresh);
                }
            }
        }
        Node::Paragraph(_) | Node::Heading(_) | Node::TableCell(_) => {
            let mut fresh = None;
            if let Some(children) = node.children_mut() {
                for child in children {
                    visit(child, &mut fresh);
                }
            }
        }
        other => {
            if let Some(children) = other.children_mut() {
                for child in children {
                    visit(child, prev);
                }
            }
        }
    }
}

/// Applies replacements to one run of text; `prev` is the character that visually precedes it.
pub fn smarten(input: &str, prev: Option<char>) -> String {
    if !input.contains(['"', '\'', '-']) && !input.contains("...") {
        return input.to_string();
    }

    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        replace_punctuation(c, &mut chars, &mut out, prev);
    }
    out
}

fn is_opening(out: &str, prev: Option<char>) -> bool {
    let last = out.chars().last().or(prev);
    match last {
        None => true,
        Some(c) => c.is_whitespace() || "([{\"'\u{201c}\u{2018}\u{2013}\u{2014}".contains(c),
    }
}

/// Replaces ASCII punctuation with smart Unicode equivalents.
fn replace_punctuation(c: char, chars: &mut Peekable<Chars<'_>>, out: &mut String, prev: Option<char>) {
    match c {
        '-' => match chars.peek() {
            Some('-') => {
                chars.next();
                match chars.peek() {
                    Some('-') => {
                        chars.next();
                        out.push('\u{2014}');
                    }
                    _ => out.push('\u{2013}'),
                }
            }
            _ => out.push('-'),
        },
        '.' => match chars.peek() {
            Some('.') => {
                if let Some('.') = chars.clone().nth(1) {
                    chars.next();
                    chars.next();
                    out.push('\u{2026}');
                } else {
                    out.push('.');
                }
            }
            _ => out.push('.'),
        },
        '"' => {
            let quote = if is_opening(out, prev) { '\u{201c}' } else { '\u{201d}' };
            out.push(quote);
        }
        '\'' => {
            let quote = if is_opening(out, prev) { '\u{2018}' } else { '\u{2019}' };
            out.push(quote);
        }
        _ => out.push(c),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::{ParseOptions, parse_mdast};
    use crate::transform::plain_text;

    fn run(input: &str) -> Node {
        let mut root = parse_mdast(input, &ParseOptions::blog()).expect("parse");
        SmartPunctuation.transform(&mut root).expect("transform");
        root
    }

    #[test]
    fn transforms_basic_punctuation() {
        let out = smarten("Hello -- \"world\" ... and 'quote' --- end", None);
        assert_eq!(
            out,
            "Hello \u{2013} \u{201c}world\u{201d} \u{2026} and \u{2018}quote\u{2019} \u{2014} end"
        );
    }

    #[test]
    fn apostrophes_close() {
        assert_eq!(smarten("don't", None), "don\u{2019}t");
    }

    #[test]
    fn two_dots_are_left_alone() {
        assert_eq!(smarten("a.. b", None), "a.. b");
    }

    #[test]
    fn skips_code() {
        let root = run("Use `\"--\"` here -- ok\n\n```\n\"quoted\" -- x\n```\n");
        let children = root.children().expect("children");
        assert_eq!(plain_text(&children[0]), "Use \"--\" here \u{2013} ok");
        let Node::Code(code) = &children[1] else {
            panic!("expected code block");
        };
        assert_eq!(code.value, "\"quoted\" -- x");
    }

    #[test]
    fn quote_context_carries_across_emphasis() {
        let root = run("*say*\" and \"*hi*\"\n");
        let children = root.children().expect("children");
        assert_eq!(plain_text(&children[0]), "say\u{201d} and \u{201c}hi\u{201d}");
    }

    #[test]
    fn raw_html_untouched() {
        let root = run("<span title=\"a--b\">x</span>\n");
        let children = root.children().expect("children");
        let Node::Paragraph(paragraph) = &children[0] else {
            panic!("expected paragraph, got {:?}", children[0]);
        };
        let html = paragraph
            .children
            .iter()
            .find_map(|node| match node {
                Node::Html(html) => Some(html),
                _ => None,
            })
            .expect("inline html");
        assert!(html.value.contains("\"a--b\""));
    }

    #[test]
    fn each_paragraph_starts_fresh() {
        let root = run("end.\n\n\"start\n");
        let children = root.children().expect("children");
        assert_eq!(plain_text(&children[1]), "\u{201c}start");
    }
}
