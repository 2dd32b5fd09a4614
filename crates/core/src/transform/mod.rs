//! Markdown-tree passes run by [`ParserPipeline`](crate::parse::ParserPipeline).

use markdown::mdast::Node;

use crate::slug::{Slugger, split_custom_id};

/// Typographic punctuation pass.
pub mod smartypants;
/// Table-of-contents synthesis pass.
pub mod toc;

pub use smartypants::SmartPunctuation;
pub use toc::{TableOfContents, TocOptions};

/// Plain text of an inline subtree, as a reader would see it.
///
/// Raw HTML, footnote calls and image alt text are skipped, matching the text content of the
/// rendered HTML.
pub fn plain_text(node: &Node) -> String {
    let mut out = String::new();
    push_text(node, &mut out);
    out
}

fn push_text(node: &Node, out: &mut String) {
    match node {
        Node::Text(text) => out.push_str(&text.value),
        Node::InlineCode(code) => out.push_str(&code.value),
        Node::InlineMath(math) => out.push_str(&math.value),
        Node::Break(_) => out.push('\n'),
        Node::Html(_) | Node::Image(_) | Node::ImageReference(_) | Node::FootnoteReference(_) => {}
        other => {
            if let Some(children) = other.children() {
                for child in children {
                    push_text(child, out);
                }
            }
        }
    }
}

/// Assigns the id a heading will carry in the rendered output.
///
/// A trailing `{#id}` wins over the slugified text. Both go through the same
/// [`Slugger`], so calling this for every heading in document order reproduces
/// the ids the HTML heading pass assigns.
pub fn heading_id(slugger: &mut Slugger, text: &str) -> String {
    match split_custom_id(text) {
        (_, Some(id)) => slugger.claim(id),
        (visible, None) => slugger.slug(visible),
    }
}
