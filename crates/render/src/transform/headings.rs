//! Heading ids and self-referencing anchors.

use folio_core::error::StageError;
use folio_core::slug::Slugger;
use serde::{Deserialize, Serialize};

use super::{HeadingEntry, HtmlTransform, RenderState};
use crate::hast::{Element, Node, Root};

/// How the self-link is attached to a heading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnchorStyle {
    /// Heading content goes inside `<a href="#id">`.
    #[default]
    Wrap,
    /// A `#` anchor is inserted before the heading content.
    Prepend,
    /// Only the `id` is assigned.
    None,
}

/// Assigns unique ids to `h1`-`h6` and links each heading to itself.
///
/// An `id` already on the heading (from `{#id}` or raw HTML) is kept but still
/// made unique. Headings that already contain a link always get the prepended
/// anchor so links never nest.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeadingAnchors {
    style: AnchorStyle,
}

impl HeadingAnchors {
    /// Creates the pass with the given anchor style.
    pub fn new(style: AnchorStyle) -> Self {
        Self { style }
    }
}

impl HtmlTransform for HeadingAnchors {
    fn name(&self) -> &'static str {
        "heading-anchors"
    }

    fn transform(&self, root: &mut Root, state: &mut RenderState) -> Result<(), StageError> {
        let mut slugger = Slugger::new();
        visit(&mut root.children, self.style, &mut slugger, &mut state.headings);
        Ok(())
    }
}

fn visit(nodes: &mut [Node], style: AnchorStyle, slugger: &mut Slugger, headings: &mut Vec<HeadingEntry>) {
    for node in nodes {
        let Node::Element(element) = node else {
            continue;
        };
        // The footnote label is not part of the document outline.
        if element.tag == "section" && element.has_attr("data-footnotes") {
            continue;
        }
        match element.heading_depth() {
            Some(depth) => anchor(element, depth, style, slugger, headings),
            None => visit(&mut element.children, style, slugger, headings),
        }
    }
}

fn anchor(
    heading: &mut Element,
    depth: u8,
    style: AnchorStyle,
    slugger: &mut Slugger,
    headings: &mut Vec<HeadingEntry>,
) {
    let text = heading_text(heading);
    let id = match heading.attr("id") {
        Some(existing) if !existing.is_empty() => slugger.claim(existing),
        _ => slugger.slug(&text),
    };
    heading.set_attr("id", id.clone());

    headings.push(HeadingEntry {
        depth,
        id: id.clone(),
        text: text.trim().to_string(),
    });

    let style = if style == AnchorStyle::Wrap && contains_link(&heading.children) {
        AnchorStyle::Prepend
    } else {
        style
    };
    let href = format!("#{id}");
    match style {
        AnchorStyle::Wrap => {
            let children = std::mem::take(&mut heading.children);
            heading.children.push(
                Element::new("a")
                    .with_attr("href", href)
                    .with_children(children)
                    .into(),
            );
        }
        AnchorStyle::Prepend => {
            let link = Element::new("a")
                .with_attr("class", "heading-anchor")
                .with_attr("href", href)
                .with_attr("aria-hidden", "true")
                .with_attr("tabindex", "-1")
                .with_child(Node::text("#"));
            heading.children.insert(0, link.into());
        }
        AnchorStyle::None => {}
    }
}

/// Visible heading text without footnote calls, matching the markdown-side text
/// used for table-of-contents links.
fn heading_text(heading: &Element) -> String {
    let mut out = String::new();
    push_heading_text(&heading.children, &mut out);
    out
}

fn push_heading_text(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Element(element) if is_footnote_call(element) => {}
            Node::Element(element) => push_heading_text(&element.children, out),
            Node::Raw(_) | Node::Comment(_) => {}
        }
    }
}

fn is_footnote_call(element: &Element) -> bool {
    match element.tag.as_str() {
        "a" => element.has_attr("data-footnote-ref"),
        "sup" => element
            .children
            .iter()
            .any(|child| child.as_element().is_some_and(is_footnote_call)),
        _ => false,
    }
}

fn contains_link(nodes: &[Node]) -> bool {
    nodes.iter().any(|node| match node {
        Node::Element(element) => element.tag == "a" || contains_link(&element.children),
        _ => false,
    })
}
