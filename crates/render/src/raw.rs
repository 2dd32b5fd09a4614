//! Raw HTML islands.
//!
//! Shortcode expansions and hand-written HTML reach the converter as markdown
//! `html` nodes. They are parsed with `tl` into real elements so later passes
//! can see them.

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::hast::{Element, Node, is_void};

static TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<!--[\s\S]*?-->|<(/?)([A-Za-z][A-Za-z0-9-]*)(?:[^>"']|"[^"]*"|'[^']*')*?(/?)>"#)
        .expect("tag pattern compiles")
});

/// Net element depth change across an HTML fragment.
///
/// Opening tags count +1 and closing tags -1. Void elements, self-closing
/// tags and comments do not count.
pub fn depth_delta(html: &str) -> isize {
    let mut depth = 0isize;
    for caps in TAG.captures_iter(html) {
        let Some(name) = caps.get(2) else {
            continue;
        };
        let name = name.as_str().to_ascii_lowercase();
        let closing = caps.get(1).is_some_and(|m| !m.as_str().is_empty());
        let self_closing = caps.get(3).is_some_and(|m| !m.as_str().is_empty());
        if closing {
            depth -= 1;
        } else if !self_closing && !is_void(&name) {
            depth += 1;
        }
    }
    depth
}

/// Parses an HTML fragment into tree nodes.
///
/// Entities in text and attribute values are decoded, attributes keep their
/// source order, and anything nested under a void element is moved up to
/// follow it. Input `tl` cannot handle comes back as a single raw node.
pub fn parse_fragment(html: &str) -> Vec<Node> {
    let Ok(dom) = tl::parse(html, tl::ParserOptions::default()) else {
        log::debug!("raw html fragment kept verbatim");
        return vec![Node::Raw(html.to_string())];
    };
    let parser = dom.parser();
    let mut out = Vec::new();
    for handle in dom.children() {
        convert(*handle, parser, &mut out);
    }
    out
}

fn convert(handle: tl::NodeHandle, parser: &tl::Parser<'_>, out: &mut Vec<Node>) {
    let Some(node) = handle.get(parser) else {
        return;
    };
    match node {
        tl::Node::Tag(tag) => {
            let mut element = Element::new(tag.name().as_utf8_str().to_ascii_lowercase());
            element.attrs = attributes(tag);

            let mut children = Vec::new();
            for child in tag.children().top().iter() {
                convert(*child, parser, &mut children);
            }

            if is_void(&element.tag) {
                out.push(Node::Element(element));
                out.extend(children);
            } else {
                element.children = children;
                out.push(Node::Element(element));
            }
        }
        tl::Node::Raw(bytes) => {
            let text = bytes.as_utf8_str();
            if !text.is_empty() {
                out.push(Node::Text(decode(&text)));
            }
        }
        tl::Node::Comment(bytes) => {
            let text = bytes.as_utf8_str();
            let body = text
                .strip_prefix("<!--")
                .and_then(|rest| rest.strip_suffix("-->"))
                .unwrap_or(&text);
            out.push(Node::Comment(body.to_string()));
        }
    }
}

fn attributes(tag: &tl::HTMLTag<'_>) -> Vec<(String, Option<String>)> {
    let source = tag.raw().as_utf8_str();
    let opening = opening_tag(&source).to_ascii_lowercase();

    let mut attrs: Vec<(String, Option<String>)> = Vec::new();
    for (name, value) in tag.attributes().iter() {
        let name = name.to_ascii_lowercase();
        if attrs.iter().any(|(seen, _)| *seen == name) {
            continue;
        }
        attrs.push((name, value.map(|v| decode(&v))));
    }
    let extra = [
        ("id", tag.attributes().id()),
        ("class", tag.attributes().class()),
    ];
    for (name, value) in extra {
        if let Some(value) = value
            && !attrs.iter().any(|(seen, _)| seen == name)
        {
            attrs.push((name.to_string(), Some(decode(&value.as_utf8_str()))));
        }
    }

    // tl keeps attributes in a hash map; restore the order they were written in.
    attrs.sort_by_key(|(name, _)| attribute_position(&opening, name));
    attrs
}

/// The `<tag ...>` prefix of an element's source, respecting quoted values.
fn opening_tag(source: &str) -> &str {
    let mut quote = None;
    for (index, ch) in source.char_indices() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(ch),
            (None, '>') => return &source[..=index],
            (None, _) => {}
        }
    }
    source
}

fn attribute_position(opening: &str, name: &str) -> usize {
    let bytes = opening.as_bytes();
    let mut from = 0;
    while let Some(found) = opening[from..].find(name) {
        let start = from + found;
        let end = start + name.len();
        let before = start.checked_sub(1).map(|i| bytes[i]);
        let after = bytes.get(end).copied();
        if before.is_some_and(|b| b.is_ascii_whitespace())
            && after.is_none_or(|b| b == b'=' || b == b'/' || b == b'>' || b.is_ascii_whitespace())
        {
            return start;
        }
        from = end;
    }
    usize::MAX
}

fn decode(text: &str) -> String {
    match html_escape::decode_html_entities(text) {
        Cow::Borrowed(text) => text.to_string(),
        Cow::Owned(text) => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialize::nodes_to_html;

    #[test]
    fn depth_counts_open_and_close() {
        assert_eq!(depth_delta("<video controls>"), 1);
        assert_eq!(depth_delta("</video>"), -1);
        assert_eq!(depth_delta("<img src=\"a.png\">"), 0);
        assert_eq!(depth_delta("<x-el />"), 0);
        assert_eq!(depth_delta("<!-- <div> -->"), 0);
        assert_eq!(depth_delta("<a title=\"a > b\">x</a>"), 0);
    }

    #[test]
    fn parses_elements_with_source_attribute_order() {
        let nodes = parse_fragment(
            "<iframe src=\"https://x.test/?a=1&amp;b=2\" title=\"Demo\" loading=\"lazy\"></iframe>",
        );
        let Some(Node::Element(iframe)) = nodes.first() else {
            panic!("expected element, got {nodes:?}");
        };
        assert_eq!(iframe.tag, "iframe");
        let names: Vec<_> = iframe.attrs.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["src", "title", "loading"]);
        assert_eq!(iframe.attr("src"), Some("https://x.test/?a=1&b=2"));
    }

    #[test]
    fn nested_markup_round_trips() {
        let html = "<video controls><source src=\"/posts/p/images/a.mp4\" type=\"video/mp4\" /></video>";
        assert_eq!(nodes_to_html(&parse_fragment(html)), html);
    }

    #[test]
    fn text_entities_are_decoded_once() {
        let nodes = parse_fragment("<span>a &amp; b</span>");
        assert_eq!(nodes[0].text_content(), "a & b");
        assert_eq!(nodes_to_html(&nodes), "<span>a &amp; b</span>");
    }

    #[test]
    fn opening_tag_ignores_quoted_brackets() {
        assert_eq!(opening_tag("<a title=\"x>y\">z</a>"), "<a title=\"x>y\">");
    }
}
