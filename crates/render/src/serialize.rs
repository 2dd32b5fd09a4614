//! HTML tree serialization.
//!
//! Output depends only on the tree: attributes are written in stored order,
//! void elements close as `<tag />`, and text is escaped for its context.

use std::fmt::Write as _;

use crate::hast::{Element, Node, Root, is_void};

/// Serializes a whole document.
pub fn to_html(root: &Root) -> String {
    nodes_to_html(&root.children)
}

/// Serializes a sequence of sibling nodes.
pub fn nodes_to_html(nodes: &[Node]) -> String {
    let mut out = String::with_capacity(256);
    for node in nodes {
        write_node(node, false, &mut out);
    }
    out
}

fn write_node(node: &Node, raw_text: bool, out: &mut String) {
    match node {
        Node::Text(text) if raw_text => out.push_str(text),
        Node::Text(text) => {
            html_escape::encode_text_to_string(text, out);
        }
        Node::Raw(html) => out.push_str(html),
        Node::Comment(body) => {
            let _ = write!(out, "<!--{body}-->");
        }
        Node::Element(element) => write_element(element, out),
    }
}

fn write_element(element: &Element, out: &mut String) {
    out.push('<');
    out.push_str(&element.tag);
    for (name, value) in &element.attrs {
        out.push(' ');
        out.push_str(name);
        if let Some(value) = value {
            out.push_str("=\"");
            html_escape::encode_double_quoted_attribute_to_string(value, out);
            out.push('"');
        }
    }

    if is_void(&element.tag) {
        out.push_str(" />");
        return;
    }
    out.push('>');

    let raw_text = matches!(element.tag.as_str(), "script" | "style");
    for child in &element.children {
        write_node(child, raw_text, out);
    }

    out.push_str("</");
    out.push_str(&element.tag);
    out.push('>');
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_text_and_attributes() {
        let root = Root::new(vec![
            Element::new("a")
                .with_attr("href", "/q?a=1&b=\"2\"")
                .with_child(Node::text("1 < 2 & 3"))
                .into(),
        ]);
        assert_eq!(
            to_html(&root),
            "<a href=\"/q?a=1&amp;b=&quot;2&quot;\">1 &lt; 2 &amp; 3</a>"
        );
    }

    #[test]
    fn void_and_boolean_attributes() {
        let root = Root::new(vec![
            Element::new("input")
                .with_attr("type", "checkbox")
                .with_flag("disabled")
                .into(),
        ]);
        assert_eq!(to_html(&root), "<input type=\"checkbox\" disabled />");
    }

    #[test]
    fn script_text_and_raw_pass_through() {
        let root = Root::new(vec![
            Element::new("script").with_child(Node::text("a < b && c")).into(),
            Node::Raw("<x-widget>".into()),
            Node::Comment(" note ".into()),
        ]);
        assert_eq!(
            to_html(&root),
            "<script>a < b && c</script><x-widget><!-- note -->"
        );
    }

    #[test]
    fn serialization_is_repeatable() {
        let root = Root::new(vec![
            Element::new("p")
                .with_attr("b", "2")
                .with_attr("a", "1")
                .with_child(Node::text("x"))
                .into(),
        ]);
        assert_eq!(to_html(&root), to_html(&root));
        insta::assert_snapshot!(to_html(&root), @r#"<p b="2" a="1">x</p>"#);
    }
}
