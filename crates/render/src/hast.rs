//! HTML-domain syntax tree.
//!
//! Elements keep attributes in insertion order so serialization is stable.

/// Elements that never have children and serialize as `<tag ... />`.
pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Returns true for HTML void elements.
pub fn is_void(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag)
}

/// A node in the HTML tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// An element with a tag name, attributes and children.
    Element(Element),
    /// Text, stored unescaped.
    Text(String),
    /// HTML passed through verbatim by the serializer.
    Raw(String),
    /// An HTML comment body.
    Comment(String),
}

impl Node {
    /// Shorthand for a text node.
    pub fn text(value: impl Into<String>) -> Self {
        Node::Text(value.into())
    }

    /// Returns the element if this node is one.
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(element) => Some(element),
            _ => None,
        }
    }

    /// Mutable variant of [`Node::as_element`].
    pub fn as_element_mut(&mut self) -> Option<&mut Element> {
        match self {
            Node::Element(element) => Some(element),
            _ => None,
        }
    }

    /// True for text nodes holding only whitespace.
    pub fn is_whitespace(&self) -> bool {
        matches!(self, Node::Text(text) if text.trim().is_empty())
    }

    /// Concatenated text content of this subtree.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.push_text_content(&mut out);
        out
    }

    fn push_text_content(&self, out: &mut String) {
        match self {
            Node::Text(text) => out.push_str(text),
            Node::Element(element) => {
                for child in &element.children {
                    child.push_text_content(out);
                }
            }
            Node::Raw(_) | Node::Comment(_) => {}
        }
    }
}

impl From<Element> for Node {
    fn from(element: Element) -> Self {
        Node::Element(element)
    }
}

/// An HTML element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Lowercase tag name.
    pub tag: String,
    /// Attributes in insertion order; `None` marks a boolean attribute.
    pub attrs: Vec<(String, Option<String>)>,
    /// Child nodes.
    pub children: Vec<Node>,
}

impl Element {
    /// Creates an element with no attributes or children.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Builder-style attribute setter.
    pub fn with_attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    /// Builder-style boolean attribute setter.
    pub fn with_flag(mut self, name: &str) -> Self {
        self.set_flag(name);
        self
    }

    /// Builder-style child append.
    pub fn with_child(mut self, child: impl Into<Node>) -> Self {
        self.children.push(child.into());
        self
    }

    /// Builder-style children replacement.
    pub fn with_children(mut self, children: Vec<Node>) -> Self {
        self.children = children;
        self
    }

    /// Value of an attribute; boolean attributes read as an empty string.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_deref().unwrap_or(""))
    }

    /// True if the attribute is present in any form.
    pub fn has_attr(&self, name: &str) -> bool {
        self.attrs.iter().any(|(key, _)| key == name)
    }

    /// Sets an attribute, replacing an existing value in place.
    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        self.put(name, Some(value.into()));
    }

    /// Sets a boolean attribute.
    pub fn set_flag(&mut self, name: &str) {
        self.put(name, None);
    }

    /// Removes an attribute and returns its value.
    pub fn remove_attr(&mut self, name: &str) -> Option<Option<String>> {
        let index = self.attrs.iter().position(|(key, _)| key == name)?;
        Some(self.attrs.remove(index).1)
    }

    fn put(&mut self, name: &str, value: Option<String>) {
        match self.attrs.iter_mut().find(|(key, _)| key == name) {
            Some(slot) => slot.1 = value,
            None => self.attrs.push((name.to_string(), value)),
        }
    }

    /// Concatenated text content of the children.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            child.push_text_content(&mut out);
        }
        out
    }

    /// Whitespace-separated class names.
    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attr("class").unwrap_or("").split_whitespace()
    }

    /// True if `class` lists `name`.
    pub fn has_class(&self, name: &str) -> bool {
        self.classes().any(|class| class == name)
    }

    /// Children that are not whitespace-only text or comments.
    pub fn meaningful_children(&self) -> impl Iterator<Item = &Node> {
        self.children
            .iter()
            .filter(|child| !child.is_whitespace() && !matches!(child, Node::Comment(_)))
    }

    /// True for `h1` through `h6`.
    pub fn heading_depth(&self) -> Option<u8> {
        match self.tag.as_str() {
            "h1" => Some(1),
            "h2" => Some(2),
            "h3" => Some(3),
            "h4" => Some(4),
            "h5" => Some(5),
            "h6" => Some(6),
            _ => None,
        }
    }
}

/// The document root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Root {
    /// Top-level nodes.
    pub children: Vec<Node>,
}

impl Root {
    /// Wraps top-level nodes.
    pub fn new(children: Vec<Node>) -> Self {
        Self { children }
    }

    /// Depth-first, pre-order walk over every element.
    pub fn for_each_element_mut(&mut self, visit: &mut impl FnMut(&mut Element)) {
        walk_mut(&mut self.children, visit);
    }
}

fn walk_mut(nodes: &mut [Node], visit: &mut impl FnMut(&mut Element)) {
    for node in nodes {
        if let Node::Element(element) = node {
            visit(element);
            walk_mut(&mut element.children, visit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attributes_keep_insertion_order() {
        let mut img = Element::new("img").with_attr("src", "a.png").with_attr("alt", "A");
        img.set_attr("src", "b.png");
        img.set_flag("hidden");
        assert_eq!(
            img.attrs,
            vec![
                ("src".to_string(), Some("b.png".to_string())),
                ("alt".to_string(), Some("A".to_string())),
                ("hidden".to_string(), None),
            ]
        );
        assert_eq!(img.attr("hidden"), Some(""));
        assert_eq!(img.remove_attr("alt"), Some(Some("A".to_string())));
        assert!(!img.has_attr("alt"));
    }

    #[test]
    fn class_queries() {
        let div = Element::new("div").with_attr("class", "code-title  wide");
        assert_eq!(div.classes().collect::<Vec<_>>(), vec!["code-title", "wide"]);
        assert!(div.has_class("wide"));
        assert!(!div.has_class("code"));
    }

    #[test]
    fn text_content_skips_raw() {
        let p = Element::new("p")
            .with_child(Node::text("a "))
            .with_child(Node::Raw("<b>x</b>".into()))
            .with_child(Element::new("em").with_child(Node::text("b")));
        assert_eq!(Node::from(p).text_content(), "a b");
    }

    #[test]
    fn walk_visits_nested_elements() {
        let mut root = Root::new(vec![
            Element::new("div")
                .with_child(Element::new("p").with_child(Element::new("img")))
                .into(),
        ]);
        let mut tags = Vec::new();
        root.for_each_element_mut(&mut |element| tags.push(element.tag.clone()));
        assert_eq!(tags, vec!["div", "p", "img"]);
    }
}
