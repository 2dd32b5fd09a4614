//! Standalone images lose their paragraph wrapper.

use folio_core::error::StageError;

use super::{HtmlTransform, RenderState};
use crate::hast::{Node, Root};

/// Replaces `<p>` holding only an image (or a link around only an image) with that image.
///
/// The image takes the paragraph's position among its siblings. Paragraphs
/// with any other meaningful content are left alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnwrapImages;

impl HtmlTransform for UnwrapImages {
    fn name(&self) -> &'static str {
        "unwrap-images"
    }

    fn transform(&self, root: &mut Root, _state: &mut RenderState) -> Result<(), StageError> {
        unwrap(&mut root.children);
        Ok(())
    }
}

fn unwrap(nodes: &mut [Node]) {
    for node in nodes {
        if let Some(index) = standalone_image(node)
            && let Node::Element(paragraph) = node
        {
            let image = paragraph.children.remove(index);
            *node = image;
            continue;
        }
        if let Node::Element(element) = node {
            unwrap(&mut element.children);
        }
    }
}

/// Index of the sole meaningful child of a paragraph if it is an image.
fn standalone_image(node: &Node) -> Option<usize> {
    let paragraph = node.as_element().filter(|element| element.tag == "p")?;
    let mut meaningful = paragraph
        .children
        .iter()
        .enumerate()
        .filter(|(_, child)| !child.is_whitespace() && !matches!(child, Node::Comment(_)));
    let (index, only) = meaningful.next()?;
    if meaningful.next().is_some() {
        return None;
    }
    is_image(only).then_some(index)
}

fn is_image(node: &Node) -> bool {
    let Some(element) = node.as_element() else {
        return false;
    };
    match element.tag.as_str() {
        "img" => true,
        "a" => {
            let mut inner = element.meaningful_children();
            matches!(
                (inner.next(), inner.next()),
                (Some(Node::Element(img)), None) if img.tag == "img"
            )
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hast::Element;
    use crate::serialize::to_html;

    fn img(src: &str) -> Element {
        Element::new("img").with_attr("src", src).with_attr("alt", "A")
    }

    fn run(mut root: Root) -> Root {
        UnwrapImages
            .transform(&mut root, &mut RenderState::default())
            .expect("transform");
        root
    }

    #[test]
    fn image_replaces_paragraph_at_same_index() {
        let root = run(Root::new(vec![
            Element::new("h1").into(),
            Element::new("p").with_child(img("a.png")).into(),
            Element::new("p").with_child(Node::text("after")).into(),
        ]));
        assert_eq!(root.children[1], Node::Element(img("a.png")));
        assert_eq!(
            to_html(&root),
            "<h1></h1><img src=\"a.png\" alt=\"A\" /><p>after</p>"
        );
    }

    #[test]
    fn whitespace_around_image_is_ignored() {
        let root = run(Root::new(vec![
            Element::new("p")
                .with_child(Node::text("\n"))
                .with_child(img("a.png"))
                .with_child(Node::text(" "))
                .into(),
        ]));
        assert_eq!(root.children, vec![Node::Element(img("a.png"))]);
    }

    #[test]
    fn mixed_content_stays_wrapped() {
        let root = run(Root::new(vec![
            Element::new("p")
                .with_child(Node::text("see "))
                .with_child(img("a.png"))
                .into(),
        ]));
        assert_eq!(to_html(&root), "<p>see <img src=\"a.png\" alt=\"A\" /></p>");
    }

    #[test]
    fn linked_image_and_nested_paragraphs() {
        let link = Element::new("a").with_attr("href", "/big.png").with_child(img("a.png"));
        let quote = Element::new("blockquote").with_child(Element::new("p").with_child(link));
        let root = run(Root::new(vec![quote.into()]));
        assert_eq!(
            to_html(&root),
            "<blockquote><a href=\"/big.png\"><img src=\"a.png\" alt=\"A\" /></a></blockquote>"
        );
    }
}
