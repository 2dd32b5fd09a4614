//! Code-block titles with a copy button.

use folio_core::error::StageError;

use super::{HtmlTransform, RenderState};
use crate::hast::{Element, Node, Root};

/// Class marking a code-title wrapper.
pub const CODE_TITLE_CLASS: &str = "code-title";

/// Rewrites `div.code-title` wrappers into a title span plus a "Copy" button.
///
/// The button carries no behaviour; the page wires it to the adjacent `<pre>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CodeTitles;

impl HtmlTransform for CodeTitles {
    fn name(&self) -> &'static str {
        "code-titles"
    }

    fn transform(&self, root: &mut Root, _state: &mut RenderState) -> Result<(), StageError> {
        root.for_each_element_mut(&mut |element| {
            if let Some(title) = code_title(element) {
                element.children = vec![
                    Element::new("span").with_child(Node::text(title)).into(),
                    copy_button().into(),
                ];
            }
        });
        Ok(())
    }
}

/// A `div` whose first class is `code-title` and whose only child is text.
fn code_title(element: &Element) -> Option<String> {
    if element.tag != "div" || element.classes().next() != Some(CODE_TITLE_CLASS) {
        return None;
    }
    match element.children.as_slice() {
        [Node::Text(title)] => Some(title.clone()),
        _ => None,
    }
}

fn copy_button() -> Element {
    Element::new("button")
        .with_attr("type", "button")
        .with_attr("class", "copy-code")
        .with_attr("aria-label", "Copy code")
        .with_child(Node::text("Copy"))
}
