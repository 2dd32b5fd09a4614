//! Passes over the HTML tree, run in a fixed order after conversion.

use folio_core::error::{Diagnostics, MarkdownProcessingError, Stage, StageError};
use serde::Serialize;

use crate::hast::Root;

/// Code-title restructuring.
pub mod code_title;
/// Heading ids and self-links.
pub mod headings;
/// Syntax highlighting of fenced code.
pub mod highlight;
/// Paragraph unwrapping around standalone images.
pub mod unwrap_images;

pub use code_title::CodeTitles;
pub use headings::{AnchorStyle, HeadingAnchors};
pub use highlight::{Highlight, HighlightOptions, theme_css};
pub use unwrap_images::UnwrapImages;

/// One heading of the rendered document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeadingEntry {
    /// Heading level, 1 to 6.
    pub depth: u8,
    /// Id assigned to the heading element.
    pub id: String,
    /// Visible heading text.
    pub text: String,
}

/// Per-document state shared by the HTML passes.
#[derive(Debug, Default)]
pub struct RenderState {
    /// Headings in document order, filled by [`HeadingAnchors`].
    pub headings: Vec<HeadingEntry>,
    /// Non-fatal findings.
    pub diagnostics: Diagnostics,
}

/// A named rewrite of the HTML tree.
pub trait HtmlTransform: Send + Sync {
    /// Stage name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Rewrites the tree in place.
    fn transform(&self, root: &mut Root, state: &mut RenderState) -> Result<(), StageError>;
}

/// Ordered HTML passes.
#[derive(Default)]
pub struct HtmlPipeline {
    transforms: Vec<Box<dyn HtmlTransform>>,
}

impl HtmlPipeline {
    /// Creates an empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a pass.
    pub fn push<T: HtmlTransform + 'static>(&mut self, transform: T) {
        self.transforms.push(Box::new(transform));
    }

    /// Names of the configured passes, in run order.
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.transforms.iter().map(|t| t.name()).collect()
    }

    /// Runs every pass in order, stopping at the first failure.
    pub fn run(&self, root: &mut Root, state: &mut RenderState) -> Result<(), MarkdownProcessingError> {
        for transform in &self.transforms {
            log::trace!("running html pass `{}`", transform.name());
            transform
                .transform(root, state)
                .map_err(|err| MarkdownProcessingError::new(Stage::HtmlTransform(transform.name()), err))?;
        }
        Ok(())
    }
}
