#![deny(missing_docs)]
//! Folio render: HTML tree conversion, HTML passes, highlighting, and the
//! pipeline entry point.
//!
//! ```no_run
//! use folio_render::{Pipeline, PipelineOptions};
//!
//! let pipeline = Pipeline::new(PipelineOptions::default())?;
//! let rendered = pipeline.process("---\ntitle: Hello\n---\n# Hello\n")?;
//! println!("{}", rendered.content);
//! # Ok::<(), folio_core::MarkdownProcessingError>(())
//! ```

/// mdast to HTML tree conversion.
pub mod convert;
/// HTML-domain tree types.
pub mod hast;
/// Pipeline configuration.
pub mod options;
/// The orchestrator and batch rendering.
pub mod pipeline;
/// Raw-HTML fragment parsing.
pub mod raw;
/// Deterministic HTML serialization.
pub mod serialize;
/// HTML-tree passes.
pub mod transform;

pub use convert::{CodeInfo, ConvertOptions, to_hast};
pub use hast::{Element, Node, Root};
pub use options::PipelineOptions;
pub use pipeline::{BatchInput, BatchOutput, BatchResult, BatchStats, Pipeline, Rendered, render};
pub use serialize::{nodes_to_html, to_html};
pub use transform::{
    AnchorStyle, HeadingEntry, HighlightOptions, HtmlPipeline, HtmlTransform, RenderState,
    theme_css,
};

pub use folio_core::{FrontMatter, MarkdownProcessingError, Stage, StageError};
