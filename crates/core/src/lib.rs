#![deny(missing_docs)]
//! Folio core: front matter, shortcodes, slugs, markdown parsing and tree passes.

/// Core error and diagnostic types.
pub mod error;
/// YAML front-matter extraction.
pub mod frontmatter;
/// Markdown parsing and the markdown-tree pass pipeline.
pub mod parse;
/// Shortcode expansion on raw markdown text.
pub mod shortcode;
/// Slug generation utilities.
pub mod slug;
/// Markdown-tree passes.
pub mod transform;

pub use error::{
    Diagnostic, Diagnostics, MarkdownProcessingError, Severity, SourceLocation, Stage, StageError,
};
pub use frontmatter::{FrontMatter, FrontMatterError, FrontMatterExtraction, extract_front_matter};
pub use parse::{AstTransform, ParseOptions, ParserPipeline, parse_mdast, parse_mdast_with_options};
pub use shortcode::{
    AssetContext, Shortcode, ShortcodeError, ShortcodeKind, ShortcodeOptions, ShortcodeRewrite,
    rewrite_shortcodes,
};
pub use slug::{Slugger, slugify, split_custom_id};
pub use transform::{SmartPunctuation, TableOfContents, TocOptions, heading_id, plain_text};
