//! Markdown parsing and the ordered markdown-tree passes.

use markdown::mdast::Node;
use markdown::message::{Message, Place};

use crate::error::{MarkdownProcessingError, Stage, StageError};

/// Parser options for building markdown-rs parse options.
#[derive(Clone, Copy, Debug)]
pub struct ParseOptions {
    /// Enable GitHub Flavored Markdown constructs (tables, strikethrough,
    /// autolink literals, task lists, footnotes).
    pub gfm: bool,
    /// Keep raw HTML as `html` nodes instead of escaping it.
    pub raw_html: bool,
    /// Enable indented code blocks.
    pub code_indented: bool,
}

impl ParseOptions {
    /// Blog defaults: GFM on, raw HTML kept for shortcode expansions.
    pub const fn blog() -> Self {
        Self {
            gfm: true,
            raw_html: true,
            code_indented: true,
        }
    }

    /// Convert to markdown-rs `ParseOptions`.
    ///
    /// Front matter is stripped before parsing, so the construct stays off.
    pub fn to_markdown(self) -> markdown::ParseOptions {
        let mut constructs = markdown::Constructs {
            frontmatter: false,
            code_indented: self.code_indented,
            html_flow: self.raw_html,
            html_text: self.raw_html,
            ..Default::default()
        };

        if self.gfm {
            constructs.gfm_autolink_literal = true;
            constructs.gfm_footnote_definition = true;
            constructs.gfm_label_start_footnote = true;
            constructs.gfm_strikethrough = true;
            constructs.gfm_table = true;
            constructs.gfm_task_list_item = true;
        }

        markdown::ParseOptions {
            constructs,
            ..markdown::ParseOptions::default()
        }
    }
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self::blog()
    }
}

/// A named pass that rewrites the markdown tree in place.
pub trait AstTransform: Send + Sync {
    /// Stage name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Mutate the parsed markdown tree in place.
    fn transform(&self, root: &mut Node) -> Result<(), StageError>;
}

/// Parser plus an ordered list of markdown-tree passes.
///
/// Passes run in insertion order; each sees the tree the previous one left.
/// markdown-rs options carry non-`Sync` hooks and are built per run.
pub struct ParserPipeline {
    options: ParseOptions,
    transforms: Vec<Box<dyn AstTransform>>,
}

impl ParserPipeline {
    /// Create a new pipeline from core parse options.
    pub fn new(options: ParseOptions) -> Self {
        Self {
            options,
            transforms: Vec::new(),
        }
    }

    /// Append a pass.
    pub fn push<T: AstTransform + 'static>(&mut self, transform: T) {
        self.transforms.push(Box::new(transform));
    }

    /// Names of the configured passes, in run order.
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.transforms.iter().map(|t| t.name()).collect()
    }

    /// Parse markdown and run every pass.
    pub fn run(&self, input: &str) -> Result<Node, MarkdownProcessingError> {
        let mut root = parse_mdast_with_options(input, &self.options.to_markdown())
            .map_err(|err| MarkdownProcessingError::new(Stage::Parse, err))?;

        for transform in &self.transforms {
            log::trace!("running markdown pass `{}`", transform.name());
            transform
                .transform(&mut root)
                .map_err(|err| MarkdownProcessingError::new(Stage::MarkdownTransform(transform.name()), err))?;
        }

        Ok(root)
    }
}

/// Parse markdown into an mdast tree using core options.
pub fn parse_mdast(input: &str, options: &ParseOptions) -> Result<Node, StageError> {
    parse_mdast_with_options(input, &options.to_markdown())
}

/// Parse markdown into an mdast tree using markdown-rs `ParseOptions`.
pub fn parse_mdast_with_options(
    input: &str,
    options: &markdown::ParseOptions,
) -> Result<Node, StageError> {
    markdown::to_mdast(input, options).map_err(|err| message_to_error(&err))
}

fn message_to_error(message: &Message) -> StageError {
    let (line, column) = match message.place.as_deref() {
        Some(Place::Point(point)) => (point.line, point.column),
        Some(Place::Position(position)) => (position.start.line, position.start.column),
        None => (1, 1),
    };
    StageError::parse_error(message.reason.clone(), line, column)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountHeadings;

    impl AstTransform for CountHeadings {
        fn name(&self) -> &'static str {
            "drop-headings"
        }

        fn transform(&self, root: &mut Node) -> Result<(), StageError> {
            if let Some(children) = root.children_mut() {
                children.retain(|child| !matches!(child, Node::Heading(_)));
            }
            Ok(())
        }
    }

    struct Fails;

    impl AstTransform for Fails {
        fn name(&self) -> &'static str {
            "fails"
        }

        fn transform(&self, _root: &mut Node) -> Result<(), StageError> {
            Err(StageError::Internal("boom".into()))
        }
    }

    #[test]
    fn parses_gfm_constructs() {
        let root = parse_mdast("| a |\n| - |\n| 1 |\n\n~~gone~~ www.example.com\n\n- [x] done\n", &ParseOptions::blog())
            .expect("parse");
        let children = root.children().expect("root children");
        assert!(matches!(children[0], Node::Table(_)));
        assert!(matches!(children[1], Node::Paragraph(_)));
        assert!(matches!(children[2], Node::List(_)));
    }

    #[test]
    fn malformed_table_is_plain_text() {
        let root = parse_mdast("| a | b |\n| nope |\n", &ParseOptions::blog()).expect("parse");
        let children = root.children().expect("root children");
        assert!(matches!(children[0], Node::Paragraph(_)));
    }

    #[test]
    fn raw_html_is_kept() {
        let root = parse_mdast("<div class=\"x\">hi</div>\n", &ParseOptions::blog()).expect("parse");
        let children = root.children().expect("root children");
        assert!(matches!(children[0], Node::Html(_)));
    }

    #[test]
    fn runs_passes_in_order() {
        let mut pipeline = ParserPipeline::new(ParseOptions::blog());
        pipeline.push(CountHeadings);
        assert_eq!(pipeline.stage_names(), vec!["drop-headings"]);
        let root = pipeline.run("# Title\n\nBody\n").expect("run");
        assert_eq!(root.children().map(Vec::len), Some(1));
    }

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn pipeline_is_shareable_across_threads() {
        assert_send_sync::<ParserPipeline>();
    }

    #[test]
    fn pass_failure_names_stage() {
        let mut pipeline = ParserPipeline::new(ParseOptions::blog());
        pipeline.push(Fails);
        let err = pipeline.run("text").unwrap_err();
        assert_eq!(err.stage, Stage::MarkdownTransform("fails"));
    }
}
