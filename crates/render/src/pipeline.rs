//! The pipeline entry point.
//!
//! A [`Pipeline`] is built once from [`PipelineOptions`] and then renders any
//! number of documents, sequentially or in parallel. Each call owns its trees;
//! the only shared state is the read-only highlighter data.

use std::sync::atomic::{AtomicUsize, Ordering};

use folio_core::error::{Diagnostics, MarkdownProcessingError, Stage};
use folio_core::frontmatter::{FrontMatter, extract_front_matter};
use folio_core::parse::{ParseOptions, ParserPipeline};
use folio_core::shortcode::{AssetContext, ShortcodeOptions, rewrite_shortcodes};
use folio_core::transform::{SmartPunctuation, TableOfContents};
use rayon::prelude::*;
use serde::Serialize;

use crate::convert::{ConvertOptions, to_hast};
use crate::options::PipelineOptions;
use crate::serialize::to_html;
use crate::transform::{
    CodeTitles, HeadingAnchors, HeadingEntry, Highlight, HtmlPipeline, RenderState, UnwrapImages,
};

/// A rendered document.
#[derive(Debug, Clone, Serialize)]
pub struct Rendered {
    /// Serialized HTML.
    pub content: String,
    /// Front-matter mapping, empty when the document has none.
    pub frontmatter: FrontMatter,
    /// Headings in document order with their final ids.
    pub headings: Vec<HeadingEntry>,
    /// Recovered problems, with document line numbers.
    pub diagnostics: Diagnostics,
}

/// One document of a batch.
#[derive(Debug, Clone)]
pub struct BatchInput {
    /// Caller-chosen identifier, echoed in the result.
    pub id: String,
    /// Raw document text.
    pub source: String,
    /// Slug overriding `frontmatter.slug`.
    pub slug: Option<String>,
}

impl BatchInput {
    /// A batch entry without a slug override.
    pub fn new(id: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            slug: None,
        }
    }
}

/// Outcome for one batch entry.
#[derive(Debug)]
pub struct BatchResult {
    /// Identifier of the input.
    pub id: String,
    /// The rendered document or the error that stopped it.
    pub result: Result<Rendered, MarkdownProcessingError>,
}

/// Batch counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchStats {
    /// Documents submitted.
    pub total: usize,
    /// Documents rendered.
    pub succeeded: usize,
    /// Documents that failed.
    pub failed: usize,
}

/// Results in input order plus counters.
#[derive(Debug)]
pub struct BatchOutput {
    /// One entry per input, same order.
    pub results: Vec<BatchResult>,
    /// Counters over `results`.
    pub stats: BatchStats,
}

/// Configured markdown-to-HTML pipeline.
pub struct Pipeline {
    options: PipelineOptions,
    markdown: ParserPipeline,
    html: HtmlPipeline,
}

impl Pipeline {
    /// Builds the stage lists from `options`.
    ///
    /// Fails with [`Stage::Configure`] when an option cannot be used, such as
    /// an invalid table-of-contents heading pattern.
    pub fn new(options: PipelineOptions) -> Result<Self, MarkdownProcessingError> {
        let mut markdown = ParserPipeline::new(ParseOptions::blog());
        if options.smart_punctuation {
            markdown.push(SmartPunctuation);
        }
        if options.table_of_contents.enabled {
            let toc = TableOfContents::new(&options.table_of_contents)
                .map_err(|err| MarkdownProcessingError::new(Stage::Configure, err))?;
            markdown.push(toc);
        }

        let mut html = HtmlPipeline::new();
        html.push(HeadingAnchors::new(options.heading_anchors));
        if options.code_titles {
            html.push(CodeTitles);
        }
        if options.unwrap_images {
            html.push(UnwrapImages);
        }
        if options.highlight.enabled {
            html.push(Highlight::new(&options.highlight));
        }

        log::debug!(
            "pipeline ready: markdown passes {:?}, html passes {:?}",
            markdown.stage_names(),
            html.stage_names()
        );
        Ok(Self {
            options,
            markdown,
            html,
        })
    }

    /// The options this pipeline was built from.
    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Names of every configured pass, markdown passes first.
    pub fn stage_names(&self) -> Vec<&'static str> {
        let mut names = self.markdown.stage_names();
        names.extend(self.html.stage_names());
        names
    }

    /// Renders a document using `frontmatter.slug` for asset paths.
    pub fn process(&self, input: &str) -> Result<Rendered, MarkdownProcessingError> {
        self.process_with_slug(input, None)
    }

    /// Renders a document; a given `slug` wins over `frontmatter.slug`.
    pub fn process_with_slug(
        &self,
        input: &str,
        slug: Option<&str>,
    ) -> Result<Rendered, MarkdownProcessingError> {
        log::debug!("extracting front matter");
        let extraction = extract_front_matter(input)
            .map_err(|err| MarkdownProcessingError::new(Stage::FrontMatter, err))?;
        let mut diagnostics = extraction.diagnostics;
        let front_matter = extraction.front_matter;
        let body_line_offset = input[..extraction.body_start].matches('\n').count();

        let slug = match (slug, front_matter.slug()) {
            (Some(given), Some(declared)) if given != declared => {
                log::warn!("slug `{given}` overrides front matter slug `{declared}`");
                diagnostics.warning(
                    format!("slug `{given}` overrides front matter slug `{declared}`"),
                    None,
                );
                given
            }
            (Some(given), _) => given,
            (None, declared) => declared.unwrap_or(""),
        };

        log::debug!("expanding shortcodes for slug `{slug}`");
        let assets = AssetContext::new(&self.options.asset_base_url, slug);
        let rewrite = rewrite_shortcodes(
            extraction.body,
            &assets,
            ShortcodeOptions {
                skip_code_fences: self.options.skip_shortcodes_in_code,
            },
        );
        diagnostics.extend_offset(rewrite.diagnostics, body_line_offset);

        log::debug!("parsing markdown");
        let mdast = self.markdown.run(&rewrite.text)?;

        log::debug!("converting to html tree");
        let convert = ConvertOptions {
            lazy_images: self.options.lazy_images,
        };
        let mut hast =
            to_hast(&mdast, &convert).map_err(|err| MarkdownProcessingError::new(Stage::Convert, err))?;

        let mut state = RenderState::default();
        self.html.run(&mut hast, &mut state)?;
        diagnostics.extend(state.diagnostics);

        log::debug!("serializing");
        let content = to_html(&hast);

        Ok(Rendered {
            content,
            frontmatter: front_matter,
            headings: state.headings,
            diagnostics,
        })
    }

    /// Renders documents in parallel; results keep input order.
    pub fn process_batch(&self, inputs: &[BatchInput]) -> BatchOutput {
        let succeeded = AtomicUsize::new(0);
        let failed = AtomicUsize::new(0);

        let results: Vec<BatchResult> = inputs
            .par_iter()
            .map(|input| {
                let result = self.process_with_slug(&input.source, input.slug.as_deref());
                match &result {
                    Ok(_) => succeeded.fetch_add(1, Ordering::Relaxed),
                    Err(err) => {
                        log::warn!("`{}` failed: {err}", input.id);
                        failed.fetch_add(1, Ordering::Relaxed)
                    }
                };
                BatchResult {
                    id: input.id.clone(),
                    result,
                }
            })
            .collect();

        BatchOutput {
            results,
            stats: BatchStats {
                total: inputs.len(),
                succeeded: succeeded.load(Ordering::Relaxed),
                failed: failed.load(Ordering::Relaxed),
            },
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("options", &self.options)
            .field("stages", &self.stage_names())
            .finish()
    }
}

/// Renders a document with default options.
pub fn render(input: &str) -> Result<Rendered, MarkdownProcessingError> {
    Pipeline::new(PipelineOptions::default())?.process(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::AnchorStyle;
    use folio_core::error::StageError;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn pipeline_can_be_shared_by_batch_workers() {
        assert_send_sync::<Pipeline>();
    }

    #[test]
    fn default_stage_order() {
        let pipeline = Pipeline::new(PipelineOptions::default()).expect("defaults are valid");
        assert_eq!(
            pipeline.stage_names(),
            vec![
                "smart-punctuation",
                "table-of-contents",
                "heading-anchors",
                "code-titles",
                "unwrap-images",
                "highlight",
            ]
        );
    }

    #[test]
    fn disabled_passes_are_left_out() {
        let mut options = PipelineOptions {
            smart_punctuation: false,
            code_titles: false,
            heading_anchors: AnchorStyle::None,
            ..PipelineOptions::default()
        };
        options.table_of_contents.enabled = false;
        options.highlight.enabled = false;
        let pipeline = Pipeline::new(options).expect("valid");
        assert_eq!(pipeline.stage_names(), vec!["heading-anchors", "unwrap-images"]);
    }

    #[test]
    fn invalid_toc_pattern_fails_configuration() {
        let mut options = PipelineOptions::default();
        options.table_of_contents.heading = "(".to_string();
        let err = Pipeline::new(options).unwrap_err();
        assert_eq!(err.stage, Stage::Configure);
        assert!(matches!(err.source, StageError::InvalidOption { .. }));
    }

    #[test]
    fn caller_slug_wins_and_is_reported() {
        let pipeline = Pipeline::new(PipelineOptions::default()).expect("valid");
        let input = "---\nslug: from-file\n---\n{% img src=\"a.png\" alt=\"A\" %}\n";
        let rendered = pipeline
            .process_with_slug(input, Some("from-route"))
            .expect("renders");
        assert!(rendered.content.contains("/posts/from-route/images/a.png"), "{}", rendered.content);
        assert_eq!(rendered.diagnostics.len(), 1);
        assert_eq!(rendered.frontmatter.slug(), Some("from-file"));
    }

    #[test]
    fn shortcode_diagnostics_use_document_lines() {
        let pipeline = Pipeline::new(PipelineOptions::default()).expect("valid");
        let input = "---\ntitle: T\n---\n\nText\n\n{% img alt=\"no src\" %}\n";
        let rendered = pipeline.process(input).expect("renders");
        let diagnostic = rendered.diagnostics.iter().next().expect("one diagnostic");
        assert_eq!(diagnostic.location.as_ref().map(|l| l.line), Some(7));
    }
}
