//! Pipeline configuration.

use folio_core::TocOptions;
use serde::{Deserialize, Serialize};

use crate::transform::{AnchorStyle, HighlightOptions};

fn default_asset_base_url() -> String {
    "/posts".to_string()
}

fn default_true() -> bool {
    true
}

/// Options controlling every stage of the pipeline.
///
/// Missing fields take their defaults, so `{}` is a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineOptions {
    /// Base of resolved asset URLs; the slug and `images/` follow it.
    #[serde(default = "default_asset_base_url")]
    pub asset_base_url: String,
    /// Whether to apply smart punctuation to prose.
    #[serde(default = "default_true")]
    pub smart_punctuation: bool,
    /// Table-of-contents synthesis.
    #[serde(default)]
    pub table_of_contents: TocOptions,
    /// How headings link to themselves.
    #[serde(default)]
    pub heading_anchors: AnchorStyle,
    /// Whether code titles get a label and copy button.
    #[serde(default = "default_true")]
    pub code_titles: bool,
    /// Whether paragraphs holding only an image are unwrapped.
    #[serde(default = "default_true")]
    pub unwrap_images: bool,
    /// Syntax highlighting.
    #[serde(default)]
    pub highlight: HighlightOptions,
    /// Whether markdown images get `loading="lazy"`.
    #[serde(default = "default_true")]
    pub lazy_images: bool,
    /// Whether shortcodes inside fenced code stay literal.
    #[serde(default = "default_true")]
    pub skip_shortcodes_in_code: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            asset_base_url: default_asset_base_url(),
            smart_punctuation: true,
            table_of_contents: TocOptions::default(),
            heading_anchors: AnchorStyle::default(),
            code_titles: true,
            unwrap_images: true,
            highlight: HighlightOptions::default(),
            lazy_images: true,
            skip_shortcodes_in_code: true,
        }
    }
}

impl PipelineOptions {
    /// Loads options from a JSON object.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_uses_defaults() {
        let options = PipelineOptions::from_json("{}").expect("valid json");
        assert_eq!(options, PipelineOptions::default());
        assert_eq!(options.asset_base_url, "/posts");
        assert!(options.smart_punctuation);
        assert!(options.highlight.enabled);
        assert_eq!(options.heading_anchors, AnchorStyle::Wrap);
    }

    #[test]
    fn partial_nested_options_keep_other_defaults() {
        let options = PipelineOptions::from_json(
            r#"{
                "heading_anchors": "prepend",
                "lazy_images": false,
                "table_of_contents": { "max_depth": 3 },
                "highlight": { "class_prefix": "hl-" }
            }"#,
        )
        .expect("valid json");
        assert_eq!(options.heading_anchors, AnchorStyle::Prepend);
        assert!(!options.lazy_images);
        assert_eq!(options.table_of_contents.max_depth, 3);
        assert!(options.table_of_contents.enabled);
        assert_eq!(options.highlight.class_prefix, "hl-");
        assert!(options.highlight.enabled);
        assert!(options.code_titles);
    }

    #[test]
    fn unknown_anchor_style_is_rejected() {
        let err = PipelineOptions::from_json(r#"{ "heading_anchors": "sideways" }"#).unwrap_err();
        assert!(err.to_string().contains("sideways"), "{err}");
    }
}
