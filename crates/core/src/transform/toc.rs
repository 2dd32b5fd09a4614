//! Table-of-contents synthesis.
//!
//! The first top-level heading whose text matches the configured pattern
//! marks where the table goes. Everything between it and the next heading of
//! equal or shallower depth is replaced by a nested list linking to every
//! heading from that point on. Without such a heading the list is inserted
//! and nothing is replaced.

use markdown::mdast::{Link, List, ListItem, Node, Paragraph, Text};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::StageError;
use crate::parse::AstTransform;
use crate::slug::{Slugger, split_custom_id};
use crate::transform::{heading_id, plain_text};

/// Default heading pattern, matched case-insensitively against the whole heading text.
pub const DEFAULT_TOC_HEADING: &str = "(table[ -]of[ -])?contents?|toc";

/// Table-of-contents settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TocOptions {
    /// Whether the pass runs at all.
    pub enabled: bool,
    /// Pattern for the heading that marks the table's location.
    pub heading: String,
    /// Deepest heading level listed.
    pub max_depth: u8,
    /// Items hold their link directly instead of inside a paragraph.
    pub tight: bool,
    /// Emit ordered lists.
    pub ordered: bool,
}

impl Default for TocOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            heading: DEFAULT_TOC_HEADING.to_string(),
            max_depth: 6,
            tight: true,
            ordered: false,
        }
    }
}

/// Markdown pass inserting the table of contents.
#[derive(Debug, Clone)]
pub struct TableOfContents {
    heading: Regex,
    max_depth: u8,
    tight: bool,
    ordered: bool,
}

impl TableOfContents {
    /// Compiles the heading pattern.
    pub fn new(options: &TocOptions) -> Result<Self, StageError> {
        let heading = Regex::new(&format!("(?i)^(?:{})$", options.heading)).map_err(|err| {
            StageError::InvalidOption {
                option: "table_of_contents.heading",
                message: err.to_string(),
            }
        })?;
        Ok(Self {
            heading,
            max_depth: options.max_depth,
            tight: options.tight,
            ordered: options.ordered,
        })
    }
}

impl AstTransform for TableOfContents {
    fn name(&self) -> &'static str {
        "table-of-contents"
    }

    fn transform(&self, root: &mut Node) -> Result<(), StageError> {
        let Some(children) = root.children() else {
            return Ok(());
        };

        let mut search = Search {
            toc: self,
            slugger: Slugger::new(),
            opening: None,
            end: None,
            entries: Vec::new(),
        };
        for (position, child) in children.iter().enumerate() {
            search.visit(child, Some(position));
        }

        let Some((opening, _)) = search.opening else {
            return Ok(());
        };
        let end = search.end.unwrap_or(opening + 1);
        let list = self.build(search.entries);

        log::debug!("inserting table of contents after heading #{opening}");
        if let Some(children) = root.children_mut() {
            children.splice(opening + 1..end, [Node::List(list)]);
        }
        Ok(())
    }
}

struct Entry {
    depth: u8,
    id: String,
    children: Vec<Node>,
}

struct Search<'a> {
    toc: &'a TableOfContents,
    slugger: Slugger,
    /// Root index and depth of the marker heading.
    opening: Option<(usize, u8)>,
    /// Root index of the first heading after the marker at equal or shallower depth.
    end: Option<usize>,
    entries: Vec<Entry>,
}

impl Search<'_> {
    fn visit(&mut self, node: &Node, position: Option<usize>) {
        let Node::Heading(heading) = node else {
            if let Some(children) = node.children() {
                for child in children {
                    self.visit(child, None);
                }
            }
            return;
        };

        let text = plain_text(node);
        let id = heading_id(&mut self.slugger, &text);

        if let Some(position) = position {
            if self.opening.is_none() {
                let (visible, _) = split_custom_id(&text);
                if self.toc.heading.is_match(visible.trim()) {
                    self.opening = Some((position, heading.depth));
                    return;
                }
            } else if let Some((_, depth)) = self.opening
                && self.end.is_none()
                && heading.depth <= depth
            {
                self.end = Some(position);
            }
        }

        if self.end.is_some() && heading.depth <= self.toc.max_depth {
            self.entries.push(Entry {
                depth: heading.depth,
                id,
                children: link_children(&heading.children),
            });
        }
    }
}

impl TableOfContents {
    fn build(&self, entries: Vec<Entry>) -> List {
        let mut list = self.empty_list();
        let Some(min_depth) = entries.iter().map(|entry| entry.depth).min() else {
            return list;
        };
        for entry in entries {
            let depth = usize::from(entry.depth - min_depth) + 1;
            self.insert_into_list(entry, depth, &mut list);
        }
        list
    }

    fn insert_into_list(&self, entry: Entry, depth: usize, list: &mut List) {
        if depth == 1 {
            list.children.push(Node::ListItem(self.item_for(entry)));
        } else if let Some(Node::ListItem(tail)) = list.children.last_mut() {
            self.insert_into_item(entry, depth, tail);
        } else {
            let mut item = self.empty_item();
            self.insert_into_item(entry, depth, &mut item);
            list.children.push(Node::ListItem(item));
        }
    }

    fn insert_into_item(&self, entry: Entry, depth: usize, item: &mut ListItem) {
        if let Some(Node::List(tail)) = item.children.last_mut() {
            self.insert_into_list(entry, depth - 1, tail);
        } else {
            let mut list = self.empty_list();
            self.insert_into_list(entry, depth - 1, &mut list);
            item.children.push(Node::List(list));
        }
    }

    fn item_for(&self, entry: Entry) -> ListItem {
        let link = Node::Link(Link {
            children: entry.children,
            position: None,
            url: format!("#{}", entry.id),
            title: None,
        });
        let mut item = self.empty_item();
        item.children.push(Node::Paragraph(Paragraph {
            children: vec![link],
            position: None,
        }));
        item
    }

    fn empty_list(&self) -> List {
        List {
            children: Vec::new(),
            position: None,
            ordered: self.ordered,
            start: self.ordered.then_some(1),
            spread: !self.tight,
        }
    }

    fn empty_item(&self) -> ListItem {
        ListItem {
            children: Vec::new(),
            position: None,
            spread: !self.tight,
            checked: None,
        }
    }
}

/// Heading content usable inside a link: nested links unwrap, footnote calls drop,
/// and a trailing `{#id}` is removed.
fn link_children(children: &[Node]) -> Vec<Node> {
    let mut out = Vec::with_capacity(children.len());
    for child in children {
        match child {
            Node::Link(link) => out.extend(link_children(&link.children)),
            Node::LinkReference(link) => out.extend(link_children(&link.children)),
            Node::FootnoteReference(_) => {}
            other => out.push(other.clone()),
        }
    }

    if let Some(Node::Text(text)) = out.last_mut() {
        let (visible, custom) = split_custom_id(&text.value);
        if custom.is_some() {
            text.value = visible.to_string();
        }
    }
    if matches!(out.last(), Some(Node::Text(Text { value, .. })) if value.is_empty()) {
        out.pop();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::{ParseOptions, parse_mdast};

    fn run(input: &str, options: &TocOptions) -> Node {
        let mut root = parse_mdast(input, &ParseOptions::blog()).expect("parse");
        TableOfContents::new(options)
            .expect("options")
            .transform(&mut root)
            .expect("transform");
        root
    }

    fn links(node: &Node, out: &mut Vec<String>) {
        if let Node::Link(link) = node {
            out.push(link.url.clone());
        }
        if let Some(children) = node.children() {
            for child in children {
                links(child, out);
            }
        }
    }

    #[test]
    fn inserts_nested_list_after_marker() {
        let root = run(
            "# Post\n\n## Contents\n\nold text\n\n## Intro\n\n### Detail\n\n## Outro\n",
            &TocOptions::default(),
        );
        let children = root.children().expect("children");
        assert!(matches!(children[2], Node::List(_)));
        assert!(matches!(children[3], Node::Heading(_)));

        let mut urls = Vec::new();
        links(&children[2], &mut urls);
        assert_eq!(urls, vec!["#intro", "#detail", "#outro"]);

        let Node::List(list) = &children[2] else {
            unreachable!()
        };
        assert_eq!(list.children.len(), 2);
        let Node::ListItem(first) = &list.children[0] else {
            panic!("expected item");
        };
        assert!(!first.spread);
        assert!(matches!(first.children[1], Node::List(_)));
    }

    #[test]
    fn no_marker_leaves_tree_alone() {
        let root = run("## Intro\n\n## Outro\n", &TocOptions::default());
        assert_eq!(root.children().map(Vec::len), Some(2));
    }

    #[test]
    fn marker_without_following_headings_gets_empty_list() {
        let root = run("## Table of Contents\n\ntext\n", &TocOptions::default());
        let children = root.children().expect("children");
        assert_eq!(children.len(), 3);
        assert!(matches!(children[2], Node::Paragraph(_)));
        let Node::List(list) = &children[1] else {
            panic!("expected list");
        };
        assert!(list.children.is_empty());
    }

    #[test]
    fn duplicate_headings_get_suffixed_links() {
        let root = run("## toc\n\n## Setup\n\n## Setup\n", &TocOptions::default());
        let mut urls = Vec::new();
        links(&root, &mut urls);
        assert_eq!(urls, vec!["#setup", "#setup-1"]);
    }

    #[test]
    fn custom_ids_and_max_depth() {
        let options = TocOptions {
            max_depth: 2,
            ..TocOptions::default()
        };
        let root = run("## TOC\n\n## Install {#setup}\n\n### Deep\n", &options);
        let mut urls = Vec::new();
        links(&root, &mut urls);
        assert_eq!(urls, vec!["#setup"]);

        let children = root.children().expect("children");
        assert_eq!(plain_text(&children[1]), "Install");
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let options = TocOptions {
            heading: "(".into(),
            ..TocOptions::default()
        };
        let err = TableOfContents::new(&options).unwrap_err();
        assert!(matches!(err, StageError::InvalidOption { .. }));
    }
}
