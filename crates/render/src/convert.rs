//! Markdown tree to HTML tree conversion.
//!
//! Raw HTML islands are stitched together across sibling nodes and parsed into
//! elements, so a `<video>` opened in one inline fragment and closed in another
//! becomes one element wrapping what sits between.

use std::collections::HashMap;

use folio_core::error::StageError;
use folio_core::slug::split_custom_id;
use markdown::mdast::{self, AlignKind, Node as Md};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::hast::{Element, Node, Root};
use crate::raw;
use crate::serialize::nodes_to_html;

static TITLE_META: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?:^|\s)title="([^"]*)""#).expect("title pattern compiles"));

/// Converter settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConvertOptions {
    /// Add `loading="lazy"` to markdown images.
    pub lazy_images: bool,
}

/// Converts a parsed markdown root into an HTML tree.
pub fn to_hast(root: &Md, options: &ConvertOptions) -> Result<Root, StageError> {
    let Md::Root(root) = root else {
        return Err(StageError::Internal("conversion expects a root node".into()));
    };

    let mut ctx = Context::new(options);
    ctx.collect(&root.children);

    let mut children = Vec::new();
    convert_children(&root.children, &mut ctx, &mut children);
    if let Some(section) = ctx.footnote_section() {
        children.push(section);
    }
    Ok(Root::new(children))
}

/// A fenced code block's language, title and remaining meta string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeInfo {
    /// Language token, if any.
    pub lang: Option<String>,
    /// Title from `lang:title` or `title="..."`.
    pub title: Option<String>,
    /// Meta with the title removed, e.g. `{1,3-5}`.
    pub meta: Option<String>,
}

impl CodeInfo {
    /// Splits the info string of a fence.
    pub fn parse(lang: Option<&str>, meta: Option<&str>) -> Self {
        let mut info = CodeInfo::default();

        if let Some(lang) = lang {
            match lang.split_once(':') {
                Some((lang, title)) => {
                    info.lang = (!lang.is_empty()).then(|| lang.to_string());
                    info.title = (!title.is_empty()).then(|| title.to_string());
                }
                None => info.lang = Some(lang.to_string()),
            }
        }

        if let Some(meta) = meta {
            let mut rest = meta.to_string();
            if let Some(caps) = TITLE_META.captures(meta)
                && let (Some(whole), Some(title)) = (caps.get(0), caps.get(1))
            {
                if info.title.is_none() {
                    info.title = Some(title.as_str().to_string());
                }
                rest.replace_range(whole.range(), " ");
            }
            let rest = rest.trim();
            info.meta = (!rest.is_empty()).then(|| rest.to_string());
        }

        info
    }
}

struct Context<'a> {
    options: &'a ConvertOptions,
    definitions: HashMap<String, &'a mdast::Definition>,
    footnote_definitions: HashMap<String, &'a mdast::FootnoteDefinition>,
    /// Footnote identifiers in order of first reference.
    footnote_order: Vec<String>,
    footnote_refs: HashMap<String, usize>,
}

impl<'a> Context<'a> {
    fn new(options: &'a ConvertOptions) -> Self {
        Self {
            options,
            definitions: HashMap::new(),
            footnote_definitions: HashMap::new(),
            footnote_order: Vec::new(),
            footnote_refs: HashMap::new(),
        }
    }

    fn collect(&mut self, nodes: &'a [Md]) {
        for node in nodes {
            match node {
                Md::Definition(definition) => {
                    self.definitions
                        .entry(definition.identifier.clone())
                        .or_insert(definition);
                }
                Md::FootnoteDefinition(definition) => {
                    self.footnote_definitions
                        .entry(definition.identifier.clone())
                        .or_insert(definition);
                    self.collect(&definition.children);
                }
                other => {
                    if let Some(children) = other.children() {
                        self.collect(children);
                    }
                }
            }
        }
    }

    /// Registers a footnote call and returns (ordinal, call count).
    fn reference_footnote(&mut self, identifier: &str) -> (usize, usize) {
        let ordinal = match self.footnote_order.iter().position(|id| id == identifier) {
            Some(index) => index + 1,
            None => {
                self.footnote_order.push(identifier.to_string());
                self.footnote_order.len()
            }
        };
        let count = self.footnote_refs.entry(identifier.to_string()).or_insert(0);
        *count += 1;
        (ordinal, *count)
    }

    fn footnote_section(&mut self) -> Option<Node> {
        let mut items = Vec::new();
        let mut index = 0;
        // Definitions may reference further footnotes, growing the order as we go.
        while index < self.footnote_order.len() {
            let identifier = self.footnote_order[index].clone();
            index += 1;
            let Some(definition) = self.footnote_definitions.get(&identifier).copied() else {
                continue;
            };
            let safe = safe_id(&identifier);

            let mut content = Vec::new();
            convert_children(&definition.children, self, &mut content);

            let calls = self.footnote_refs.get(&identifier).copied().unwrap_or(1);
            let mut backrefs = Vec::new();
            for call in 1..=calls {
                let suffix = if call == 1 { String::new() } else { format!("-{call}") };
                let mut backref = Element::new("a")
                    .with_attr("href", format!("#user-content-fnref-{safe}{suffix}"))
                    .with_flag("data-footnote-backref")
                    .with_attr("aria-label", format!("Back to reference {index}"))
                    .with_attr("class", "data-footnote-backref")
                    .with_child(Node::text("\u{21a9}"));
                if call > 1 {
                    backref
                        .children
                        .push(Element::new("sup").with_child(Node::text(call.to_string())).into());
                }
                backrefs.push(Node::text(" "));
                backrefs.push(backref.into());
            }

            match content.last_mut() {
                Some(Node::Element(last)) if last.tag == "p" => last.children.extend(backrefs),
                _ => content.extend(backrefs),
            }

            items.push(
                Element::new("li")
                    .with_attr("id", format!("user-content-fn-{safe}"))
                    .with_children(content)
                    .into(),
            );
        }

        if items.is_empty() {
            return None;
        }

        let label = Element::new("h2")
            .with_attr("class", "sr-only")
            .with_attr("id", "footnote-label")
            .with_child(Node::text("Footnotes"));
        Some(
            Element::new("section")
                .with_flag("data-footnotes")
                .with_attr("class", "footnotes")
                .with_child(label)
                .with_child(Element::new("ol").with_children(items))
                .into(),
        )
    }
}

/// Footnote identifiers made safe for use in ids and fragments.
fn safe_id(identifier: &str) -> String {
    identifier
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c.to_lowercase().next().unwrap_or(c)
            } else {
                '-'
            }
        })
        .collect()
}

/// Converts siblings, gathering raw HTML islands that span several nodes.
fn convert_children<'a>(children: &'a [Md], ctx: &mut Context<'a>, out: &mut Vec<Node>) {
    let mut index = 0;
    while index < children.len() {
        if let Md::Html(html) = &children[index] {
            index = convert_island(children, index, &html.value, ctx, out);
        } else {
            convert_node(&children[index], ctx, out);
            index += 1;
        }
    }
}

/// Handles the island starting at `start`; returns the index after it.
fn convert_island<'a>(
    children: &'a [Md],
    start: usize,
    first: &str,
    ctx: &mut Context<'a>,
    out: &mut Vec<Node>,
) -> usize {
    let opening = raw::depth_delta(first);
    if opening == 0 {
        out.extend(raw::parse_fragment(first));
        return start + 1;
    }
    if opening < 0 {
        log::debug!("stray closing tag kept verbatim: {first}");
        out.push(Node::Raw(first.to_string()));
        return start + 1;
    }

    // Find where the island balances, looking at html siblings only.
    let mut depth = opening;
    let mut end = None;
    for (offset, sibling) in children[start + 1..].iter().enumerate() {
        if let Md::Html(html) = sibling {
            depth += raw::depth_delta(&html.value);
            if depth <= 0 {
                end = Some(start + 1 + offset);
                break;
            }
        }
    }

    let Some(end) = end else {
        log::debug!("unbalanced raw html kept verbatim: {first}");
        out.push(Node::Raw(first.to_string()));
        return start + 1;
    };

    let mut buffer = String::from(first);
    for sibling in &children[start + 1..=end] {
        match sibling {
            Md::Html(html) => buffer.push_str(&html.value),
            other => {
                let mut converted = Vec::new();
                convert_node(other, ctx, &mut converted);
                buffer.push_str(&nodes_to_html(&converted));
            }
        }
    }
    out.extend(raw::parse_fragment(&buffer));
    end + 1
}

fn convert_node<'a>(node: &'a Md, ctx: &mut Context<'a>, out: &mut Vec<Node>) {
    match node {
        Md::Root(root) => convert_children(&root.children, ctx, out),
        Md::Text(text) => out.push(Node::text(text.value.clone())),
        Md::Paragraph(paragraph) => {
            out.push(wrap("p", &paragraph.children, ctx));
        }
        Md::Heading(heading) => out.push(convert_heading(heading, ctx)),
        Md::ThematicBreak(_) => out.push(Element::new("hr").into()),
        Md::Blockquote(quote) => out.push(wrap("blockquote", &quote.children, ctx)),
        Md::List(list) => out.push(convert_list(list, ctx)),
        Md::ListItem(item) => out.push(convert_list_item(item, item.spread, ctx)),
        Md::Code(code) => convert_code(code, out),
        Md::Html(html) => out.extend(raw::parse_fragment(&html.value)),
        Md::Emphasis(emphasis) => out.push(wrap("em", &emphasis.children, ctx)),
        Md::Strong(strong) => out.push(wrap("strong", &strong.children, ctx)),
        Md::Delete(delete) => out.push(wrap("del", &delete.children, ctx)),
        Md::InlineCode(code) => {
            out.push(Element::new("code").with_child(Node::text(code.value.clone())).into());
        }
        Md::InlineMath(math) => {
            out.push(
                Element::new("code")
                    .with_attr("class", "language-math math-inline")
                    .with_child(Node::text(math.value.clone()))
                    .into(),
            );
        }
        Md::Math(math) => {
            let code = Element::new("code")
                .with_attr("class", "language-math math-display")
                .with_child(Node::text(format!("{}\n", math.value)));
            out.push(Element::new("pre").with_child(code).into());
        }
        Md::Break(_) => {
            out.push(Element::new("br").into());
            out.push(Node::text("\n"));
        }
        Md::Link(link) => {
            let mut anchor = Element::new("a").with_attr("href", link.url.clone());
            if let Some(title) = &link.title {
                anchor.set_attr("title", title.clone());
            }
            let mut children = Vec::new();
            convert_children(&link.children, ctx, &mut children);
            out.push(anchor.with_children(children).into());
        }
        Md::LinkReference(reference) => convert_link_reference(reference, ctx, out),
        Md::Image(image) => {
            out.push(image_element(&image.url, &image.alt, image.title.as_deref(), ctx).into());
        }
        Md::ImageReference(reference) => match ctx.definitions.get(&reference.identifier).copied() {
            Some(definition) => out.push(
                image_element(&definition.url, &reference.alt, definition.title.as_deref(), ctx).into(),
            ),
            None => out.push(Node::text(format!("![{}]", reference.alt))),
        },
        Md::FootnoteReference(reference) => {
            let (ordinal, call) = ctx.reference_footnote(&reference.identifier);
            let safe = safe_id(&reference.identifier);
            let suffix = if call == 1 { String::new() } else { format!("-{call}") };
            let anchor = Element::new("a")
                .with_attr("href", format!("#user-content-fn-{safe}"))
                .with_attr("id", format!("user-content-fnref-{safe}{suffix}"))
                .with_flag("data-footnote-ref")
                .with_attr("aria-describedby", "footnote-label")
                .with_child(Node::text(ordinal.to_string()));
            out.push(Element::new("sup").with_child(anchor).into());
        }
        Md::Table(table) => out.push(convert_table(table, ctx)),
        // Rendered at the end of the document or not at all.
        Md::Definition(_) | Md::FootnoteDefinition(_) => {}
        Md::Yaml(_) | Md::Toml(_) => {}
        Md::TableRow(_) | Md::TableCell(_) => {
            log::warn!("table row or cell outside a table");
        }
        other => {
            log::warn!("unhandled markdown node: {other:?}");
        }
    }
}

fn wrap<'a>(tag: &str, children: &'a [Md], ctx: &mut Context<'a>) -> Node {
    let mut converted = Vec::new();
    convert_children(children, ctx, &mut converted);
    Element::new(tag).with_children(converted).into()
}

/// Renders a heading, moving a trailing `{#id}` into the `id` attribute.
fn convert_heading<'a>(heading: &'a mdast::Heading, ctx: &mut Context<'a>) -> Node {
    let mut children = Vec::new();
    convert_children(&heading.children, ctx, &mut children);

    let mut element = Element::new(format!("h{}", heading.depth));
    if let Some(id) = strip_custom_id(&mut children) {
        element.set_attr("id", id);
    }
    element.with_children(children).into()
}

/// Removes `{#id}` from the deepest last text node, looking through inline wrappers.
fn strip_custom_id(children: &mut Vec<Node>) -> Option<String> {
    let last = children.last_mut()?;
    let (id, emptied) = match last {
        Node::Text(text) => {
            let (visible, id) = split_custom_id(text);
            let id = id?.to_string();
            *text = visible.to_string();
            (id, text.is_empty())
        }
        Node::Element(element) if matches!(element.tag.as_str(), "em" | "strong" | "del" | "a") => {
            return strip_custom_id(&mut element.children);
        }
        _ => return None,
    };
    if emptied {
        children.pop();
    }
    Some(id)
}

fn convert_list<'a>(list: &'a mdast::List, ctx: &mut Context<'a>) -> Node {
    let tag = if list.ordered { "ol" } else { "ul" };
    let mut element = Element::new(tag);
    if list.ordered
        && let Some(start) = list.start
        && start != 1
    {
        element.set_attr("start", start.to_string());
    }

    let loose = list.spread
        || list
            .children
            .iter()
            .any(|child| matches!(child, Md::ListItem(item) if item.spread));

    let mut has_tasks = false;
    for child in &list.children {
        if let Md::ListItem(item) = child {
            has_tasks |= item.checked.is_some();
            element.children.push(convert_list_item(item, loose, ctx));
        }
    }
    if has_tasks {
        element.set_attr("class", "contains-task-list");
    }
    element.into()
}

/// Renders `<li>`; tight items unwrap their paragraphs.
fn convert_list_item<'a>(item: &'a mdast::ListItem, loose: bool, ctx: &mut Context<'a>) -> Node {
    let mut children = Vec::new();
    let mut start = 0;
    if !loose {
        for (index, child) in item.children.iter().enumerate() {
            if let Md::Paragraph(paragraph) = child {
                convert_children(&item.children[start..index], ctx, &mut children);
                convert_children(&paragraph.children, ctx, &mut children);
                start = index + 1;
            }
        }
    }
    convert_children(&item.children[start..], ctx, &mut children);

    let mut element = Element::new("li");
    if let Some(checked) = item.checked {
        element.set_attr("class", "task-list-item");
        let mut input = Element::new("input")
            .with_attr("type", "checkbox")
            .with_flag("disabled");
        if checked {
            input.set_flag("checked");
        }
        let prefix = [Node::from(input), Node::text(" ")];
        match children.first_mut() {
            Some(Node::Element(first)) if first.tag == "p" => {
                first.children.splice(0..0, prefix);
            }
            _ => {
                children.splice(0..0, prefix);
            }
        }
    }
    element.with_children(children).into()
}

/// Renders a fence as an optional `div.code-title` followed by `pre > code`.
fn convert_code(code: &mdast::Code, out: &mut Vec<Node>) {
    let info = CodeInfo::parse(code.lang.as_deref(), code.meta.as_deref());

    if let Some(title) = &info.title {
        out.push(
            Element::new("div")
                .with_attr("class", "code-title")
                .with_child(Node::text(title.clone()))
                .into(),
        );
    }

    let mut inner = Element::new("code");
    if let Some(lang) = &info.lang {
        inner.set_attr("class", format!("language-{lang}"));
    }
    if let Some(meta) = &info.meta {
        inner.set_attr("data-meta", meta.clone());
    }
    if !code.value.is_empty() {
        inner.children.push(Node::text(format!("{}\n", code.value)));
    }
    out.push(Element::new("pre").with_child(inner).into());
}

fn image_element(url: &str, alt: &str, title: Option<&str>, ctx: &Context<'_>) -> Element {
    let mut img = Element::new("img").with_attr("src", url).with_attr("alt", alt);
    if let Some(title) = title {
        img.set_attr("title", title);
    }
    if ctx.options.lazy_images {
        img.set_attr("loading", "lazy");
    }
    img
}

fn convert_link_reference<'a>(
    reference: &'a mdast::LinkReference,
    ctx: &mut Context<'a>,
    out: &mut Vec<Node>,
) {
    let mut children = Vec::new();
    convert_children(&reference.children, ctx, &mut children);

    match ctx.definitions.get(&reference.identifier).copied() {
        Some(definition) => {
            let mut anchor = Element::new("a").with_attr("href", definition.url.clone());
            if let Some(title) = &definition.title {
                anchor.set_attr("title", title.clone());
            }
            out.push(anchor.with_children(children).into());
        }
        None => {
            out.push(Node::text("["));
            out.extend(children);
            match reference.reference_kind {
                mdast::ReferenceKind::Full => {
                    let label = reference.label.as_deref().unwrap_or(&reference.identifier);
                    out.push(Node::text(format!("][{label}]")));
                }
                mdast::ReferenceKind::Collapsed => out.push(Node::text("][]")),
                mdast::ReferenceKind::Shortcut => out.push(Node::text("]")),
            }
        }
    }
}

fn convert_table<'a>(table: &'a mdast::Table, ctx: &mut Context<'a>) -> Node {
    let mut element = Element::new("table");

    if let Some(Md::TableRow(header)) = table.children.first() {
        let row = convert_row(header, "th", &table.align, ctx);
        element.children.push(Element::new("thead").with_child(row).into());
    }

    if table.children.len() > 1 {
        let mut body = Element::new("tbody");
        for row in table.children.iter().skip(1) {
            if let Md::TableRow(row) = row {
                body.children.push(convert_row(row, "td", &table.align, ctx));
            }
        }
        element.children.push(body.into());
    }

    element.into()
}

fn convert_row<'a>(
    row: &'a mdast::TableRow,
    cell_tag: &str,
    aligns: &[AlignKind],
    ctx: &mut Context<'a>,
) -> Node {
    let mut tr = Element::new("tr");
    for (index, cell) in row.children.iter().enumerate() {
        let Md::TableCell(cell) = cell else {
            continue;
        };
        let mut children = Vec::new();
        convert_children(&cell.children, ctx, &mut children);
        let mut element = Element::new(cell_tag).with_children(children);
        match aligns.get(index) {
            Some(AlignKind::Left) => element.set_attr("align", "left"),
            Some(AlignKind::Right) => element.set_attr("align", "right"),
            Some(AlignKind::Center) => element.set_attr("align", "center"),
            Some(AlignKind::None) | None => {}
        }
        tr.children.push(element.into());
    }
    tr.into()
}
