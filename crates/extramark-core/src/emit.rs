use crate::ast::{Block, BlockKind, ColumnAlignment, TableSpec};
use crate::entities::scan_entity;
use crate::inline::{has_url_scheme, SpanFormatter};
use crate::label::{make_heading_id, make_unique_id};
use crate::options::Options;
use crate::span::Span;
use crate::{DocState, ImageSizeResolver};
use ammonia::Builder;
use std::collections::{HashMap, HashSet};

/// Walks the block tree and emits an HTML5-compatible fragment.
pub(crate) fn render_document(
    opts: &Options,
    state: &mut DocState,
    images: Option<&dyn ImageSizeResolver>,
    blocks: &[Block],
) -> String {
    let mut renderer = Renderer {
        opts,
        state,
        images,
        out: String::new(),
    };
    renderer.render_top_level(blocks);
    renderer.render_footnotes();
    renderer.out
}

/// Plain-text rendering used when a summary length is configured: output
/// stops growing once the budget is exceeded.
pub(crate) fn render_summary(
    opts: &Options,
    state: &mut DocState,
    images: Option<&dyn ImageSizeResolver>,
    blocks: &[Block],
) -> String {
    let mut out = String::new();
    for block in blocks {
        if out.len() > opts.summary_length {
            break;
        }
        let mut text = String::new();
        plain_text_of(opts, state, images, block, &mut text);
        let text = text.trim();
        if !text.is_empty() {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(text);
        }
    }
    out
}

fn plain_text_of(
    opts: &Options,
    state: &mut DocState,
    images: Option<&dyn ImageSizeResolver>,
    block: &Block,
    out: &mut String,
) {
    match &block.kind {
        BlockKind::Paragraph
        | BlockKind::Span
        | BlockKind::Heading { .. }
        | BlockKind::ListItem
        | BlockKind::DefinitionTerm
        | BlockKind::DefinitionDescription
            if block.children.is_empty() =>
        {
            let mut formatter = SpanFormatter::new(opts, state, images);
            formatter.format_plain(&block.buf, block.span, out);
        }
        BlockKind::CodeBlock { .. } => {
            for child in &block.children {
                out.push_str(child.content());
                out.push('\n');
            }
        }
        BlockKind::RawHtml | BlockKind::UnsafeHtml | BlockKind::Blank => {}
        _ => {
            for child in &block.children {
                plain_text_of(opts, state, images, child, out);
                out.push(' ');
            }
        }
    }
}

struct Renderer<'a> {
    opts: &'a Options,
    state: &'a mut DocState,
    images: Option<&'a dyn ImageSizeResolver>,
    out: String,
}

impl<'a> Renderer<'a> {
    /// Top-level walk, wrapping heading-delimited sections in the
    /// configured templates. `{0}` in a template is the 1-based section
    /// index.
    fn render_top_level(&mut self, blocks: &[Block]) {
        let templated = self.opts.section_header.is_some()
            || self.opts.section_heading_suffix.is_some()
            || self.opts.section_footer.is_some();
        if !templated {
            for block in blocks {
                self.render_block(block);
            }
            return;
        }

        let top_level = blocks
            .iter()
            .filter_map(|block| match block.kind {
                BlockKind::Heading { level, .. } => Some(level),
                _ => None,
            })
            .min();
        let mut index = 0usize;
        let mut open = false;
        for block in blocks {
            let starts_section =
                matches!(block.kind, BlockKind::Heading { level, .. } if Some(level) == top_level);
            if starts_section {
                if open && let Some(footer) = &self.opts.section_footer {
                    self.out.push_str(&expand_template(footer, index));
                }
                index += 1;
                open = true;
                if let Some(header) = &self.opts.section_header {
                    self.out.push_str(&expand_template(header, index));
                }
                self.render_block(block);
                if let Some(suffix) = &self.opts.section_heading_suffix {
                    self.out.push_str(&expand_template(suffix, index));
                }
                continue;
            }
            self.render_block(block);
        }
        if open && let Some(footer) = &self.opts.section_footer {
            self.out.push_str(&expand_template(footer, index));
        }
    }

    fn render_block(&mut self, block: &Block) {
        match &block.kind {
            BlockKind::Blank => {}
            BlockKind::Heading { level, id } => {
                let id_attr = self.heading_id_attr(block, id.as_deref());
                self.out.push_str(&format!("<h{}{}>", level, id_attr));
                self.render_span(block);
                self.out.push_str(&format!("</h{}>\n", level));
            }
            BlockKind::Paragraph => {
                self.out.push_str("<p>");
                self.render_span(block);
                self.out.push_str("</p>\n");
            }
            BlockKind::Span => {
                self.render_span(block);
                self.out.push('\n');
            }
            BlockKind::Quote => {
                self.out.push_str("<blockquote>\n");
                self.render_children(block);
                self.out.push_str("</blockquote>\n");
            }
            BlockKind::CodeBlock { language } => {
                match language {
                    Some(language) => {
                        self.out.push_str("<pre><code class=\"language-");
                        escape_attr(language, &mut self.out);
                        self.out.push_str("\">");
                    }
                    None => self.out.push_str("<pre><code>"),
                }
                for child in &block.children {
                    let content = child.content();
                    escape_html_strict(content, &mut self.out);
                    if !content.ends_with('\n') {
                        self.out.push('\n');
                    }
                }
                self.out.push_str("</code></pre>\n");
            }
            BlockKind::OrderedList => {
                self.out.push_str("<ol>\n");
                self.render_children(block);
                self.out.push_str("</ol>\n");
            }
            BlockKind::UnorderedList => {
                self.out.push_str("<ul>\n");
                self.render_children(block);
                self.out.push_str("</ul>\n");
            }
            BlockKind::ListItem => {
                if block.children.is_empty() {
                    self.out.push_str("<li>");
                    self.render_span(block);
                    self.out.push_str("</li>\n");
                } else {
                    self.out.push_str("<li>");
                    self.render_children(block);
                    self.out.push_str("</li>\n");
                }
            }
            BlockKind::HorizontalRule => self.out.push_str("<hr />\n"),
            BlockKind::UserBreak => self.out.push_str("<div class=\"section-break\"></div>\n"),
            BlockKind::RawHtml => {
                self.out.push_str(block.content());
                self.out.push('\n');
            }
            BlockKind::UnsafeHtml => {
                escape_html_strict(block.content(), &mut self.out);
                self.out.push('\n');
            }
            BlockKind::HtmlTag(tag) => {
                tag.render_open(&mut self.out);
                let span_body = block.children.len() == 1
                    && matches!(block.children[0].kind, BlockKind::Span);
                if span_body {
                    let child = &block.children[0];
                    let mut formatter =
                        SpanFormatter::new(self.opts, self.state, self.images);
                    formatter.format(&child.buf, child.span, &mut self.out);
                } else {
                    self.out.push('\n');
                    self.render_children(block);
                }
                tag.render_close(&mut self.out);
                self.out.push('\n');
            }
            BlockKind::Composite => {
                self.render_children(block);
            }
            BlockKind::Table(spec) => self.render_table(spec),
            BlockKind::DefinitionList => {
                self.out.push_str("<dl>\n");
                self.render_children(block);
                self.out.push_str("</dl>\n");
            }
            BlockKind::DefinitionTerm => {
                self.out.push_str("<dt>");
                self.render_span(block);
                self.out.push_str("</dt>\n");
            }
            BlockKind::DefinitionDescription => {
                if block.children.is_empty() {
                    self.out.push_str("<dd>");
                    self.render_span(block);
                    self.out.push_str("</dd>\n");
                } else {
                    self.out.push_str("<dd>\n");
                    self.render_children(block);
                    self.out.push_str("</dd>\n");
                }
            }
            BlockKind::FootnoteParagraph { return_link } => {
                self.out.push_str("<p>");
                self.render_span(block);
                self.out.push(' ');
                self.out.push_str(return_link);
                self.out.push_str("</p>\n");
            }
            // Parse-only kinds never reach a finished tree.
            BlockKind::SetextH1
            | BlockKind::SetextH2 { .. }
            | BlockKind::Indent
            | BlockKind::OrderedListItemLine
            | BlockKind::UnorderedListItemLine
            | BlockKind::TableSpecLine(_)
            | BlockKind::Footnote { .. } => {}
        }
    }

    fn render_children(&mut self, block: &Block) {
        for child in &block.children {
            self.render_block(child);
        }
    }

    fn render_span(&mut self, block: &Block) {
        let mut formatter = SpanFormatter::new(self.opts, self.state, self.images);
        formatter.format(&block.buf, block.span, &mut self.out);
    }

    fn heading_id_attr(&mut self, block: &Block, explicit: Option<&str>) -> String {
        if let Some(id) = explicit {
            self.state.used_ids.insert(id.to_string());
            let mut attr = String::from(" id=\"");
            escape_attr(id, &mut attr);
            attr.push('"');
            return attr;
        }
        if !self.opts.auto_heading_ids {
            return String::new();
        }
        let mut plain = String::new();
        let mut formatter = SpanFormatter::new(self.opts, self.state, self.images);
        formatter.format_plain(&block.buf, block.span, &mut plain);
        let id = make_unique_id(&make_heading_id(&plain), &mut self.state.used_ids);
        let mut attr = String::from(" id=\"");
        escape_attr(&id, &mut attr);
        attr.push('"');
        attr
    }

    fn render_table(&mut self, spec: &TableSpec) {
        self.out.push_str("<table>\n<thead>\n<tr>\n");
        for (cell, align) in spec.header.iter().zip(align_iter(spec)) {
            self.render_table_cell("th", cell, align);
        }
        self.out.push_str("</tr>\n</thead>\n<tbody>\n");
        for row in &spec.rows {
            self.out.push_str("<tr>\n");
            for (cell, align) in row.iter().zip(align_iter(spec)) {
                self.render_table_cell("td", cell, align);
            }
            self.out.push_str("</tr>\n");
        }
        self.out.push_str("</tbody>\n</table>\n");
    }

    fn render_table_cell(&mut self, tag: &str, cell: &str, align: ColumnAlignment) {
        let attr = match align {
            ColumnAlignment::None => "",
            ColumnAlignment::Left => " align=\"left\"",
            ColumnAlignment::Right => " align=\"right\"",
            ColumnAlignment::Center => " align=\"center\"",
        };
        self.out.push_str(&format!("<{}{}>", tag, attr));
        let mut formatter = SpanFormatter::new(self.opts, self.state, self.images);
        formatter.format(cell, Span::new(0, cell.len()), &mut self.out);
        self.out.push_str(&format!("</{}>\n", tag));
    }

    /// Claimed footnotes render after the body in first-reference order;
    /// each one's last paragraph is rewritten in place to carry the return
    /// link.
    fn render_footnotes(&mut self) {
        if self.state.footnotes_used.is_empty() {
            return;
        }
        self.out.push_str("<div class=\"");
        escape_attr(&self.opts.html_class_footnotes, &mut self.out);
        self.out.push_str("\">\n<hr />\n<ol>\n");

        let mut index = 0usize;
        while index < self.state.footnotes_used.len() {
            let mut footnote = self.state.footnotes_used[index].clone();
            let id = match &footnote.kind {
                BlockKind::Footnote { id } => id.clone(),
                _ => {
                    index += 1;
                    continue;
                }
            };
            let return_link = format!(
                "<a href=\"#fnref:{}\" rev=\"footnote\">&#8617;</a>",
                attr_escaped(&id)
            );
            match footnote.children.last_mut() {
                Some(last) if matches!(last.kind, BlockKind::Paragraph) => {
                    last.kind = BlockKind::FootnoteParagraph { return_link };
                }
                _ => {
                    let buf = footnote.buffer().clone();
                    let empty = Span::empty(0);
                    let para =
                        Block::new(&buf, BlockKind::FootnoteParagraph { return_link }, empty, empty);
                    footnote.children.push(para);
                }
            }

            self.out.push_str("<li id=\"fn:");
            escape_attr(&id, &mut self.out);
            self.out.push_str("\">\n");
            for child in &footnote.children {
                self.render_block(child);
            }
            self.out.push_str("</li>\n");
            index += 1;
        }
        self.out.push_str("</ol>\n</div>\n");
    }
}

fn align_iter(spec: &TableSpec) -> impl Iterator<Item = ColumnAlignment> + '_ {
    spec.columns.iter().copied().chain(std::iter::repeat(ColumnAlignment::None))
}

fn expand_template(template: &str, index: usize) -> String {
    template.replace("{0}", &index.to_string())
}

fn attr_escaped(text: &str) -> String {
    let mut out = String::new();
    escape_attr(text, &mut out);
    out
}

// === Encoders ===

/// Entity-aware encoder for ordinary text: something that already reads
/// as an entity passes through untouched.
pub(crate) fn escape_html_smart(text: &str, out: &mut String) {
    let bytes = text.as_bytes();
    let mut i = 0usize;
    while i < bytes.len() {
        match bytes[i] {
            b'&' => match scan_entity(bytes, i, bytes.len()) {
                Some(len) => {
                    out.push_str(&text[i..i + len]);
                    i += len;
                    continue;
                }
                None => out.push_str("&amp;"),
            },
            b'<' => out.push_str("&lt;"),
            b'>' => out.push_str("&gt;"),
            b'"' => out.push_str("&quot;"),
            b => {
                let len = match b {
                    0x00..=0x7F => 1,
                    0xC0..=0xDF => 2,
                    0xE0..=0xEF => 3,
                    _ => 4,
                };
                out.push_str(&text[i..(i + len).min(text.len())]);
                i += len;
                continue;
            }
        }
        i += 1;
    }
}

/// Strict encoder: every `&` escapes, entities included.
pub(crate) fn escape_html_strict(text: &str, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
}

pub(crate) fn escape_attr(text: &str, out: &mut String) {
    escape_html_strict(text, out);
}

// === URL handling ===

/// Qualifies relative and absolute-path URLs against the configured
/// locations. `mailto:` and fragment links are matched case-insensitively
/// and never rewritten.
pub(crate) fn qualify_url(opts: &Options, url: &str) -> String {
    if url.starts_with('#') || has_url_scheme(url) {
        return url.to_string();
    }
    if let Some(rest) = url.strip_prefix('/') {
        let root = opts
            .url_root_location
            .as_deref()
            .or(opts.url_base_location.as_deref());
        return match root {
            Some(root) => format!("{}/{}", root.trim_end_matches('/'), rest),
            None => url.to_string(),
        };
    }
    match opts.url_base_location.as_deref() {
        Some(base) => format!("{}/{}", base.trim_end_matches('/'), url),
        None => url.to_string(),
    }
}

pub(crate) fn url_is_external(url: &str) -> bool {
    has_url_scheme(url)
}

// === Sanitized output ===

/// Runs the rendered fragment through an allow-list sanitizer. The
/// in-parser safe mode escapes whole unsafe regions; this pass is the
/// belt-and-braces variant for callers embedding output in hostile
/// contexts.
pub(crate) fn sanitize_fragment(html: &str) -> String {
    let tags: HashSet<&'static str> = [
        "a", "abbr", "b", "blockquote", "br", "code", "dd", "del", "div", "dl", "dt", "em",
        "h1", "h2", "h3", "h4", "h5", "h6", "hr", "i", "img", "kbd", "li", "ol", "p", "pre",
        "s", "strong", "sub", "sup", "table", "tbody", "td", "th", "thead", "tr", "u", "ul",
    ]
    .iter()
    .copied()
    .collect();

    let mut generic_attributes: HashSet<&'static str> = HashSet::new();
    generic_attributes.insert("class");
    generic_attributes.insert("id");

    let mut tag_attributes: HashMap<&'static str, HashSet<&'static str>> = HashMap::new();
    tag_attributes.insert("a", ["href", "title", "rel", "target"].iter().copied().collect());
    tag_attributes.insert("abbr", ["title"].iter().copied().collect());
    tag_attributes.insert(
        "img",
        ["alt", "src", "title", "width", "height"].iter().copied().collect(),
    );
    tag_attributes.insert("td", ["align"].iter().copied().collect());
    tag_attributes.insert("th", ["align"].iter().copied().collect());

    Builder::new()
        .tags(tags)
        .generic_attributes(generic_attributes)
        .tag_attributes(tag_attributes)
        .link_rel(None)
        .clean(html)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smart_encoder_passes_entities_once() {
        let mut out = String::new();
        escape_html_smart("&amp; & <b> \"q\"", &mut out);
        assert_eq!(out, "&amp; &amp; &lt;b&gt; &quot;q&quot;");
    }

    #[test]
    fn strict_encoder_double_escapes_entities() {
        let mut out = String::new();
        escape_html_strict("&amp;", &mut out);
        assert_eq!(out, "&amp;amp;");
    }

    #[test]
    fn url_qualification() {
        let mut opts = Options::default();
        opts.url_base_location = Some("http://example.com/base/".to_string());
        opts.url_root_location = Some("http://example.com".to_string());
        assert_eq!(qualify_url(&opts, "page.html"), "http://example.com/base/page.html");
        assert_eq!(qualify_url(&opts, "/top.html"), "http://example.com/top.html");
        assert_eq!(qualify_url(&opts, "http://other.org/x"), "http://other.org/x");
        assert_eq!(qualify_url(&opts, "MAILTO:a@b.c"), "MAILTO:a@b.c");
        assert_eq!(qualify_url(&opts, "#anchor"), "#anchor");
    }
}
