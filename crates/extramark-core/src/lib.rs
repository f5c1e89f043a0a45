mod ast;
mod cursor;
mod emit;
mod entities;
mod html;
mod inline;
mod label;
mod options;
mod parser;
mod section;
mod span;

pub use ast::{Abbreviation, Block, BlockKind, ColumnAlignment, LinkDefinition, TableSpec};
pub use html::HtmlTag;
pub use options::Options;
pub use section::{join_sections, split_sections};
pub use span::Span;

use std::collections::{HashMap, HashSet};

/// Nesting limit for mutually recursive parsing (quotes in quotes, HTML in
/// Markdown in HTML). Past it, regions degrade to literal text.
pub(crate) const MAX_DEPTH: usize = 32;

/// Collaborator that knows the pixel size of images, used for `width`/
/// `height` attributes and `max_image_width` downscaling.
pub trait ImageSizeResolver {
    fn image_size(&self, url: &str, options: &Options) -> Option<(u32, u32)>;
}

/// Document-scoped mutable state, reset at the start of every transform.
/// One instance must not be shared across concurrent transforms; use
/// independent [`Transform`] instances instead.
#[derive(Default)]
pub(crate) struct DocState {
    /// Reference link definitions keyed by lowercased id.
    pub link_defs: HashMap<String, LinkDefinition>,
    pub footnotes_pending: HashMap<String, Block>,
    /// Claimed footnotes in first-reference order.
    pub footnotes_used: Vec<Block>,
    /// Length-sorted before rendering so longer abbreviations win.
    pub abbreviations: Vec<Abbreviation>,
    pub used_ids: HashSet<String>,
    pub head_block: String,
}

impl DocState {
    fn reset(&mut self) {
        *self = DocState::default();
    }

    pub fn add_abbreviation(&mut self, abbr: Abbreviation) {
        match self
            .abbreviations
            .iter_mut()
            .find(|existing| existing.abbr == abbr.abbr)
        {
            Some(existing) => *existing = abbr,
            None => self.abbreviations.push(abbr),
        }
    }

    /// Moves a pending footnote into the used list and returns its index.
    /// A second reference to an already-claimed id reuses the first index.
    pub fn claim_footnote(&mut self, id: &str) -> Option<usize> {
        let claimed = self.footnotes_used.iter().position(|block| {
            matches!(&block.kind, BlockKind::Footnote { id: used } if used == id)
        });
        if let Some(index) = claimed {
            return Some(index);
        }
        let block = self.footnotes_pending.remove(id)?;
        self.footnotes_used.push(block);
        Some(self.footnotes_used.len() - 1)
    }
}

/// Markdown-to-HTML transformer.
///
/// ```
/// use extramark_core::{Options, Transform};
///
/// let mut transform = Transform::new(Options::default());
/// assert_eq!(transform.transform("Hello *world*"), "<p>Hello <em>world</em></p>\n");
/// ```
pub struct Transform {
    pub options: Options,
    images: Option<Box<dyn ImageSizeResolver>>,
    state: DocState,
}

impl Default for Transform {
    fn default() -> Self {
        Self::new(Options::default())
    }
}

impl Transform {
    pub fn new(options: Options) -> Self {
        Self {
            options,
            images: None,
            state: DocState::default(),
        }
    }

    pub fn with_image_sizes(mut self, resolver: Box<dyn ImageSizeResolver>) -> Self {
        self.images = Some(resolver);
        self
    }

    /// Transforms one Markdown document into an HTML fragment. A pure
    /// function of the input and the options: all document-scoped state is
    /// reset first.
    pub fn transform(&mut self, source: &str) -> String {
        self.state.reset();
        log::debug!("transform: {} bytes, extra={}", source.len(), self.options.extra_mode);
        let (_buf, blocks) = parser::parse_document(&self.options, &mut self.state, source);
        self.state
            .abbreviations
            .sort_by(|a, b| b.abbr.len().cmp(&a.abbr.len()));
        if self.options.summary_length > 0 {
            return emit::render_summary(
                &self.options,
                &mut self.state,
                self.images.as_deref(),
                &blocks,
            );
        }
        emit::render_document(&self.options, &mut self.state, self.images.as_deref(), &blocks)
    }

    /// Like [`transform`](Self::transform), with an allow-list sanitizer
    /// pass over the rendered fragment.
    pub fn transform_sanitized(&mut self, source: &str) -> String {
        let html = self.transform(source);
        emit::sanitize_fragment(&html)
    }

    /// Content diverted out of `<head>` blocks during the last transform,
    /// when `extract_head_blocks` is enabled.
    pub fn head_block(&self) -> &str {
        &self.state.head_block
    }
}
