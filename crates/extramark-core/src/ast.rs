use crate::html::HtmlTag;
use crate::span::Span;
use std::rc::Rc;

/// Node of the parsed document tree.
///
/// A block references the shared text buffer of the region it was parsed
/// from; `span` is the content window and `line` the original raw line
/// (used for indentation math and plain-text reversion). Exactly one of
/// content window / children is meaningful for a given kind.
#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    pub(crate) buf: Rc<str>,
    pub kind: BlockKind,
    pub span: Span,
    pub line: Span,
    pub children: Vec<Block>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum BlockKind {
    Blank,
    Heading { level: u8, id: Option<String> },
    /// Underline candidate lines, resolved against the previous line during
    /// collapse and never present in a finished tree.
    SetextH1,
    SetextH2 { width: usize },
    Quote,
    OrderedListItemLine,
    UnorderedListItemLine,
    Paragraph,
    /// 4-space / tab indented line (parse-only).
    Indent,
    HorizontalRule,
    UserBreak,
    RawHtml,
    /// HTML region judged unsafe in safe mode; rendered fully escaped.
    UnsafeHtml,
    /// Inline-formatted content without a wrapping paragraph tag.
    Span,
    CodeBlock { language: Option<String> },
    ListItem,
    OrderedList,
    UnorderedList,
    /// HTML tag wrapper: the open/close tags with markdown-processed children.
    HtmlTag(HtmlTag),
    /// Stitched sequence of raw-HTML and markdown child blocks.
    Composite,
    /// Table delimiter row as classified (parse-only).
    TableSpecLine(TableSpec),
    Table(TableSpec),
    DefinitionDescription,
    DefinitionTerm,
    DefinitionList,
    Footnote { id: String },
    /// Last paragraph of a rendered footnote, rewritten to carry the
    /// return link.
    FootnoteParagraph { return_link: String },
}

impl Block {
    pub(crate) fn new(buf: &Rc<str>, kind: BlockKind, span: Span, line: Span) -> Self {
        Self {
            buf: Rc::clone(buf),
            kind,
            span,
            line,
            children: Vec::new(),
        }
    }

    pub(crate) fn container(buf: &Rc<str>, kind: BlockKind, children: Vec<Block>) -> Self {
        let span = children
            .first()
            .map(|first| {
                Span::new(
                    first.line.start,
                    children.last().map(|last| last.line.end).unwrap_or(first.line.end),
                )
            })
            .unwrap_or(Span::empty(0));
        Self {
            buf: Rc::clone(buf),
            kind,
            span,
            line: span,
            children,
        }
    }

    pub fn content(&self) -> &str {
        self.span.slice(&self.buf)
    }

    pub fn line_text(&self) -> &str {
        self.line.slice(&self.buf)
    }

    pub(crate) fn buffer(&self) -> &Rc<str> {
        &self.buf
    }

    /// Leading space count of the raw line, tabs counted as 4 columns.
    pub(crate) fn leading_columns(&self) -> usize {
        let mut columns = 0;
        for b in self.line_text().bytes() {
            match b {
                b' ' => columns += 1,
                b'\t' => columns += 4 - (columns % 4),
                _ => break,
            }
        }
        columns
    }

    /// Late reclassification: the block becomes plain paragraph text and the
    /// content window widens back to the raw line.
    pub(crate) fn revert_to_plain(&mut self) {
        self.kind = BlockKind::Paragraph;
        self.span = self.line;
    }

    pub(crate) fn is_blank(&self) -> bool {
        matches!(self.kind, BlockKind::Blank)
    }

    pub(crate) fn is_list_item_line(&self) -> bool {
        matches!(
            self.kind,
            BlockKind::OrderedListItemLine | BlockKind::UnorderedListItemLine
        )
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ColumnAlignment {
    None,
    Left,
    Right,
    Center,
}

/// Parsed table shape: delimiter-row column alignments plus, once built,
/// the header row and body rows. Rows are padded so every row has exactly
/// `columns.len()` cells.
#[derive(Clone, Debug, PartialEq)]
pub struct TableSpec {
    pub leading_bar: bool,
    pub trailing_bar: bool,
    pub columns: Vec<ColumnAlignment>,
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl TableSpec {
    pub(crate) fn new(leading_bar: bool, trailing_bar: bool, columns: Vec<ColumnAlignment>) -> Self {
        Self {
            leading_bar,
            trailing_bar,
            columns,
            header: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub(crate) fn pad_row(&self, mut row: Vec<String>) -> Vec<String> {
        while row.len() < self.columns.len() {
            row.push("&nbsp;".to_string());
        }
        row
    }
}

/// Reference-style link definition: `[id]: url "title"`. Ids are matched
/// case-insensitively.
#[derive(Clone, Debug, PartialEq)]
pub struct LinkDefinition {
    pub id: String,
    pub url: String,
    pub title: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Abbreviation {
    pub abbr: String,
    pub title: String,
}
