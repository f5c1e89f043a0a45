use crate::ast::{Abbreviation, Block, BlockKind, ColumnAlignment, LinkDefinition, TableSpec};
use crate::cursor::Cursor;
use crate::html::{parse_tag, HtmlTag, MarkdownMode};
use crate::label::strip_explicit_id;
use crate::options::Options;
use crate::span::Span;
use crate::{DocState, MAX_DEPTH};
use std::rc::Rc;

/// Context a region is parsed under. Continuation and interruption rules
/// differ inside list items, definitions and footnotes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum ParentKind {
    Document,
    Quote,
    ListItem,
    Definition,
    Footnote,
}

/// Parses one top-level document region.
pub(crate) fn parse_document(
    opts: &Options,
    state: &mut DocState,
    source: &str,
) -> (Rc<str>, Vec<Block>) {
    let buf: Rc<str> = Rc::from(source);
    let html_mode = if opts.extra_mode && opts.markdown_in_html {
        MarkdownMode::Deep
    } else {
        MarkdownMode::Off
    };
    let mut parser = BlockParser {
        opts,
        state,
        parent: ParentKind::Document,
        depth: 0,
        html_mode,
    };
    let blocks = parser.parse(&buf);
    (buf, blocks)
}

/// Two-phase block parser: each physical line is classified into a typed
/// line block, then a transition on (incoming kind, kind of the first
/// pending line) collapses runs of lines into finished blocks.
pub(crate) struct BlockParser<'o, 's> {
    pub opts: &'o Options,
    pub state: &'s mut DocState,
    parent: ParentKind,
    depth: usize,
    html_mode: MarkdownMode,
}

enum Classified {
    /// A per-line block for the collapse engine.
    Line(Block),
    /// A fully built multi-line block (HTML region, fenced code).
    Finished(Block),
    /// Swallowed into document state (link/abbreviation definition).
    Consumed,
}

struct Collapse {
    blocks: Vec<Block>,
    pending: Vec<Block>,
    prev_blank: bool,
    /// Whether the pending run started right after a blank line.
    run_after_blank: bool,
}

impl<'o, 's> BlockParser<'o, 's> {
    fn child(&mut self, parent: ParentKind, html_mode: MarkdownMode) -> BlockParser<'o, '_> {
        BlockParser {
            opts: self.opts,
            state: &mut *self.state,
            parent,
            depth: self.depth + 1,
            html_mode,
        }
    }

    /// Re-parses rebuilt region text as a nested document. At the nesting
    /// limit the region degrades to one literal paragraph.
    fn parse_nested(&mut self, text: &str, parent: ParentKind) -> (Rc<str>, Vec<Block>) {
        let buf: Rc<str> = Rc::from(text);
        let full = Span::new(0, buf.len());
        if self.depth + 1 >= MAX_DEPTH {
            log::warn!("block nesting limit reached; treating region as literal text");
            let block = Block::new(&buf, BlockKind::Paragraph, full, full);
            return (Rc::clone(&buf), vec![block]);
        }
        let html_mode = self.html_mode;
        let blocks = self.child(parent, html_mode).parse(&buf);
        (buf, blocks)
    }

    pub(crate) fn parse(&mut self, buf: &Rc<str>) -> Vec<Block> {
        let mut cursor = Cursor::new(buf);
        let mut ctx = Collapse {
            blocks: Vec::new(),
            pending: Vec::new(),
            prev_blank: true,
            run_after_blank: true,
        };

        while !cursor.at_end() {
            match self.classify_line(buf, &mut cursor, &ctx) {
                Classified::Line(block) => self.add_line(buf, block, &mut ctx, &mut cursor),
                Classified::Finished(block) => {
                    self.flush(buf, &mut ctx);
                    ctx.blocks.push(block);
                    ctx.prev_blank = false;
                }
                // Definitions are invisible; following constructs behave as
                // if after a blank line.
                Classified::Consumed => ctx.prev_blank = true,
            }
        }
        self.flush(buf, &mut ctx);

        let mut blocks = ctx.blocks;
        if self.opts.extra_mode {
            blocks = build_definition_lists(buf, blocks);
        }
        blocks
    }

    // === Phase A: line classification ===

    fn classify_line(&mut self, buf: &Rc<str>, cursor: &mut Cursor, ctx: &Collapse) -> Classified {
        let line_start = cursor.position();
        let line = cursor.scan_line();
        cursor.skip_eol();
        let after_line = cursor.position();
        let text = line.slice(buf);

        let make = |kind: BlockKind, span: Span| Block::new(buf, kind, span, line);
        let at = |offset: usize| line.start + offset;

        if text.trim().is_empty() {
            return Classified::Line(make(BlockKind::Blank, Span::empty(line.start)));
        }

        let columns = leading_columns(text);
        if columns >= 4 {
            let offset = strip_indent_offset(text);
            return Classified::Line(make(BlockKind::Indent, Span::new(at(offset), line.end)));
        }

        let ws = text.len() - text.trim_start_matches([' ', '\t']).len();
        let stripped = &text[ws..];

        // ATX heading, trailing `#` run stripped, `{#id}` suffix honored in
        // extra (non-safe) mode. Levels above six clamp to six.
        if stripped.starts_with('#') {
            let hashes = stripped.bytes().take_while(|&b| b == b'#').count();
            let level = hashes.min(6) as u8;
            let rest_full = &stripped[hashes..];
            let lead = rest_full.len() - rest_full.trim_start_matches([' ', '\t']).len();
            let mut rest = rest_full.trim_start_matches([' ', '\t']);
            rest = rest.trim_end_matches([' ', '\t']);
            rest = rest.trim_end_matches('#');
            rest = rest.trim_end_matches([' ', '\t']);
            let mut id = None;
            if self.opts.extra_mode && !self.opts.safe_mode {
                let (remaining, explicit) = strip_explicit_id(rest);
                rest = remaining;
                id = explicit.map(|value| value.to_string());
            }
            let offset = ws + hashes + lead;
            let span = Span::new(at(offset), at(offset) + rest.len());
            return Classified::Line(make(BlockKind::Heading { level, id }, span));
        }

        // Bare `=`/`-` runs are setext underline candidates, resolved
        // against the pending paragraph during collapse.
        if let Some((level, width)) = setext_underline(stripped) {
            let kind = if level == 1 {
                BlockKind::SetextH1
            } else {
                BlockKind::SetextH2 { width }
            };
            return Classified::Line(make(kind, Span::new(at(ws), line.end)));
        }

        if self.opts.extra_mode
            && let Some(spec) = parse_table_spec(stripped)
        {
            return Classified::Line(make(BlockKind::TableSpecLine(spec), line));
        }

        if self.opts.extra_mode
            && let Some(block) = self.try_fenced_code(buf, cursor, line, stripped, ws)
        {
            return Classified::Finished(block);
        }

        if stripped.starts_with('<') {
            cursor.set_position(at(ws));
            if let Some(block) = self.try_html_block(buf, cursor) {
                return Classified::Finished(block);
            }
            cursor.set_position(after_line);
        }

        if let Some(rest) = stripped.strip_prefix('>') {
            let offset = ws + 1 + if rest.starts_with(' ') { 1 } else { 0 };
            return Classified::Line(make(BlockKind::Quote, Span::new(at(offset), line.end)));
        }

        if is_thematic_break(stripped) {
            let kind = if self.opts.user_breaks {
                BlockKind::UserBreak
            } else {
                BlockKind::HorizontalRule
            };
            return Classified::Line(make(kind, line));
        }

        if self.opts.extra_mode
            && let Some(abbr) = parse_abbreviation_definition(stripped)
        {
            self.state.add_abbreviation(abbr);
            return Classified::Consumed;
        }

        if let Some(offset) = unordered_marker(stripped) {
            let span = Span::new(at(ws + offset), line.end);
            return Classified::Line(make(BlockKind::UnorderedListItemLine, span));
        }

        if self.opts.extra_mode
            && let Some(offset) = definition_marker(stripped)
        {
            let span = Span::new(at(ws + offset), line.end);
            return Classified::Line(make(BlockKind::DefinitionDescription, span));
        }

        if let Some(offset) = ordered_marker(stripped) {
            let span = Span::new(at(ws + offset), line.end);
            return Classified::Line(make(BlockKind::OrderedListItemLine, span));
        }

        if stripped.starts_with('[') {
            let mid_paragraph = !ctx.prev_blank && !ctx.pending.is_empty();
            if self.opts.extra_mode
                && let Some((id, offset)) = parse_footnote_marker(stripped)
                && !mid_paragraph
            {
                let span = Span::new(at(ws + offset), line.end);
                return Classified::Line(make(BlockKind::Footnote { id }, span));
            }
            if !mid_paragraph
                && let Some(def) = parse_link_definition(stripped)
            {
                self.state.link_defs.insert(def.id.to_lowercase(), def);
                return Classified::Consumed;
            }
        }

        let span = Span::new(at(ws), line.end);
        Classified::Line(make(BlockKind::Paragraph, span))
    }

    // === Phase B: collapse ===

    fn add_line(&mut self, buf: &Rc<str>, mut b: Block, ctx: &mut Collapse, cursor: &mut Cursor) {
        let incoming_blank = b.is_blank();
        let incoming_kind = b.kind.clone();
        let first_kind = ctx.pending.first().map(|first| first.kind.clone());
        // A paragraph is only interrupted by a list/quote/footnote/definition
        // marker after a blank line, or inside a list/definition context.
        let can_interrupt = ctx.prev_blank
            || matches!(
                self.parent,
                ParentKind::ListItem | ParentKind::Definition | ParentKind::Footnote
            );

        match (&incoming_kind, &first_kind) {
            (BlockKind::Blank, None) => {}
            (BlockKind::Blank, Some(kind)) => match kind {
                BlockKind::OrderedListItemLine
                | BlockKind::UnorderedListItemLine
                | BlockKind::Footnote { .. }
                | BlockKind::Indent => ctx.pending.push(b),
                _ => self.flush(buf, ctx),
            },

            (BlockKind::Paragraph, None) => self.start_run(ctx, b),
            (BlockKind::Paragraph, Some(kind)) => match kind {
                BlockKind::Paragraph
                | BlockKind::Quote
                | BlockKind::DefinitionDescription => ctx.pending.push(b),
                BlockKind::OrderedListItemLine
                | BlockKind::UnorderedListItemLine
                | BlockKind::Footnote { .. } => {
                    if ctx.prev_blank {
                        self.flush(buf, ctx);
                        self.start_run(ctx, b);
                    } else {
                        // Lazy continuation of the last item.
                        ctx.pending.push(b);
                    }
                }
                _ => {
                    self.flush(buf, ctx);
                    self.start_run(ctx, b);
                }
            },

            (BlockKind::Indent, None) => self.start_run(ctx, b),
            (BlockKind::Indent, Some(kind)) => match kind {
                // Indentation inside an ongoing paragraph is swallowed as a
                // continuation line.
                BlockKind::Paragraph
                | BlockKind::Quote
                | BlockKind::Indent
                | BlockKind::OrderedListItemLine
                | BlockKind::UnorderedListItemLine
                | BlockKind::Footnote { .. }
                | BlockKind::DefinitionDescription => ctx.pending.push(b),
                _ => {
                    self.flush(buf, ctx);
                    self.start_run(ctx, b);
                }
            },

            (BlockKind::Quote, None) => self.start_run(ctx, b),
            (BlockKind::Quote, Some(kind)) => match kind {
                BlockKind::Quote => ctx.pending.push(b),
                BlockKind::Paragraph
                | BlockKind::OrderedListItemLine
                | BlockKind::UnorderedListItemLine => {
                    if can_interrupt {
                        self.flush(buf, ctx);
                        self.start_run(ctx, b);
                    } else {
                        b.revert_to_plain();
                        ctx.pending.push(b);
                    }
                }
                _ => {
                    self.flush(buf, ctx);
                    self.start_run(ctx, b);
                }
            },

            (
                BlockKind::OrderedListItemLine | BlockKind::UnorderedListItemLine,
                Some(BlockKind::Paragraph),
            ) => {
                if can_interrupt {
                    self.flush(buf, ctx);
                    self.start_run(ctx, b);
                } else {
                    b.revert_to_plain();
                    ctx.pending.push(b);
                }
            }
            (BlockKind::OrderedListItemLine, Some(BlockKind::OrderedListItemLine))
            | (BlockKind::UnorderedListItemLine, Some(BlockKind::UnorderedListItemLine)) => {
                ctx.pending.push(b)
            }
            (BlockKind::OrderedListItemLine | BlockKind::UnorderedListItemLine, _) => {
                self.flush(buf, ctx);
                self.start_run(ctx, b);
            }

            (BlockKind::DefinitionDescription, pending) => match pending {
                Some(BlockKind::Paragraph) | Some(BlockKind::DefinitionDescription) => {
                    // The flushed paragraph becomes the term in the
                    // definition-list post-pass.
                    self.flush(buf, ctx);
                    self.start_run(ctx, b);
                }
                None => {
                    let after_term = matches!(
                        ctx.blocks.last().map(|last| &last.kind),
                        Some(
                            BlockKind::Paragraph
                                | BlockKind::DefinitionDescription
                                | BlockKind::DefinitionList
                        )
                    );
                    if !after_term {
                        // A definition marker after unrelated content
                        // reverts to plain paragraph text.
                        b.revert_to_plain();
                    }
                    self.start_run(ctx, b);
                }
                Some(_) => {
                    self.flush(buf, ctx);
                    b.revert_to_plain();
                    self.start_run(ctx, b);
                }
            },

            (BlockKind::Footnote { .. }, None) => self.start_run(ctx, b),
            (BlockKind::Footnote { .. }, Some(BlockKind::Paragraph)) => {
                if can_interrupt {
                    self.flush(buf, ctx);
                    self.start_run(ctx, b);
                } else {
                    b.revert_to_plain();
                    ctx.pending.push(b);
                }
            }
            (BlockKind::Footnote { .. }, Some(_)) => {
                self.flush(buf, ctx);
                self.start_run(ctx, b);
            }

            // Setext markers bind to the immediately preceding line of a
            // paragraph run and otherwise degrade.
            (BlockKind::SetextH1 | BlockKind::SetextH2 { .. }, pending) => {
                let over_paragraph = matches!(pending, Some(BlockKind::Paragraph))
                    && ctx
                        .pending
                        .last()
                        .is_some_and(|last| matches!(last.kind, BlockKind::Paragraph));
                if over_paragraph {
                    let level = if matches!(&incoming_kind, BlockKind::SetextH1) { 1 } else { 2 };
                    let prev = match ctx.pending.pop() {
                        Some(prev) => prev,
                        None => return,
                    };
                    self.flush(buf, ctx);
                    ctx.blocks.push(self.make_setext_heading(buf, prev, level));
                } else {
                    let dash_width = match &incoming_kind {
                        BlockKind::SetextH2 { width } => *width,
                        _ => 0,
                    };
                    if dash_width >= 3 {
                        self.flush(buf, ctx);
                        b.kind = if self.opts.user_breaks {
                            BlockKind::UserBreak
                        } else {
                            BlockKind::HorizontalRule
                        };
                        ctx.blocks.push(b);
                    } else {
                        // `===` with nothing to underline is just text.
                        b.revert_to_plain();
                        if ctx.pending.is_empty() {
                            self.start_run(ctx, b);
                        } else {
                            ctx.pending.push(b);
                        }
                    }
                }
            }

            (BlockKind::TableSpecLine(spec), pending) => {
                let spec = spec.clone();
                let single_paragraph = matches!(pending, Some(BlockKind::Paragraph))
                    && ctx.pending.len() == 1;
                if single_paragraph {
                    let header = match ctx.pending.pop() {
                        Some(header) => header,
                        None => return,
                    };
                    let table = self.build_table(buf, spec, header, cursor);
                    ctx.blocks.push(table);
                } else {
                    b.revert_to_plain();
                    if ctx.pending.is_empty() {
                        self.start_run(ctx, b);
                    } else {
                        ctx.pending.push(b);
                    }
                }
            }

            (BlockKind::Heading { .. }, _) => {
                self.flush(buf, ctx);
                ctx.blocks.push(b);
            }
            (BlockKind::HorizontalRule | BlockKind::UserBreak, _) => {
                self.flush(buf, ctx);
                ctx.blocks.push(b);
            }

            (_, None) => self.start_run(ctx, b),
            (_, Some(_)) => {
                self.flush(buf, ctx);
                self.start_run(ctx, b);
            }
        }

        ctx.prev_blank = incoming_blank;
    }

    fn start_run(&mut self, ctx: &mut Collapse, b: Block) {
        ctx.run_after_blank = ctx.prev_blank;
        ctx.pending.push(b);
    }

    fn make_setext_heading(&self, buf: &Rc<str>, line: Block, level: u8) -> Block {
        let content = line.content();
        let (text, explicit) = if self.opts.extra_mode && !self.opts.safe_mode {
            strip_explicit_id(content)
        } else {
            (content, None)
        };
        let id = explicit.map(|value| value.to_string());
        // Only end trims apply, so the content start is stable.
        let start = line.span.start;
        Block::new(
            buf,
            BlockKind::Heading { level, id },
            Span::new(start, start + text.trim_end().len()),
            line.line,
        )
    }

    /// Flushes the pending run into finished blocks.
    fn flush(&mut self, buf: &Rc<str>, ctx: &mut Collapse) {
        let mut pending = std::mem::take(&mut ctx.pending);
        while pending.last().is_some_and(|last| last.is_blank()) {
            pending.pop();
        }
        let first = match pending.first() {
            Some(first) => first,
            None => return,
        };

        match first.kind.clone() {
            BlockKind::Paragraph => {
                let start = pending[0].span.start;
                let end = pending[pending.len() - 1].span.end;
                let text = &buf[start..end];
                let trimmed_end = end - (text.len() - text.trim_end().len());
                let line = Span::new(pending[0].line.start, pending[pending.len() - 1].line.end);
                ctx.blocks.push(Block::new(
                    buf,
                    BlockKind::Paragraph,
                    Span::new(start, trimmed_end),
                    line,
                ));
            }
            BlockKind::Quote => {
                let block = self.build_quote(buf, pending);
                ctx.blocks.push(block);
            }
            BlockKind::Indent => {
                let block = self.build_indented_code(buf, pending);
                ctx.blocks.push(block);
            }
            BlockKind::OrderedListItemLine | BlockKind::UnorderedListItemLine => {
                let block = self.build_list(buf, pending);
                ctx.blocks.push(block);
            }
            BlockKind::DefinitionDescription => {
                let block = self.build_definition(buf, pending, ctx.run_after_blank);
                ctx.blocks.push(block);
            }
            BlockKind::Footnote { id } => {
                // Footnotes register into the pending map and emit nothing.
                self.build_footnote(buf, pending, id);
            }
            _ => {
                for block in pending {
                    if !block.is_blank() {
                        ctx.blocks.push(block);
                    }
                }
            }
        }
    }

    // === Builders ===

    fn build_quote(&mut self, buf: &Rc<str>, run: Vec<Block>) -> Block {
        let mut text = String::new();
        for line in &run {
            text.push_str(line.content());
            text.push('\n');
        }
        let (_, children) = self.parse_nested(&text, ParentKind::Quote);
        let span = Span::new(run[0].line.start, run[run.len() - 1].line.end);
        let mut block = Block::new(buf, BlockKind::Quote, span, span);
        block.children = children;
        block
    }

    fn build_indented_code(&self, buf: &Rc<str>, run: Vec<Block>) -> Block {
        let span = Span::new(run[0].line.start, run[run.len() - 1].line.end);
        let mut block = Block::new(buf, BlockKind::CodeBlock { language: None }, span, span);
        block.children = run;
        block
    }

    fn build_list(&mut self, buf: &Rc<str>, run: Vec<Block>) -> Block {
        let ordered = matches!(run[0].kind, BlockKind::OrderedListItemLine);
        let base_columns = run[0].leading_columns();

        // Any line indented further than the first item is a continuation
        // of the item before it; its marker text stays in the content.
        let mut lines = run;
        for line in lines.iter_mut().skip(1) {
            if line.is_list_item_line() && line.leading_columns() > base_columns {
                let offset = strip_indent_offset(line.line_text());
                line.kind = BlockKind::Indent;
                line.span = Span::new(line.line.start + offset, line.line.end);
            }
        }

        let mut items = Vec::new();
        let mut segment: Vec<Block> = Vec::new();
        for line in lines {
            if line.is_list_item_line() && !segment.is_empty() {
                items.push(self.build_list_item(buf, std::mem::take(&mut segment)));
            }
            segment.push(line);
        }
        if !segment.is_empty() {
            items.push(self.build_list_item(buf, segment));
        }

        let kind = if ordered {
            BlockKind::OrderedList
        } else {
            BlockKind::UnorderedList
        };
        Block::container(buf, kind, items)
    }

    fn build_list_item(&mut self, buf: &Rc<str>, mut segment: Vec<Block>) -> Block {
        let had_blank = segment.iter().any(|line| line.is_blank());
        while segment.last().is_some_and(|last| last.is_blank()) {
            segment.pop();
        }
        if segment.len() == 1 {
            let line = &segment[0];
            return Block::new(buf, BlockKind::ListItem, line.span, line.line);
        }

        let mut text = String::new();
        for line in &segment {
            text.push_str(line.content());
            text.push('\n');
        }
        let (_, mut children) = self.parse_nested(&text, ParentKind::ListItem);
        if !had_blank {
            // Tight list: top-level paragraphs render without `<p>` tags.
            for child in &mut children {
                if matches!(child.kind, BlockKind::Paragraph) {
                    child.kind = BlockKind::Span;
                }
            }
        }
        let span = Span::new(segment[0].line.start, segment[segment.len() - 1].line.end);
        let mut block = Block::new(buf, BlockKind::ListItem, span, span);
        block.children = children;
        block
    }

    fn build_definition(&mut self, buf: &Rc<str>, run: Vec<Block>, after_blank: bool) -> Block {
        if run.len() == 1 && !after_blank {
            let line = &run[0];
            return Block::new(buf, BlockKind::DefinitionDescription, line.span, line.line);
        }
        let mut text = String::new();
        for line in &run {
            text.push_str(line.content());
            text.push('\n');
        }
        let (_, children) = self.parse_nested(&text, ParentKind::Definition);
        let span = Span::new(run[0].line.start, run[run.len() - 1].line.end);
        let mut block = Block::new(buf, BlockKind::DefinitionDescription, span, span);
        block.children = children;
        block
    }

    fn build_footnote(&mut self, buf: &Rc<str>, run: Vec<Block>, id: String) {
        let mut text = String::new();
        for line in &run {
            text.push_str(line.content());
            text.push('\n');
        }
        let (_, children) = self.parse_nested(&text, ParentKind::Footnote);
        let span = Span::new(run[0].line.start, run[run.len() - 1].line.end);
        let mut block = Block::new(buf, BlockKind::Footnote { id: id.clone() }, span, span);
        block.children = children;
        // Duplicate ids overwrite the earlier pending entry.
        self.state.footnotes_pending.insert(id, block);
    }

    fn try_fenced_code(
        &mut self,
        buf: &Rc<str>,
        cursor: &mut Cursor,
        line: Span,
        stripped: &str,
        ws: usize,
    ) -> Option<Block> {
        let bytes = stripped.as_bytes();
        let delim = *bytes.first()?;
        if delim != b'`' && delim != b'~' {
            return None;
        }
        let fence_len = bytes.iter().take_while(|&&b| b == delim).count();
        if fence_len < 3 {
            return None;
        }
        let info = stripped[fence_len..].trim();
        if info.contains(delim as char) {
            return None;
        }
        let language = info
            .split_whitespace()
            .next()
            .map(|word| word.to_string());

        // Interior runs to a closing fence of the same delimiter at a line
        // start; an unterminated fence is not a code block.
        let content_start = cursor.position();
        let saved = cursor.position();
        let close;
        loop {
            if cursor.at_end() {
                cursor.set_position(saved);
                return None;
            }
            let fence_line_start = cursor.position();
            let candidate = cursor.scan_line();
            cursor.skip_eol();
            let text = candidate.slice(buf);
            let inner = text.trim();
            if inner.len() >= fence_len
                && inner.bytes().all(|b| b == delim)
                && leading_columns(text) < 4
            {
                close = fence_line_start;
                break;
            }
        }

        let interior = Span::new(content_start, close);
        let span = Span::new(line.start + ws, cursor.position());
        let mut block = Block::new(buf, BlockKind::CodeBlock { language }, span, span);
        let child = Block::new(buf, BlockKind::Indent, interior, interior);
        block.children = vec![child];
        Some(block)
    }

    fn build_table(
        &mut self,
        buf: &Rc<str>,
        mut spec: TableSpec,
        header: Block,
        cursor: &mut Cursor,
    ) -> Block {
        // The already-buffered line is reinterpreted as the header row by
        // rewinding to its span and re-scanning with the cell grammar.
        let header_cells =
            parse_table_row(header.content()).unwrap_or_else(|| vec![header.content().to_string()]);
        spec.header = spec.pad_row(header_cells);

        loop {
            let saved = cursor.position();
            if cursor.at_end() {
                break;
            }
            let row_line = cursor.scan_line();
            cursor.skip_eol();
            match parse_table_row(row_line.slice(buf)) {
                Some(cells) => spec.rows.push(spec.pad_row(cells)),
                None => {
                    cursor.set_position(saved);
                    break;
                }
            }
        }

        let span = Span::new(header.line.start, cursor.position());
        Block::new(buf, BlockKind::Table(spec), span, span)
    }

    // === HTML block scanning ===

    /// Attempts an HTML block at the cursor (sitting on `<`). On any
    /// failure the caller's position is restored and the line falls
    /// through to paragraph classification.
    fn try_html_block(&mut self, buf: &Rc<str>, cursor: &mut Cursor) -> Option<Block> {
        if self.depth >= MAX_DEPTH {
            return None;
        }
        let saved = cursor.position();
        let tag = match parse_tag(cursor) {
            Some(tag) => tag,
            None => {
                cursor.set_position(saved);
                return None;
            }
        };
        if tag.closing {
            cursor.set_position(saved);
            return None;
        }
        let flags = tag.flags();
        if !flags.block {
            cursor.set_position(saved);
            return None;
        }

        if tag.name.eq_ignore_ascii_case("head") && self.opts.extract_head_blocks {
            return self.extract_head(buf, cursor, saved, &tag);
        }

        let mut mode = if self.opts.extra_mode {
            tag.markdown_mode(self.html_mode)
        } else {
            MarkdownMode::Off
        };
        if flags.content_as_span && matches!(mode, MarkdownMode::Block | MarkdownMode::Deep) {
            mode = MarkdownMode::Span;
        }

        let (block, saw_unsafe) = match self.scan_tag_region(buf, cursor, saved, tag, mode) {
            Some(result) => result,
            None => {
                cursor.set_position(saved);
                return None;
            }
        };
        let region_end = cursor.position();
        cursor.skip_linespace();
        if !cursor.at_eol() {
            cursor.set_position(saved);
            return None;
        }
        cursor.skip_eol();

        if self.opts.safe_mode && saw_unsafe {
            // Coarse containment: the entire region is escaped rather than
            // partially cleaned.
            let span = Span::new(saved, region_end);
            return Some(Block::new(buf, BlockKind::UnsafeHtml, span, span));
        }
        Some(block)
    }

    /// Builds the block for an opening tag already consumed from the
    /// cursor. Returns the block and whether anything unsafe was seen
    /// inside the region.
    fn scan_tag_region(
        &mut self,
        buf: &Rc<str>,
        cursor: &mut Cursor,
        region_start: usize,
        tag: HtmlTag,
        mode: MarkdownMode,
    ) -> Option<(Block, bool)> {
        let mut saw_unsafe = self.opts.safe_mode && !tag.is_safe();
        let flags = tag.flags();

        // Self-closing and no-closing tags complete immediately.
        if tag.closed || flags.no_closing {
            let span = Span::new(region_start, cursor.position());
            return Some((Block::new(buf, BlockKind::RawHtml, span, span), saw_unsafe));
        }

        let content_start = cursor.position();
        let mut segments: Vec<Block> = Vec::new();
        let mut html_start = content_start;
        let mut depth = 0usize;
        let (close_start, close_end) = loop {
            if !cursor.find_char(b'<') {
                return None;
            }
            let tag_start = cursor.position();
            let nested = match parse_tag(cursor) {
                Some(nested) => nested,
                None => {
                    // Unparsable `<` is skipped one character at a time.
                    cursor.set_position(tag_start + 1);
                    continue;
                }
            };
            if self.opts.safe_mode && !nested.is_safe() {
                saw_unsafe = true;
            }
            // In literal regions, a nested tag carrying its own markdown
            // mode is cut out and parsed as its own sub-region; it takes no
            // part in the depth tracking because its close is consumed here.
            if mode == MarkdownMode::Off
                && self.opts.extra_mode
                && !nested.closing
                && nested.has_markdown_attribute()
                && nested.markdown_mode(MarkdownMode::Off) != MarkdownMode::Off
                && self.depth + 1 < MAX_DEPTH
            {
                let mut nested_mode = nested.markdown_mode(MarkdownMode::Off);
                if nested.flags().content_as_span
                    && matches!(nested_mode, MarkdownMode::Block | MarkdownMode::Deep)
                {
                    nested_mode = MarkdownMode::Span;
                }
                self.depth += 1;
                let result = self.scan_tag_region(buf, cursor, tag_start, nested, nested_mode);
                self.depth -= 1;
                match result {
                    Some((child, child_unsafe)) => {
                        saw_unsafe |= child_unsafe;
                        if html_start < tag_start {
                            let chunk = Span::new(html_start, tag_start);
                            segments.push(Block::new(buf, BlockKind::RawHtml, chunk, chunk));
                        }
                        html_start = cursor.position();
                        segments.push(child);
                    }
                    None => cursor.set_position(tag_start + 1),
                }
                continue;
            }
            if nested.name.eq_ignore_ascii_case(&tag.name) {
                if nested.closing {
                    if depth == 0 {
                        break (tag_start, cursor.position());
                    }
                    depth -= 1;
                    continue;
                }
                if !nested.closed && !nested.flags().no_closing {
                    depth += 1;
                }
            }
        };

        let region = Span::new(region_start, close_end);
        let interior = Span::new(content_start, close_start);

        let block = match mode {
            MarkdownMode::Off => {
                if segments.is_empty() {
                    Block::new(buf, BlockKind::RawHtml, region, region)
                } else {
                    if html_start < close_end {
                        let chunk = Span::new(html_start, close_end);
                        segments.push(Block::new(buf, BlockKind::RawHtml, chunk, chunk));
                    }
                    let mut block = Block::new(buf, BlockKind::Composite, region, region);
                    block.children = segments;
                    block
                }
            }
            MarkdownMode::Span => {
                let mut block = Block::new(buf, BlockKind::HtmlTag(tag), region, region);
                block.children = vec![Block::new(buf, BlockKind::Span, interior, interior)];
                block
            }
            MarkdownMode::Block | MarkdownMode::Deep => {
                let inner_mode = if mode == MarkdownMode::Deep {
                    MarkdownMode::Deep
                } else {
                    MarkdownMode::Off
                };
                let text = interior.slice(buf).to_string();
                let child_buf: Rc<str> = Rc::from(text.as_str());
                let children = if self.depth + 1 >= MAX_DEPTH {
                    let full = Span::new(0, child_buf.len());
                    log::warn!("html nesting limit reached; treating interior as literal text");
                    vec![Block::new(&child_buf, BlockKind::Paragraph, full, full)]
                } else {
                    self.child(ParentKind::Document, inner_mode).parse(&child_buf)
                };
                let mut block = Block::new(buf, BlockKind::HtmlTag(tag), region, region);
                block.children = children;
                block
            }
        };
        Some((block, saw_unsafe))
    }

    /// `<head>` interiors accumulate into the side buffer instead of the
    /// block tree.
    fn extract_head(
        &mut self,
        buf: &Rc<str>,
        cursor: &mut Cursor,
        saved: usize,
        tag: &HtmlTag,
    ) -> Option<Block> {
        let content_start = cursor.position();
        loop {
            if !cursor.find_char(b'<') {
                cursor.set_position(saved);
                return None;
            }
            let tag_start = cursor.position();
            match parse_tag(cursor) {
                Some(nested) if nested.closing && nested.name.eq_ignore_ascii_case(&tag.name) => {
                    let interior = &buf[content_start..tag_start];
                    self.state.head_block.push_str(interior.trim());
                    self.state.head_block.push('\n');
                    cursor.skip_linespace();
                    cursor.skip_eol();
                    let span = Span::empty(saved);
                    return Some(Block::new(buf, BlockKind::Blank, span, span));
                }
                Some(_) => {}
                None => cursor.set_position(tag_start + 1),
            }
        }
    }
}

// === Definition-list post-pass ===

/// Merges adjacent term/description blocks into `dl` containers: the
/// paragraph sibling preceding a description run is retyped into terms,
/// one per line.
fn build_definition_lists(buf: &Rc<str>, blocks: Vec<Block>) -> Vec<Block> {
    let mut out: Vec<Block> = Vec::new();
    let mut iter = blocks.into_iter().peekable();

    while let Some(block) = iter.next() {
        if !matches!(block.kind, BlockKind::DefinitionDescription) {
            out.push(block);
            continue;
        }
        let mut children: Vec<Block> = Vec::new();
        if out
            .last()
            .is_some_and(|last| matches!(last.kind, BlockKind::Paragraph))
        {
            let term = match out.pop() {
                Some(term) => term,
                None => continue,
            };
            children.extend(split_terms(buf, term));
        }
        children.push(block);
        loop {
            match iter.peek().map(|next| &next.kind) {
                Some(BlockKind::DefinitionDescription) => {
                    if let Some(next) = iter.next() {
                        children.push(next);
                    }
                }
                Some(BlockKind::Paragraph) => {
                    // A paragraph continues the list only when a further
                    // description follows it.
                    let para = match iter.next() {
                        Some(para) => para,
                        None => break,
                    };
                    if matches!(
                        iter.peek().map(|next| &next.kind),
                        Some(BlockKind::DefinitionDescription)
                    ) {
                        children.extend(split_terms(buf, para));
                    } else {
                        let dl = Block::container(buf, BlockKind::DefinitionList, children);
                        out.push(dl);
                        out.push(para);
                        children = Vec::new();
                        break;
                    }
                }
                _ => break,
            }
        }
        if !children.is_empty() {
            out.push(Block::container(buf, BlockKind::DefinitionList, children));
        }
    }
    out
}

/// One paragraph of term lines becomes one `dt` per line.
fn split_terms(buf: &Rc<str>, term: Block) -> Vec<Block> {
    let mut terms = Vec::new();
    let mut start = term.span.start;
    let text = term.content();
    for (offset, _) in text.match_indices('\n') {
        let end = term.span.start + offset;
        terms.push(Block::new(
            buf,
            BlockKind::DefinitionTerm,
            Span::new(start, end),
            term.line,
        ));
        start = end + 1;
    }
    terms.push(Block::new(
        buf,
        BlockKind::DefinitionTerm,
        Span::new(start, term.span.end),
        term.line,
    ));
    terms
}

// === Line-shape helpers ===

fn leading_columns(text: &str) -> usize {
    let mut columns = 0;
    for b in text.bytes() {
        match b {
            b' ' => columns += 1,
            b'\t' => columns += 4 - (columns % 4),
            _ => break,
        }
    }
    columns
}

/// Byte offset after removing one level (4 columns) of indentation.
fn strip_indent_offset(text: &str) -> usize {
    let mut columns = 0;
    for (idx, b) in text.bytes().enumerate() {
        match b {
            b' ' => columns += 1,
            b'\t' => columns += 4 - (columns % 4),
            _ => return idx,
        }
        if columns >= 4 {
            return idx + 1;
        }
    }
    text.len()
}

fn setext_underline(text: &str) -> Option<(u8, usize)> {
    let trimmed = text.trim_end();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.bytes().all(|b| b == b'=') {
        return Some((1, trimmed.len()));
    }
    if trimmed.bytes().all(|b| b == b'-') {
        return Some((2, trimmed.len()));
    }
    None
}

/// 3+ of `-`, `_` or `*`, optionally space-separated, and nothing else.
fn is_thematic_break(text: &str) -> bool {
    let trimmed = text.trim_end();
    let mut delim = 0u8;
    let mut count = 0usize;
    for b in trimmed.bytes() {
        match b {
            b' ' | b'\t' => {}
            b'-' | b'_' | b'*' => {
                if delim == 0 {
                    delim = b;
                } else if b != delim {
                    return false;
                }
                count += 1;
            }
            _ => return false,
        }
    }
    count >= 3
}

fn unordered_marker(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    if bytes.len() >= 2
        && matches!(bytes[0], b'*' | b'+' | b'-')
        && matches!(bytes[1], b' ' | b'\t')
    {
        let mut offset = 2;
        while offset < bytes.len() && matches!(bytes[offset], b' ' | b'\t') {
            offset += 1;
        }
        Some(offset)
    } else {
        None
    }
}

fn ordered_marker(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let digits = bytes.iter().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 || digits + 1 >= bytes.len() {
        return None;
    }
    if bytes[digits] != b'.' || !matches!(bytes[digits + 1], b' ' | b'\t') {
        return None;
    }
    let mut offset = digits + 2;
    while offset < bytes.len() && matches!(bytes[offset], b' ' | b'\t') {
        offset += 1;
    }
    Some(offset)
}

fn definition_marker(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    if bytes.len() >= 2 && bytes[0] == b':' && matches!(bytes[1], b' ' | b'\t') {
        let mut offset = 2;
        while offset < bytes.len() && matches!(bytes[offset], b' ' | b'\t') {
            offset += 1;
        }
        Some(offset)
    } else {
        None
    }
}

/// `*[abbr]: title`
fn parse_abbreviation_definition(text: &str) -> Option<Abbreviation> {
    let rest = text.strip_prefix("*[")?;
    let close = rest.find(']')?;
    let abbr = rest[..close].trim();
    let after = rest[close + 1..].strip_prefix(':')?;
    if abbr.is_empty() {
        return None;
    }
    Some(Abbreviation {
        abbr: abbr.to_string(),
        title: after.trim().to_string(),
    })
}

/// `[^id]:` — returns the id and the content offset on the first line.
fn parse_footnote_marker(text: &str) -> Option<(String, usize)> {
    let rest = text.strip_prefix("[^")?;
    let close = rest.find(']')?;
    let id = &rest[..close];
    if id.is_empty() || !rest[close + 1..].starts_with(':') {
        return None;
    }
    let mut offset = 2 + close + 2;
    let bytes = text.as_bytes();
    while offset < bytes.len() && matches!(bytes[offset], b' ' | b'\t') {
        offset += 1;
    }
    Some((id.to_string(), offset))
}

/// `[id]: url "optional title"`
fn parse_link_definition(text: &str) -> Option<LinkDefinition> {
    let rest = text.strip_prefix('[')?;
    let close = rest.find(']')?;
    let id = rest[..close].trim();
    if id.is_empty() || id.starts_with('^') {
        return None;
    }
    let mut after = rest[close + 1..].strip_prefix(':')?.trim_start();

    let url;
    if let Some(stripped) = after.strip_prefix('<') {
        let end = stripped.find('>')?;
        url = &stripped[..end];
        after = &stripped[end + 1..];
    } else {
        let end = after
            .find(|ch: char| ch.is_ascii_whitespace())
            .unwrap_or(after.len());
        url = &after[..end];
        after = &after[end..];
    }
    if url.is_empty() {
        return None;
    }

    let after = after.trim();
    let title = if after.is_empty() {
        None
    } else {
        let bytes = after.as_bytes();
        let (open, shut) = match bytes[0] {
            b'"' => (b'"', b'"'),
            b'\'' => (b'\'', b'\''),
            b'(' => (b'(', b')'),
            _ => return None,
        };
        let _ = open;
        if bytes[bytes.len() - 1] != shut || after.len() < 2 {
            return None;
        }
        Some(crate::inline::unescape_punct(&after[1..after.len() - 1]))
    };

    Some(LinkDefinition {
        id: id.to_string(),
        url: crate::inline::unescape_punct(url),
        title,
    })
}

// === Table grammar ===

/// Delimiter row: `[|] ( [:] -+ [:] [|] )+`, linespace ignored.
fn parse_table_spec(text: &str) -> Option<TableSpec> {
    let bytes = text.trim_end().as_bytes();
    let mut i = 0usize;
    let skip_ws = |bytes: &[u8], mut i: usize| {
        while i < bytes.len() && matches!(bytes[i], b' ' | b'\t') {
            i += 1;
        }
        i
    };

    i = skip_ws(bytes, i);
    let leading_bar = i < bytes.len() && bytes[i] == b'|';
    if leading_bar {
        i += 1;
    }

    let mut columns = Vec::new();
    let mut trailing_bar = false;
    loop {
        i = skip_ws(bytes, i);
        if i >= bytes.len() {
            break;
        }
        let left = bytes[i] == b':';
        if left {
            i += 1;
        }
        let dash_start = i;
        while i < bytes.len() && bytes[i] == b'-' {
            i += 1;
        }
        if i == dash_start {
            return None;
        }
        let right = i < bytes.len() && bytes[i] == b':';
        if right {
            i += 1;
        }
        columns.push(match (left, right) {
            (false, false) => ColumnAlignment::None,
            (true, false) => ColumnAlignment::Left,
            (false, true) => ColumnAlignment::Right,
            (true, true) => ColumnAlignment::Center,
        });
        i = skip_ws(bytes, i);
        trailing_bar = false;
        if i < bytes.len() && bytes[i] == b'|' {
            trailing_bar = true;
            i += 1;
        }
    }

    if columns.is_empty() {
        return None;
    }
    Some(TableSpec::new(leading_bar, trailing_bar, columns))
}

/// A row line: cells split on unescaped `|`, trimmed. Lines without a pipe
/// end the table.
fn parse_table_row(text: &str) -> Option<Vec<String>> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    let mut has_pipe = false;
    let mut cells = Vec::new();
    let mut cell = String::new();
    let mut chars = trimmed.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' if chars.peek() == Some(&'|') => {
                chars.next();
                cell.push('|');
            }
            '|' => {
                has_pipe = true;
                cells.push(std::mem::take(&mut cell));
            }
            _ => cell.push(ch),
        }
    }
    cells.push(cell);
    if !has_pipe {
        return None;
    }
    if cells.first().is_some_and(|first| first.trim().is_empty()) {
        cells.remove(0);
    }
    if cells.last().is_some_and(|last| last.trim().is_empty()) {
        cells.pop();
    }
    Some(cells.into_iter().map(|cell| cell.trim().to_string()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thematic_break_shapes() {
        assert!(is_thematic_break("***"));
        assert!(is_thematic_break("* * *"));
        assert!(is_thematic_break("___"));
        assert!(!is_thematic_break("**"));
        assert!(!is_thematic_break("*-*"));
    }

    #[test]
    fn table_spec_alignments() {
        let spec = parse_table_spec("| :--- | ---: | :-: | --- |").unwrap();
        assert!(spec.leading_bar && spec.trailing_bar);
        assert_eq!(
            spec.columns,
            vec![
                ColumnAlignment::Left,
                ColumnAlignment::Right,
                ColumnAlignment::Center,
                ColumnAlignment::None
            ]
        );
        assert!(parse_table_spec("| pipes only |").is_none());
    }

    #[test]
    fn table_rows_split_on_unescaped_pipes() {
        assert_eq!(
            parse_table_row("| a | b \\| c |").unwrap(),
            vec!["a".to_string(), "b | c".to_string()]
        );
        assert!(parse_table_row("no pipes here").is_none());
    }

    #[test]
    fn link_definition_forms() {
        let def = parse_link_definition("[id]: http://example.com \"Title\"").unwrap();
        assert_eq!(def.id, "id");
        assert_eq!(def.url, "http://example.com");
        assert_eq!(def.title.as_deref(), Some("Title"));
        let def = parse_link_definition("[id]: <http://example.com/x>").unwrap();
        assert_eq!(def.url, "http://example.com/x");
        assert!(parse_link_definition("[^fn]: not a link def").is_none());
    }

    #[test]
    fn list_marker_offsets() {
        assert_eq!(unordered_marker("* item"), Some(2));
        assert_eq!(unordered_marker("*item"), None);
        assert_eq!(ordered_marker("12. item"), Some(4));
        assert_eq!(ordered_marker("12) item"), None);
    }

    #[test]
    fn indentation_columns() {
        assert_eq!(leading_columns("    x"), 4);
        assert_eq!(leading_columns("\tx"), 4);
        assert_eq!(leading_columns("  \tx"), 4);
        assert_eq!(strip_indent_offset("\tcode"), 1);
        assert_eq!(strip_indent_offset("    code"), 4);
    }

    #[test]
    fn abbreviation_definitions() {
        let abbr = parse_abbreviation_definition("*[HTML]: Hyper Text Markup Language").unwrap();
        assert_eq!(abbr.abbr, "HTML");
        assert_eq!(abbr.title, "Hyper Text Markup Language");
        assert!(parse_abbreviation_definition("*[]: empty").is_none());
    }
}
