use crate::ast::Abbreviation;
use crate::cursor::Cursor;
use crate::emit::{escape_attr, escape_html_smart, escape_html_strict, qualify_url, url_is_external};
use crate::entities::scan_entity;
use crate::html::parse_tag;
use crate::options::Options;
use crate::span::Span;
use crate::{DocState, ImageSizeResolver, MAX_DEPTH};

/// Unit of inline content. Either the span window into the source carries
/// the token's text, or the kind carries a payload.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Token {
    pub span: Span,
    pub kind: TokenKind,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum TokenKind {
    Text,
    /// Inline HTML tag kept verbatim.
    InlineHtml,
    /// `&name;` / `&#n;` passed through by the smart encoder.
    Entity,
    /// Code span; the payload is the trimmed interior window.
    CodeSpan(Span),
    LineBreak,
    EmOpen,
    EmClose,
    StrongOpen,
    StrongClose,
    /// Unresolved emphasis mark runs; retyped and split in place by the
    /// resolver. Whatever stays unresolved renders as literal text.
    MarkOpen,
    MarkClose,
    MarkInternal,
    Link(LinkInfo),
    Image(LinkInfo),
    FootnoteRef { index: usize, id: String },
    AbbrRef(Abbreviation),
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct LinkInfo {
    pub url: String,
    pub title: Option<String>,
    /// Window of the link text / image alt text.
    pub text: Span,
}

/// Worklist entry for emphasis resolution; indices follow the token stream
/// as marks are split and removed.
#[derive(Clone, Debug)]
struct Mark {
    token_index: usize,
    ch: u8,
    len: usize,
    can_open: bool,
    can_close: bool,
}

/// Tokenizes the text inside one block and renders the token stream.
///
/// One formatter is built per block; the document-scoped lookups (link
/// definitions, footnotes, abbreviations) live in the shared state.
pub(crate) struct SpanFormatter<'a> {
    pub opts: &'a Options,
    pub state: &'a mut DocState,
    pub images: Option<&'a dyn ImageSizeResolver>,
    disable_links: bool,
    depth: usize,
}

impl<'a> SpanFormatter<'a> {
    pub fn new(
        opts: &'a Options,
        state: &'a mut DocState,
        images: Option<&'a dyn ImageSizeResolver>,
    ) -> Self {
        Self {
            opts,
            state,
            images,
            disable_links: false,
            depth: 0,
        }
    }

    /// Full pipeline: tokenize, resolve emphasis, locate abbreviations,
    /// render into `out`.
    pub fn format(&mut self, buf: &str, span: Span, out: &mut String) {
        if self.depth >= MAX_DEPTH {
            log::warn!("inline nesting limit reached; rendering literally");
            escape_html_smart(span.slice(buf), out);
            return;
        }
        let (mut tokens, mut marks) = self.tokenize(buf, span);
        resolve_emphasis(&mut tokens, &mut marks);
        if self.opts.extra_mode && !self.state.abbreviations.is_empty() {
            tokens = self.apply_abbreviations(buf, tokens);
        }
        self.render_tokens(buf, &tokens, out);
    }

    /// Plain-text rendering for summaries and image alt text.
    pub fn format_plain(&mut self, buf: &str, span: Span, out: &mut String) {
        if self.depth >= MAX_DEPTH {
            out.push_str(span.slice(buf));
            return;
        }
        let (mut tokens, mut marks) = self.tokenize(buf, span);
        resolve_emphasis(&mut tokens, &mut marks);
        for token in &tokens {
            match &token.kind {
                TokenKind::Text
                | TokenKind::Entity
                | TokenKind::MarkOpen
                | TokenKind::MarkClose
                | TokenKind::MarkInternal => out.push_str(token.span.slice(buf)),
                TokenKind::CodeSpan(content) => out.push_str(content.slice(buf)),
                TokenKind::LineBreak => out.push(' '),
                TokenKind::Link(info) | TokenKind::Image(info) => {
                    self.depth += 1;
                    self.format_plain(buf, info.text, out);
                    self.depth -= 1;
                }
                TokenKind::AbbrRef(abbr) => out.push_str(&abbr.abbr),
                TokenKind::FootnoteRef { .. } | TokenKind::InlineHtml => {}
                TokenKind::EmOpen
                | TokenKind::EmClose
                | TokenKind::StrongOpen
                | TokenKind::StrongClose => {}
            }
        }
    }

    // === Tokenization ===

    fn tokenize(&mut self, buf: &str, span: Span) -> (Vec<Token>, Vec<Mark>) {
        let bytes = buf.as_bytes();
        let (start, end) = (span.start, span.end.min(buf.len()));
        let mut tokens: Vec<Token> = Vec::new();
        let mut marks: Vec<Mark> = Vec::new();
        let mut text_start = start;
        let mut i = start;

        macro_rules! flush_text {
            ($upto:expr) => {
                if text_start < $upto {
                    tokens.push(Token {
                        span: Span::new(text_start, $upto),
                        kind: TokenKind::Text,
                    });
                }
            };
        }

        while i < end {
            match bytes[i] {
                b'*' | b'_' => {
                    let ch = bytes[i];
                    let run = count_run(bytes, i, end, ch);
                    let ws_before = i == start || is_linespace_or_break(bytes[i - 1]);
                    let after = i + run;
                    let ws_after = after >= end || is_linespace_or_break(bytes[after]);
                    let kind = if ws_before && ws_after {
                        // A run entirely bounded by whitespace is plain text.
                        None
                    } else if ws_before {
                        Some(TokenKind::MarkOpen)
                    } else if ws_after {
                        Some(TokenKind::MarkClose)
                    } else if self.opts.extra_mode
                        && ch == b'_'
                        && after < end
                        && bytes[after].is_ascii_alphanumeric()
                    {
                        // Intra-word underscore is not emphasis in extra mode.
                        None
                    } else {
                        Some(TokenKind::MarkInternal)
                    };
                    match kind {
                        Some(kind) => {
                            flush_text!(i);
                            let (can_open, can_close) = match kind {
                                TokenKind::MarkOpen => (true, false),
                                TokenKind::MarkClose => (false, true),
                                _ => (true, true),
                            };
                            tokens.push(Token {
                                span: Span::new(i, after),
                                kind,
                            });
                            marks.push(Mark {
                                token_index: tokens.len() - 1,
                                ch,
                                len: run,
                                can_open,
                                can_close,
                            });
                            i = after;
                            text_start = i;
                        }
                        None => i = after,
                    }
                }
                b'`' => {
                    if let Some((token, next)) = scan_code_span(buf, i, end) {
                        flush_text!(i);
                        tokens.push(token);
                        i = next;
                        text_start = i;
                    } else {
                        i += count_run(bytes, i, end, b'`');
                    }
                }
                b'[' | b'!' => {
                    if bytes[i] == b'!' && !(i + 1 < end && bytes[i + 1] == b'[') {
                        i += 1;
                        continue;
                    }
                    match self.try_link_or_footnote(buf, i, end) {
                        Some((token, next)) => {
                            flush_text!(i);
                            tokens.push(token);
                            i = next;
                            text_start = i;
                        }
                        None => i += 1,
                    }
                }
                b'<' => {
                    if let Some((token, next)) = self.try_autolink(buf, i, end) {
                        flush_text!(i);
                        tokens.push(token);
                        i = next;
                        text_start = i;
                        continue;
                    }
                    let mut cursor = Cursor::window(buf, i, end);
                    match parse_tag(&mut cursor) {
                        Some(tag) if !self.opts.safe_mode || tag.is_safe() => {
                            flush_text!(i);
                            tokens.push(Token {
                                span: Span::new(i, cursor.position()),
                                kind: TokenKind::InlineHtml,
                            });
                            i = cursor.position();
                            text_start = i;
                        }
                        // Unsafe or unparsable: the `<` stays literal text.
                        _ => i += 1,
                    }
                }
                b'&' => match scan_entity(bytes, i, end) {
                    Some(len) => {
                        flush_text!(i);
                        tokens.push(Token {
                            span: Span::new(i, i + len),
                            kind: TokenKind::Entity,
                        });
                        i += len;
                        text_start = i;
                    }
                    None => i += 1,
                },
                b'\n' => {
                    let mut spaces = 0;
                    while i - spaces > text_start && bytes[i - spaces - 1] == b' ' {
                        spaces += 1;
                    }
                    if spaces >= 2 {
                        flush_text!(i - spaces);
                        tokens.push(Token {
                            span: Span::new(i - spaces, i + 1),
                            kind: TokenKind::LineBreak,
                        });
                        i += 1;
                        text_start = i;
                    } else {
                        i += 1;
                    }
                }
                b'\\' => {
                    if i + 1 < end && is_escapable(bytes[i + 1], self.opts.extra_mode) {
                        flush_text!(i);
                        tokens.push(Token {
                            span: Span::new(i + 1, i + 2),
                            kind: TokenKind::Text,
                        });
                        i += 2;
                        text_start = i;
                    } else {
                        i += 1;
                    }
                }
                _ => i += 1,
            }
        }
        flush_text!(end);
        (tokens, marks)
    }

    fn try_autolink(&mut self, buf: &str, start: usize, end: usize) -> Option<(Token, usize)> {
        let bytes = buf.as_bytes();
        let mut i = start + 1;
        while i < end {
            let b = bytes[i];
            if b == b'>' {
                break;
            }
            if b.is_ascii_whitespace() || b == b'<' {
                return None;
            }
            i += 1;
        }
        if i >= end || bytes[i] != b'>' {
            return None;
        }
        let inner = &buf[start + 1..i];
        let text = Span::new(start + 1, i);
        let url = if has_url_scheme(inner) {
            inner.to_string()
        } else if looks_like_email(inner) {
            format!("mailto:{}", inner)
        } else {
            return None;
        };
        let info = LinkInfo {
            url,
            title: None,
            text,
        };
        Some((
            Token {
                span: Span::new(start, i + 1),
                kind: TokenKind::Link(info),
            },
            i + 1,
        ))
    }

    /// `[text](url)`, `[text][id]`, `[text]`, `![alt](...)` and `[^id]`.
    /// Failure leaves no trace; the caller falls back to literal text.
    fn try_link_or_footnote(&mut self, buf: &str, start: usize, end: usize) -> Option<(Token, usize)> {
        let bytes = buf.as_bytes();
        let image = bytes[start] == b'!';
        let open = if image { start + 1 } else { start };

        if !image && self.opts.extra_mode && open + 1 < end && bytes[open + 1] == b'^' {
            if let Some(close) = find_bracket_close(bytes, open + 1, end) {
                let id = buf[open + 2..close].to_string();
                if !id.is_empty()
                    && let Some(index) = self.state.claim_footnote(&id)
                {
                    return Some((
                        Token {
                            span: Span::new(start, close + 1),
                            kind: TokenKind::FootnoteRef { index, id },
                        },
                        close + 1,
                    ));
                }
            }
            return None;
        }

        if !image && self.disable_links {
            return None;
        }

        let close = find_bracket_close(bytes, open, end)?;
        let text = Span::new(open + 1, close);
        let mut i = close + 1;

        if i < end && bytes[i] == b'(' {
            let (url, title, next) = parse_inline_target(buf, i, end)?;
            let info = LinkInfo { url, title, text };
            let kind = if image {
                TokenKind::Image(info)
            } else {
                TokenKind::Link(info)
            };
            return Some((
                Token {
                    span: Span::new(start, next),
                    kind,
                },
                next,
            ));
        }

        // Reference style: an explicit (possibly empty) id, or the link
        // text itself as a shortcut id.
        let id_text;
        if i < end && bytes[i] == b'[' {
            let id_close = find_bracket_close(bytes, i, end)?;
            id_text = if id_close == i + 1 {
                text.slice(buf).to_string()
            } else {
                buf[i + 1..id_close].to_string()
            };
            i = id_close + 1;
        } else {
            id_text = text.slice(buf).to_string();
        }
        let def = self.state.link_defs.get(&id_text.trim().to_lowercase())?;
        let info = LinkInfo {
            url: def.url.clone(),
            title: def.title.clone(),
            text,
        };
        let kind = if image {
            TokenKind::Image(info)
        } else {
            TokenKind::Link(info)
        };
        Some((
            Token {
                span: Span::new(start, i),
                kind,
            },
            i,
        ))
    }

    // === Abbreviations ===

    /// Substring search for registered abbreviations inside text tokens,
    /// accepted only at non-alphanumeric boundaries. The abbreviation list
    /// is length-sorted so longer matches win.
    fn apply_abbreviations(&self, buf: &str, tokens: Vec<Token>) -> Vec<Token> {
        let bytes = buf.as_bytes();
        let mut out = Vec::with_capacity(tokens.len());
        for token in tokens {
            if !matches!(token.kind, TokenKind::Text) {
                out.push(token);
                continue;
            }
            let mut start = token.span.start;
            let mut pos = start;
            while pos < token.span.end {
                let mut matched = None;
                for abbr in &self.state.abbreviations {
                    let len = abbr.abbr.len();
                    if pos + len > token.span.end || &buf[pos..pos + len] != abbr.abbr.as_str() {
                        continue;
                    }
                    let before_ok = pos == 0 || !bytes[pos - 1].is_ascii_alphanumeric();
                    let after_ok =
                        pos + len >= buf.len() || !bytes[pos + len].is_ascii_alphanumeric();
                    if before_ok && after_ok {
                        matched = Some(abbr.clone());
                        break;
                    }
                }
                match matched {
                    Some(abbr) => {
                        let len = abbr.abbr.len();
                        if start < pos {
                            out.push(Token {
                                span: Span::new(start, pos),
                                kind: TokenKind::Text,
                            });
                        }
                        out.push(Token {
                            span: Span::new(pos, pos + len),
                            kind: TokenKind::AbbrRef(abbr),
                        });
                        pos += len;
                        start = pos;
                    }
                    None => pos += 1,
                }
            }
            if start < token.span.end {
                out.push(Token {
                    span: Span::new(start, token.span.end),
                    kind: TokenKind::Text,
                });
            }
        }
        out
    }

    // === Rendering ===

    fn render_tokens(&mut self, buf: &str, tokens: &[Token], out: &mut String) {
        for token in tokens {
            match &token.kind {
                TokenKind::Text => escape_html_smart(token.span.slice(buf), out),
                TokenKind::Entity | TokenKind::InlineHtml => out.push_str(token.span.slice(buf)),
                TokenKind::CodeSpan(content) => {
                    out.push_str("<code>");
                    escape_html_strict(content.slice(buf), out);
                    out.push_str("</code>");
                }
                TokenKind::LineBreak => out.push_str("<br />\n"),
                TokenKind::EmOpen => out.push_str("<em>"),
                TokenKind::EmClose => out.push_str("</em>"),
                TokenKind::StrongOpen => out.push_str("<strong>"),
                TokenKind::StrongClose => out.push_str("</strong>"),
                TokenKind::MarkOpen | TokenKind::MarkClose | TokenKind::MarkInternal => {
                    escape_html_smart(token.span.slice(buf), out)
                }
                TokenKind::Link(info) => self.render_link(buf, info, out),
                TokenKind::Image(info) => self.render_image(buf, info, out),
                TokenKind::FootnoteRef { index, id } => {
                    out.push_str("<sup id=\"fnref:");
                    escape_attr(id, out);
                    out.push_str("\"><a href=\"#fn:");
                    escape_attr(id, out);
                    out.push_str("\" rel=\"footnote\">");
                    out.push_str(&(index + 1).to_string());
                    out.push_str("</a></sup>");
                }
                TokenKind::AbbrRef(abbr) => {
                    out.push_str("<abbr title=\"");
                    escape_attr(&abbr.title, out);
                    out.push_str("\">");
                    escape_html_smart(&abbr.abbr, out);
                    out.push_str("</abbr>");
                }
            }
        }
    }

    fn render_link(&mut self, buf: &str, info: &LinkInfo, out: &mut String) {
        if is_mailto(&info.url) {
            // Obfuscated email rendering: every character becomes a decimal
            // entity, for the href and the visible address alike.
            out.push_str("<a href=\"");
            obfuscate(&info.url, out);
            out.push_str("\">");
            obfuscate(&info.url[7..], out);
            out.push_str("</a>");
            return;
        }
        let url = qualify_url(self.opts, &info.url);
        let external = url_is_external(&url);
        out.push_str("<a href=\"");
        escape_attr(&url, out);
        out.push('"');
        if let Some(title) = &info.title {
            out.push_str(" title=\"");
            escape_attr(title, out);
            out.push('"');
        }
        if self.opts.no_follow_links || (self.opts.no_follow_external_links && external) {
            out.push_str(" rel=\"nofollow\"");
        }
        if (self.opts.new_window_for_external_links && external)
            || (self.opts.new_window_for_local_links && !external)
        {
            out.push_str(" target=\"_blank\"");
        }
        out.push('>');
        let was_disabled = self.disable_links;
        self.disable_links = true;
        self.depth += 1;
        self.format(buf, info.text, out);
        self.depth -= 1;
        self.disable_links = was_disabled;
        out.push_str("</a>");
    }

    fn render_image(&mut self, buf: &str, info: &LinkInfo, out: &mut String) {
        let url = qualify_url(self.opts, &info.url);
        let titled_figure =
            self.opts.extra_mode && info.title.is_some() && !self.opts.html_class_titled_images.is_empty();
        if titled_figure {
            out.push_str("<div class=\"");
            escape_attr(&self.opts.html_class_titled_images, out);
            out.push_str("\">\n");
        }
        out.push_str("<img src=\"");
        escape_attr(&url, out);
        out.push_str("\" alt=\"");
        let mut alt = String::new();
        self.depth += 1;
        self.format_plain(buf, info.text, &mut alt);
        self.depth -= 1;
        escape_attr(&alt, out);
        out.push('"');
        if let Some((width, height)) = self.resolve_image_size(&url) {
            out.push_str(&format!(" width=\"{}\" height=\"{}\"", width, height));
        }
        if let Some(title) = &info.title {
            out.push_str(" title=\"");
            escape_attr(title, out);
            out.push('"');
        }
        out.push_str(" />");
        if titled_figure {
            out.push_str("\n<p>");
            if let Some(title) = &info.title {
                escape_html_smart(title, out);
            }
            out.push_str("</p>\n</div>");
        }
    }

    fn resolve_image_size(&self, url: &str) -> Option<(u32, u32)> {
        let (width, height) = self.images?.image_size(url, self.opts)?;
        let max = self.opts.max_image_width;
        if max > 0 && width > max {
            let scaled = (height as u64 * max as u64 / width as u64) as u32;
            Some((max, scaled))
        } else {
            Some((width, height))
        }
    }
}

fn is_mailto(url: &str) -> bool {
    url.len() >= 7 && url[..7].eq_ignore_ascii_case("mailto:")
}

fn obfuscate(text: &str, out: &mut String) {
    for ch in text.chars() {
        out.push_str(&format!("&#{};", ch as u32));
    }
}

// === Emphasis resolution (fixed-point pairing) ===

/// Pairs emphasis marks until no opener/closer pair remains. Driven from
/// the earliest still-active closer, matched against the nearest preceding
/// opener of the same character; matched marks are retyped in place and
/// longer runs split, keeping the matched-width portion adjacent to the
/// emphasized content.
fn resolve_emphasis(tokens: &mut Vec<Token>, marks: &mut Vec<Mark>) {
    loop {
        let closer_pos = marks.iter().position(|mark| mark.can_close);
        let ci = match closer_pos {
            Some(ci) => ci,
            None => break,
        };
        let closer_ch = marks[ci].ch;
        let opener_pos = marks[..ci]
            .iter()
            .rposition(|mark| mark.can_open && mark.ch == closer_ch);
        let oi = match opener_pos {
            Some(oi) => oi,
            None => {
                marks[ci].can_close = false;
                continue;
            }
        };

        let mut style = marks[oi].len.min(marks[ci].len);
        if style >= 3 {
            style = if style % 2 == 1 { 1 } else { 2 };
        }

        // Split the opener: the remainder stays outside (before) the
        // matched portion.
        if marks[oi].len > style {
            let remainder = marks[oi].len - style;
            let ti = marks[oi].token_index;
            let token = tokens[ti].clone();
            let split_at = token.span.start + remainder;
            tokens[ti].span = Span::new(token.span.start, split_at);
            tokens.insert(
                ti + 1,
                Token {
                    span: Span::new(split_at, token.span.end),
                    kind: token.kind,
                },
            );
            shift_token_indices(marks, ti);
            let mut kept = marks[oi].clone();
            kept.len = remainder;
            let matched = Mark {
                token_index: ti + 1,
                len: style,
                ..marks[oi].clone()
            };
            marks[oi] = kept;
            marks.insert(oi + 1, matched);
            continue;
        }
        if marks[ci].len > style {
            // Split the closer: the matched portion stays adjacent to the
            // content, the remainder outside (after).
            let remainder = marks[ci].len - style;
            let ti = marks[ci].token_index;
            let token = tokens[ti].clone();
            let split_at = token.span.start + style;
            tokens[ti].span = Span::new(token.span.start, split_at);
            tokens.insert(
                ti + 1,
                Token {
                    span: Span::new(split_at, token.span.end),
                    kind: token.kind,
                },
            );
            shift_token_indices(marks, ti);
            let mut kept = marks[ci].clone();
            kept.len = style;
            let rest = Mark {
                token_index: ti + 1,
                len: remainder,
                ..marks[ci].clone()
            };
            marks[ci] = kept;
            marks.insert(ci + 1, rest);
            continue;
        }

        let (open_kind, close_kind) = if style == 2 {
            (TokenKind::StrongOpen, TokenKind::StrongClose)
        } else {
            (TokenKind::EmOpen, TokenKind::EmClose)
        };
        tokens[marks[oi].token_index].kind = open_kind;
        tokens[marks[ci].token_index].kind = close_kind;
        marks.remove(ci);
        marks.remove(oi);
    }
}

fn shift_token_indices(marks: &mut [Mark], inserted_after: usize) {
    for mark in marks.iter_mut() {
        if mark.token_index > inserted_after {
            mark.token_index += 1;
        }
    }
}

// === Scanning helpers ===

fn count_run(bytes: &[u8], start: usize, end: usize, ch: u8) -> usize {
    let mut i = start;
    while i < end && bytes[i] == ch {
        i += 1;
    }
    i - start
}

fn is_linespace_or_break(b: u8) -> bool {
    b == b' ' || b == b'\t' || b == b'\n' || b == b'\r'
}

fn is_escapable(b: u8, extra: bool) -> bool {
    match b {
        b'\\' | b'`' | b'*' | b'_' | b'{' | b'}' | b'[' | b']' | b'(' | b')' | b'#' | b'+'
        | b'-' | b'.' | b'!' | b'>' => true,
        b'~' | b'|' | b':' | b'^' => extra,
        _ => false,
    }
}

fn scan_code_span(buf: &str, start: usize, end: usize) -> Option<(Token, usize)> {
    let bytes = buf.as_bytes();
    let run = count_run(bytes, start, end, b'`');
    let mut i = start + run;
    while i < end {
        if bytes[i] == b'`' {
            let close = count_run(bytes, i, end, b'`');
            if close == run {
                let mut content_start = start + run;
                if content_start < i && bytes[content_start] == b' ' {
                    content_start += 1;
                }
                let mut content_end = i;
                while content_end > content_start && bytes[content_end - 1].is_ascii_whitespace() {
                    content_end -= 1;
                }
                return Some((
                    Token {
                        span: Span::new(start, i + close),
                        kind: TokenKind::CodeSpan(Span::new(content_start, content_end)),
                    },
                    i + close,
                ));
            }
            i += close;
        } else {
            i += 1;
        }
    }
    None
}

/// Matching `]` for the bracket at `open`, honoring escapes and nesting.
fn find_bracket_close(bytes: &[u8], open: usize, end: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut i = open + 1;
    while i < end {
        match bytes[i] {
            b'\\' if i + 1 < end => i += 1,
            b'[' => depth += 1,
            b']' => {
                if depth == 0 {
                    return Some(i);
                }
                depth -= 1;
            }
            b'\n' if i + 1 < end && bytes[i + 1] == b'\n' => return None,
            _ => {}
        }
        i += 1;
    }
    None
}

/// `(url "title")` after a link's closing bracket. Returns the qualified
/// pieces and the position after the closing parenthesis.
fn parse_inline_target(buf: &str, open: usize, end: usize) -> Option<(String, Option<String>, usize)> {
    let bytes = buf.as_bytes();
    let mut i = open + 1;
    while i < end && (bytes[i] == b' ' || bytes[i] == b'\t') {
        i += 1;
    }

    let url_start;
    let url_end;
    if i < end && bytes[i] == b'<' {
        url_start = i + 1;
        let mut j = url_start;
        while j < end && bytes[j] != b'>' && bytes[j] != b'\n' {
            j += 1;
        }
        if j >= end || bytes[j] != b'>' {
            return None;
        }
        url_end = j;
        i = j + 1;
    } else {
        url_start = i;
        let mut depth = 0usize;
        while i < end {
            match bytes[i] {
                b'\\' if i + 1 < end => i += 1,
                b'(' => depth += 1,
                b')' => {
                    if depth == 0 {
                        break;
                    }
                    depth -= 1;
                }
                b' ' | b'\t' | b'\n' => break,
                _ => {}
            }
            i += 1;
        }
        url_end = i;
    }

    while i < end && (bytes[i] == b' ' || bytes[i] == b'\t' || bytes[i] == b'\n') {
        i += 1;
    }

    let mut title = None;
    if i < end && (bytes[i] == b'"' || bytes[i] == b'\'') {
        let quote = bytes[i];
        let title_start = i + 1;
        let mut j = title_start;
        while j < end && bytes[j] != quote {
            j += 1;
        }
        if j >= end {
            return None;
        }
        title = Some(unescape_punct(&buf[title_start..j]));
        i = j + 1;
        while i < end && (bytes[i] == b' ' || bytes[i] == b'\t') {
            i += 1;
        }
    }

    if i >= end || bytes[i] != b')' {
        return None;
    }
    Some((unescape_punct(&buf[url_start..url_end]), title, i + 1))
}

pub(crate) fn unescape_punct(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut i = 0usize;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 1 < bytes.len() && bytes[i + 1].is_ascii_punctuation() {
            out.push(bytes[i + 1] as char);
            i += 2;
            continue;
        }
        let ch_len = utf8_len(bytes[i]);
        out.push_str(&text[i..(i + ch_len).min(bytes.len())]);
        i += ch_len;
    }
    out
}

fn utf8_len(b: u8) -> usize {
    match b {
        0x00..=0x7F => 1,
        0xC0..=0xDF => 2,
        0xE0..=0xEF => 3,
        _ => 4,
    }
}

pub(crate) fn has_url_scheme(text: &str) -> bool {
    for scheme in ["http://", "https://", "ftp://", "mailto:"] {
        if text.len() >= scheme.len() && text[..scheme.len()].eq_ignore_ascii_case(scheme) {
            return true;
        }
    }
    false
}

fn looks_like_email(text: &str) -> bool {
    let at = match text.find('@') {
        Some(at) if at > 0 => at,
        _ => return false,
    };
    let domain = &text[at + 1..];
    domain.contains('.')
        && text
            .bytes()
            .all(|b| b.is_ascii_graphic() && b != b'<' && b != b'>')
}
