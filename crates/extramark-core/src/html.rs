use crate::cursor::Cursor;
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// How Markdown syntax is treated inside an HTML block.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MarkdownMode {
    /// Leave the interior as literal HTML (still safety-scanned).
    Off,
    /// Inline-format the interior as one span.
    Span,
    /// Re-run the block parser on the interior; Markdown stays off inside
    /// further nested HTML.
    Block,
    /// Like `Block`, but Markdown remains enabled recursively.
    Deep,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub(crate) struct TagFlags {
    pub block: bool,
    pub inline: bool,
    pub no_closing: bool,
    pub content_as_span: bool,
}

const B: TagFlags = TagFlags { block: true, inline: false, no_closing: false, content_as_span: false };
const B_SPAN: TagFlags = TagFlags { block: true, inline: false, no_closing: false, content_as_span: true };
const B_VOID: TagFlags = TagFlags { block: true, inline: false, no_closing: true, content_as_span: false };
const I: TagFlags = TagFlags { block: false, inline: true, no_closing: false, content_as_span: false };
const I_VOID: TagFlags = TagFlags { block: false, inline: true, no_closing: true, content_as_span: false };
const B_I: TagFlags = TagFlags { block: true, inline: true, no_closing: false, content_as_span: false };

static TAG_FLAGS: Lazy<HashMap<&'static str, TagFlags>> = Lazy::new(|| {
    let mut table = HashMap::new();
    for name in ["p", "h1", "h2", "h3", "h4", "h5", "h6"] {
        table.insert(name, B_SPAN);
    }
    for name in [
        "div", "blockquote", "pre", "table", "thead", "tbody", "tr", "td", "th", "dl", "dd",
        "dt", "ol", "ul", "li", "form", "fieldset", "legend", "iframe", "script", "style",
        "noscript", "head", "body", "html", "math", "address", "article", "aside", "figure",
        "figcaption", "footer", "header", "main", "nav", "section",
    ] {
        table.insert(name, B);
    }
    table.insert("hr", B_VOID);
    for name in ["br", "img", "input"] {
        table.insert(name, I_VOID);
    }
    for name in ["ins", "del"] {
        table.insert(name, B_I);
    }
    // Comments are parsed as a tag named "!" and behave as blocks.
    table.insert("!", B);
    table
});

// Tag/attribute allow-list for safe mode. A tag listed with no attributes
// must carry none at all to pass.
static SAFE_TAGS: Lazy<HashMap<&'static str, &'static [&'static str]>> = Lazy::new(|| {
    const NONE: &[&str] = &[];
    let mut table: HashMap<&'static str, &'static [&'static str]> = HashMap::new();
    for name in [
        "b", "blockquote", "code", "dd", "dt", "dl", "del", "em", "h1", "h2", "h3", "h4",
        "h5", "h6", "i", "kbd", "li", "ol", "ul", "p", "pre", "s", "sub", "sup", "strong",
        "strike", "hr", "br",
    ] {
        table.insert(name, NONE);
    }
    table.insert("a", &["href", "title", "class"]);
    table.insert("img", &["src", "width", "height", "alt", "title", "class"]);
    table.insert("abbr", &["title"]);
    table
});

/// A parsed HTML tag. Attribute keys keep their source spelling but are
/// matched case-insensitively; insertion order is irrelevant.
#[derive(Clone, Debug, PartialEq)]
pub struct HtmlTag {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    /// Self-closing (`<br />`).
    pub closed: bool,
    /// A closing tag (`</div>`).
    pub closing: bool,
}

impl HtmlTag {
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub(crate) fn flags(&self) -> TagFlags {
        let name = self.name.to_ascii_lowercase();
        match TAG_FLAGS.get(name.as_str()) {
            Some(flags) => *flags,
            // Unknown tags default to inline.
            None => I,
        }
    }

    /// Safe-mode judgment: the tag name must be on the allow-list, every
    /// attribute must be allowed for that tag, and `href`/`src` values must
    /// begin with `http://`, `https://` or `ftp://`.
    pub fn is_safe(&self) -> bool {
        let name = self.name.to_ascii_lowercase();
        let allowed = match SAFE_TAGS.get(name.as_str()) {
            Some(allowed) => *allowed,
            None => return false,
        };
        if allowed.is_empty() && !self.attributes.is_empty() {
            return false;
        }
        for (key, value) in &self.attributes {
            let key = key.to_ascii_lowercase();
            if !allowed.contains(&key.as_str()) {
                return false;
            }
            if (key == "href" || key == "src") && !is_safe_url(value) {
                return false;
            }
        }
        true
    }

    /// Markdown-processing mode of this tag: an explicit `markdown`
    /// attribute wins, otherwise the mode inherited from the enclosing
    /// region applies.
    pub(crate) fn markdown_mode(&self, inherited: MarkdownMode) -> MarkdownMode {
        match self.attribute("markdown") {
            Some("1") | Some("block") => MarkdownMode::Block,
            Some("span") => MarkdownMode::Span,
            Some("deep") => MarkdownMode::Deep,
            Some("0") | Some("off") => MarkdownMode::Off,
            _ => inherited,
        }
    }

    pub(crate) fn has_markdown_attribute(&self) -> bool {
        self.attribute("markdown").is_some()
    }

    /// Rebuilds the opening tag, dropping the `markdown` pseudo-attribute.
    pub(crate) fn render_open(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (key, value) in &self.attributes {
            if key.eq_ignore_ascii_case("markdown") {
                continue;
            }
            out.push(' ');
            out.push_str(key);
            out.push_str("=\"");
            out.push_str(value);
            out.push('"');
        }
        if self.closed {
            out.push_str(" />");
        } else {
            out.push('>');
        }
    }

    pub(crate) fn render_close(&self, out: &mut String) {
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

fn is_safe_url(url: &str) -> bool {
    let prefix: String = url
        .chars()
        .take(8)
        .map(|ch| ch.to_ascii_lowercase())
        .collect();
    prefix.starts_with("http://") || prefix.starts_with("https://") || prefix.starts_with("ftp://")
}

fn is_tag_name_start(b: u8) -> bool {
    b.is_ascii_alphabetic()
}

fn is_tag_name_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_'
}

fn is_attr_name_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b == b':'
}

fn is_attr_name_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b':' || b == b'.'
}

fn skip_whitespace(cursor: &mut Cursor) {
    while let Some(b) = cursor.current() {
        if b.is_ascii_whitespace() {
            cursor.advance(1);
        } else {
            break;
        }
    }
}

/// Parses one tag at the cursor (which must sit on `<`). On failure the
/// cursor is restored to where it started.
pub(crate) fn parse_tag(cursor: &mut Cursor) -> Option<HtmlTag> {
    let saved = cursor.position();
    if !cursor.match_char(b'<') {
        return None;
    }

    // `<!-- ... -->` becomes a tag named `!` with one synthetic attribute
    // holding the comment text.
    if cursor.match_str("!--") {
        cursor.mark();
        loop {
            if cursor.at_end() {
                cursor.set_position(saved);
                return None;
            }
            if cursor.starts_with("-->") {
                break;
            }
            cursor.advance(1);
        }
        let content = cursor.extract().to_string();
        cursor.advance(3);
        return Some(HtmlTag {
            name: "!".to_string(),
            attributes: vec![("content".to_string(), content)],
            closed: true,
            closing: false,
        });
    }

    let closing = cursor.match_char(b'/');

    match cursor.current() {
        Some(b) if is_tag_name_start(b) => {}
        _ => {
            cursor.set_position(saved);
            return None;
        }
    }
    cursor.mark();
    while let Some(b) = cursor.current() {
        if is_tag_name_continue(b) {
            cursor.advance(1);
        } else {
            break;
        }
    }
    let name = cursor.extract().to_string();

    let mut attributes = Vec::new();
    let mut closed = false;
    loop {
        skip_whitespace(cursor);
        match cursor.current() {
            Some(b'>') => {
                cursor.advance(1);
                break;
            }
            Some(b'/') if !closing => {
                cursor.advance(1);
                skip_whitespace(cursor);
                if !cursor.match_char(b'>') {
                    cursor.set_position(saved);
                    return None;
                }
                closed = true;
                break;
            }
            Some(b) if is_attr_name_start(b) && !closing => {
                cursor.mark();
                while let Some(b) = cursor.current() {
                    if is_attr_name_continue(b) {
                        cursor.advance(1);
                    } else {
                        break;
                    }
                }
                let key = cursor.extract().to_string();
                skip_whitespace(cursor);
                if cursor.match_char(b'=') {
                    skip_whitespace(cursor);
                    let value = match cursor.current() {
                        Some(quote @ (b'"' | b'\'')) => {
                            cursor.advance(1);
                            cursor.mark();
                            if !cursor.find_char(quote) {
                                cursor.set_position(saved);
                                return None;
                            }
                            let value = cursor.extract().to_string();
                            cursor.advance(1);
                            value
                        }
                        _ => {
                            cursor.mark();
                            while let Some(b) = cursor.current() {
                                if b.is_ascii_whitespace() || b == b'>' || b == b'/' {
                                    break;
                                }
                                cursor.advance(1);
                            }
                            cursor.extract().to_string()
                        }
                    };
                    attributes.push((key, value));
                } else {
                    attributes.push((key, String::new()));
                }
            }
            _ => {
                cursor.set_position(saved);
                return None;
            }
        }
    }

    Some(HtmlTag {
        name,
        attributes,
        closed,
        closing,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Option<HtmlTag> {
        let mut cursor = Cursor::new(text);
        parse_tag(&mut cursor)
    }

    #[test]
    fn parses_attribute_forms() {
        let tag = parse("<a href=\"http://x\" title='t' data-k=v disabled>").unwrap();
        assert_eq!(tag.name, "a");
        assert_eq!(tag.attribute("HREF"), Some("http://x"));
        assert_eq!(tag.attribute("title"), Some("t"));
        assert_eq!(tag.attribute("data-k"), Some("v"));
        assert_eq!(tag.attribute("disabled"), Some(""));
        assert!(!tag.closed && !tag.closing);
    }

    #[test]
    fn parses_closing_and_self_closing() {
        let tag = parse("</div>").unwrap();
        assert!(tag.closing);
        let tag = parse("<hr />").unwrap();
        assert!(tag.closed);
        assert!(tag.flags().no_closing);
    }

    #[test]
    fn comment_becomes_bang_tag() {
        let tag = parse("<!-- hi -->").unwrap();
        assert_eq!(tag.name, "!");
        assert!(tag.closed);
        assert_eq!(tag.attribute("content"), Some(" hi "));
    }

    #[test]
    fn failure_restores_position() {
        let mut cursor = Cursor::new("<not a tag");
        assert!(parse_tag(&mut cursor).is_none());
        assert_eq!(cursor.position(), 0);
    }

    #[test]
    fn safety_judgment() {
        assert!(parse("<b>").unwrap().is_safe());
        assert!(parse("<a href=\"https://example.com\">").unwrap().is_safe());
        assert!(!parse("<a href=\"javascript:alert(1)\">").unwrap().is_safe());
        assert!(!parse("<script>").unwrap().is_safe());
        assert!(!parse("<b onclick=x>").unwrap().is_safe());
        assert!(!parse("<p class=\"x\">").unwrap().is_safe());
        assert!(parse("<img src=\"HTTP://example.com/a.png\">").unwrap().is_safe());
    }

    #[test]
    fn unknown_tags_default_to_inline() {
        let flags = parse("<custom-widget>").unwrap().flags();
        assert!(flags.inline && !flags.block);
    }

    #[test]
    fn markdown_attribute_resolution() {
        let tag = parse("<div markdown=\"1\">").unwrap();
        assert_eq!(tag.markdown_mode(MarkdownMode::Off), MarkdownMode::Block);
        let tag = parse("<div markdown=\"span\">").unwrap();
        assert_eq!(tag.markdown_mode(MarkdownMode::Deep), MarkdownMode::Span);
        let tag = parse("<div>").unwrap();
        assert_eq!(tag.markdown_mode(MarkdownMode::Deep), MarkdownMode::Deep);
        let mut out = String::new();
        parse("<div markdown=\"1\" class=\"c\">").unwrap().render_open(&mut out);
        assert_eq!(out, "<div class=\"c\">");
    }
}
