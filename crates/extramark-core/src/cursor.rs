use crate::span::Span;

/// Read-only scanning window over the document buffer.
///
/// The cursor sees `[start, end)` of the underlying text and never mutates
/// it. Backtracking is save-an-integer / restore-an-integer: callers
/// snapshot `position()` before a speculative parse and `set_position()` on
/// failure. One mark register supports slice extraction.
#[derive(Clone)]
pub(crate) struct Cursor<'a> {
    text: &'a str,
    start: usize,
    end: usize,
    pos: usize,
    mark: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(text: &'a str) -> Self {
        Self::window(text, 0, text.len())
    }

    pub fn window(text: &'a str, start: usize, end: usize) -> Self {
        let end = end.min(text.len());
        let start = start.min(end);
        Self {
            text,
            start,
            end,
            pos: start,
            mark: start,
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn set_position(&mut self, pos: usize) {
        self.pos = pos.clamp(self.start, self.end);
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.end
    }

    /// Current byte, or `None` at the window end.
    pub fn current(&self) -> Option<u8> {
        if self.pos < self.end {
            Some(self.text.as_bytes()[self.pos])
        } else {
            None
        }
    }

    pub fn advance(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.end);
    }

    /// Consumes `ch` if it is the current byte.
    pub fn match_char(&mut self, ch: u8) -> bool {
        if self.current() == Some(ch) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Consumes `s` if the window continues with it (ASCII, case-sensitive).
    pub fn match_str(&mut self, s: &str) -> bool {
        if self.text[self.pos..self.end].starts_with(s) {
            self.pos += s.len();
            true
        } else {
            false
        }
    }

    pub fn starts_with(&self, s: &str) -> bool {
        self.text[self.pos..self.end].starts_with(s)
    }

    /// Skips spaces and tabs. Returns the number of bytes skipped.
    pub fn skip_linespace(&mut self) -> usize {
        let from = self.pos;
        while let Some(b) = self.current() {
            if b == b' ' || b == b'\t' {
                self.pos += 1;
            } else {
                break;
            }
        }
        self.pos - from
    }

    /// Consumes one line ending (`\n`, `\r` or `\r\n`) if present.
    pub fn skip_eol(&mut self) -> bool {
        match self.current() {
            Some(b'\n') => {
                self.pos += 1;
                true
            }
            Some(b'\r') => {
                self.pos += 1;
                if self.current() == Some(b'\n') {
                    self.pos += 1;
                }
                true
            }
            _ => false,
        }
    }

    pub fn at_eol(&self) -> bool {
        matches!(self.current(), None | Some(b'\n') | Some(b'\r'))
    }

    /// Advances to the next line ending and returns the span of the line
    /// content (the ending itself is not consumed).
    pub fn scan_line(&mut self) -> Span {
        let from = self.pos;
        while let Some(b) = self.current() {
            if b == b'\n' || b == b'\r' {
                break;
            }
            self.pos += 1;
        }
        Span::new(from, self.pos)
    }

    /// Advances until `ch` is the current byte. Returns false (position at
    /// window end) when `ch` never occurs.
    pub fn find_char(&mut self, ch: u8) -> bool {
        while let Some(b) = self.current() {
            if b == ch {
                return true;
            }
            self.pos += 1;
        }
        false
    }

    pub fn mark(&mut self) {
        self.mark = self.pos;
    }

    pub fn marked_span(&self) -> Span {
        if self.mark <= self.pos {
            Span::new(self.mark, self.pos)
        } else {
            Span::new(self.pos, self.mark)
        }
    }

    /// The slice between the mark register and the current position.
    pub fn extract(&self) -> &'a str {
        self.marked_span().slice(self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_line_stops_at_line_ending() {
        let text = "one\r\ntwo";
        let mut cursor = Cursor::new(text);
        let line = cursor.scan_line();
        assert_eq!(line.slice(text), "one");
        assert!(cursor.skip_eol());
        let line = cursor.scan_line();
        assert_eq!(line.slice(text), "two");
        assert!(cursor.at_end());
    }

    #[test]
    fn mark_extract_round_trip() {
        let mut cursor = Cursor::new("abc def");
        cursor.advance(4);
        cursor.mark();
        cursor.advance(3);
        assert_eq!(cursor.extract(), "def");
    }

    #[test]
    fn backtracking_is_position_restore() {
        let mut cursor = Cursor::new("hello");
        let saved = cursor.position();
        assert!(!cursor.match_str("help"));
        cursor.advance(3);
        cursor.set_position(saved);
        assert!(cursor.match_str("hello"));
    }

    #[test]
    fn window_clamps_out_of_range() {
        let mut cursor = Cursor::window("abcdef", 2, 4);
        assert_eq!(cursor.current(), Some(b'c'));
        cursor.advance(10);
        assert!(cursor.at_end());
        assert_eq!(cursor.position(), 4);
    }
}
