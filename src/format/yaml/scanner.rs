//! Byte-level cursor shared by the YAML parser. No token stream is built —
//! indentation and scalar boundaries are tracked directly as byte offsets
//! while parsing, which is simpler than the original tool's two-pass
//! line/col-to-byte-offset recovery (that recovery pass existed only
//! because the library it wrapped reported positions in line/col, not
//! bytes).

pub struct Scanner<'a> {
    pub data: &'a [u8],
    pub pos: usize,
}

impl<'a> Scanner<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Scanner { data, pos: 0 }
    }

    pub fn at_eof(&self) -> bool {
        self.pos >= self.data.len()
    }

    pub fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    pub fn peek_at(&self, offset: usize) -> Option<u8> {
        self.data.get(self.pos + offset).copied()
    }

    pub fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    /// Column of the current position, counting from 0 at the start of the
    /// current line.
    pub fn column(&self) -> usize {
        let line_start = self.data[..self.pos]
            .iter()
            .rposition(|&b| b == b'\n')
            .map(|i| i + 1)
            .unwrap_or(0);
        self.pos - line_start
    }

    pub fn skip_spaces(&mut self) {
        while matches!(self.peek(), Some(b' ')) {
            self.pos += 1;
        }
    }

    pub fn skip_to_eol(&mut self) {
        while !matches!(self.peek(), Some(b'\n') | None) {
            self.pos += 1;
        }
    }

    /// Skip blank lines and full-line comments, landing either at EOF or at
    /// the first column of meaningful content.
    pub fn skip_blank_and_comment_lines(&mut self) {
        loop {
            let before_spaces = self.pos;
            self.skip_spaces();
            match self.peek() {
                Some(b'\n') => {
                    self.pos += 1;
                }
                Some(b'#') => {
                    self.skip_to_eol();
                    if matches!(self.peek(), Some(b'\n')) {
                        self.pos += 1;
                    }
                }
                _ => {
                    // Not a blank or comment line after all — the spaces we
                    // just skipped are this line's real indentation, so keep
                    // `pos` there rather than rewinding to the line start.
                    let _ = before_spaces;
                    return;
                }
            }
        }
    }

    pub fn starts_with(&self, s: &str) -> bool {
        self.data[self.pos..].starts_with(s.as_bytes())
    }
}
