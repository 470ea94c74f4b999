use crate::token::{Span, Token, TokenKind};
use crate::LexerError;

/// Tree expression scanner.
///
/// Works on the raw bytes of the source so that every span is a byte
/// offset into the original expression text. Identifiers are ASCII only;
/// quoted strings may carry arbitrary UTF-8.
pub struct Scanner<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
    tokens: Vec<Token>,
}

impl<'a> Scanner<'a> {
    /// Create a new scanner for the given source.
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            pos: 0,
            tokens: Vec::new(),
        }
    }

    /// Tokenize the entire source into a vector of tokens ending in `End`.
    pub fn tokenize(source: &str) -> Result<Vec<Token>, LexerError> {
        let mut scanner = Scanner::new(source);
        scanner.scan_tokens()?;
        Ok(scanner.tokens)
    }

    fn scan_tokens(&mut self) -> Result<(), LexerError> {
        while !self.is_at_end() {
            self.scan_token()?;
        }
        self.emit(TokenKind::End, self.pos);
        Ok(())
    }

    fn scan_token(&mut self) -> Result<(), LexerError> {
        let start = self.pos;

        match self.peek() {
            b' ' | b'\t' | b'\n' | b'\r' => {
                self.advance();
                Ok(())
            }

            b'"' => self.scan_string(),

            b'-' if self.peek_next() == b'>' => {
                self.advance();
                self.advance();
                self.emit(TokenKind::Arrow, start);
                Ok(())
            }
            b'<' => self.single(TokenKind::LAngle),
            b'>' => self.single(TokenKind::RAngle),
            b'=' => self.single(TokenKind::Eq),
            b',' => self.single(TokenKind::Comma),
            b':' => self.single(TokenKind::Colon),

            c if c.is_ascii_alphabetic() || c == b'_' => self.scan_identifier(),

            c if c.is_ascii_graphic() => {
                Err(self.error(format!("Unexpected character: '{}'", c as char)))
            }
            c => Err(self.error(format!("Unexpected byte: 0x{c:02x}"))),
        }
    }

    // --- Scanners ---

    /// Scan a quoted string. `\"` `\\` `\n` `\t` are expanded; any other
    /// escape is kept as written so regex escapes pass through.
    fn scan_string(&mut self) -> Result<(), LexerError> {
        let start = self.pos;
        self.advance(); // consume opening quote

        let mut value = Vec::new();

        while !self.is_at_end() && self.peek() != b'"' {
            if self.peek() == b'\\' {
                self.advance(); // consume backslash
                if self.is_at_end() {
                    break;
                }
                match self.peek() {
                    b'"' => value.push(b'"'),
                    b'\\' => value.push(b'\\'),
                    b'n' => value.push(b'\n'),
                    b't' => value.push(b'\t'),
                    c => {
                        value.push(b'\\');
                        value.push(c);
                    }
                }
            } else {
                value.push(self.peek());
            }
            self.advance();
        }

        if self.is_at_end() {
            return Err(LexerError {
                message: "Unterminated string".into(),
                offset: start,
            });
        }

        self.advance(); // consume closing quote

        // Only ASCII bytes were inserted or removed, so the buffer is still UTF-8.
        let value = String::from_utf8(value).map_err(|_| LexerError {
            message: "String is not valid UTF-8".into(),
            offset: start,
        })?;
        self.emit(TokenKind::String(value), start);
        Ok(())
    }

    /// Scan `[A-Za-z_][A-Za-z0-9_-]*`, lowercased. A `-` directly before
    /// `>` ends the identifier so `tr->td` splits around the arrow.
    fn scan_identifier(&mut self) -> Result<(), LexerError> {
        let start = self.pos;
        self.advance();

        while !self.is_at_end() {
            let c = self.peek();
            let continues = c.is_ascii_alphanumeric()
                || c == b'_'
                || (c == b'-' && self.peek_next() != b'>');
            if !continues {
                break;
            }
            self.advance();
        }

        let ident = self.source[start..self.pos].to_ascii_lowercase();
        self.emit(TokenKind::Ident(ident), start);
        Ok(())
    }

    // --- Helpers ---

    fn single(&mut self, kind: TokenKind) -> Result<(), LexerError> {
        let start = self.pos;
        self.advance();
        self.emit(kind, start);
        Ok(())
    }

    fn emit(&mut self, kind: TokenKind, start: usize) {
        self.tokens.push(Token::new(kind, Span::new(start, self.pos)));
    }

    fn peek(&self) -> u8 {
        self.bytes.get(self.pos).copied().unwrap_or(0)
    }

    fn peek_next(&self) -> u8 {
        self.bytes.get(self.pos + 1).copied().unwrap_or(0)
    }

    fn advance(&mut self) {
        if !self.is_at_end() {
            self.pos += 1;
        }
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn error(&self, message: String) -> LexerError {
        LexerError {
            message,
            offset: self.pos,
        }
    }
}
