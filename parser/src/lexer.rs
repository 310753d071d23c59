/// Lexer for the script dialect.
///
/// The [`Lexer`] walks an in-memory source string and implements
/// [`Iterator`] over [`Token`]s, ending with a single [`TokenKind::Eof`].
/// It tracks byte offset, line, and column for every token.
///
/// Newlines are significant (they terminate statements) and are emitted as
/// [`TokenKind::Line`]. Comments are skipped:
///
/// | Syntax     | Kind          | Notes                        |
/// |------------|---------------|------------------------------|
/// | `// …`     | Line comment  | Runs to end of line          |
/// | `/* … */`  | Block comment | Nestable (`/* /* */ */`)     |
///
/// String literals may contain `%(expr)` interpolations. The lexer does
/// not tokenize the embedded expression; it hands the raw text to the
/// parser as a [`StringPart::Code`].
use crate::span::{Pos, Span};
use crate::token::{StringPart, Token, TokenKind};

pub struct Lexer<'a> {
    source: &'a [u8],
    offset: usize,
    line: usize,
    column: usize,
    done: bool,
}

impl<'a> Lexer<'a> {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(source: &'a str) -> Self {
        Self {
            source: source.as_bytes(),
            offset: 0,
            line: 1,
            column: 1,
            done: false,
        }
    }

    fn pos(&self) -> Pos {
        Pos::new(self.offset, self.line, self.column)
    }

    fn peek(&self) -> Option<u8> {
        self.source.get(self.offset).copied()
    }

    fn peek_ahead(&self, n: usize) -> Option<u8> {
        self.source.get(self.offset + n).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.offset += 1;
        if b == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(b)
    }

    fn matches(&mut self, expected: u8) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn text(&self, start: Pos) -> &'a str {
        // Token boundaries always fall on ASCII bytes.
        std::str::from_utf8(&self.source[start.offset..self.offset])
            .unwrap_or_default()
    }

    fn token(&self, kind: TokenKind, start: Pos) -> Token {
        Token::new(kind, Span::new(start, self.pos()))
    }

    /// Skip spaces, tabs, carriage returns and comments. Returns an error
    /// token for an unterminated block comment.
    fn skip_trivia(&mut self) -> Option<Token> {
        loop {
            match self.peek() {
                Some(b' ' | b'\t' | b'\r') => {
                    self.advance();
                }
                Some(b'/') if self.peek_ahead(1) == Some(b'/') => {
                    while let Some(b) = self.peek() {
                        if b == b'\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                Some(b'/') if self.peek_ahead(1) == Some(b'*') => {
                    let start = self.pos();
                    self.advance();
                    self.advance();
                    let mut depth = 1;
                    while depth > 0 {
                        match self.advance() {
                            Some(b'/') if self.peek() == Some(b'*') => {
                                self.advance();
                                depth += 1;
                            }
                            Some(b'*') if self.peek() == Some(b'/') => {
                                self.advance();
                                depth -= 1;
                            }
                            Some(_) => {}
                            None => {
                                return Some(self.token(
                                    TokenKind::Error(
                                        "Unterminated block comment.".into(),
                                    ),
                                    start,
                                ));
                            }
                        }
                    }
                }
                _ => return None,
            }
        }
    }

    fn lex_number(&mut self, start: Pos) -> Token {
        if self.peek() == Some(b'0')
            && matches!(self.peek_ahead(1), Some(b'x' | b'X'))
        {
            self.advance();
            self.advance();
            while self.peek().is_some_and(|b| b.is_ascii_hexdigit()) {
                self.advance();
            }
            let digits = &self.text(start)[2..];
            return match u64::from_str_radix(digits, 16) {
                Ok(n) => self.token(TokenKind::Number(n as f64), start),
                Err(_) => self.token(
                    TokenKind::Error("Invalid hex literal.".into()),
                    start,
                ),
            };
        }

        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.advance();
        }
        if self.peek() == Some(b'.')
            && self.peek_ahead(1).is_some_and(|b| b.is_ascii_digit())
        {
            self.advance();
            while self.peek().is_some_and(|b| b.is_ascii_digit()) {
                self.advance();
            }
        }
        if matches!(self.peek(), Some(b'e' | b'E')) {
            let sign = usize::from(matches!(self.peek_ahead(1), Some(b'+' | b'-')));
            if self.peek_ahead(1 + sign).is_some_and(|b| b.is_ascii_digit()) {
                for _ in 0..=sign {
                    self.advance();
                }
                while self.peek().is_some_and(|b| b.is_ascii_digit()) {
                    self.advance();
                }
            }
        }

        match self.text(start).parse::<f64>() {
            Ok(n) => self.token(TokenKind::Number(n), start),
            Err(_) => self.token(
                TokenKind::Error("Invalid number literal.".into()),
                start,
            ),
        }
    }

    fn lex_name(&mut self, start: Pos) -> Token {
        while self
            .peek()
            .is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_')
        {
            self.advance();
        }
        let text = self.text(start);
        if text.starts_with('_') {
            return self.token(TokenKind::Field(text.to_string()), start);
        }
        let kind = TokenKind::keyword(text)
            .unwrap_or_else(|| TokenKind::Name(text.to_string()));
        self.token(kind, start)
    }

    /// Reads a string literal; the opening quote is already consumed.
    fn lex_string(&mut self, start: Pos) -> Token {
        let mut parts = Vec::new();
        let mut bytes = Vec::new();

        loop {
            let Some(b) = self.advance() else {
                return self.token(
                    TokenKind::Error("Unterminated string.".into()),
                    start,
                );
            };
            match b {
                b'"' => break,
                b'\\' => {
                    let escaped = match self.advance() {
                        Some(b'"') => b'"',
                        Some(b'\\') => b'\\',
                        Some(b'%') => b'%',
                        Some(b'0') => b'\0',
                        Some(b'n') => b'\n',
                        Some(b'r') => b'\r',
                        Some(b't') => b'\t',
                        _ => {
                            return self.token(
                                TokenKind::Error(
                                    "Invalid escape character.".into(),
                                ),
                                start,
                            );
                        }
                    };
                    bytes.push(escaped);
                }
                b'%' if self.peek() == Some(b'(') => {
                    self.advance();
                    if !bytes.is_empty() {
                        parts.push(StringPart::Literal(
                            String::from_utf8_lossy(&bytes).into_owned(),
                        ));
                        bytes.clear();
                    }
                    let code_start = self.pos();
                    let mut depth = 1;
                    loop {
                        match self.peek() {
                            None => {
                                return self.token(
                                    TokenKind::Error(
                                        "Unterminated interpolation.".into(),
                                    ),
                                    start,
                                );
                            }
                            Some(b'(') => depth += 1,
                            Some(b')') => {
                                depth -= 1;
                                if depth == 0 {
                                    break;
                                }
                            }
                            Some(_) => {}
                        }
                        self.advance();
                    }
                    let source = self.text(code_start).to_string();
                    self.advance();
                    parts.push(StringPart::Code {
                        source,
                        start: code_start,
                    });
                }
                other => bytes.push(other),
            }
        }

        if !bytes.is_empty() || parts.is_empty() {
            parts.push(StringPart::Literal(
                String::from_utf8_lossy(&bytes).into_owned(),
            ));
        }
        self.token(TokenKind::String(parts), start)
    }

    pub fn next_token(&mut self) -> Token {
        if let Some(error) = self.skip_trivia() {
            return error;
        }

        let start = self.pos();
        let Some(b) = self.advance() else {
            return self.token(TokenKind::Eof, start);
        };

        let kind = match b {
            b'\n' => TokenKind::Line,
            b'(' => TokenKind::LParen,
            b')' => TokenKind::RParen,
            b'[' => TokenKind::LBracket,
            b']' => TokenKind::RBracket,
            b'{' => TokenKind::LBrace,
            b'}' => TokenKind::RBrace,
            b',' => TokenKind::Comma,
            b'.' => TokenKind::Dot,
            b'+' => TokenKind::Plus,
            b'-' => TokenKind::Minus,
            b'*' => TokenKind::Star,
            b'/' => TokenKind::Slash,
            b'%' => TokenKind::Percent,
            b'!' if self.matches(b'=') => TokenKind::BangEq,
            b'!' => TokenKind::Bang,
            b'=' if self.matches(b'=') => TokenKind::EqEq,
            b'=' => TokenKind::Eq,
            b'<' if self.matches(b'=') => TokenKind::LtEq,
            b'<' => TokenKind::Lt,
            b'>' if self.matches(b'=') => TokenKind::GtEq,
            b'>' => TokenKind::Gt,
            b'&' if self.matches(b'&') => TokenKind::AmpAmp,
            b'|' if self.matches(b'|') => TokenKind::PipePipe,
            b'"' => return self.lex_string(start),
            b if b.is_ascii_digit() => {
                self.offset -= 1;
                self.column -= 1;
                return self.lex_number(start);
            }
            b if b.is_ascii_alphabetic() || b == b'_' => {
                return self.lex_name(start);
            }
            other => TokenKind::Error(format!(
                "Invalid character '{}'.",
                char::from(other).escape_default()
            )),
        };
        self.token(kind, start)
    }
}

impl Iterator for Lexer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        if self.done {
            return None;
        }
        let token = self.next_token();
        if token.is_eof() {
            self.done = true;
        }
        Some(token)
    }
}
