use std::fmt;

use super::types::{Token, TokenKind};

/// Characters that separate tokens and are otherwise discarded.
pub(crate) fn is_blank(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\x0b' | '\r' | '\n' | '\x0c')
}

/// Why lexing stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LexErrorKind {
    /// Input ended before the closing quote. `start` is the byte offset of
    /// the opening quote.
    UnterminatedQuote { quote: char, start: usize },
    /// A character that can never be handed to the OS (NUL).
    UnexpectedChar(char),
}

/// A lexing failure and the byte offset where it was detected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    pub offset: usize,
    pub kind: LexErrorKind,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            LexErrorKind::UnterminatedQuote { quote, start } => write!(
                f,
                "unterminated quote: {quote} opened at byte {start} is never closed"
            ),
            LexErrorKind::UnexpectedChar(c) => {
                write!(f, "unexpected character {c:?} at byte {}", self.offset)
            }
        }
    }
}

impl std::error::Error for LexError {}

/// Hand-written lexer over a command string.
///
/// Call [`Lexer::next_token`] repeatedly; it returns `Eol` at the end of the
/// input and `Error` on failure, after which [`Lexer::error`] holds the
/// details and every further call returns `Eol`.
pub struct Lexer<'a> {
    input: &'a str,
    pos: usize,
    error: Option<LexError>,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            error: None,
        }
    }

    pub fn error(&self) -> Option<&LexError> {
        self.error.as_ref()
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn bump(&mut self, c: char) {
        self.pos += c.len_utf8();
    }

    fn fail(&mut self, offset: usize, kind: LexErrorKind) -> Token<'a> {
        self.error = Some(LexError { offset, kind });
        self.pos = self.input.len();
        Token::new(TokenKind::Error, "", offset)
    }

    pub fn next_token(&mut self) -> Token<'a> {
        if self.error.is_some() {
            return Token::new(TokenKind::Eol, "", self.input.len());
        }
        while let Some(c) = self.peek().filter(|&c| is_blank(c)) {
            self.bump(c);
        }

        let start = self.pos;
        let Some(c) = self.peek() else {
            return Token::new(TokenKind::Eol, "", start);
        };

        if c == '\0' {
            return self.fail(start, LexErrorKind::UnexpectedChar(c));
        }
        if let Some(kind) = TokenKind::operator(c) {
            self.bump(c);
            return Token::new(kind, &self.input[start..self.pos], start);
        }
        if c == '\'' || c == '"' {
            return self.read_quoted(c);
        }
        self.read_atom()
    }

    /// Everything up to the matching quote is one atom, operators and
    /// whitespace included. There are no escapes.
    fn read_quoted(&mut self, quote: char) -> Token<'a> {
        let start = self.pos;
        let body = start + quote.len_utf8();
        match self.input[body..].find(quote) {
            Some(len) => {
                let end = body + len;
                self.pos = end + quote.len_utf8();
                if let Some(nul) = self.input[body..end].find('\0') {
                    return self.fail(body + nul, LexErrorKind::UnexpectedChar('\0'));
                }
                Token::new(TokenKind::Atom, &self.input[body..end], body)
            }
            None => {
                let end = self.input.len();
                self.fail(end, LexErrorKind::UnterminatedQuote { quote, start })
            }
        }
    }

    /// A bare atom runs until whitespace or an operator. Quote characters in
    /// the middle of a bare atom are ordinary characters.
    fn read_atom(&mut self) -> Token<'a> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if is_blank(c) || TokenKind::operator(c).is_some() {
                break;
            }
            if c == '\0' {
                return self.fail(self.pos, LexErrorKind::UnexpectedChar(c));
            }
            self.bump(c);
        }
        Token::new(TokenKind::Atom, &self.input[start..self.pos], start)
    }
}

/// Split a command string into atoms and operators.
///
/// The returned tokens never include `Eol` or `Error`; lexing stops at the
/// first of either.
pub fn tokenize(input: &str) -> Result<Vec<Token<'_>>, LexError> {
    let mut lexer = Lexer::new(input);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token();
        match token.kind {
            TokenKind::Eol => return Ok(tokens),
            TokenKind::Error => break,
            _ => tokens.push(token),
        }
    }
    Err(lexer
        .error
        .take()
        .unwrap_or(LexError {
            offset: input.len(),
            kind: LexErrorKind::UnexpectedChar('\0'),
        }))
}
