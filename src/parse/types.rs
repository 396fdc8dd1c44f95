//! Token and AST types shared by the lexer, the parser and the evaluator.
//!
//! Every piece of text in here borrows from the command string that was
//! tokenized; nothing is copied until a word crosses the OS boundary.

use serde::Serialize;
use std::fmt;

/// Lexical category of a [`Token`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    /// A word: bare run of characters or the inside of a quoted string.
    Atom,
    /// End of input.
    Eol,
    /// Lexing failed; see [`LexError`](super::LexError).
    Error,
    /// `|`
    Pipe,
    /// `&`
    Ampersand,
    /// `>`
    Greater,
    /// `<`
    Lesser,
    /// `;`
    Semicolon,
}

impl TokenKind {
    /// The operator kind for a single character, if it is one.
    pub fn operator(c: char) -> Option<Self> {
        match c {
            '|' => Some(TokenKind::Pipe),
            '&' => Some(TokenKind::Ampersand),
            '>' => Some(TokenKind::Greater),
            '<' => Some(TokenKind::Lesser),
            ';' => Some(TokenKind::Semicolon),
            _ => None,
        }
    }

    /// Human-readable name, used in parse errors.
    pub fn as_str(self) -> &'static str {
        match self {
            TokenKind::Atom => "word",
            TokenKind::Eol => "end of input",
            TokenKind::Error => "invalid input",
            TokenKind::Pipe => "|",
            TokenKind::Ampersand => "&",
            TokenKind::Greater => ">",
            TokenKind::Lesser => "<",
            TokenKind::Semicolon => ";",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One lexical token: a kind plus a view into the command string.
///
/// For quoted atoms `text` excludes the quotes and `offset` points at the
/// first byte after the opening quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    pub offset: usize,
}

impl<'a> Token<'a> {
    pub fn new(kind: TokenKind, text: &'a str, offset: usize) -> Self {
        Self { kind, text, offset }
    }

    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }
}

/// A single argv element or redirection target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Word<'a> {
    pub text: &'a str,
    #[serde(skip)]
    pub offset: usize,
}

impl<'a> Word<'a> {
    pub fn as_str(&self) -> &'a str {
        self.text
    }
}

impl<'a> From<&Token<'a>> for Word<'a> {
    fn from(token: &Token<'a>) -> Self {
        Self {
            text: token.text,
            offset: token.offset,
        }
    }
}

impl fmt::Display for Word<'_> {
    /// Renders the word so that lexing the output yields the same word.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self.text;
        let needs_quotes = text.is_empty()
            || text.starts_with(['\'', '"'])
            || text
                .chars()
                .any(|c| super::tokenize::is_blank(c) || TokenKind::operator(c).is_some());
        if !needs_quotes {
            return f.write_str(text);
        }
        // No escapes exist, so pick the quote character the word doesn't contain.
        if text.contains('\'') {
            write!(f, "\"{text}\"")
        } else {
            write!(f, "'{text}'")
        }
    }
}

/// Direction of a redirection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// `< file`: the file becomes stdin.
    In,
    /// `> file`: stdout is written to the file, created or truncated.
    Out,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::In => "<",
            Direction::Out => ">",
        }
    }
}

/// Abstract syntax tree of one command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Node<'a> {
    /// A simple command: program followed by its arguments.
    Command(Vec<Word<'a>>),
    /// `stage | rest`; `rest` is another `Pipeline` for three or more stages.
    Pipeline(Box<Node<'a>>, Box<Node<'a>>),
    /// `first ; rest`. `rest` is `None` for a trailing `;`.
    Sequence(Box<Node<'a>>, Option<Box<Node<'a>>>),
    /// `job & rest`. Only `job` runs in the background.
    Background(Box<Node<'a>>, Option<Box<Node<'a>>>),
    /// `inner < target` or `inner > target`.
    Redirect {
        direction: Direction,
        target: Word<'a>,
        inner: Box<Node<'a>>,
    },
}

impl<'a> Node<'a> {
    /// The argv words if this is a simple command.
    pub fn words(&self) -> Option<&[Word<'a>]> {
        match self {
            Node::Command(words) => Some(words),
            _ => None,
        }
    }

    /// Number of stages if this node is run as one pipeline.
    pub fn stage_count(&self) -> usize {
        match self {
            Node::Pipeline(_, rest) => 1 + rest.stage_count(),
            _ => 1,
        }
    }
}

impl fmt::Display for Node<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Command(words) => {
                for (i, word) in words.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{word}")?;
                }
                Ok(())
            }
            Node::Pipeline(stage, rest) => write!(f, "{stage} | {rest}"),
            Node::Sequence(first, rest) => match rest {
                Some(rest) => write!(f, "{first}; {rest}"),
                None => write!(f, "{first};"),
            },
            Node::Background(job, rest) => match rest {
                Some(rest) => write!(f, "{job} & {rest}"),
                None => write!(f, "{job} &"),
            },
            Node::Redirect {
                direction,
                target,
                inner,
            } => write!(f, "{inner} {} {target}", direction.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(text: &str) -> Word<'_> {
        Word { text, offset: 0 }
    }

    #[test]
    fn operator_chars() {
        assert_eq!(TokenKind::operator('|'), Some(TokenKind::Pipe));
        assert_eq!(TokenKind::operator(';'), Some(TokenKind::Semicolon));
        assert_eq!(TokenKind::operator('a'), None);
    }

    #[test]
    fn word_display_plain() {
        assert_eq!(word("ls").to_string(), "ls");
        assert_eq!(word("héllo").to_string(), "héllo");
    }

    #[test]
    fn word_display_quotes_when_needed() {
        assert_eq!(word("a b").to_string(), "'a b'");
        assert_eq!(word("a|b").to_string(), "'a|b'");
        assert_eq!(word("it's here").to_string(), "\"it's here\"");
        assert_eq!(word("").to_string(), "''");
    }

    #[test]
    fn stage_count_follows_chain() {
        let cmd = |w| Box::new(Node::Command(vec![word(w)]));
        let node = Node::Pipeline(cmd("a"), Box::new(Node::Pipeline(cmd("b"), cmd("c"))));
        assert_eq!(node.stage_count(), 3);
        assert_eq!(node.to_string(), "a | b | c");
    }
}
