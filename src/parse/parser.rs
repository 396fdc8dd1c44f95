use std::fmt;

use super::types::{Direction, Node, Token, TokenKind, Word};

/// Why a token sequence did not form a command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// Nothing but whitespace.
    Empty,
    /// A command was required (at the start, or after `|`, `&`, `;`).
    ExpectedCommand { found: TokenKind },
    /// `>` or `<` not followed by a word.
    MissingRedirectTarget { operator: TokenKind },
    /// The grammar ended before the input did, e.g. a second redirection
    /// on the same command.
    TrailingInput { found: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// Byte offset of the offending token, or the input length at the end.
    pub offset: usize,
    pub kind: ParseErrorKind,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ParseErrorKind::Empty => f.write_str("empty command"),
            ParseErrorKind::ExpectedCommand { found } => {
                write!(f, "expected a command at byte {}, found {found}", self.offset)
            }
            ParseErrorKind::MissingRedirectTarget { operator } => write!(
                f,
                "redirection `{operator}` at byte {} needs a target",
                self.offset
            ),
            ParseErrorKind::TrailingInput { found } => {
                write!(f, "unexpected `{found}` at byte {}", self.offset)
            }
        }
    }
}

impl std::error::Error for ParseError {}

/// Recursive-descent parser with one token of lookahead.
///
/// ```text
/// full_command   := pipeline ( ('&' | ';') full_command? )?
/// pipeline       := command ( '|' pipeline )?
/// command        := simple_command ( ('>' | '<') ATOM )?
/// simple_command := ATOM+
/// ```
struct Parser<'t, 'a> {
    tokens: &'t [Token<'a>],
    cursor: usize,
    end: usize,
}

impl<'t, 'a> Parser<'t, 'a> {
    fn peek(&self) -> Option<&'t Token<'a>> {
        self.tokens.get(self.cursor)
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(|t| t.kind)
    }

    fn next(&mut self) -> Option<&'t Token<'a>> {
        let token = self.tokens.get(self.cursor);
        if token.is_some() {
            self.cursor += 1;
        }
        token
    }

    fn offset(&self) -> usize {
        self.peek().map_or(self.end, |t| t.offset)
    }

    fn expected_command(&self) -> ParseError {
        ParseError {
            offset: self.offset(),
            kind: ParseErrorKind::ExpectedCommand {
                found: self.peek_kind().unwrap_or(TokenKind::Eol),
            },
        }
    }

    fn full_command(&mut self) -> Result<Node<'a>, ParseError> {
        let left = self.pipeline()?;
        let Some(op) = self
            .peek_kind()
            .filter(|k| matches!(k, TokenKind::Ampersand | TokenKind::Semicolon))
        else {
            return Ok(left);
        };
        self.next();

        // A trailing `&` or `;` ends the line without a further command.
        let rest = match self.peek_kind() {
            None => None,
            Some(TokenKind::Atom) => Some(Box::new(self.full_command()?)),
            Some(_) => return Err(self.expected_command()),
        };
        let left = Box::new(left);
        Ok(match op {
            TokenKind::Ampersand => Node::Background(left, rest),
            _ => Node::Sequence(left, rest),
        })
    }

    fn pipeline(&mut self) -> Result<Node<'a>, ParseError> {
        let stage = self.command()?;
        if self.peek_kind() != Some(TokenKind::Pipe) {
            return Ok(stage);
        }
        self.next();
        if self.peek_kind() != Some(TokenKind::Atom) {
            return Err(self.expected_command());
        }
        let rest = self.pipeline()?;
        Ok(Node::Pipeline(Box::new(stage), Box::new(rest)))
    }

    fn command(&mut self) -> Result<Node<'a>, ParseError> {
        let simple = self.simple_command()?;
        let direction = match self.peek_kind() {
            Some(TokenKind::Greater) => Direction::Out,
            Some(TokenKind::Lesser) => Direction::In,
            _ => return Ok(simple),
        };
        let Some(operator) = self.next() else {
            return Ok(simple);
        };
        let target = match self.peek() {
            Some(token) if token.is(TokenKind::Atom) => Word::from(token),
            _ => {
                return Err(ParseError {
                    offset: operator.offset,
                    kind: ParseErrorKind::MissingRedirectTarget {
                        operator: operator.kind,
                    },
                });
            }
        };
        self.next();
        Ok(Node::Redirect {
            direction,
            target,
            inner: Box::new(simple),
        })
    }

    fn simple_command(&mut self) -> Result<Node<'a>, ParseError> {
        let mut words = Vec::new();
        while let Some(token) = self.peek().filter(|t| t.is(TokenKind::Atom)) {
            words.push(Word::from(token));
            self.next();
        }
        if words.is_empty() {
            return Err(self.expected_command());
        }
        Ok(Node::Command(words))
    }
}

/// Build the AST for a token sequence produced by
/// [`tokenize`](super::tokenize).
///
/// Succeeds only if every token is consumed. `input_len` is used as the
/// error offset when the problem is at the end of the input; pass the
/// length of the tokenized string.
pub fn parse<'a>(tokens: &[Token<'a>], input_len: usize) -> Result<Node<'a>, ParseError> {
    if tokens.is_empty() {
        return Err(ParseError {
            offset: 0,
            kind: ParseErrorKind::Empty,
        });
    }
    let mut parser = Parser {
        tokens,
        cursor: 0,
        end: input_len,
    };
    let node = parser.full_command()?;
    match parser.peek() {
        None => Ok(node),
        Some(token) => Err(ParseError {
            offset: token.offset,
            kind: ParseErrorKind::TrailingInput {
                found: token.text.to_string(),
            },
        }),
    }
}

/// Tokenize and parse in one step.
pub fn parse_command(input: &str) -> Result<Node<'_>, crate::ShellError> {
    let tokens = super::tokenize(input)?;
    Ok(parse(&tokens, input.len())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::tokenize;

    fn ast(input: &str) -> Node<'_> {
        let tokens = tokenize(input).unwrap();
        parse(&tokens, input.len()).unwrap()
    }

    fn error(input: &str) -> ParseError {
        let tokens = tokenize(input).unwrap();
        parse(&tokens, input.len()).unwrap_err()
    }

    fn argv<'a>(node: &Node<'a>) -> Vec<&'a str> {
        node.words().unwrap().iter().map(|w| w.as_str()).collect()
    }

    #[test]
    fn simple_command() {
        let node = ast("grep -n foo file.txt");
        assert_eq!(argv(&node), vec!["grep", "-n", "foo", "file.txt"]);
    }

    #[test]
    fn pipeline_is_right_chained() {
        let node = ast("a | b x | c");
        let Node::Pipeline(first, rest) = &node else {
            panic!("expected pipeline, got {node:?}");
        };
        assert_eq!(argv(first), vec!["a"]);
        let Node::Pipeline(second, last) = rest.as_ref() else {
            panic!("expected nested pipeline");
        };
        assert_eq!(argv(second), vec!["b", "x"]);
        assert_eq!(argv(last), vec!["c"]);
        assert_eq!(node.stage_count(), 3);
    }

    #[test]
    fn output_redirection() {
        let node = ast("echo hi > out.txt");
        let Node::Redirect {
            direction,
            target,
            inner,
        } = &node
        else {
            panic!("expected redirect, got {node:?}");
        };
        assert_eq!(*direction, Direction::Out);
        assert_eq!(target.as_str(), "out.txt");
        assert_eq!(argv(inner), vec!["echo", "hi"]);
    }

    #[test]
    fn input_redirection_in_pipeline() {
        let node = ast("sort < in.txt | uniq > out.txt");
        assert_eq!(node.to_string(), "sort < in.txt | uniq > out.txt");
    }

    #[test]
    fn sequence_and_background() {
        let node = ast("sleep 5 & echo a ; echo b");
        let Node::Background(job, Some(rest)) = &node else {
            panic!("expected background, got {node:?}");
        };
        assert_eq!(argv(job), vec!["sleep", "5"]);
        assert!(matches!(rest.as_ref(), Node::Sequence(_, Some(_))));
    }

    #[test]
    fn trailing_ampersand_and_semicolon() {
        assert!(matches!(ast("sleep 5 &"), Node::Background(_, None)));
        assert!(matches!(ast("true;"), Node::Sequence(_, None)));
    }

    #[test]
    fn quoted_operator_is_a_word() {
        let node = ast("echo '|' \";\"");
        assert_eq!(argv(&node), vec!["echo", "|", ";"]);
    }

    #[test]
    fn empty_input() {
        assert_eq!(error("   ").kind, ParseErrorKind::Empty);
    }

    #[test]
    fn leading_operator() {
        let err = error("| sort");
        assert_eq!(
            err.kind,
            ParseErrorKind::ExpectedCommand {
                found: TokenKind::Pipe
            }
        );
        assert_eq!(err.offset, 0);
    }

    #[test]
    fn trailing_pipe() {
        let err = error("ls |");
        assert_eq!(
            err.kind,
            ParseErrorKind::ExpectedCommand {
                found: TokenKind::Eol
            }
        );
        assert_eq!(err.offset, 4);
    }

    #[test]
    fn doubled_separator() {
        assert!(matches!(
            error("a ; ; b").kind,
            ParseErrorKind::ExpectedCommand { .. }
        ));
        assert!(matches!(
            error("a & | b").kind,
            ParseErrorKind::ExpectedCommand { .. }
        ));
    }

    #[test]
    fn redirection_needs_target() {
        let err = error("echo hi >");
        assert_eq!(
            err.kind,
            ParseErrorKind::MissingRedirectTarget {
                operator: TokenKind::Greater
            }
        );
        assert_eq!(err.offset, 8);
        assert!(matches!(
            error("cat < | x").kind,
            ParseErrorKind::MissingRedirectTarget { .. }
        ));
    }

    #[test]
    fn second_redirection_is_rejected() {
        let err = error("sort < in.txt > out.txt");
        assert_eq!(
            err.kind,
            ParseErrorKind::TrailingInput { found: ">".into() }
        );
        assert_eq!(err.offset, 14);
    }

    #[test]
    fn words_after_redirect_target_are_rejected() {
        assert!(matches!(
            error("echo > out.txt extra").kind,
            ParseErrorKind::TrailingInput { .. }
        ));
    }

    #[test]
    fn display_round_trips() {
        for line in [
            "ls -la",
            "printf 'a b' | sort",
            "cat < in.txt | wc -l > count.txt",
            "sleep 1 & true",
            "false; true",
            "true;",
            "sleep 5 &",
        ] {
            let rendered = ast(line).to_string();
            assert_eq!(rendered, line);
            assert_eq!(ast(&rendered).to_string(), rendered);
        }
    }

    #[test]
    fn serializes_to_json() {
        let node = ast("echo hi > out.txt");
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["redirect"]["direction"], "out");
        assert_eq!(json["redirect"]["target"]["text"], "out.txt");
        assert_eq!(json["redirect"]["inner"]["command"][1]["text"], "hi");
    }
}
