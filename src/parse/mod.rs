pub mod parser;
pub mod tokenize;
pub mod types;

pub use parser::{ParseError, ParseErrorKind, parse, parse_command};
pub use tokenize::{LexError, LexErrorKind, Lexer, tokenize};
pub use types::{Direction, Node, Token, TokenKind, Word};
