//! Yash Parser
//!
//! Grammar, with `<`, `>`, `2>`, `|` and `&` as operators and every other
//! token as a word:
//!
//! ```text
//! line     := segment ('|' segment)? '&'?
//! segment  := (word | redirect)+
//! redirect := ('<' | '>' | '2>') word
//! ```
//!
//! A segment must start with a word, and a repeated redirection of the same
//! stream within one segment replaces the earlier one.

use std::fmt;

pub use self::ast::{JobDescriptor, Operator, Segment};

use crate::core::tokenizer::Tokenizer;
use crate::errors::{Error, ErrorKind, Result};

pub mod ast;

/// The ways operator placement can be malformed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SyntaxError {
    /// The operator has no preceding word in its segment
    LeadingOperator(Operator),
    /// The operator is the last token of the line
    TrailingOperator(Operator),
    /// The operator is directly followed by another operator
    MissingOperand(Operator),
    /// `&` appears anywhere but at the end of the line
    MisplacedBackground,
    /// More than one `|`
    ExtraPipe,
    /// The line holds no token at all
    Empty,
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            SyntaxError::LeadingOperator(op) => write!(f, "command must not start with {}", op),
            SyntaxError::TrailingOperator(op) => write!(f, "command must not end with {}", op),
            SyntaxError::MissingOperand(op) => write!(f, "near token {}", op),
            SyntaxError::MisplacedBackground => write!(
                f,
                "{} must be the last token of the command",
                Operator::Background
            ),
            SyntaxError::ExtraPipe => {
                write!(f, "only one {} per command is supported", Operator::Pipe)
            }
            SyntaxError::Empty => write!(f, "empty command"),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Parser {
    tokenizer: Tokenizer,
    max_line_len: usize,
}

impl Parser {
    pub fn new(max_line_len: usize, max_tokens: usize) -> Self {
        Self {
            tokenizer: Tokenizer::new(max_tokens),
            max_line_len,
        }
    }

    /// Parse `input` according to the yash grammar.
    ///
    /// Parsing stops at the first malformed operator; on success the first
    /// segment always holds at least the program name.
    pub fn parse(&self, input: &str) -> Result<JobDescriptor> {
        let input = input.trim();
        if input.chars().count() > self.max_line_len {
            return Err(ErrorKind::LineTooLong(self.max_line_len).into());
        }

        let tokens = self.tokenizer.tokenize(input)?;
        let last = tokens.len().saturating_sub(1);
        let mut first = Segment::default();
        let mut second: Option<Segment> = None;
        let mut background = false;

        let mut i = 0;
        while i < tokens.len() {
            let current = second.as_mut().unwrap_or(&mut first);
            let op = match Operator::from_token(&tokens[i]) {
                Some(op) => op,
                None => {
                    current.argv.push(tokens[i].to_string());
                    i += 1;
                    continue;
                }
            };

            if op == Operator::Background {
                if i != last {
                    return Err(Error::syntax(SyntaxError::MisplacedBackground));
                }
                if current.argv.is_empty() {
                    return Err(Error::syntax(SyntaxError::LeadingOperator(op)));
                }
                background = true;
                i += 1;
                continue;
            }

            if current.argv.is_empty() {
                return Err(Error::syntax(SyntaxError::LeadingOperator(op)));
            } else if i == last {
                return Err(Error::syntax(SyntaxError::TrailingOperator(op)));
            } else if Operator::from_token(&tokens[i + 1]).is_some() {
                return Err(Error::syntax(SyntaxError::MissingOperand(op)));
            }

            let operand = tokens[i + 1].to_string();
            match op {
                Operator::RedirectInput => current.stdin = Some(operand),
                Operator::RedirectOutput => current.stdout = Some(operand),
                Operator::RedirectError => current.stderr = Some(operand),
                Operator::Pipe => {
                    if second.is_some() {
                        return Err(Error::syntax(SyntaxError::ExtraPipe));
                    }
                    // the word after `|` starts the second segment
                    second = Some(Segment::default());
                    i += 1;
                    continue;
                }
                Operator::Background => unreachable!(),
            }
            i += 2;
        }

        if first.argv.is_empty() {
            return Err(Error::syntax(SyntaxError::Empty));
        }

        let job = JobDescriptor {
            input: input.to_string(),
            first,
            second,
            background,
        };
        debug!("parsed job: {:?}", job);
        Ok(job)
    }
}

impl Default for Parser {
    fn default() -> Self {
        Parser::new(2000, 1000)
    }
}
