use std::fmt;

/// The operator tokens of the command language. Every other token is a word.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Operator {
    RedirectInput,
    RedirectOutput,
    RedirectError,
    Pipe,
    Background,
}

impl Operator {
    pub fn from_token(token: &str) -> Option<Operator> {
        match token {
            "<" => Some(Operator::RedirectInput),
            ">" => Some(Operator::RedirectOutput),
            "2>" => Some(Operator::RedirectError),
            "|" => Some(Operator::Pipe),
            "&" => Some(Operator::Background),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Operator::RedirectInput => "<",
            Operator::RedirectOutput => ">",
            Operator::RedirectError => "2>",
            Operator::Pipe => "|",
            Operator::Background => "&",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "`{}`", self.as_str())
    }
}

/// One side of an optional pipe.
///
/// A redirection that is `None` inherits the shell's own stream.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Segment {
    pub argv: Vec<String>,
    pub stdin: Option<String>,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
}

impl Segment {
    pub fn program(&self) -> &str {
        &self.argv[0]
    }
}

/// Everything the launcher needs to know about one accepted command line.
#[derive(Clone, Debug, PartialEq)]
pub struct JobDescriptor {
    /// Command line, used for messages
    pub input: String,
    pub first: Segment,
    /// Present only when the line contains a pipe
    pub second: Option<Segment>,
    /// Run the job in the background, defaults to false
    pub background: bool,
}

impl JobDescriptor {
    pub fn pipe(&self) -> bool {
        self.second.is_some()
    }
}
