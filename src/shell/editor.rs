use std::fmt;

use rustyline::{self, error::ReadlineError, Config};

use super::LineSource;
use crate::errors::Result;

/// Line editor backed by rustyline, with an in-memory command history.
pub struct Editor {
    internal: rustyline::Editor<()>,
    history_capacity: usize,
}

impl Editor {
    pub fn with_capacity(history_capacity: usize) -> Editor {
        let config = Config::builder()
            .max_history_size(history_capacity)
            .history_ignore_space(true)
            .auto_add_history(false)
            .build();

        Editor {
            internal: rustyline::Editor::with_config(config),
            history_capacity,
        }
    }

    pub fn add_history_entry(&mut self, line: &str) {
        if self.history_capacity > 0 {
            self.internal.add_history_entry(line);
        }
    }
}

impl LineSource for Editor {
    /// An interrupted read yields an empty line, so the prompt is redrawn.
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>> {
        match self.internal.readline(prompt) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    self.add_history_entry(line.trim());
                }
                Ok(Some(line))
            }
            Err(ReadlineError::Eof) => Ok(None),
            Err(ReadlineError::Interrupted) => Ok(Some(String::new())),
            Err(e) => Err(e.into()),
        }
    }
}

impl fmt::Debug for Editor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "count: {}", self.internal.history().len())?;
        writeln!(f, "capacity: {}", self.history_capacity)
    }
}
