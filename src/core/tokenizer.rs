//! Splits a command line into whitespace-delimited tokens.

use std::ops::Index;
use std::slice;

use crate::errors::{ErrorKind, Result};

/// Owned tokens of one command line.
///
/// Tokens never borrow from the line they were produced from, so the original
/// text can be kept around for display while the tokens are consumed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Tokens(Vec<String>);

impl Tokens {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> slice::Iter<'_, String> {
        self.0.iter()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.0.get(index).map(String::as_str)
    }

    /// Joins the tokens with single spaces.
    pub fn join(&self) -> String {
        self.0.join(" ")
    }
}

impl Index<usize> for Tokens {
    type Output = str;

    fn index(&self, index: usize) -> &str {
        &self.0[index]
    }
}

impl<'a> IntoIterator for &'a Tokens {
    type Item = &'a String;
    type IntoIter = slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl IntoIterator for Tokens {
    type Item = String;
    type IntoIter = ::std::vec::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Tokenizer {
    max_tokens: usize,
}

impl Tokenizer {
    pub fn new(max_tokens: usize) -> Self {
        Self { max_tokens }
    }

    /// Splits `line` into maximal runs of non-whitespace characters.
    ///
    /// A trailing newline is treated like any other whitespace. Fails with
    /// `TokenLimitExceeded` instead of truncating when the line holds more than
    /// `max_tokens` tokens.
    pub fn tokenize(&self, line: &str) -> Result<Tokens> {
        let mut tokens = Vec::new();
        for word in line.split_whitespace() {
            if tokens.len() == self.max_tokens {
                return Err(ErrorKind::TokenLimitExceeded(self.max_tokens).into());
            }
            tokens.push(word.to_string());
        }

        trace!("tokenized {:?} into {} tokens", line, tokens.len());
        Ok(Tokens(tokens))
    }
}
