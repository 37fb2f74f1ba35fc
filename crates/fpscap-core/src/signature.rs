//! Wildcard byte signatures for scanning module images.

use std::fmt;

use crate::error::{Error, Result};

/// An immutable byte-or-wildcard pattern, written as space-separated hex
/// tokens with `??` for wildcard positions, e.g. `"7F 0F 8B 05 ?? ?? ?? ??"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    tokens: Vec<Option<u8>>,
}

impl Signature {
    pub fn parse(pattern: &str) -> Result<Self> {
        let mut tokens = Vec::new();
        for token in pattern.split_whitespace() {
            if token == "??" || token == "?" {
                tokens.push(None);
                continue;
            }

            let value = u8::from_str_radix(token, 16).map_err(|e| {
                Error::InvalidSignature(format!("invalid token '{token}': {e}"))
            })?;
            tokens.push(Some(value));
        }

        if tokens.is_empty() {
            return Err(Error::InvalidSignature("pattern is empty".to_string()));
        }

        Ok(Self { tokens })
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Offset of the first match in `buffer`, if any.
    ///
    /// Candidate positions are prefiltered with `memchr` on the first fixed
    /// byte of the pattern; a fully wildcarded pattern falls back to a plain
    /// walk.
    pub fn find(&self, buffer: &[u8]) -> Option<usize> {
        self.find_iter(buffer).next()
    }

    /// All match offsets in `buffer`, in ascending order.
    pub fn find_all(&self, buffer: &[u8]) -> Vec<usize> {
        self.find_iter(buffer).collect()
    }

    fn find_iter<'a>(&'a self, buffer: &'a [u8]) -> Box<dyn Iterator<Item = usize> + 'a> {
        if buffer.len() < self.tokens.len() {
            return Box::new(std::iter::empty());
        }
        let last = buffer.len() - self.tokens.len();

        match self.first_fixed() {
            Some((anchor_offset, anchor_byte)) => Box::new(
                memchr::memchr_iter(anchor_byte, buffer)
                    .filter_map(move |pos| pos.checked_sub(anchor_offset))
                    .filter(move |start| *start <= last)
                    .filter(move |start| self.matches_at(buffer, *start)),
            ),
            None => Box::new((0..=last).filter(move |start| self.matches_at(buffer, *start))),
        }
    }

    fn first_fixed(&self) -> Option<(usize, u8)> {
        self.tokens
            .iter()
            .enumerate()
            .find_map(|(i, t)| t.map(|b| (i, b)))
    }

    fn matches_at(&self, buffer: &[u8], start: usize) -> bool {
        self.tokens.iter().enumerate().all(|(i, token)| match token {
            Some(value) => buffer[start + i] == *value,
            None => true,
        })
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let formatted = self
            .tokens
            .iter()
            .map(|b| match b {
                Some(value) => format!("{value:02X}"),
                None => "??".to_string(),
            })
            .collect::<Vec<_>>()
            .join(" ");
        f.write_str(&formatted)
    }
}
