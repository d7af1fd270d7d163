//! The line grammar: which lines are ledgered and how they split into
//! columns.

use crate::error::LogError;

/// How a text log is carved into ledgerable rows and columns.
///
/// A line is ledgerable when, after trimming leading whitespace, it is
/// non-empty and does not start with a comment-prefix character. Ledgerable
/// lines split into string columns on the delimiter characters; with no
/// delimiters configured, tokens split on whitespace. Both character sets
/// are ASCII so they round-trip through the single-byte header fields of the
/// tracking files.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LogFormat {
    comment_prefixes: String,
    delimiters: String,
}

impl LogFormat {
    /// Build a format from its comment-prefix and delimiter characters.
    ///
    /// # Errors
    /// [`LogError::InvalidFormat`] if either set contains a non-ASCII
    /// character or more than 255 of them.
    pub fn new(comment_prefixes: &str, delimiters: &str) -> Result<Self, LogError> {
        for (name, chars) in [
            ("comment-prefix set", comment_prefixes),
            ("delimiter set", delimiters),
        ] {
            if !chars.is_ascii() {
                return Err(LogError::InvalidFormat {
                    section: "log format",
                    detail: format!("{name} must be ASCII"),
                });
            }
            if chars.len() > usize::from(u8::MAX) {
                return Err(LogError::InvalidFormat {
                    section: "log format",
                    detail: format!("{name} holds more than 255 characters"),
                });
            }
        }
        Ok(Self {
            comment_prefixes: comment_prefixes.to_owned(),
            delimiters: delimiters.to_owned(),
        })
    }

    /// The comment-prefix characters.
    #[must_use]
    pub fn comment_prefixes(&self) -> &str {
        &self.comment_prefixes
    }

    /// The delimiter characters; empty means whitespace splitting.
    #[must_use]
    pub fn delimiters(&self) -> &str {
        &self.delimiters
    }

    /// Whether `line` contributes a row to the ledger.
    #[must_use]
    pub fn is_ledgerable(&self, line: &str) -> bool {
        let trimmed = line.trim_start();
        match trimmed.chars().next() {
            None => false,
            Some(first) => !self.comment_prefixes.contains(first),
        }
    }

    /// Split a ledgerable line into its column tokens.
    ///
    /// Empty tokens (between adjacent delimiters) are dropped, matching
    /// whitespace splitting; a line of nothing but delimiters yields no
    /// tokens and is skipped by the replay even when ledgerable.
    #[must_use]
    pub fn tokens<'a>(&self, line: &'a str) -> Vec<&'a str> {
        let line = line.trim_end_matches(['\r', '\n']);
        if self.delimiters.is_empty() {
            line.split_whitespace().collect()
        } else {
            line.split(|c: char| self.delimiters.contains(c))
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .collect()
        }
    }
}
