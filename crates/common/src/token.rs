//! Candidate invite token
//!
//! Layout (6 ASCII bytes):
//!
//! | index | content              |
//! |-------|----------------------|
//! | 0     | `'0'`                |
//! | 1     | uppercase letter     |
//! | 2, 4  | digit `1..=9`        |
//! | 3, 5  | uppercase letter     |

use std::fmt;
use std::str::FromStr;

use rand::RngExt;

use crate::error::{Error, Result};

/// Length of every token in bytes.
pub const TOKEN_LEN: usize = 6;

const LETTERS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &[u8] = b"123456789";

/// A candidate token. Always satisfies the layout above.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Token(String);

impl Token {
    /// Validate and wrap a token read from outside (record files, tests).
    pub fn parse(raw: &str) -> Result<Self> {
        let invalid = |reason| Error::InvalidToken {
            token: raw.to_string(),
            reason,
        };

        let bytes = raw.as_bytes();
        if bytes.len() != TOKEN_LEN {
            return Err(invalid("must be exactly 6 ASCII characters"));
        }
        if bytes[0] != b'0' {
            return Err(invalid("must start with '0'"));
        }
        for (i, b) in bytes.iter().enumerate().skip(1) {
            let ok = match i {
                2 | 4 => DIGITS.contains(b),
                _ => b.is_ascii_uppercase(),
            };
            if !ok {
                return Err(invalid(match i {
                    2 | 4 => "positions 2 and 4 must be digits 1-9",
                    _ => "positions 1, 3 and 5 must be uppercase letters",
                }));
            }
        }

        Ok(Self(raw.to_string()))
    }

    /// Draw a fresh token. No uniqueness guarantee between calls.
    pub fn random(rng: &mut impl RngExt) -> Self {
        let mut bytes = [b'0'; TOKEN_LEN];
        bytes[1] = pick(rng, LETTERS);
        bytes[2] = pick(rng, DIGITS);
        bytes[3] = pick(rng, LETTERS);
        bytes[4] = pick(rng, DIGITS);
        bytes[5] = pick(rng, LETTERS);
        Self(bytes.iter().map(|&b| b as char).collect())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn pick(rng: &mut impl RngExt, set: &[u8]) -> u8 {
    set[rng.random_range(0..set.len())]
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Token {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl AsRef<str> for Token {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
