//! Token generation

use common::Token;

/// Source of candidate tokens.
///
/// Implementations have no knowledge of what was already tried; the
/// scheduler regenerates when a claim fails.
pub trait Generate: Send {
    fn generate(&mut self) -> Token;
}

/// Draws from the thread-local RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomGenerator;

impl Generate for RandomGenerator {
    fn generate(&mut self) -> Token {
        Token::random(&mut rand::rng())
    }
}
