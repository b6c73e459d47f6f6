//! Short transfer code generation.
//!
//! Codes are drawn uniformly from the 26 uppercase letters, with no digits
//! and no checksum. Uniqueness is only checked against codes that are
//! currently live; expired or consumed codes are free to be drawn again.
//!
//! ## Known weakness
//!
//! Codes are advisory-unique, not unguessable. A 4-letter text code has
//! 26^4 = 456,976 possibilities, so a determined party can brute-force a
//! live code within its 5 minute window. The relay throttles receive
//! attempts; the code length itself stays fixed.

use codedrop_types::{TransferCode, MAX_CODE_LEN};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Letters codes are drawn from.
pub const CODE_ALPHABET: &[u8; 26] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Draws attempted before giving up.
pub const MAX_GENERATION_ATTEMPTS: usize = 10;

/// Every draw collided with a live code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no free {length}-letter code after {attempts} attempts")]
pub struct ExhaustedError {
    /// Code length that was requested
    pub length: usize,
    /// Draws made
    pub attempts: usize,
}

/// Random source for transfer codes.
#[derive(Debug, Clone)]
pub struct CodeGenerator {
    rng: StdRng,
}

impl Default for CodeGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeGenerator {
    /// Create a generator seeded from OS entropy.
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Create a deterministic generator (for tests).
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Draw a single code. `length` is clamped to `1..=MAX_CODE_LEN`.
    pub fn draw(&mut self, length: usize) -> TransferCode {
        let length = length.clamp(1, MAX_CODE_LEN);
        loop {
            let letters: Vec<u8> = (0..length)
                .map(|_| CODE_ALPHABET[self.rng.gen_range(0..CODE_ALPHABET.len())])
                .collect();
            if let Ok(code) = TransferCode::from_letters(&letters) {
                return code;
            }
        }
    }

    /// The bounded sequence of candidate codes for one allocation.
    ///
    /// Yields at most [`MAX_GENERATION_ATTEMPTS`] codes. Async callers that
    /// check liveness against a store iterate this and call
    /// [`CodeDraws::exhausted`] when it runs dry.
    pub fn draws(&mut self, length: usize) -> CodeDraws<'_> {
        CodeDraws {
            generator: self,
            length,
            drawn: 0,
        }
    }

    /// Return the first drawn code that `is_live` does not claim.
    ///
    /// # Errors
    ///
    /// Returns [`ExhaustedError`] when all [`MAX_GENERATION_ATTEMPTS`] draws
    /// collide with live codes.
    pub fn generate<F>(
        &mut self,
        length: usize,
        mut is_live: F,
    ) -> Result<TransferCode, ExhaustedError>
    where
        F: FnMut(&TransferCode) -> bool,
    {
        let mut draws = self.draws(length);
        for code in draws.by_ref() {
            if !is_live(&code) {
                return Ok(code);
            }
        }
        Err(draws.exhausted())
    }
}

/// Iterator over the candidate codes of one allocation.
#[derive(Debug)]
pub struct CodeDraws<'a> {
    generator: &'a mut CodeGenerator,
    length: usize,
    drawn: usize,
}

impl CodeDraws<'_> {
    /// The error to report once every draw has collided.
    pub fn exhausted(&self) -> ExhaustedError {
        ExhaustedError {
            length: self.length,
            attempts: self.drawn,
        }
    }
}

impl Iterator for CodeDraws<'_> {
    type Item = TransferCode;

    fn next(&mut self) -> Option<Self::Item> {
        if self.drawn >= MAX_GENERATION_ATTEMPTS {
            return None;
        }
        self.drawn += 1;
        Some(self.generator.draw(self.length))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = MAX_GENERATION_ATTEMPTS - self.drawn;
        (left, Some(left))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn draws_uppercase_letters_of_requested_length() {
        let mut gen = CodeGenerator::seeded(7);
        for length in [4, 5] {
            for _ in 0..200 {
                let code = gen.draw(length);
                assert_eq!(code.len(), length);
                assert!(code.as_str().bytes().all(|b| b.is_ascii_uppercase()));
            }
        }
    }

    #[test]
    fn seeded_generators_are_deterministic() {
        let mut a = CodeGenerator::seeded(42);
        let mut b = CodeGenerator::seeded(42);
        assert_eq!(a.draw(4), b.draw(4));
        assert_eq!(a.draw(5), b.draw(5));
    }

    #[test]
    fn draws_cover_the_alphabet() {
        let mut gen = CodeGenerator::seeded(1);
        let mut seen = HashSet::new();
        for _ in 0..2_000 {
            seen.insert(gen.draw(1).as_str().to_string());
        }
        assert_eq!(seen.len(), 26);
    }

    #[test]
    fn generate_skips_live_codes() {
        let mut gen = CodeGenerator::seeded(3);
        let mut reference = CodeGenerator::seeded(3);
        let first = reference.draw(4);

        let code = gen.generate(4, |c| *c == first).unwrap();
        assert_ne!(code, first);
    }

    #[test]
    fn generate_returns_first_free_draw() {
        let mut gen = CodeGenerator::seeded(9);
        let mut reference = CodeGenerator::seeded(9);
        let expected = reference.draw(4);

        assert_eq!(gen.generate(4, |_| false).unwrap(), expected);
    }

    #[test]
    fn saturated_space_exhausts_within_budget() {
        let mut gen = CodeGenerator::seeded(11);
        let mut checks = 0;

        let err = gen
            .generate(1, |_| {
                checks += 1;
                true
            })
            .unwrap_err();

        assert_eq!(checks, MAX_GENERATION_ATTEMPTS);
        assert_eq!(
            err,
            ExhaustedError {
                length: 1,
                attempts: MAX_GENERATION_ATTEMPTS
            }
        );
    }

    #[test]
    fn draws_iterator_is_bounded() {
        let mut gen = CodeGenerator::new();
        let draws = gen.draws(5);
        assert_eq!(draws.size_hint(), (MAX_GENERATION_ATTEMPTS, Some(MAX_GENERATION_ATTEMPTS)));
        assert_eq!(draws.count(), MAX_GENERATION_ATTEMPTS);
    }

    #[test]
    fn zero_length_is_clamped() {
        let mut gen = CodeGenerator::seeded(5);
        assert_eq!(gen.draw(0).len(), 1);
        assert_eq!(gen.draw(100).len(), MAX_CODE_LEN);
    }

    #[test]
    fn exhausted_error_display() {
        let err = ExhaustedError {
            length: 4,
            attempts: 10,
        };
        assert_eq!(err.to_string(), "no free 4-letter code after 10 attempts");
    }
}
