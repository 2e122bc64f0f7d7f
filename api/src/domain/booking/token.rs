//! Booking counter marks.

use rand::Rng;

/// Number of characters in a booking token.
pub const BOOKING_TOKEN_LENGTH: usize = 6;

const TOKEN_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Source of candidate booking tokens.
#[cfg_attr(test, mockall::automock)]
pub trait TokenGenerator: Send + Sync {
    /// Produce a candidate token; uniqueness is checked by the caller.
    fn generate(&self) -> String;
}

/// Uniformly random uppercase alphanumeric tokens.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomTokenGenerator;

impl TokenGenerator for RandomTokenGenerator {
    fn generate(&self) -> String {
        let mut rng = rand::thread_rng();
        (0..BOOKING_TOKEN_LENGTH)
            .filter_map(|_| {
                let index = rng.gen_range(0..TOKEN_ALPHABET.len());
                TOKEN_ALPHABET.get(index).copied().map(char::from)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn random_tokens_are_six_uppercase_alphanumerics() {
        let token = RandomTokenGenerator.generate();

        assert_eq!(token.len(), BOOKING_TOKEN_LENGTH);
        assert!(token
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }
}
