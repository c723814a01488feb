use rand::rngs::OsRng;
use rand::Rng;

const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz1234567890";

pub const IDENTIFIER_LENGTH: usize = 7;

/// Short random identifier from the OS random source.
///
/// Collisions are unlikely but not excluded; callers check for duplicates.
pub fn generate_identifier() -> String {
    (0..IDENTIFIER_LENGTH)
        .map(|_| ALPHABET[OsRng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_identifier_shape() {
        let id = generate_identifier();
        assert_eq!(id.len(), IDENTIFIER_LENGTH);
        assert!(id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_identifiers_differ() {
        let ids: HashSet<String> = (0..100).map(|_| generate_identifier()).collect();
        assert!(ids.len() > 95);
    }
}
