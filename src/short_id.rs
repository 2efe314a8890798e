//! URL-safe opaque identifier generation

use rand::{rngs::OsRng, seq::SliceRandom};

/// 57-character alphabet excluding visually ambiguous glyphs
/// (no `0/O`, `1/l/I`, no padding characters).
const ALPHABET: &[u8] = b"23456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Generate a short id of the given length drawn uniformly from [ALPHABET].
pub fn generate(length: usize) -> String {
    let mut rng = OsRng;
    (0..length)
        .map(|_| *ALPHABET.choose(&mut rng).expect("alphabet is non-empty") as char)
        .collect()
}

/// Short id for public-facing File records; length is configurable (default 6).
pub fn generate_file_id(length: usize) -> String {
    generate(length)
}

/// Short id for in-progress Upload records; fixed at 12 characters per spec §3.
pub fn generate_upload_id() -> String {
    generate(12)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_requested_length() {
        assert_eq!(generate(6).len(), 6);
        assert_eq!(generate_upload_id().len(), 12);
    }

    #[test]
    fn only_uses_alphabet_characters() {
        let id = generate(256);
        assert!(id.bytes().all(|b| ALPHABET.contains(&b)));
    }

    #[test]
    fn excludes_ambiguous_glyphs() {
        for ambiguous in ['0', 'O', '1', 'l', 'I'] {
            assert!(!ALPHABET.contains(&(ambiguous as u8)));
        }
    }
}
