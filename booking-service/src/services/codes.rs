//! Ticket and token code generators.
//!
//! Uniqueness is enforced by database constraints; callers retry on a
//! collision.

use rand::{Rng, RngCore, rngs::OsRng};

/// Alphabet for human-typed codes. Omits 0/O and 1/I.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const ALPHANUMERIC_CODE_LENGTH: usize = 8;
pub const REFERRAL_CODE_PREFIX: &str = "REF";

fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    OsRng.fill_bytes(&mut buf);
    hex::encode(buf)
}

fn random_from_alphabet(len: usize) -> String {
    let mut rng = OsRng;
    (0..len)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Opaque QR payload key, 128 bits as hex.
pub fn generate_qr_token() -> String {
    random_hex(16)
}

/// Backup code printed under the QR image.
pub fn generate_alphanumeric_code() -> String {
    random_from_alphabet(ALPHANUMERIC_CODE_LENGTH)
}

/// One-time token for the public reschedule resolution link.
pub fn generate_reschedule_token() -> String {
    random_hex(32)
}

pub fn generate_referral_code() -> String {
    format!("{}{}", REFERRAL_CODE_PREFIX, random_from_alphabet(6))
}

/// Normalise a user-typed code for lookup.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_qr_token_format() {
        let token = generate_qr_token();
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_alphanumeric_code_format() {
        for _ in 0..100 {
            let code = generate_alphanumeric_code();
            assert_eq!(code.len(), ALPHANUMERIC_CODE_LENGTH);
            assert!(code.bytes().all(|b| CODE_ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn test_codes_are_distinct() {
        let codes: HashSet<String> = (0..1000).map(|_| generate_alphanumeric_code()).collect();
        assert_eq!(codes.len(), 1000);
        assert_ne!(generate_qr_token(), generate_qr_token());
    }

    #[test]
    fn test_reschedule_token_length() {
        assert_eq!(generate_reschedule_token().len(), 64);
    }

    #[test]
    fn test_referral_code_format() {
        let code = generate_referral_code();
        assert!(code.starts_with(REFERRAL_CODE_PREFIX));
        assert_eq!(code.len(), REFERRAL_CODE_PREFIX.len() + 6);
    }

    #[test]
    fn test_normalize_code() {
        assert_eq!(normalize_code("  spring20 "), "SPRING20");
    }
}
