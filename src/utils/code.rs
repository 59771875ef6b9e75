// src/utils/code.rs

use std::sync::LazyLock;

use chrono::Utc;
use rand::Rng;
use regex::Regex;

use crate::config::{DEVICE_TOKEN_SUFFIX_LEN, QUIZ_CODE_LEN};

const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const BASE36_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

static QUIZ_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9]{6}$").expect("quiz code pattern is valid"));

/// True when `raw` has the shape of a share code (case-insensitive).
pub fn is_quiz_code(raw: &str) -> bool {
    QUIZ_CODE_RE.is_match(raw)
}

fn random_string(alphabet: &[u8], len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| alphabet[rng.gen_range(0..alphabet.len())] as char)
        .collect()
}

/// Generates a fresh 6-character share code (`A-Z0-9`).
pub fn generate_quiz_code() -> String {
    random_string(CODE_ALPHABET, QUIZ_CODE_LEN)
}

/// Generates a device token: `<unix-millis>-<9 base36 chars>`.
/// Only a weak duplicate signal; it is not cryptographically secure.
pub fn generate_device_token() -> String {
    format!(
        "{}-{}",
        Utc::now().timestamp_millis(),
        random_string(BASE36_ALPHABET, DEVICE_TOKEN_SUFFIX_LEN)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_codes_match_the_code_shape() {
        for _ in 0..50 {
            let code = generate_quiz_code();
            assert!(is_quiz_code(&code), "{code}");
            assert_eq!(code, code.to_uppercase());
        }
    }

    #[test]
    fn code_shape() {
        assert!(is_quiz_code("ab12CD"));
        assert!(!is_quiz_code("ab12C"));
        assert!(!is_quiz_code("ab12CD7"));
        assert!(!is_quiz_code("ab-2CD"));
    }

    #[test]
    fn device_token_layout() {
        let token = generate_device_token();
        let (millis, suffix) = token.split_once('-').unwrap();
        assert!(millis.parse::<i64>().is_ok());
        assert_eq!(suffix.len(), DEVICE_TOKEN_SUFFIX_LEN);
        assert!(suffix.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }
}
