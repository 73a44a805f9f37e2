//! Room-code generator: 4-letter uppercase codes, unique against a
//! persisted used-set. Allocation happens under the same lock that owns
//! the used-set, generalized from a monotonic counter to a randomly drawn
//! code with bounded retry.

use rand::Rng;
use std::collections::HashSet;

const CODE_LEN: usize = 4;
const MAX_ATTEMPTS: usize = 10_000;

/// Draw a random 4-letter uppercase code not present in `used`. `used`
/// should hold every code ever allocated (the coordinator's `usedCodes`
/// map), not just currently-active ones, so codes are never reused even
/// after a room is deleted.
pub fn generate_unique_code(used: &HashSet<String>, rng: &mut impl Rng) -> Option<String> {
    for _ in 0..MAX_ATTEMPTS {
        let candidate = random_code(rng);
        if !used.contains(&candidate) {
            return Some(candidate);
        }
    }
    None
}

fn random_code(rng: &mut impl Rng) -> String {
    (0..CODE_LEN)
        .map(|_| (b'A' + rng.random_range(0..26)) as char)
        .collect()
}

/// Normalize a client-supplied room code: uppercase, and validate it is
/// exactly 4 Latin letters.
pub fn normalize_room_code(raw: &str) -> Option<String> {
    if raw.chars().count() != CODE_LEN {
        return None;
    }
    if !raw.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    Some(raw.to_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn generated_codes_match_pattern() {
        let mut rng = StdRng::seed_from_u64(1);
        let used = HashSet::new();
        let code = generate_unique_code(&used, &mut rng).unwrap();
        assert_eq!(code.len(), 4);
        assert!(code.chars().all(|c| c.is_ascii_uppercase()));
    }

    #[test]
    fn never_returns_a_used_code() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut used = HashSet::new();
        for _ in 0..50 {
            let code = generate_unique_code(&used, &mut rng).unwrap();
            assert!(!used.contains(&code));
            used.insert(code);
        }
    }

    #[test]
    fn normalize_accepts_lowercase_and_rejects_bad_shapes() {
        assert_eq!(normalize_room_code("abcd"), Some("ABCD".to_string()));
        assert_eq!(normalize_room_code("ABCD"), Some("ABCD".to_string()));
        assert_eq!(normalize_room_code("abc"), None);
        assert_eq!(normalize_room_code("ab1d"), None);
        assert_eq!(normalize_room_code("abcde"), None);
    }
}
