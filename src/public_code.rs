use ring::digest::{digest, SHA256};

/// Width the numeric segment is zero-padded to.
const NUMERIC_WIDTH: usize = 3;
/// Hex characters of the digest kept as the checksum segment.
const CHECKSUM_LEN: usize = 3;

fn checksum(account_id: i64) -> String {
    let hash = digest(&SHA256, account_id.to_string().as_bytes());
    let mut hex = hex::encode(hash.as_ref());
    hex.truncate(CHECKSUM_LEN);
    hex
}

/// Derives the point-of-sale code for an account, e.g. `007-1c5`.
pub fn for_account(account_id: i64) -> String {
    format!("{:0width$}-{}", account_id, checksum(account_id), width = NUMERIC_WIDTH)
}

/// Recovers the account id from a code, rejecting codes whose checksum segment
/// does not match the numeric one.
pub fn verify(code: &str) -> Option<i64> {
    let (numeric, check) = code.trim().split_once('-')?;
    if numeric.is_empty() || !numeric.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let account_id: i64 = numeric.parse().ok()?;
    if account_id <= 0 || !check.eq_ignore_ascii_case(&checksum(account_id)) {
        return None;
    }
    Some(account_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_for_account_is_deterministic() {
        assert_eq!(for_account(42), for_account(42));
        assert!(for_account(7).starts_with("007-"));
        assert_eq!(for_account(7), "007-790");
        assert_eq!(for_account(42), "042-734");
        assert!(for_account(123456).starts_with("123456-"));
    }

    #[test]
    fn test_codes_are_distinct() {
        let mut seen = HashSet::new();
        for id in 1..=10000 {
            let code = for_account(id);
            assert!(seen.insert(code.clone()), "duplicate code {} for id {}", code, id);
        }
    }

    #[test]
    fn test_verify() {
        for id in [1, 9, 10, 999, 1000, 65535] {
            assert_eq!(verify(&for_account(id)), Some(id));
        }
        assert_eq!(verify(&for_account(5).to_uppercase()), Some(5));
        assert_eq!(verify(" 005-"), None);
        assert_eq!(verify("abc"), None);
        assert_eq!(verify("000-000"), None);

        // a guessed neighbour with a copied checksum is rejected
        let forged = format!("{:03}-{}", 11, &for_account(10)[4..]);
        assert_ne!(forged, for_account(11));
        assert_eq!(verify(&forged), None);
    }
}
