use chrono::{NaiveDate, Utc};
use sha2::{Digest, Sha256};

/// Derives the privacy-preserving visitor hash for the current UTC day.
///
/// The digest input is `ip:user_agent:YYYY-MM-DD`, so the identifier rotates
/// every calendar day and the same visitor cannot be tracked across days.
/// Raw IP and User-Agent never reach storage; only this hash does. Collisions
/// between distinct visitors are acceptable.
pub fn visitor_hash(ip: &str, user_agent: &str) -> String {
    visitor_hash_for_date(ip, user_agent, Utc::now().date_naive())
}

/// Date-explicit variant of [`visitor_hash`]. Pure and deterministic.
pub fn visitor_hash_for_date(ip: &str, user_agent: &str, date: NaiveDate) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ip.as_bytes());
    hasher.update(b":");
    hasher.update(user_agent.as_bytes());
    hasher.update(b":");
    hasher.update(date.format("%Y-%m-%d").to_string().as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    const UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) Chrome/120.0";

    #[test]
    fn test_same_day_is_deterministic() {
        let day = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();
        let a = visitor_hash_for_date("203.0.113.7", UA, day);
        let b = visitor_hash_for_date("203.0.113.7", UA, day);
        assert_eq!(a, b);
    }

    #[test]
    fn test_hash_rotates_daily() {
        let monday = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let tuesday = NaiveDate::from_ymd_opt(2025, 3, 11).unwrap();
        let a = visitor_hash_for_date("203.0.113.7", UA, monday);
        let b = visitor_hash_for_date("203.0.113.7", UA, tuesday);
        assert_ne!(a, b);
    }

    #[test]
    fn test_distinct_visitors_differ() {
        let day = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();
        let a = visitor_hash_for_date("203.0.113.7", UA, day);
        let b = visitor_hash_for_date("203.0.113.8", UA, day);
        let c = visitor_hash_for_date("203.0.113.7", "curl/8.0", day);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_output_is_sha256_hex() {
        let day = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();
        let hash = visitor_hash_for_date("203.0.113.7", UA, day);
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
