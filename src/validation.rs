use anyhow::{anyhow, Result};
use regex::Regex;
use std::sync::OnceLock;

/// Largest number of labels the top-products report may return
pub const MAX_TOP_LIMIT: i64 = 100;

/// Longest accepted free-text search query
pub const MAX_QUERY_LENGTH: usize = 256;

fn channel_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // Telegram public usernames: letters, digits and underscores
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_]{1,64}$").expect("channel name pattern is valid"))
}

/// Validation utilities for input sanitization and edge case handling
#[derive(Debug, Copy, Clone)]
pub struct InputValidator;

impl InputValidator {
    /// Validate a channel username.
    ///
    /// Channel names become directory names in the data lake, so anything
    /// outside the username alphabet (path separators, dots) is refused.
    pub fn validate_channel_name(name: &str) -> Result<()> {
        if name.trim().is_empty() {
            return Err(anyhow!("Channel name cannot be empty"));
        }

        if !channel_name_pattern().is_match(name) {
            return Err(anyhow!(
                "Invalid channel name '{}': only letters, digits and underscores (max 64)",
                name
            ));
        }

        Ok(())
    }

    /// Validate a free-text search query
    pub fn validate_search_query(query: &str) -> Result<()> {
        if query.trim().is_empty() {
            return Err(anyhow!("Search query cannot be empty"));
        }

        if query.chars().count() > MAX_QUERY_LENGTH {
            return Err(anyhow!(
                "Search query too long (max {} characters)",
                MAX_QUERY_LENGTH
            ));
        }

        if query.contains('\0') {
            return Err(anyhow!("Search query contains invalid characters"));
        }

        Ok(())
    }

    /// Validate the requested size of the top-products report
    pub fn validate_top_limit(limit: i64) -> Result<()> {
        if !(1..=MAX_TOP_LIMIT).contains(&limit) {
            return Err(anyhow!(
                "limit must be between 1 and {} (got {})",
                MAX_TOP_LIMIT,
                limit
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_names() {
        assert!(InputValidator::validate_channel_name("tikvahpharma").is_ok());
        assert!(InputValidator::validate_channel_name("demo_2").is_ok());
        assert!(InputValidator::validate_channel_name("").is_err());
        assert!(InputValidator::validate_channel_name("../etc").is_err());
        assert!(InputValidator::validate_channel_name("a/b").is_err());
    }

    #[test]
    fn test_top_limit_bounds() {
        assert!(InputValidator::validate_top_limit(1).is_ok());
        assert!(InputValidator::validate_top_limit(100).is_ok());
        assert!(InputValidator::validate_top_limit(0).is_err());
        assert!(InputValidator::validate_top_limit(101).is_err());
        assert!(InputValidator::validate_top_limit(-5).is_err());
    }
}
