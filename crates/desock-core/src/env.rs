//! Environment variable utilities
//!
//! Generic `env_get<T>` parsing with defaults, plus the C-style integer
//! parser used for the packet channel id.
//!
//! # Usage
//!
//! ```ignore
//! use desock_core::env::{env_get, env_get_bool};
//!
//! let max_conns: usize = env_get("DESOCK_MAX_CONNS", 8);
//! let echo: bool = env_get_bool("DESOCK_ECHO_IO", false);
//! ```

use std::str::FromStr;

/// Get environment variable parsed as type T, or return default
///
/// Unset or unparsable values fall back to `default`.
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Get environment variable as boolean
///
/// Accepts: "1", "true", "yes", "on" (case-insensitive) as true.
/// Any other value is false; unset returns the default.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => matches!(val.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

/// Get environment variable as optional value
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Check if environment variable is set (regardless of value)
#[inline]
pub fn env_is_set(key: &str) -> bool {
    std::env::var_os(key).is_some()
}

/// Parse an unsigned integer the way `strtoul(s, NULL, 0)` picks its base:
/// `0x`/`0X` prefix is hex, a leading `0` is octal, anything else decimal.
///
/// Unlike `strtoul`, trailing garbage and empty input are rejected.
pub fn parse_c_ulong(raw: &str) -> Option<u64> {
    let s = raw.trim();
    let s = s.strip_prefix('+').unwrap_or(s);

    let (digits, radix) = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        (hex, 16)
    } else if s.len() > 1 && s.starts_with('0') {
        (&s[1..], 8)
    } else {
        (s, 10)
    };

    if digits.is_empty() || digits.starts_with(['+', '-']) {
        return None;
    }
    u64::from_str_radix(digits, radix).ok()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_get_default() {
        let val: usize = env_get("__DESOCK_TEST_UNSET_VAR__", 42);
        assert_eq!(val, 42);

        let val: Option<usize> = env_get_opt("__DESOCK_TEST_UNSET_VAR__");
        assert!(val.is_none());
        assert!(!env_is_set("__DESOCK_TEST_UNSET_VAR__"));
    }

    #[test]
    fn test_env_get_with_set_var() {
        std::env::set_var("__DESOCK_TEST_NUM__", " 123 ");
        let val: usize = env_get("__DESOCK_TEST_NUM__", 0);
        assert_eq!(val, 123);

        std::env::set_var("__DESOCK_TEST_NUM__", "many");
        let val: usize = env_get("__DESOCK_TEST_NUM__", 7);
        assert_eq!(val, 7);
        std::env::remove_var("__DESOCK_TEST_NUM__");
    }

    #[test]
    fn test_env_get_bool_variants() {
        for (raw, expected) in [("1", true), ("TRUE", true), ("on", true), ("0", false), ("garbage", false)] {
            std::env::set_var("__DESOCK_TEST_BOOL__", raw);
            assert_eq!(env_get_bool("__DESOCK_TEST_BOOL__", !expected), expected, "{}", raw);
        }
        std::env::remove_var("__DESOCK_TEST_BOOL__");
        assert!(env_get_bool("__DESOCK_TEST_BOOL__", true));
    }

    #[test]
    fn test_parse_c_ulong_bases() {
        assert_eq!(parse_c_ulong("32769"), Some(32769));
        assert_eq!(parse_c_ulong("0x8001"), Some(0x8001));
        assert_eq!(parse_c_ulong("0X1f"), Some(31));
        assert_eq!(parse_c_ulong("017"), Some(15));
        assert_eq!(parse_c_ulong("0"), Some(0));
        assert_eq!(parse_c_ulong(" +12\n"), Some(12));
    }

    #[test]
    fn test_parse_c_ulong_rejects() {
        assert_eq!(parse_c_ulong(""), None);
        assert_eq!(parse_c_ulong("0x"), None);
        assert_eq!(parse_c_ulong("09"), None);
        assert_eq!(parse_c_ulong("12abc"), None);
        assert_eq!(parse_c_ulong("-1"), None);
        assert_eq!(parse_c_ulong("0x-1"), None);
    }
}
