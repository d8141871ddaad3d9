//! Environment variable helpers.

use std::str::FromStr;
use std::sync::OnceLock;

static ENV_PATTERN: OnceLock<Option<regex_lite::Regex>> = OnceLock::new();

/// Expand ${VAR_NAME} patterns with environment variable values.
/// Unknown variables are left untouched.
pub fn expand_env(s: &str) -> String {
    let Some(re) = ENV_PATTERN
        .get_or_init(|| regex_lite::Regex::new(r"\$\{([^}]+)\}").ok())
        .as_ref()
    else {
        return s.to_string();
    };

    let mut result = s.to_string();
    for cap in re.captures_iter(s) {
        if let (Some(full_match), Some(var_match)) = (cap.get(0), cap.get(1)) {
            if let Ok(value) = std::env::var(var_match.as_str()) {
                result = result.replace(full_match.as_str(), &value);
            }
        }
    }
    result
}

/// Overwrite `slot` with the parsed value of `name`, if set and valid.
pub fn env_override<T: FromStr>(name: &str, slot: &mut T) {
    let Ok(raw) = std::env::var(name) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(value) => *slot = value,
        Err(_) => tracing::warn!(var = name, value = %raw, "Ignoring unparseable environment override"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env() {
        // Use unique var name to avoid conflicts with parallel tests
        std::env::set_var("SENTINEL_EXPAND_TEST_VAR", "test_value");
        assert_eq!(expand_env("${SENTINEL_EXPAND_TEST_VAR}"), "test_value");
        assert_eq!(
            expand_env("redis://${SENTINEL_EXPAND_TEST_VAR}:6379"),
            "redis://test_value:6379"
        );
        assert_eq!(expand_env("no_vars"), "no_vars");
        assert_eq!(expand_env("${SENTINEL_UNSET_VAR}"), "${SENTINEL_UNSET_VAR}");
        std::env::remove_var("SENTINEL_EXPAND_TEST_VAR");
    }

    #[test]
    fn test_env_override_parses() {
        std::env::set_var("SENTINEL_OVERRIDE_TEST", " 42 ");
        let mut value = 7u64;
        env_override("SENTINEL_OVERRIDE_TEST", &mut value);
        assert_eq!(value, 42);
        std::env::remove_var("SENTINEL_OVERRIDE_TEST");

        env_override("SENTINEL_OVERRIDE_TEST", &mut value);
        assert_eq!(value, 42);
    }
}
