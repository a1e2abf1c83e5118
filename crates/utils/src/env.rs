use std::str::FromStr;

/// Reads `name` from the environment, parses it as `T`, and falls back to
/// `default` when the variable is unset, empty, or fails to parse.
///
/// Mirrors the override-with-default convention used throughout this
/// workspace for router-wide tunables (poller interval, TTLs, deadlines).
pub fn env_or<T>(name: &str, default: T) -> T
where
    T: FromStr,
{
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse::<T>().ok())
        .unwrap_or(default)
}

/// Same as [`env_or`] but additionally rejects parsed values that fail
/// `predicate` (e.g. non-positive durations), falling back to `default`.
pub fn env_or_filtered<T>(name: &str, default: T, predicate: impl Fn(&T) -> bool) -> T
where
    T: FromStr,
{
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse::<T>().ok())
        .filter(predicate)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn falls_back_to_default_when_unset() {
        std::env::remove_var("ROUTER_TEST_ENV_VAR");
        let value: u64 = env_or("ROUTER_TEST_ENV_VAR", 42);
        assert_eq!(value, 42);
    }

    #[test]
    #[serial]
    fn parses_set_value() {
        std::env::set_var("ROUTER_TEST_ENV_VAR", "17");
        let value: u64 = env_or("ROUTER_TEST_ENV_VAR", 42);
        assert_eq!(value, 17);
        std::env::remove_var("ROUTER_TEST_ENV_VAR");
    }

    #[test]
    #[serial]
    fn filtered_rejects_non_positive() {
        std::env::set_var("ROUTER_TEST_ENV_VAR", "0");
        let value: u64 = env_or_filtered("ROUTER_TEST_ENV_VAR", 30, |v| *v > 0);
        assert_eq!(value, 30);
        std::env::remove_var("ROUTER_TEST_ENV_VAR");
    }
}
