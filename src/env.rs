//! Small environment-variable helpers shared by every `from_env` constructor.

/// Parse `key` as `T`, falling back to `default` when unset or malformed.
pub(crate) fn parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

/// Parse a boolean flag (`1/true/yes/on`, `0/false/no/off`), case-insensitive.
pub(crate) fn flag(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .and_then(|raw| match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        })
}

/// Read a non-empty string variable.
pub(crate) fn non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Unique variable names per test so parallel tests never race.

    #[test]
    fn flag_true_and_false_variants() {
        for (i, val) in ["1", "true", "YES", " On "].iter().enumerate() {
            let key = format!("__SECRETARY_FLAG_TRUE_{i}__");
            unsafe { std::env::set_var(&key, val) };
            assert_eq!(flag(&key), Some(true), "expected true for {val:?}");
            unsafe { std::env::remove_var(&key) };
        }
        for (i, val) in ["0", "false", "No", "off"].iter().enumerate() {
            let key = format!("__SECRETARY_FLAG_FALSE_{i}__");
            unsafe { std::env::set_var(&key, val) };
            assert_eq!(flag(&key), Some(false), "expected false for {val:?}");
            unsafe { std::env::remove_var(&key) };
        }
    }

    #[test]
    fn flag_invalid_or_unset_is_none() {
        let key = "__SECRETARY_FLAG_INVALID__";
        unsafe { std::env::set_var(key, "maybe") };
        assert_eq!(flag(key), None);
        unsafe { std::env::remove_var(key) };
        assert_eq!(flag("__SECRETARY_FLAG_SURELY_UNSET__"), None);
    }

    #[test]
    fn parse_falls_back_on_garbage() {
        let key = "__SECRETARY_PARSE_GARBAGE__";
        unsafe { std::env::set_var(key, "abc") };
        assert_eq!(parse(key, 7_u64), 7);
        unsafe { std::env::set_var(key, " 12 ") };
        assert_eq!(parse(key, 7_u64), 12);
        unsafe { std::env::remove_var(key) };
    }

    #[test]
    fn non_empty_rejects_blank() {
        let key = "__SECRETARY_NON_EMPTY__";
        unsafe { std::env::set_var(key, "   ") };
        assert_eq!(non_empty(key), None);
        unsafe { std::env::set_var(key, " value ") };
        assert_eq!(non_empty(key).as_deref(), Some("value"));
        unsafe { std::env::remove_var(key) };
    }
}
