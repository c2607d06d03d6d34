//! Test fixtures and environment helpers.

/// Variable enabling suites that talk to the system libcurl.
pub const NATIVE_IT_ENV: &str = "EASYWIRE_NATIVE_IT";

/// Returns `true` when native integration suites were requested.
#[must_use]
pub fn native_it_enabled() -> bool {
    native_it_enabled_with(std::env::var(NATIVE_IT_ENV).ok())
}

fn native_it_enabled_with(value: Option<String>) -> bool {
    value.is_some_and(|value| {
        let value = value.trim();
        !value.is_empty() && value != "0" && !value.eq_ignore_ascii_case("false")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_it_requires_a_truthy_value() {
        assert!(!native_it_enabled_with(None));
        assert!(!native_it_enabled_with(Some(String::new())));
        assert!(!native_it_enabled_with(Some("0".into())));
        assert!(!native_it_enabled_with(Some("FALSE".into())));
        assert!(native_it_enabled_with(Some("1".into())));
    }

    #[test]
    fn native_it_obeys_env_value() {
        let env_value = std::env::var(NATIVE_IT_ENV).ok();
        assert_eq!(native_it_enabled(), native_it_enabled_with(env_value));
    }
}
