//! String and list helpers shared by the commands

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};

static ENV_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env reference regex")
});

/// Returns the values only in `old` and the values only in `new`, in their
/// original order.
pub fn diff_slices(old: &[String], new: &[String]) -> (Vec<String>, Vec<String>) {
    let removed = old.iter().filter(|v| !new.contains(v)).cloned().collect();
    let added = new.iter().filter(|v| !old.contains(v)).cloned().collect();
    (removed, added)
}

/// `*` matches everything, a trailing `*` matches a prefix, anything else
/// must be equal.
pub fn string_matches_pattern(text: &str, pattern: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    match pattern.strip_suffix('*') {
        Some(prefix) => text.starts_with(prefix),
        None => text == pattern,
    }
}

pub fn string_matches_any(text: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|p| string_matches_pattern(text, p))
}

/// Environment variable name for a parameter name: `docker-registry` becomes
/// `DOCKER_REGISTRY`.
pub fn env_var_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Replace `${NAME}` references with values from `vars`. Unknown references
/// are left as they are.
pub fn substitute_env_vars(text: &str, vars: &HashMap<String, String>) -> String {
    ENV_REFERENCE
        .replace_all(text, |caps: &Captures| match vars.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Upper-case the first letter, used for default display names
pub fn title_case(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
