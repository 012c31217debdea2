use std::collections::BTreeMap;

/// Read-only view of the environment that `ENV:` references resolve against.
///
/// Compilation never touches `std::env` directly; callers hand in a source so
/// the same tree compiles identically under test and in the CLI.
pub trait EnvSource {
    fn get(&self, key: &str) -> Option<String>;

    /// Value for `key` only when it is set and non-empty.
    fn non_empty(&self, key: &str) -> Option<String> {
        self.get(key).filter(|v| !v.is_empty())
    }
}

/// The real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl EnvSource for BTreeMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        BTreeMap::get(self, key).cloned()
    }
}

impl<E: EnvSource + ?Sized> EnvSource for &E {
    fn get(&self, key: &str) -> Option<String> {
        (**self).get(key)
    }
}

/// Builds a map-backed environment from `(key, value)` pairs.
pub fn env_from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> BTreeMap<String, String> {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_values_are_treated_as_unset() {
        let env = env_from_pairs([("SET", "1"), ("EMPTY", "")]);
        assert_eq!(env.non_empty("SET").as_deref(), Some("1"));
        assert_eq!(env.non_empty("EMPTY"), None);
        assert_eq!(env.non_empty("MISSING"), None);
        assert_eq!(EnvSource::get(&env, "EMPTY").as_deref(), Some(""));
    }
}
