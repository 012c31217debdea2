use serde_json::{Number, Value};

use crate::env::EnvSource;
use crate::error::{CompileError, Result};

pub const ENV_MARKER: &str = "ENV";
pub const OPTIMAL_PLACEHOLDER: &str = "OPTIMAL";

/// How a resolved scalar is typed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coercion {
    /// Numbers when the raw text parses fully as one, strings otherwise.
    Opportunistic,
    /// Must be numeric; anything else is a `TypeCoercion` error.
    Number,
}

/// A parsed `ENV:<KEY>:<fallback>` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvRef<'a> {
    pub key: &'a str,
    pub fallback: Option<&'a str>,
    pub raw: &'a str,
}

impl<'a> EnvRef<'a> {
    /// `None` when `raw` is not a reference at all.
    ///
    /// The fallback is everything after the second `:` so URLs survive intact.
    pub fn parse(raw: &'a str) -> Option<Result<Self>> {
        let rest = raw.strip_prefix(ENV_MARKER)?.strip_prefix(':')?;
        let mut parts = rest.splitn(2, ':');
        let key = parts.next().unwrap_or_default();
        if key.is_empty() {
            return Some(Err(CompileError::MalformedReference {
                reference: raw.to_string(),
            }));
        }
        let fallback = parts.next().filter(|f| !f.is_empty());
        Some(Ok(EnvRef { key, fallback, raw }))
    }

    fn lookup(&self, env: &dyn EnvSource) -> Result<String> {
        env.non_empty(self.key)
            .or_else(|| self.fallback.map(str::to_string))
            .ok_or_else(|| CompileError::UnresolvedReference {
                key: self.key.to_string(),
                reference: self.raw.to_string(),
            })
    }
}

/// Resolves one scalar. Anything that is not an `ENV:` string comes back
/// unchanged, so applying this twice is the same as applying it once.
pub fn resolve_value(value: &Value, coercion: Coercion, env: &dyn EnvSource) -> Result<Value> {
    let raw = match value.as_str() {
        Some(s) => s,
        None => return Ok(value.clone()),
    };
    let reference = match EnvRef::parse(raw) {
        Some(parsed) => parsed?,
        None => return Ok(value.clone()),
    };
    let chosen = reference.lookup(env)?;
    match coercion {
        Coercion::Number => parse_number(&chosen)
            .map(Value::Number)
            .ok_or_else(|| CompileError::TypeCoercion {
                key: reference.key.to_string(),
                raw: chosen.clone(),
            }),
        Coercion::Opportunistic => Ok(parse_number(&chosen)
            .map(Value::Number)
            .unwrap_or(Value::String(chosen))),
    }
}

/// Walks maps and sequences at any depth, resolving every scalar leaf.
pub fn resolve_tree(value: &Value, env: &dyn EnvSource) -> Result<Value> {
    match value {
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), resolve_tree(v, env)?);
            }
            Ok(Value::Object(out))
        }
        Value::Array(items) => items
            .iter()
            .map(|v| resolve_tree(v, env))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        leaf => resolve_value(leaf, Coercion::Opportunistic, env),
    }
}

/// Parses text that is entirely a number. Integers stay integers so the
/// rendered plan reads `50`, not `50.0`.
pub fn parse_number(raw: &str) -> Option<Number> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return Some(Number::from(i));
    }
    if let Ok(u) = trimmed.parse::<u64>() {
        return Some(Number::from(u));
    }
    let f = trimmed.parse::<f64>().ok().filter(|f| f.is_finite())?;
    // `1e3` and `50.0` are whole numbers and render as such.
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        return Some(Number::from(f as i64));
    }
    Number::from_f64(f)
}

/// Resolves a rate field that may be a literal number, an `ENV:` reference or
/// the OPTIMAL placeholder. The result is always a number.
pub fn resolve_rate(
    value: &Value,
    field: &str,
    optimal: Option<&Number>,
    env: &dyn EnvSource,
) -> std::result::Result<Number, RateError> {
    if value.as_str() == Some(OPTIMAL_PLACEHOLDER) {
        return optimal.cloned().ok_or(RateError::MissingOptimal);
    }
    match resolve_value(value, Coercion::Number, env)? {
        Value::Number(n) => Ok(n),
        other => Err(RateError::Compile(CompileError::TypeCoercion {
            key: field.to_string(),
            raw: render_scalar(&other),
        })),
    }
}

/// Failure from [`resolve_rate`]; the caller knows which round to blame for a
/// missing optimal value.
#[derive(Debug)]
pub enum RateError {
    MissingOptimal,
    Compile(CompileError),
}

impl From<CompileError> for RateError {
    fn from(err: CompileError) -> Self {
        RateError::Compile(err)
    }
}

fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::env_from_pairs;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn no_env() -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    #[test]
    fn literals_pass_through_unchanged() {
        let env = no_env();
        for v in [
            json!("plain"),
            json!("ENVIRONMENT"),
            json!("ENV"),
            json!("env:X:1"),
            json!(12),
            json!(1.5),
            json!(true),
            json!(null),
        ] {
            let out = resolve_value(&v, Coercion::Opportunistic, &env).expect("literal");
            assert_eq!(out, v);
            let out = resolve_value(&v, Coercion::Number, &env).expect("literal");
            assert_eq!(out, v);
        }
    }

    #[test]
    fn fallback_used_when_unset_and_env_wins_when_set() {
        let unset = no_env();
        assert_eq!(
            resolve_value(&json!("ENV:X:5"), Coercion::Opportunistic, &unset).expect("fallback"),
            json!(5)
        );
        let set = env_from_pairs([("X", "7")]);
        assert_eq!(
            resolve_value(&json!("ENV:X:5"), Coercion::Opportunistic, &set).expect("env"),
            json!(7)
        );
        let empty = env_from_pairs([("X", "")]);
        assert_eq!(
            resolve_value(&json!("ENV:X:5"), Coercion::Opportunistic, &empty).expect("empty env"),
            json!(5)
        );
    }

    #[test]
    fn missing_value_and_fallback_is_unresolved() {
        let err = resolve_value(&json!("ENV:X"), Coercion::Opportunistic, &no_env())
            .expect_err("should fail");
        match err {
            CompileError::UnresolvedReference { key, reference } => {
                assert_eq!(key, "X");
                assert_eq!(reference, "ENV:X");
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(resolve_value(&json!("ENV:X:"), Coercion::Opportunistic, &no_env()).is_err());
    }

    #[test]
    fn missing_key_is_malformed() {
        for raw in ["ENV:", "ENV::5"] {
            let err = resolve_value(&json!(raw), Coercion::Opportunistic, &no_env())
                .expect_err("should fail");
            assert!(
                matches!(err, CompileError::MalformedReference { .. }),
                "unexpected error for {}: {}",
                raw,
                err
            );
        }
    }

    #[test]
    fn numeric_mode_rejects_text() {
        let env = env_from_pairs([("RATE", "fast")]);
        let err = resolve_value(&json!("ENV:RATE:10"), Coercion::Number, &env).expect_err("text");
        match err {
            CompileError::TypeCoercion { key, raw } => {
                assert_eq!(key, "RATE");
                assert_eq!(raw, "fast");
            }
            other => panic!("unexpected error: {}", other),
        }
        let out = resolve_value(&json!("ENV:RATE:10"), Coercion::Opportunistic, &env).expect("text");
        assert_eq!(out, json!("fast"));
    }

    #[test]
    fn fallback_keeps_colons() {
        let out = resolve_value(
            &json!("ENV:NODE_URL:ws://localhost:8558"),
            Coercion::Opportunistic,
            &no_env(),
        )
        .expect("url fallback");
        assert_eq!(out, json!("ws://localhost:8558"));
    }

    #[test]
    fn parse_number_is_strict_about_whole_text() {
        assert_eq!(parse_number("42"), Some(Number::from(42)));
        assert_eq!(parse_number(" 42 "), Some(Number::from(42)));
        assert_eq!(parse_number("2.5").and_then(|n| n.as_f64()), Some(2.5));
        assert_eq!(parse_number("42abc"), None);
        assert_eq!(parse_number("inf"), None);
        assert_eq!(parse_number("NaN"), None);
        assert_eq!(parse_number(""), None);
    }

    #[test]
    fn whole_floats_become_integers() {
        assert_eq!(parse_number("1e3"), Some(Number::from(1000)));
        assert_eq!(parse_number("50.0"), Some(Number::from(50)));
        assert_eq!(parse_number("-2E2"), Some(Number::from(-200)));
        assert_eq!(parse_number("1.5e1").and_then(|n| n.as_i64()), Some(15));
        assert!(parse_number("2.5e-1").map_or(false, |n| n.is_f64()));

        let env = env_from_pairs([("T", "1e3")]);
        let resolved = resolve_value(&Value::from("ENV:T:5"), Coercion::Number, &env).expect("number");
        assert_eq!(resolved, Value::from(1000));
        assert_eq!(serde_yaml::to_string(&resolved).expect("yaml").trim(), "1000");
    }

    #[test]
    fn resolving_twice_is_idempotent() {
        let env = env_from_pairs([("Y", "abc")]);
        let once = resolve_value(&json!("ENV:Y:1"), Coercion::Opportunistic, &env).expect("once");
        let twice = resolve_value(&once, Coercion::Opportunistic, &env).expect("twice");
        assert_eq!(once, twice);
    }

    #[test]
    fn tree_resolution_reaches_nested_leaves() {
        let env = env_from_pairs([("ASSETS", "25")]);
        let input = json!({
            "a": "ENV:Y:10",
            "nested": { "list": ["ENV:ASSETS:1", "keep", { "deep": "ENV:Z:hello" }] }
        });
        let out = resolve_tree(&input, &env).expect("tree");
        assert_eq!(
            out,
            json!({
                "a": 10,
                "nested": { "list": [25, "keep", { "deep": "hello" }] }
            })
        );
    }

    #[test]
    fn rate_resolution_handles_placeholder() {
        let env = no_env();
        let optimal = Number::from(50);
        assert_eq!(
            resolve_rate(&json!("OPTIMAL"), "rateTps", Some(&optimal), &env).expect("optimal"),
            Number::from(50)
        );
        assert!(matches!(
            resolve_rate(&json!("OPTIMAL"), "rateTps", None, &env),
            Err(RateError::MissingOptimal)
        ));
        assert!(matches!(
            resolve_rate(&json!("fast"), "rateTps", None, &env),
            Err(RateError::Compile(CompileError::TypeCoercion { .. }))
        ));
        assert_eq!(
            resolve_rate(&json!("ENV:TPS:30"), "rateTps", None, &env).expect("env"),
            Number::from(30)
        );
    }
}
