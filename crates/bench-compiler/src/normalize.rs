use serde_json::{Number, Value};

use crate::env::EnvSource;
use crate::error::{CompileError, Result};
use crate::model::{RateControl, RateControlSpec, Workload, WorkloadSpec};
use crate::resolve::{resolve_rate, resolve_tree, RateError};

pub const DEFAULT_RATE_CONTROL: &str = "fixed-rate";

/// Rate-control opts that must end up numeric.
pub const NUMERIC_RATE_OPTS: [&str; 3] = ["tps", "startTps", "transactionLoad"];

/// Where in the tree a value is being resolved, plus the runtime inputs
/// resolution needs. Every error leaving a normalizer is pinned to it.
#[derive(Clone, Copy)]
pub struct Scope<'a> {
    pub scenario: &'a str,
    pub round: Option<&'a str>,
    pub optimal: Option<&'a Number>,
    pub env: &'a dyn EnvSource,
}

impl<'a> Scope<'a> {
    pub fn describe(&self) -> String {
        match self.round {
            Some(round) => format!("round {} of scenario {}", round, self.scenario),
            None => format!("scenario {}", self.scenario),
        }
    }

    pub fn fail(&self, err: CompileError, field: &str) -> CompileError {
        err.within(self.describe(), field)
    }

    pub fn missing(&self, field: &str) -> CompileError {
        CompileError::MissingRequiredArgument {
            scope: self.describe(),
            field: field.to_string(),
        }
    }

    /// Resolves a rate to a concrete number, substituting the optimal value
    /// for the OPTIMAL placeholder.
    pub fn rate(&self, value: &Value, field: &str) -> Result<Number> {
        resolve_rate(value, field, self.optimal, self.env).map_err(|err| match err {
            RateError::MissingOptimal => self.fail(
                CompileError::MissingOverride {
                    scenario: self.scenario.to_string(),
                    round: self.round.unwrap_or(self.scenario).to_string(),
                },
                field,
            ),
            RateError::Compile(inner) => self.fail(inner, field),
        })
    }
}

/// Clones `spec`, fills a missing module from `fallback_module` and resolves
/// every `ENV:` leaf inside `arguments`. The module may still be unset.
pub fn normalize_workload(
    spec: &WorkloadSpec,
    fallback_module: Option<&str>,
    env: &dyn EnvSource,
) -> Result<WorkloadSpec> {
    let mut out = spec.clone();
    if out.module.is_none() {
        out.module = fallback_module.map(str::to_string);
    }
    if let Some(arguments) = out.arguments.as_mut() {
        for value in arguments.values_mut() {
            *value = resolve_tree(value, env)?;
        }
    }
    Ok(out)
}

/// Turns a normalized workload into its final binding; a module is required
/// by now.
pub fn finish_workload(spec: WorkloadSpec, scope: &Scope<'_>) -> Result<Workload> {
    match spec.module {
        Some(module) => Ok(Workload {
            module,
            arguments: spec.arguments,
        }),
        None => {
            let binding = serde_json::to_string(&spec).unwrap_or_else(|_| "{}".to_string());
            Err(CompileError::MissingRequiredArgument {
                scope: format!("{} (workload binding {})", scope.describe(), binding),
                field: "workload.module".to_string(),
            })
        }
    }
}

/// Clones `spec`, defaults `type` to fixed-rate and resolves the numeric
/// opts that are present. Absent opts stay absent; any other opt is resolved
/// opportunistically.
pub fn normalize_rate_control(spec: &RateControlSpec, scope: &Scope<'_>) -> Result<RateControl> {
    let mut opts = spec.opts.clone();
    for (key, value) in opts.iter_mut() {
        let field = format!("rateControl.opts.{}", key);
        if NUMERIC_RATE_OPTS.contains(&key.as_str()) {
            *value = Value::Number(scope.rate(value, &field)?);
        } else {
            *value = resolve_tree(value, scope.env).map_err(|e| scope.fail(e, &field))?;
        }
    }
    Ok(RateControl {
        kind: spec
            .kind
            .clone()
            .unwrap_or_else(|| DEFAULT_RATE_CONTROL.to_string()),
        opts,
    })
}

/// The rate-control block synthesized for a round that only names a target
/// rate.
pub fn fixed_rate(kind: Option<&str>, tps: Number) -> RateControl {
    let mut opts = serde_json::Map::new();
    opts.insert("tps".to_string(), Value::Number(tps));
    RateControl {
        kind: kind.unwrap_or(DEFAULT_RATE_CONTROL).to_string(),
        opts,
    }
}
