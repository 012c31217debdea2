//! Loading the scenario tree, tagging each scenario with its shape, and
//! locating rounds by id.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use jsonschema::JSONSchema;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{CompileError, Result};
use crate::model::{CommonConfig, RateControlSpec, RoundSpec, ScenarioSpec, WorkloadSpec};

const TREE_SCHEMA: &str = include_str!("../schemas/scenario_tree_v1.jsonschema");

/// Which scenario ids belong to the TPS-sweep family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepRule {
    pub prefix: String,
    pub exclude: Vec<String>,
}

impl Default for SweepRule {
    fn default() -> Self {
        Self {
            prefix: "A".to_string(),
            exclude: vec!["A0".to_string()],
        }
    }
}

impl SweepRule {
    fn matches(&self, id: &str, rounds: &[RoundSpec]) -> bool {
        id.starts_with(&self.prefix)
            && !self.exclude.iter().any(|e| e == id)
            && rounds
                .iter()
                .all(|r| r.tps.is_some() && r.rate_tps.is_none())
    }
}

/// What a nested round id resolves to when several scenarios share it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LookupPolicy {
    /// First match in tree order wins.
    #[default]
    FirstMatch,
    /// The id must be unique across the tree.
    Unique,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InlineRound {
    pub label: Option<String>,
    pub tx_duration: Option<u64>,
    pub rate_control: Option<RateControlSpec>,
    pub workload: Option<WorkloadSpec>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScenarioShape {
    /// Rounds carry only a bare `tps`; everything else comes from `commonConfig`.
    Sweep { family: String, rounds: Vec<RoundSpec> },
    MultiRound { rounds: Vec<RoundSpec> },
    SingleRound(InlineRound),
}

impl ScenarioShape {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScenarioShape::Sweep { .. } => "sweep",
            ScenarioShape::MultiRound { .. } => "multi_round",
            ScenarioShape::SingleRound(_) => "single_round",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    pub id: String,
    pub description: String,
    pub common: CommonConfig,
    pub workers: Option<u64>,
    pub shape: ScenarioShape,
}

impl Scenario {
    fn classify(id: &str, spec: ScenarioSpec, sweep: &SweepRule) -> Result<Self> {
        let malformed = |reason: String| CompileError::MalformedScenario {
            scenario: id.to_string(),
            reason,
        };
        let shape = match spec.rounds {
            Some(rounds) => {
                if spec.label.is_some() || spec.rate_control.is_some() {
                    return Err(malformed(
                        "a scenario with rounds must not also set a top-level label or rateControl"
                            .to_string(),
                    ));
                }
                if rounds.is_empty() {
                    return Err(malformed("rounds must not be empty".to_string()));
                }
                let mut seen = BTreeSet::new();
                for round in &rounds {
                    if !seen.insert(round.id.as_str()) {
                        return Err(malformed(format!("duplicate round id '{}'", round.id)));
                    }
                }
                if sweep.matches(id, &rounds) {
                    ScenarioShape::Sweep {
                        family: sweep.prefix.clone(),
                        rounds,
                    }
                } else {
                    ScenarioShape::MultiRound { rounds }
                }
            }
            None => ScenarioShape::SingleRound(InlineRound {
                label: spec.label,
                tx_duration: spec.tx_duration,
                rate_control: spec.rate_control,
                workload: spec.workload,
            }),
        };
        Ok(Scenario {
            id: id.to_string(),
            description: spec.description,
            common: spec.common_config.unwrap_or_default(),
            workers: spec.workers,
            shape,
        })
    }

    /// Rounds in declaration order; empty for an inline scenario.
    pub fn rounds(&self) -> &[RoundSpec] {
        match &self.shape {
            ScenarioShape::Sweep { rounds, .. } | ScenarioShape::MultiRound { rounds } => rounds,
            ScenarioShape::SingleRound(_) => &[],
        }
    }
}

/// The outcome of looking an id up in the tree.
#[derive(Debug, Clone, Copy)]
pub enum Selection<'a> {
    Scenario(&'a Scenario),
    NestedRound {
        parent: &'a Scenario,
        round: &'a RoundSpec,
    },
}

/// Every scenario, in file order. Immutable once loaded.
#[derive(Debug, Clone, Default)]
pub struct ScenarioTree {
    scenarios: Vec<Scenario>,
}

impl ScenarioTree {
    pub fn from_path(path: &Path) -> Result<Self> {
        Self::from_path_with(path, &SweepRule::default())
    }

    pub fn from_path_with(path: &Path, sweep: &SweepRule) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|source| CompileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let value: Value = serde_json::from_str(&raw).map_err(|source| CompileError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        let tree = Self::from_value_with(value, sweep)?;
        debug!(path = %path.display(), scenarios = tree.len(), "loaded scenario tree");
        Ok(tree)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        Self::from_value_with(value, &SweepRule::default())
    }

    /// Validates, then classifies every scenario exactly once. Accepts the
    /// bare tree or one wrapped as `{"scenarios": {...}}`.
    pub fn from_value_with(value: Value, sweep: &SweepRule) -> Result<Self> {
        let value = unwrap_scenarios_key(value);
        validate_tree_schema(&value)?;
        let entries = match value {
            Value::Object(map) => map,
            _ => {
                return Err(CompileError::Schema {
                    messages: vec!["scenario tree must be an object".to_string()],
                })
            }
        };
        let mut scenarios = Vec::with_capacity(entries.len());
        for (id, raw) in entries {
            let spec: ScenarioSpec =
                serde_json::from_value(raw).map_err(|e| CompileError::MalformedScenario {
                    scenario: id.clone(),
                    reason: e.to_string(),
                })?;
            scenarios.push(Scenario::classify(&id, spec, sweep)?);
        }
        Ok(Self { scenarios })
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Scenario> {
        self.scenarios.iter()
    }

    /// Exact, case-sensitive lookup of a top-level scenario.
    pub fn get(&self, id: &str) -> Option<&Scenario> {
        self.scenarios.iter().find(|s| s.id == id)
    }

    /// A top-level scenario if `id` names one, otherwise the round with that
    /// id inside some scenario's round list.
    pub fn find_round(&self, id: &str, policy: LookupPolicy) -> Result<Selection<'_>> {
        if let Some(scenario) = self.get(id) {
            return Ok(Selection::Scenario(scenario));
        }
        let mut matches = self.scenarios.iter().filter_map(|parent| {
            parent
                .rounds()
                .iter()
                .find(|r| r.id == id)
                .map(|round| (parent, round))
        });
        let (parent, round) = matches
            .next()
            .ok_or_else(|| CompileError::NotFound { id: id.to_string() })?;
        let others: Vec<&str> = matches.map(|(p, _)| p.id.as_str()).collect();
        if !others.is_empty() {
            match policy {
                LookupPolicy::Unique => {
                    let mut parents = vec![parent.id.clone()];
                    parents.extend(others.iter().map(|p| p.to_string()));
                    return Err(CompileError::AmbiguousRound {
                        id: id.to_string(),
                        parents,
                    });
                }
                LookupPolicy::FirstMatch => {
                    warn!(
                        round = id,
                        chosen = %parent.id,
                        shadowed = ?others,
                        "round id appears in several scenarios; using the first"
                    );
                }
            }
        }
        Ok(Selection::NestedRound { parent, round })
    }
}

/// A wrapped tree keeps its scenarios under `scenarios`, possibly beside
/// other top-level keys. A bare tree may itself hold a scenario named
/// `scenarios`; that one carries scalar fields and is left alone.
fn unwrap_scenarios_key(value: Value) -> Value {
    let wrapped = value
        .get("scenarios")
        .and_then(Value::as_object)
        .map_or(false, |inner| inner.values().all(Value::is_object));
    match value {
        Value::Object(mut map) if wrapped => map.remove("scenarios").unwrap_or(Value::Null),
        other => other,
    }
}

fn validate_tree_schema(value: &Value) -> Result<()> {
    let schema: Value = serde_json::from_str(TREE_SCHEMA).map_err(|e| CompileError::Schema {
        messages: vec![format!("embedded schema is invalid: {}", e)],
    })?;
    let compiled = JSONSchema::compile(&schema).map_err(|e| CompileError::Schema {
        messages: vec![format!("embedded schema failed to compile: {}", e)],
    })?;
    if let Err(errors) = compiled.validate(value) {
        let mut msgs = Vec::new();
        for e in errors {
            msgs.push(format!("{}: {}", e.instance_path, e));
        }
        return Err(CompileError::Schema { messages: msgs });
    }
    Ok(())
}
