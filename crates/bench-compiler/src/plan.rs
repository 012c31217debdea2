//! The plan builder: turns one selected scenario (or one nested round) into
//! a complete, fully resolved benchmark plan.

use serde_json::{Number, Value};
use tracing::{debug, info};

use crate::catalog::{InlineRound, LookupPolicy, Scenario, ScenarioShape, ScenarioTree, Selection};
use crate::env::EnvSource;
use crate::error::Result;
use crate::model::{BenchmarkPlan, ResolvedRound, RoundSpec, TestPlan, Workers, Workload, WorkloadSpec};
use crate::monitors::MonitorSettings;
use crate::normalize::{
    finish_workload, fixed_rate, normalize_rate_control, normalize_workload, Scope,
};

pub const DEFAULT_WORKERS: u64 = 3;

#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// Value substituted for the OPTIMAL placeholder.
    pub optimal_tps: Option<Number>,
    pub lookup: LookupPolicy,
    pub monitors: MonitorSettings,
}

pub struct PlanCompiler<'a> {
    tree: &'a ScenarioTree,
    env: &'a dyn EnvSource,
    options: CompileOptions,
}

impl<'a> PlanCompiler<'a> {
    pub fn new(tree: &'a ScenarioTree, env: &'a dyn EnvSource) -> Self {
        Self {
            tree,
            env,
            options: CompileOptions::default(),
        }
    }

    pub fn with_options(mut self, options: CompileOptions) -> Self {
        self.options = options;
        self
    }

    /// Compiles `id`, which names a top-level scenario or a round nested in
    /// one. Fails on the first unresolved value; never returns a partial plan.
    pub fn compile(&self, id: &str) -> Result<BenchmarkPlan> {
        let test = match self.tree.find_round(id, self.options.lookup)? {
            Selection::Scenario(scenario) => match &scenario.shape {
                ScenarioShape::Sweep { family, rounds } => self.sweep(scenario, family, rounds)?,
                ScenarioShape::MultiRound { rounds } => self.multi_round(scenario, rounds)?,
                ScenarioShape::SingleRound(inline) => self.single_round(scenario, inline)?,
            },
            Selection::NestedRound { parent, round } => self.nested_round(parent, round)?,
        };
        info!(
            scenario = id,
            name = %test.name,
            rounds = test.rounds.len(),
            workers = test.workers.number,
            "compiled benchmark plan"
        );
        Ok(BenchmarkPlan {
            test,
            monitors: self.options.monitors.build(id),
        })
    }

    fn scope<'s>(&'s self, scenario: &'s str, round: Option<&'s str>) -> Scope<'s> {
        Scope {
            scenario,
            round,
            optimal: self.options.optimal_tps.as_ref(),
            env: self.env,
        }
    }

    fn sweep(&self, scenario: &Scenario, family: &str, rounds: &[RoundSpec]) -> Result<TestPlan> {
        let common = &scenario.common;
        let outer = self.scope(&scenario.id, None);
        let tx_duration = common
            .tx_duration
            .ok_or_else(|| outer.missing("commonConfig.txDuration"))?;
        let module = common
            .workload_module
            .clone()
            .ok_or_else(|| outer.missing("commonConfig.workloadModule"))?;

        let mut resolved = Vec::with_capacity(rounds.len());
        for round in rounds {
            let scope = self.scope(&scenario.id, Some(round.id.as_str()));
            let raw = round.tps.as_ref().ok_or_else(|| scope.missing("tps"))?;
            let tps = scope.rate(raw, "tps")?;
            let entry = ResolvedRound {
                label: round.id.clone(),
                description: format!("Test minting NFT dengan beban {} TPS.", tps),
                tx_duration,
                rate_control: fixed_rate(common.rate_controller_type.as_deref(), tps),
                workload: Workload {
                    module: module.clone(),
                    arguments: None,
                },
            };
            debug!(scenario = %scenario.id, round = %entry.label, tps = ?entry.rate_control.tps(), "resolved sweep round");
            resolved.push(entry);
        }

        Ok(TestPlan {
            name: format!("Scenario-{}-Saturation-Test", family),
            description: scenario.description.clone(),
            workers: Workers {
                number: common.workers.unwrap_or(DEFAULT_WORKERS),
            },
            rounds: resolved,
        })
    }

    fn multi_round(&self, scenario: &Scenario, rounds: &[RoundSpec]) -> Result<TestPlan> {
        let resolved = rounds
            .iter()
            .map(|round| self.round_entry(scenario, round))
            .collect::<Result<Vec<_>>>()?;
        let workers = rounds
            .first()
            .and_then(|r| r.workers)
            .or(scenario.common.workers)
            .unwrap_or(DEFAULT_WORKERS);
        Ok(TestPlan {
            name: format!("Scenario-{}-Test", scenario.id),
            description: scenario.description.clone(),
            workers: Workers { number: workers },
            rounds: resolved,
        })
    }

    fn single_round(&self, scenario: &Scenario, inline: &InlineRound) -> Result<TestPlan> {
        let common = &scenario.common;
        let scope = self.scope(&scenario.id, None);

        let rate_control = match (&inline.rate_control, &common.rate_tps) {
            (Some(spec), _) => normalize_rate_control(spec, &scope)?,
            (None, Some(raw)) => fixed_rate(
                common.rate_controller_type.as_deref(),
                scope.rate(raw, "commonConfig.rateTps")?,
            ),
            (None, None) => return Err(scope.missing("rateControl")),
        };
        let workload = self.workload(inline.workload.as_ref(), common.workload_module.as_deref(), &scope)?;
        let tx_duration = inline
            .tx_duration
            .or(common.tx_duration)
            .ok_or_else(|| scope.missing("txDuration"))?;

        let entry = ResolvedRound {
            label: inline.label.clone().unwrap_or_else(|| scenario.id.clone()),
            description: scenario.description.clone(),
            tx_duration,
            rate_control,
            workload,
        };
        debug!(scenario = %scenario.id, round = %entry.label, tps = ?entry.rate_control.tps(), "resolved inline round");

        Ok(TestPlan {
            name: format!("Scenario-{}-Test", scenario.id),
            description: scenario.description.clone(),
            workers: Workers {
                number: scenario.workers.unwrap_or(DEFAULT_WORKERS),
            },
            rounds: vec![entry],
        })
    }

    fn nested_round(&self, parent: &Scenario, round: &RoundSpec) -> Result<TestPlan> {
        let entry = self.round_entry(parent, round)?;
        let workers = round
            .workers
            .or(parent.common.workers)
            .or(parent.workers)
            .unwrap_or(DEFAULT_WORKERS);
        Ok(TestPlan {
            name: format!("Scenario-{}-{}-Test", parent.id, round.id),
            description: parent.description.clone(),
            workers: Workers { number: workers },
            rounds: vec![entry],
        })
    }

    /// One round of a multi-round scenario, also used for a nested round.
    fn round_entry(&self, parent: &Scenario, round: &RoundSpec) -> Result<ResolvedRound> {
        let common = &parent.common;
        let scope = self.scope(&parent.id, Some(round.id.as_str()));

        let own_rate: Option<(&str, &Value)> = round
            .rate_tps
            .as_ref()
            .map(|v| ("rateTps", v))
            .or_else(|| round.tps.as_ref().map(|v| ("tps", v)));
        // The round's own rate is resolved even when an explicit rate-control
        // block wins; the inherited one only when it is used.
        let rate = match own_rate {
            Some((field, raw)) => Some(scope.rate(raw, field)?),
            None => None,
        };

        let rate_control = match (&round.rate_control, rate, &common.rate_tps) {
            (Some(spec), _, _) => normalize_rate_control(spec, &scope)?,
            (None, Some(tps), _) => fixed_rate(None, tps),
            (None, None, Some(raw)) => fixed_rate(None, scope.rate(raw, "commonConfig.rateTps")?),
            (None, None, None) => return Err(scope.missing("rateTps")),
        };
        let workload = self.workload(round.workload.as_ref(), common.workload_module.as_deref(), &scope)?;
        let tx_duration = round
            .tx_duration
            .or(common.tx_duration)
            .ok_or_else(|| scope.missing("txDuration"))?;

        let suffix = common.label_prefix.as_deref().unwrap_or(&parent.id);
        let entry = ResolvedRound {
            label: round
                .label
                .clone()
                .unwrap_or_else(|| format!("{}-{}", round.id, suffix)),
            description: round
                .description
                .clone()
                .unwrap_or_else(|| format!("Test untuk skenario {}", round.id)),
            tx_duration,
            rate_control,
            workload,
        };
        debug!(scenario = %parent.id, round = %entry.label, tps = ?entry.rate_control.tps(), "resolved round");
        Ok(entry)
    }

    fn workload(
        &self,
        spec: Option<&WorkloadSpec>,
        fallback_module: Option<&str>,
        scope: &Scope<'_>,
    ) -> Result<Workload> {
        let empty = WorkloadSpec::default();
        let normalized = normalize_workload(spec.unwrap_or(&empty), fallback_module, self.env)
            .map_err(|e| scope.fail(e, "workload.arguments"))?;
        finish_workload(normalized, scope)
    }
}
