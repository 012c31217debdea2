//! Input descriptors as they appear in the scenario tree, and the plan
//! document handed to the execution engine.
//!
//! Field names follow the engine's camelCase contract exactly.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Defaults shared by every round of a scenario.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommonConfig {
    #[serde(default)]
    pub tx_duration: Option<u64>,
    #[serde(default)]
    pub rate_controller_type: Option<String>,
    #[serde(default)]
    pub workload_module: Option<String>,
    #[serde(default)]
    pub label_prefix: Option<String>,
    #[serde(default)]
    pub workers: Option<u64>,
    #[serde(default)]
    pub rate_tps: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundSpec {
    pub id: String,
    #[serde(default)]
    pub tps: Option<Value>,
    #[serde(default)]
    pub rate_tps: Option<Value>,
    #[serde(default, alias = "rateController")]
    pub rate_control: Option<RateControlSpec>,
    #[serde(default)]
    pub workload: Option<WorkloadSpec>,
    #[serde(default)]
    pub workers: Option<u64>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tx_duration: Option<u64>,
}

/// A scenario exactly as written, before its shape is known.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioSpec {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub common_config: Option<CommonConfig>,
    #[serde(default)]
    pub rounds: Option<Vec<RoundSpec>>,
    #[serde(default)]
    pub workers: Option<u64>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub tx_duration: Option<u64>,
    #[serde(default)]
    pub rate_control: Option<RateControlSpec>,
    #[serde(default)]
    pub workload: Option<WorkloadSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RateControlSpec {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub opts: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkloadSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Map<String, Value>>,
}

// Output document.

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchmarkPlan {
    pub test: TestPlan,
    pub monitors: Monitors,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestPlan {
    pub name: String,
    pub description: String,
    pub workers: Workers,
    pub rounds: Vec<ResolvedRound>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Workers {
    pub number: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedRound {
    pub label: String,
    pub description: String,
    pub tx_duration: u64,
    pub rate_control: RateControl,
    pub workload: Workload,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateControl {
    #[serde(rename = "type")]
    pub kind: String,
    pub opts: Map<String, Value>,
}

impl RateControl {
    pub fn tps(&self) -> Option<&Value> {
        self.opts.get("tps")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Workload {
    pub module: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Monitors {
    pub resource: Vec<ResourceMonitor>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub transaction: Vec<TransactionMonitor>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceMonitor {
    pub module: String,
    pub options: ResourceOptions,
    pub charting: Charting,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceOptions {
    pub interval: u64,
    pub containers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Charting {
    pub bar: BarChart,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BarChart {
    pub metrics: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionMonitor {
    pub module: String,
    pub options: PushOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushOptions {
    pub push_interval: u64,
    pub push_url: String,
    pub labels: PushLabels,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushLabels {
    pub job: String,
    pub scenario: String,
    pub variant: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_accepts_historical_rate_controller_spelling() {
        let round: RoundSpec = serde_json::from_value(json!({
            "id": "C1",
            "rateController": { "type": "linear-rate", "opts": { "startTps": 10 } }
        }))
        .expect("round");
        let rc = round.rate_control.expect("rate control");
        assert_eq!(rc.kind.as_deref(), Some("linear-rate"));
        assert_eq!(rc.opts.get("startTps"), Some(&json!(10)));
    }

    #[test]
    fn resolved_round_serializes_engine_field_names() {
        let round = ResolvedRound {
            label: "B1-b".to_string(),
            description: "d".to_string(),
            tx_duration: 60,
            rate_control: RateControl {
                kind: "fixed-rate".to_string(),
                opts: json!({ "tps": 50 }).as_object().cloned().unwrap_or_default(),
            },
            workload: Workload {
                module: "m".to_string(),
                arguments: None,
            },
        };
        let value = serde_json::to_value(&round).expect("serialize");
        assert_eq!(
            value,
            json!({
                "label": "B1-b",
                "description": "d",
                "txDuration": 60,
                "rateControl": { "type": "fixed-rate", "opts": { "tps": 50 } },
                "workload": { "module": "m" }
            })
        );
    }
}
