use crate::env::EnvSource;
use crate::model::{
    BarChart, Charting, Monitors, PushLabels, PushOptions, ResourceMonitor, ResourceOptions,
    TransactionMonitor,
};

pub const PUSH_URL_ENV: &str = "PUSHGATEWAY_URL";
pub const PUSH_JOB_ENV: &str = "PUSHGATEWAY_JOB";
pub const VARIANT_ENV: &str = "BENCHMARK_VARIANT";

pub const DEFAULT_PUSH_URL: &str = "http://localhost:9091";
pub const DEFAULT_PUSH_JOB: &str = "caliper";
pub const DEFAULT_VARIANT: &str = "default";
pub const PUSH_INTERVAL_MS: u64 = 5000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushSettings {
    pub url: String,
    pub job: String,
    pub variant: String,
}

/// Settings for the monitor block appended to every plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorSettings {
    pub push: Option<PushSettings>,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            push: Some(PushSettings {
                url: DEFAULT_PUSH_URL.to_string(),
                job: DEFAULT_PUSH_JOB.to_string(),
                variant: DEFAULT_VARIANT.to_string(),
            }),
        }
    }
}

impl MonitorSettings {
    pub fn from_env(env: &dyn EnvSource) -> Self {
        Self {
            push: Some(PushSettings {
                url: env
                    .non_empty(PUSH_URL_ENV)
                    .unwrap_or_else(|| DEFAULT_PUSH_URL.to_string()),
                job: env
                    .non_empty(PUSH_JOB_ENV)
                    .unwrap_or_else(|| DEFAULT_PUSH_JOB.to_string()),
                variant: env
                    .non_empty(VARIANT_ENV)
                    .unwrap_or_else(|| DEFAULT_VARIANT.to_string()),
            }),
        }
    }

    pub fn without_push(self) -> Self {
        Self { push: None }
    }

    pub fn build(&self, scenario_id: &str) -> Monitors {
        let resource = vec![ResourceMonitor {
            module: "docker".to_string(),
            options: ResourceOptions {
                interval: 1,
                containers: vec!["all".to_string()],
            },
            charting: Charting {
                bar: BarChart {
                    metrics: vec!["all".to_string()],
                },
            },
        }];
        let transaction = self
            .push
            .iter()
            .map(|push| TransactionMonitor {
                module: "prometheus-push".to_string(),
                options: PushOptions {
                    push_interval: PUSH_INTERVAL_MS,
                    push_url: push.url.clone(),
                    labels: PushLabels {
                        job: push.job.clone(),
                        scenario: scenario_id.to_string(),
                        variant: push.variant.clone(),
                    },
                },
            })
            .collect();
        Monitors {
            resource,
            transaction,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::env_from_pairs;
    use serde_json::json;

    #[test]
    fn defaults_apply_when_env_is_empty() {
        let env = env_from_pairs([(VARIANT_ENV, "")]);
        let settings = MonitorSettings::from_env(&env);
        assert_eq!(settings, MonitorSettings::default());
    }

    #[test]
    fn monitor_block_matches_engine_layout() {
        let env = env_from_pairs([(VARIANT_ENV, "qbft-4"), (PUSH_URL_ENV, "http://gw:9091")]);
        let monitors = MonitorSettings::from_env(&env).build("B");
        assert_eq!(
            serde_json::to_value(&monitors).expect("serialize"),
            json!({
                "resource": [{
                    "module": "docker",
                    "options": { "interval": 1, "containers": ["all"] },
                    "charting": { "bar": { "metrics": ["all"] } }
                }],
                "transaction": [{
                    "module": "prometheus-push",
                    "options": {
                        "pushInterval": 5000,
                        "pushUrl": "http://gw:9091",
                        "labels": { "job": "caliper", "scenario": "B", "variant": "qbft-4" }
                    }
                }]
            })
        );
    }

    #[test]
    fn push_exporter_can_be_disabled() {
        let monitors = MonitorSettings::default().without_push().build("A1");
        let value = serde_json::to_value(&monitors).expect("serialize");
        assert!(value.get("transaction").is_none());
        assert_eq!(monitors.resource.len(), 1);
    }
}
