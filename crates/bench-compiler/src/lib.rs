//! Compiles declarative benchmark scenarios into fully resolved plans.
//!
//! A scenario tree (JSON) is loaded once into a [`ScenarioTree`], which tags
//! every scenario with its [`ScenarioShape`]. A [`PlanCompiler`] then resolves
//! one scenario id, or one round id nested anywhere in the tree, into a
//! [`BenchmarkPlan`]: environment references substituted, the OPTIMAL
//! placeholder replaced, defaults inherited from `commonConfig`, and the
//! monitor block attached.

pub mod catalog;
pub mod env;
pub mod error;
pub mod model;
pub mod monitors;
pub mod normalize;
pub mod output;
pub mod plan;
pub mod resolve;

pub use catalog::{LookupPolicy, Scenario, ScenarioShape, ScenarioTree, Selection, SweepRule};
pub use env::{EnvSource, ProcessEnv};
pub use error::{CompileError, Result};
pub use model::{BenchmarkPlan, ResolvedRound};
pub use monitors::MonitorSettings;
pub use output::{render_yaml, sha256_digest, write_plan};
pub use plan::{CompileOptions, PlanCompiler, DEFAULT_WORKERS};
pub use resolve::{parse_number, resolve_value, Coercion};

use std::fs;
use std::path::Path;

use serde_json::Number;

/// Reads an optimal-TPS file: a single number, surrounding whitespace allowed.
pub fn read_optimal_tps(path: &Path) -> Result<Number> {
    let raw = fs::read_to_string(path).map_err(|source| CompileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_number(&raw).ok_or_else(|| CompileError::TypeCoercion {
        key: path.display().to_string(),
        raw: raw.trim().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::env_from_pairs;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn temp_path(tag: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!(
            "bench_lib_{}_{}_{}",
            tag,
            std::process::id(),
            chrono::Utc::now().timestamp_micros()
        ))
    }

    #[test]
    fn end_to_end_optimal_round() {
        let tree = ScenarioTree::from_value(json!({
            "B": {
                "description": "d",
                "commonConfig": { "txDuration": 60, "workloadModule": "m" },
                "rounds": [ { "id": "B1", "rateTps": "OPTIMAL" } ]
            }
        }))
        .expect("tree");
        let env = BTreeMap::new();
        let options = CompileOptions {
            optimal_tps: parse_number("50"),
            ..CompileOptions::default()
        };
        let plan = PlanCompiler::new(&tree, &env)
            .with_options(options)
            .compile("B")
            .expect("compile");
        let yaml = render_yaml(&plan).expect("render");
        let reparsed: serde_json::Value = serde_yaml::from_str(&yaml).expect("yaml");
        assert_eq!(reparsed.pointer("/test/name"), Some(&json!("Scenario-B-Test")));
        assert_eq!(reparsed.pointer("/test/workers/number"), Some(&json!(3)));
        assert_eq!(reparsed.pointer("/test/rounds/0/label"), Some(&json!("B1-B")));
        assert_eq!(reparsed.pointer("/test/rounds/0/rateControl/opts/tps"), Some(&json!(50)));
        assert_eq!(reparsed.pointer("/test/rounds/0/workload/module"), Some(&json!("m")));
        assert_eq!(
            reparsed.pointer("/monitors/resource/0/module"),
            Some(&json!("docker"))
        );
        assert_eq!(
            reparsed.pointer("/monitors/transaction/0/options/labels/scenario"),
            Some(&json!("B"))
        );
    }

    #[test]
    fn repeated_compilation_is_byte_identical() {
        let tree = ScenarioTree::from_value(json!({
            "C": {
                "description": "mixed",
                "commonConfig": { "txDuration": 30, "workloadModule": "m" },
                "rounds": [
                    { "id": "C1", "rateTps": "ENV:C1_TPS:5", "workload": { "arguments": { "z": 1, "a": "ENV:A:x", "m": [1, 2] } } },
                    { "id": "C2", "rateControl": { "type": "fixed-load", "opts": { "transactionLoad": 10 } } }
                ]
            }
        }))
        .expect("tree");
        let env = env_from_pairs([("C1_TPS", "12")]);
        let monitors = MonitorSettings::from_env(&env);
        let options = CompileOptions {
            monitors,
            ..CompileOptions::default()
        };
        let compiler = PlanCompiler::new(&tree, &env).with_options(options);
        let first = render_yaml(&compiler.compile("C").expect("first")).expect("render");
        let second = render_yaml(&compiler.compile("C").expect("second")).expect("render");
        assert_eq!(first, second);
        let z_at = first.find("z: 1").expect("z");
        let a_at = first.find("a: x").expect("a");
        assert!(z_at < a_at, "argument order must follow the input: {}", first);
    }

    #[test]
    fn optimal_tps_file_is_read_as_number() {
        let path = temp_path("optimal");
        fs::write(&path, "150\n").expect("write");
        assert_eq!(read_optimal_tps(&path).expect("read"), Number::from(150));
        fs::write(&path, "fast").expect("write");
        let err = read_optimal_tps(&path).expect_err("not numeric");
        assert!(matches!(err, CompileError::TypeCoercion { .. }));
        let _ = fs::remove_file(path);
    }
}
