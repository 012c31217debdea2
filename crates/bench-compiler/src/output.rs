use std::fs;
use std::io::Write;
use std::path::Path;

use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::error::{CompileError, Result};
use crate::model::BenchmarkPlan;

/// Renders the plan as the YAML document the execution engine reads.
pub fn render_yaml(plan: &BenchmarkPlan) -> Result<String> {
    Ok(serde_yaml::to_string(plan)?)
}

pub fn sha256_digest(bytes: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(bytes)))
}

/// Renders and writes the plan. Rendering finishes before the file is
/// touched, and the write goes through a temp file plus rename.
pub fn write_plan(path: &Path, plan: &BenchmarkPlan) -> Result<String> {
    let rendered = render_yaml(plan)?;
    atomic_write_bytes(path, rendered.as_bytes()).map_err(|source| CompileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(sha256_digest(rendered.as_bytes()))
}

fn atomic_write_bytes(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let ts = Utc::now().timestamp_micros();
    let pid = std::process::id();
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("plan.yaml");
    let tmp = path.with_file_name(format!(".{}.tmp.{}.{}", name, pid, ts));
    let mut file = fs::File::create(&tmp)?;
    if let Err(err) = file.write_all(bytes).and_then(|_| file.sync_all()) {
        let _ = fs::remove_file(&tmp);
        return Err(err);
    }
    if let Err(err) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(err);
    }
    Ok(())
}
