//! The cargo toolchain is probed once per process; every compilation reuses the result.

use crate::error::{Diagnostic, PipelineError};
use std::process::Command;
use std::sync::OnceLock;

static TOOLCHAIN: OnceLock<Result<String, String>> = OnceLock::new();

fn probe(cargo: &str) -> Result<String, String> {
    let output = Command::new(cargo)
        .arg("--version")
        .output()
        .map_err(|e| format!("cannot run {}: {}", cargo, e))?;
    if !output.status.success() {
        return Err(format!(
            "{} --version exited with {}: {}",
            cargo,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// `cargo --version` of the first `cargo` resolved in this process.
pub fn resolve(cargo: &str) -> Result<&'static str, PipelineError> {
    let resolved = TOOLCHAIN.get_or_init(|| {
        let probed = probe(cargo);
        match &probed {
            Ok(version) => tracing::info!(toolchain = %version, "cargo toolchain resolved"),
            Err(e) => tracing::error!(error = %e, "cargo toolchain unavailable"),
        }
        probed
    });
    resolved.as_deref().map_err(|message| PipelineError::Compilation {
        diagnostics: vec![Diagnostic {
            file: String::new(),
            line: 0,
            column: 0,
            code: "toolchain".into(),
            message: message.clone(),
        }],
    })
}
