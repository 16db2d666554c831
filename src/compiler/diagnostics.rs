//! Reads the `--message-format=json` stream of a cargo build.

use crate::error::Diagnostic;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Deserialize)]
struct CargoMessage {
    reason: String,
    #[serde(default)]
    package_id: String,
    target: Option<CargoTarget>,
    message: Option<RustcMessage>,
    executable: Option<PathBuf>,
    success: Option<bool>,
}

#[derive(Deserialize)]
struct CargoTarget {
    name: String,
}

#[derive(Deserialize)]
struct RustcMessage {
    level: String,
    message: String,
    code: Option<RustcCode>,
    #[serde(default)]
    spans: Vec<RustcSpan>,
}

#[derive(Deserialize)]
struct RustcCode {
    code: String,
}

#[derive(Deserialize)]
struct RustcSpan {
    file_name: String,
    line_start: u32,
    column_start: u32,
    is_primary: bool,
}

#[derive(Debug, Default)]
pub struct BuildReport {
    /// Error-level diagnostics of the module package, in emission order.
    pub diagnostics: Vec<Diagnostic>,
    pub executable: Option<PathBuf>,
    pub success: Option<bool>,
}

/// Non-JSON lines (cargo's own status output) are skipped.
pub fn parse_build_output(stdout: &str, package: &str) -> BuildReport {
    let mut report = BuildReport::default();
    for line in stdout.lines() {
        let Ok(msg) = serde_json::from_str::<CargoMessage>(line) else {
            continue;
        };
        let ours = msg.target.as_ref().map(|t| t.name == package).unwrap_or(false)
            || msg.package_id.contains(package);
        match msg.reason.as_str() {
            "compiler-message" if ours => {
                let Some(m) = msg.message else { continue };
                if m.level != "error" {
                    continue;
                }
                // the trailing "aborting due to N previous errors" summary has no span
                let Some(span) = m.spans.iter().find(|s| s.is_primary).or(m.spans.first()) else {
                    continue;
                };
                report.diagnostics.push(Diagnostic {
                    file: span.file_name.clone(),
                    line: span.line_start,
                    column: span.column_start,
                    code: m.code.map(|c| c.code).unwrap_or_else(|| "error".to_string()),
                    message: m.message,
                });
            }
            "compiler-artifact" if ours => {
                if msg.executable.is_some() {
                    report.executable = msg.executable;
                }
            }
            "build-finished" => report.success = msg.success,
            _ => {}
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    const PKG: &str = "dynapi_mod_shop";

    #[test]
    fn keeps_module_errors_only() {
        let stdout = [
            r#"{"reason":"compiler-message","package_id":"path+file:///w/shop#dynapi_mod_shop@0.1.0","target":{"name":"dynapi_mod_shop","kind":["bin"]},"message":{"level":"error","message":"no field `title` on type `&CustomerDto`","code":{"code":"E0609","explanation":null},"spans":[{"file_name":"src/entities/customer/dto.rs","line_start":21,"column_start":14,"is_primary":true}]}}"#,
            r#"{"reason":"compiler-message","package_id":"path+file:///w/shop#dynapi_mod_shop@0.1.0","target":{"name":"dynapi_mod_shop","kind":["bin"]},"message":{"level":"warning","message":"unused import","code":null,"spans":[{"file_name":"src/main.rs","line_start":1,"column_start":1,"is_primary":true}]}}"#,
            r#"{"reason":"compiler-message","package_id":"registry+https://github.com/rust-lang/crates.io-index#other@1.0.0","target":{"name":"other","kind":["lib"]},"message":{"level":"error","message":"elsewhere","code":null,"spans":[{"file_name":"lib.rs","line_start":1,"column_start":1,"is_primary":true}]}}"#,
            r#"{"reason":"compiler-message","package_id":"path+file:///w/shop#dynapi_mod_shop@0.1.0","target":{"name":"dynapi_mod_shop","kind":["bin"]},"message":{"level":"error","message":"aborting due to 1 previous error","code":null,"spans":[]}}"#,
            "   Compiling dynapi_mod_shop v0.1.0",
            r#"{"reason":"build-finished","success":false}"#,
        ]
        .join("\n");
        let report = parse_build_output(&stdout, PKG);
        assert_eq!(report.success, Some(false));
        assert_eq!(report.diagnostics.len(), 1);
        let d = &report.diagnostics[0];
        assert_eq!(d.code, "E0609");
        assert_eq!(d.file, "src/entities/customer/dto.rs");
        assert_eq!((d.line, d.column), (21, 14));
    }

    #[test]
    fn finds_executable_artifact() {
        let stdout = r#"{"reason":"compiler-artifact","package_id":"path+file:///w/shop#dynapi_mod_shop@0.1.0","target":{"name":"dynapi_mod_shop","kind":["bin"]},"executable":"/w/target/release/dynapi_mod_shop"}
{"reason":"build-finished","success":true}"#;
        let report = parse_build_output(stdout, PKG);
        assert_eq!(report.success, Some(true));
        assert_eq!(report.executable, Some(PathBuf::from("/w/target/release/dynapi_mod_shop")));
    }
}
