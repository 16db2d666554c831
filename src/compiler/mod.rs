//! Compiles a generated package into an executable module with `cargo build --release`.
//! Builds share one `CARGO_TARGET_DIR` so the reference-set dependencies compile once per host.

pub mod archive;
pub mod diagnostics;
mod references;
mod toolchain;

pub use references::{Dependency, ReferenceSet, VERSION as REFERENCE_SET_VERSION};
pub use toolchain::resolve as resolve_toolchain;

use crate::codegen::SourceFiles;
use crate::error::{Diagnostic, PipelineError};
use crate::settings::Settings;
use async_trait::async_trait;
use diagnostics::parse_build_output;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Output of a successful build. Intermediates stay in the workspace and are not retained here.
#[derive(Clone, Debug)]
pub struct CompiledArtifacts {
    pub binary: Vec<u8>,
    /// Packed DWARF (`.dwp`) when the platform produces one; otherwise empty.
    pub debug_symbols: Vec<u8>,
    pub source_archive: Vec<u8>,
}

#[derive(Clone, Debug)]
pub struct CompilerOptions {
    pub workspace_dir: PathBuf,
    pub cargo: String,
    pub offline: bool,
    pub workers: usize,
}

impl CompilerOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        CompilerOptions {
            workspace_dir: settings.workspace_dir.clone(),
            cargo: settings.cargo.clone(),
            offline: settings.offline,
            workers: settings.compile_workers,
        }
    }
}

/// Seam for the connection registry; [`Compiler`] is the cargo-backed implementation.
#[async_trait]
pub trait ModuleCompiler: Send + Sync {
    async fn compile(
        &self,
        module: &str,
        sources: &SourceFiles,
        references: &ReferenceSet,
    ) -> Result<CompiledArtifacts, PipelineError>;
}

#[derive(Clone)]
pub struct Compiler {
    options: Arc<CompilerOptions>,
    permits: Arc<Semaphore>,
}

impl Compiler {
    pub fn new(options: CompilerOptions) -> Self {
        let permits = Arc::new(Semaphore::new(options.workers.max(1)));
        Compiler {
            options: Arc::new(options),
            permits,
        }
    }

    /// Build `sources` plus the reference set as package `dynapi_mod_<module>`.
    /// The cargo process runs on the blocking pool, at most `workers` at a time.
    pub async fn compile(
        &self,
        module: &str,
        sources: &SourceFiles,
        references: &ReferenceSet,
    ) -> Result<CompiledArtifacts, PipelineError> {
        let _permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| PipelineError::Load(format!("compiler unavailable: {}", e)))?;
        let options = self.options.clone();
        let module = module.to_string();
        let package = package_files(&module, sources, references);
        tracing::info!(module = %module, files = package.len(), "compiling module");
        let started = std::time::Instant::now();
        let result = tokio::task::spawn_blocking(move || build(&options, &module, package))
            .await
            .map_err(|e| PipelineError::Load(format!("compile task failed: {}", e)))?;
        match &result {
            Ok(artifacts) => tracing::info!(
                elapsed_ms = started.elapsed().as_millis() as u64,
                binary_bytes = artifacts.binary.len(),
                "module compiled"
            ),
            Err(e) => tracing::warn!(error = %e, "module compilation failed"),
        }
        result
    }
}

#[async_trait]
impl ModuleCompiler for Compiler {
    async fn compile(
        &self,
        module: &str,
        sources: &SourceFiles,
        references: &ReferenceSet,
    ) -> Result<CompiledArtifacts, PipelineError> {
        Compiler::compile(self, module, sources, references).await
    }
}

/// Everything written to the package directory: manifest, support sources, generated sources.
fn package_files(module: &str, sources: &SourceFiles, references: &ReferenceSet) -> Vec<(String, String)> {
    let mut files = vec![("Cargo.toml".to_string(), references.cargo_toml(module))];
    files.extend(
        references
            .support_sources()
            .map(|(path, text)| (path.to_string(), text.to_string())),
    );
    files.extend(sources.iter().map(|(p, t)| (p.clone(), t.clone())));
    files
}

fn io_error(context: &str, path: &Path, e: std::io::Error) -> PipelineError {
    PipelineError::Load(format!("{} {}: {}", context, path.display(), e))
}

fn write_package(dir: &Path, files: &[(String, String)]) -> Result<(), PipelineError> {
    let src = dir.join("src");
    match std::fs::remove_dir_all(&src) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(io_error("cannot clear", &src, e)),
    }
    for (rel, text) in files {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| io_error("cannot create", parent, e))?;
        }
        std::fs::write(&path, text).map_err(|e| io_error("cannot write", &path, e))?;
    }
    Ok(())
}

/// Last lines of cargo's stderr, for failures that produce no rustc diagnostic (resolution, network).
fn stderr_diagnostic(stderr: &str) -> Diagnostic {
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let tail = lines[lines.len().saturating_sub(20)..].join("\n");
    Diagnostic {
        file: "Cargo.toml".into(),
        line: 0,
        column: 0,
        code: "cargo".into(),
        message: tail,
    }
}

fn build(options: &CompilerOptions, module: &str, files: Vec<(String, String)>) -> Result<CompiledArtifacts, PipelineError> {
    toolchain::resolve(&options.cargo)?;
    let package = ReferenceSet::package_name(module);
    let dir = options.workspace_dir.join(module);
    write_package(&dir, &files)?;

    let mut cmd = Command::new(&options.cargo);
    cmd.arg("build")
        .arg("--release")
        .arg("--message-format=json")
        .arg("--manifest-path")
        .arg(dir.join("Cargo.toml"))
        .env("CARGO_TARGET_DIR", options.workspace_dir.join("target"));
    if options.offline {
        cmd.arg("--offline");
    }
    let output = cmd
        .output()
        .map_err(|e| PipelineError::Load(format!("cannot run {}: {}", options.cargo, e)))?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    let report = parse_build_output(&stdout, &package);

    if !output.status.success() || report.success == Some(false) {
        let mut diagnostics = report.diagnostics;
        if diagnostics.is_empty() {
            diagnostics.push(stderr_diagnostic(&String::from_utf8_lossy(&output.stderr)));
        }
        return Err(PipelineError::Compilation { diagnostics });
    }

    let executable = report.executable.unwrap_or_else(|| {
        options
            .workspace_dir
            .join("target")
            .join("release")
            .join(format!("{}{}", package, std::env::consts::EXE_SUFFIX))
    });
    let binary = std::fs::read(&executable).map_err(|e| io_error("cannot read", &executable, e))?;
    let debug_symbols = std::fs::read(executable.with_extension("dwp")).unwrap_or_default();
    let source_archive = archive::write_archive(files.iter().map(|(p, t)| (p.as_str(), t.as_str())))?;

    Ok(CompiledArtifacts {
        binary,
        debug_symbols,
        source_archive,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::{Generator, TemplateSet};
    use crate::metadata::{map_entities, map_procedures};
    use crate::schema::{ColumnDef, DatabaseKind, DatabaseModel, RelationDef};

    fn customer_model() -> DatabaseModel {
        DatabaseModel {
            tables: vec![RelationDef {
                schema: "public".into(),
                name: "Customer".into(),
                columns: vec![
                    ColumnDef::new("Id", "int", false, 1).primary_key(),
                    ColumnDef::new("Name", "varchar", true, 2),
                ],
            }],
            ..Default::default()
        }
    }

    fn compiler(tag: &str) -> Compiler {
        Compiler::new(CompilerOptions {
            workspace_dir: std::env::temp_dir().join(format!("dynapi-compile-{}", tag)),
            cargo: std::env::var("DYNAPI_CARGO").unwrap_or_else(|_| "cargo".into()),
            offline: false,
            workers: 1,
        })
    }

    #[test]
    fn package_includes_support_sources() {
        let mut sources = SourceFiles::new();
        sources.insert("src/main.rs".into(), "fn main() {}".into());
        let files = package_files("shop", &sources, &ReferenceSet::standard(DatabaseKind::Postgres));
        let paths: Vec<&str> = files.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(
            paths,
            vec!["Cargo.toml", "src/error.rs", "src/paging.rs", "src/results.rs", "src/main.rs"]
        );
    }

    #[test]
    fn stderr_fallback_keeps_tail() {
        let stderr = (1..=30).map(|i| format!("line {}", i)).collect::<Vec<_>>().join("\n");
        let d = stderr_diagnostic(&stderr);
        assert_eq!(d.code, "cargo");
        assert!(d.message.starts_with("line 11"));
        assert!(d.message.ends_with("line 30"));
    }

    #[tokio::test]
    #[ignore = "requires cargo with crates.io access"]
    async fn customer_module_compiles_cleanly() {
        let kind = DatabaseKind::Postgres;
        let model = customer_model();
        let generated = Generator::default()
            .generate("shop", kind, map_entities(kind, &model), map_procedures(kind, &model))
            .await
            .unwrap();
        let artifacts = compiler("ok")
            .compile("shop", &generated.sources, &ReferenceSet::standard(kind))
            .await
            .unwrap();
        assert!(!artifacts.binary.is_empty());
        let names = archive::entry_names(&artifacts.source_archive).unwrap();
        assert!(names.contains(&"src/entities/customer/dto.rs".to_string()));
    }

    #[tokio::test]
    #[ignore = "requires cargo with crates.io access"]
    async fn undeclared_property_reports_dto_diagnostic() {
        let kind = DatabaseKind::Postgres;
        let model = customer_model();
        let broken_dto = format!(
            "{}\nimpl {{{{dto}}}} {{\n    pub fn title(&self) -> &str {{\n        &self.title\n    }}\n}}\n",
            include_str!("../codegen/templates/entity_dto.tpl")
        );
        let templates = TemplateSet::builtin()
            .with_override(crate::codegen::templates::ENTITY_DTO, &broken_dto)
            .unwrap();
        let generated = Generator::new(templates)
            .generate("shop", kind, map_entities(kind, &model), map_procedures(kind, &model))
            .await
            .unwrap();
        let err = compiler("broken")
            .compile("shop", &generated.sources, &ReferenceSet::standard(kind))
            .await
            .unwrap_err();
        let diagnostics = match err {
            PipelineError::Compilation { diagnostics } => diagnostics,
            other => panic!("expected compilation error, got {other}"),
        };
        assert!(diagnostics
            .iter()
            .any(|d| d.code == "E0609" && d.file.ends_with("entities/customer/dto.rs") && d.line > 0));
    }
}
