//! One load context: a runtime directory holding the module executable, plus the serving child.

use crate::error::PipelineError;
use crate::manifest::Manifest;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

pub const CONNECTION_STRING_ENV: &str = "DYNAPI_CONNECTION_STRING";
pub const LISTEN_ENV: &str = "DYNAPI_LISTEN";
const READY_PREFIX: &str = "LISTENING ";
const EXECUTABLE: &str = "module";

fn load_error(message: impl Into<String>) -> PipelineError {
    PipelineError::Load(message.into())
}

/// Write the executable under `<runtime>/<name>/<hash16>/module`.
pub async fn materialize(runtime_dir: &Path, name: &str, hash: &str, binary: &[u8]) -> Result<PathBuf, PipelineError> {
    let dir = runtime_dir.join(name).join(hash.get(..16).unwrap_or(hash));
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| load_error(format!("cannot create {}: {}", dir.display(), e)))?;
    let path = dir.join(EXECUTABLE);
    tokio::fs::write(&path, binary)
        .await
        .map_err(|e| load_error(format!("cannot write {}: {}", path.display(), e)))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .await
            .map_err(|e| load_error(format!("cannot chmod {}: {}", path.display(), e)))?;
    }
    Ok(path)
}

/// Run the registration entry point (`--register`) and parse its manifest.
pub async fn register(executable: &Path, timeout: Duration) -> Result<Manifest, PipelineError> {
    let mut attempts = 0;
    let output = loop {
        let run = Command::new(executable)
            .arg("--register")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();
        match tokio::time::timeout(timeout, run).await {
            Err(_) => return Err(load_error("registration entry point timed out")),
            // ETXTBSY: a concurrently forked process still holds the freshly written file.
            Ok(Err(e)) if e.raw_os_error() == Some(26) && attempts < 5 => {
                attempts += 1;
                tokio::time::sleep(Duration::from_millis(20 * attempts)).await;
            }
            Ok(Err(e)) => return Err(load_error(format!("cannot start module: {}", e))),
            Ok(Ok(output)) => break output,
        }
    };
    if !output.status.success() {
        return Err(load_error(format!(
            "registration entry point exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Manifest::from_json(&String::from_utf8_lossy(&output.stdout))
        .map_err(|e| load_error(format!("registration manifest unreadable: {}", e)))
}

/// A serving module child. Dropping it kills the process.
#[derive(Debug)]
pub struct ModuleProcess {
    pub addr: String,
    pub dir: PathBuf,
    child: Child,
    drains: Vec<JoinHandle<()>>,
}

impl ModuleProcess {
    /// Spawn `--serve` and wait for its `LISTENING <addr>` line.
    pub async fn spawn(
        name: &str,
        executable: &Path,
        connection_string: &str,
        timeout: Duration,
    ) -> Result<ModuleProcess, PipelineError> {
        let mut child = Command::new(executable)
            .arg("--serve")
            .env(CONNECTION_STRING_ENV, connection_string)
            .env(LISTEN_ENV, "127.0.0.1:0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| load_error(format!("cannot start module: {}", e)))?;

        let mut drains = Vec::new();
        if let Some(stderr) = child.stderr.take() {
            let name = name.to_string();
            drains.push(tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(connection = %name, "{}", line);
                }
            }));
        }
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| load_error("module stdout unavailable"))?;
        let mut lines = BufReader::new(stdout).lines();

        let first = tokio::time::timeout(timeout, lines.next_line())
            .await
            .map_err(|_| load_error(format!("module did not report an address within {}s", timeout.as_secs())))?
            .map_err(|e| load_error(format!("cannot read module output: {}", e)))?;
        let addr = match first.as_deref().and_then(|l| l.trim().strip_prefix(READY_PREFIX)) {
            Some(addr) => addr.trim().to_string(),
            None => {
                let status = child.try_wait().ok().flatten();
                return Err(load_error(format!(
                    "module exited or misreported readiness (status {:?}, first line {:?})",
                    status, first
                )));
            }
        };
        drains.push(tokio::spawn(async move {
            while let Ok(Some(_)) = lines.next_line().await {}
        }));

        let dir = executable
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Ok(ModuleProcess {
            addr,
            dir,
            child,
            drains,
        })
    }

    pub fn upstream(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Stop the child and remove the runtime directory.
    pub async fn release(mut self) {
        if let Err(e) = self.child.kill().await {
            tracing::warn!(error = %e, "module process already gone");
        }
        for drain in self.drains.drain(..) {
            drain.abort();
        }
        remove_dir(&self.dir).await;
    }
}

pub async fn remove_dir(dir: &Path) {
    if dir.as_os_str().is_empty() {
        return;
    }
    if let Err(e) = tokio::fs::remove_dir_all(dir).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(dir = %dir.display(), error = %e, "cannot remove runtime directory");
        }
    }
}
