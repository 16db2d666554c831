//! Host settings from environment variables. Call `dotenvy::dotenv()` first to pick up a `.env` file.

use crate::error::ConfigError;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct Settings {
    /// Host database holding `_sys_connections`.
    pub database_url: String,
    /// Schema for the host's own tables. Must be a valid identifier.
    pub sys_schema: String,
    pub bind: String,
    /// Root for generated packages and the shared cargo target dir.
    pub workspace_dir: PathBuf,
    /// Root for per-connection load contexts.
    pub runtime_dir: PathBuf,
    pub cargo: String,
    pub offline: bool,
    pub compile_workers: usize,
    pub introspection_timeout: Duration,
    pub module_startup_timeout: Duration,
    /// Allow MySQL output-shape probing by executing procedures inside a rolled-back transaction.
    /// Off unless `DYNAPI_PROBE_EXECUTE` enables it.
    pub probe_execute: bool,
    pub max_body_bytes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            database_url: "postgres://localhost/dynapi".into(),
            sys_schema: "dynapi".into(),
            bind: "0.0.0.0:3000".into(),
            workspace_dir: PathBuf::from(".dynapi/work"),
            runtime_dir: PathBuf::from(".dynapi/run"),
            cargo: "cargo".into(),
            offline: false,
            compile_workers: 1,
            introspection_timeout: Duration::from_secs(30),
            module_startup_timeout: Duration::from_secs(20),
            probe_execute: false,
            max_body_bytes: 2 * 1024 * 1024,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut s = Settings::default();
        if let Some(v) = lookup("DATABASE_URL") {
            s.database_url = v;
        }
        if let Some(v) = lookup("DYNAPI_SCHEMA") {
            if !is_identifier(&v) {
                return Err(ConfigError::Invalid {
                    key: "DYNAPI_SCHEMA",
                    message: format!("'{}' is not a valid identifier", v),
                });
            }
            s.sys_schema = v;
        }
        if let Some(v) = lookup("DYNAPI_BIND") {
            s.bind = v;
        }
        if let Some(v) = lookup("DYNAPI_WORKSPACE") {
            s.workspace_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("DYNAPI_RUNTIME_DIR") {
            s.runtime_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("DYNAPI_CARGO") {
            s.cargo = v;
        }
        if let Some(v) = lookup("DYNAPI_OFFLINE") {
            s.offline = parse_bool("DYNAPI_OFFLINE", &v)?;
        }
        if let Some(v) = lookup("DYNAPI_COMPILE_WORKERS") {
            s.compile_workers = parse_num::<usize>("DYNAPI_COMPILE_WORKERS", &v)?.max(1);
        }
        if let Some(v) = lookup("DYNAPI_INTROSPECTION_TIMEOUT_SECS") {
            s.introspection_timeout =
                Duration::from_secs(parse_num("DYNAPI_INTROSPECTION_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = lookup("DYNAPI_MODULE_STARTUP_TIMEOUT_SECS") {
            s.module_startup_timeout =
                Duration::from_secs(parse_num("DYNAPI_MODULE_STARTUP_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = lookup("DYNAPI_PROBE_EXECUTE") {
            s.probe_execute = parse_bool("DYNAPI_PROBE_EXECUTE", &v)?;
        }
        if let Some(v) = lookup("DYNAPI_MAX_BODY_BYTES") {
            s.max_body_bytes = parse_num("DYNAPI_MAX_BODY_BYTES", &v)?;
        }
        Ok(s)
    }

    /// Shared `CARGO_TARGET_DIR` so reference dependencies build once per host.
    pub fn target_dir(&self) -> PathBuf {
        self.workspace_dir.join("target")
    }
}

fn parse_bool(key: &'static str, v: &str) -> Result<bool, ConfigError> {
    match v.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::Invalid {
            key,
            message: format!("expected a boolean, got '{}'", other),
        }),
    }
}

fn parse_num<T: FromStr>(key: &'static str, v: &str) -> Result<T, ConfigError> {
    v.trim().parse::<T>().map_err(|_| ConfigError::Invalid {
        key,
        message: format!("expected a number, got '{}'", v),
    })
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
