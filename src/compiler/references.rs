//! The fixed reference set every generated module builds against: pinned dependencies plus the
//! support sources (`error`, `paging`, `results`) that generated code imports from `crate::`.
//! Templates and this list change together; bump `VERSION` when either does.

use crate::schema::DatabaseKind;

pub const VERSION: &str = "1";

const SUPPORT: &[(&str, &str)] = &[
    ("src/error.rs", include_str!("support/error.rs.in")),
    ("src/paging.rs", include_str!("support/paging.rs.in")),
    ("src/results.rs", include_str!("support/results.rs.in")),
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dependency {
    pub name: &'static str,
    pub version: &'static str,
    pub features: Vec<&'static str>,
}

impl Dependency {
    fn new(name: &'static str, version: &'static str, features: &[&'static str]) -> Self {
        Dependency {
            name,
            version,
            features: features.to_vec(),
        }
    }

    fn toml_line(&self) -> String {
        if self.features.is_empty() {
            format!("{} = \"{}\"\n", self.name, self.version)
        } else {
            let features: Vec<String> = self.features.iter().map(|f| format!("\"{}\"", f)).collect();
            format!(
                "{} = {{ version = \"{}\", features = [{}] }}\n",
                self.name,
                self.version,
                features.join(", ")
            )
        }
    }
}

#[derive(Clone, Debug)]
pub struct ReferenceSet {
    pub kind: DatabaseKind,
    pub dependencies: Vec<Dependency>,
}

impl ReferenceSet {
    pub fn standard(kind: DatabaseKind) -> Self {
        let driver = match kind {
            DatabaseKind::Postgres => "postgres",
            DatabaseKind::Mysql => "mysql",
        };
        ReferenceSet {
            kind,
            dependencies: vec![
                Dependency::new("anyhow", "1", &[]),
                Dependency::new("async-trait", "0.1", &[]),
                Dependency::new("axum", "0.7", &["json"]),
                Dependency::new("chrono", "0.4", &["serde"]),
                Dependency::new("rust_decimal", "1", &["serde"]),
                Dependency::new("serde", "1", &["derive"]),
                Dependency::new("serde_json", "1", &[]),
                Dependency::new(
                    "sqlx",
                    "0.8",
                    &["runtime-tokio", driver, "rust_decimal", "uuid", "chrono", "json"],
                ),
                Dependency::new("thiserror", "1", &[]),
                Dependency::new("tokio", "1", &["full"]),
                Dependency::new("tracing", "0.1", &[]),
                Dependency::new("tracing-subscriber", "0.3", &["env-filter"]),
                Dependency::new("uuid", "1", &["serde"]),
            ],
        }
    }

    /// Package name for a module; also the binary name.
    pub fn package_name(module: &str) -> String {
        format!("dynapi_mod_{}", module)
    }

    pub fn cargo_toml(&self, module: &str) -> String {
        let mut out = format!(
            "[package]\nname = \"{}\"\nversion = \"0.1.0\"\nedition = \"2021\"\npublish = false\n\n\
             [workspace]\n\n\
             [profile.release]\ndebug = \"limited\"\nsplit-debuginfo = \"packed\"\n\n\
             [dependencies]\n",
            Self::package_name(module)
        );
        for dep in &self.dependencies {
            out.push_str(&dep.toml_line());
        }
        out
    }

    pub fn support_sources(&self) -> impl Iterator<Item = (&'static str, &'static str)> {
        SUPPORT.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cargo_toml_pins_driver_feature() {
        let toml = ReferenceSet::standard(DatabaseKind::Mysql).cargo_toml("shop");
        assert!(toml.contains("name = \"dynapi_mod_shop\""));
        assert!(toml.contains("sqlx = { version = \"0.8\", features = [\"runtime-tokio\", \"mysql\""));
        assert!(toml.contains("anyhow = \"1\"\n"));
        // standalone package, never absorbed by an enclosing workspace
        assert!(toml.contains("[workspace]"));
    }

    #[test]
    fn support_sources_cover_crate_imports() {
        let set = ReferenceSet::standard(DatabaseKind::Postgres);
        let paths: Vec<&str> = set.support_sources().map(|(p, _)| p).collect();
        assert_eq!(paths, vec!["src/error.rs", "src/paging.rs", "src/results.rs"]);
    }

    #[allow(dead_code)]
    mod paging {
        include!("support/paging.rs.in");
    }

    #[test]
    fn paging_offset_saturates_on_huge_pages() {
        let query = paging::PageQuery {
            page: Some(i64::MAX),
            page_size: Some(paging::MAX_PAGE_SIZE),
        };
        assert_eq!(query.offset(), i64::MAX);

        let query = paging::PageQuery {
            page: Some(3),
            page_size: Some(20),
        };
        assert_eq!(query.offset(), 40);
        assert_eq!(paging::PageQuery::default().offset(), 0);
    }
}
