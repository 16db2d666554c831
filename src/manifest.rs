//! Registration manifest: what a compiled module declares about itself.
//! Embedded in the module at generation time and printed by `--register`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const FORMAT_VERSION: u32 = 1;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub module: String,
    pub format_version: u32,
    pub database_kind: String,
    pub controllers: Vec<ControllerEntry>,
    /// Named DTO/input/output shapes referenced by action parameters and responses.
    #[serde(default)]
    pub types: BTreeMap<String, TypeShape>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ServiceLifetime {
    /// One instance for the life of the module.
    Singleton,
    /// One instance per request.
    Scoped,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerEntry {
    pub name: String,
    pub service: String,
    pub lifetime: ServiceLifetime,
    pub actions: Vec<ActionEntry>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionEntry {
    pub name: String,
    pub method: String,
    /// Route template relative to the module root, e.g. `/customers/:id`.
    pub route: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: Vec<ParameterEntry>,
    #[serde(default)]
    pub responses: Vec<ResponseEntry>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParameterSource {
    Path,
    Query,
    Body,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterEntry {
    pub name: String,
    pub source: ParameterSource,
    pub type_name: String,
    pub required: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEntry {
    pub status: u16,
    #[serde(default)]
    pub type_name: Option<String>,
    pub description: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeShape {
    pub fields: Vec<FieldShape>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldShape {
    /// Wire (JSON) name.
    pub name: String,
    pub type_name: String,
    pub nullable: bool,
}

impl Manifest {
    pub fn action_count(&self) -> usize {
        self.controllers.iter().map(|c| c.actions.len()).sum()
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text.trim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_manifest_with_defaults() {
        let text = r#"{
            "module": "shop",
            "formatVersion": 1,
            "databaseKind": "postgres",
            "controllers": [{
                "name": "CustomerController",
                "service": "CustomerService",
                "lifetime": "scoped",
                "actions": [{"name": "list_items", "method": "GET", "route": "/customers"}]
            }]
        }"#;
        let m = Manifest::from_json(text).unwrap();
        assert_eq!(m.action_count(), 1);
        assert_eq!(m.controllers[0].lifetime, ServiceLifetime::Scoped);
        assert!(m.types.is_empty());
        assert!(m.controllers[0].actions[0].parameters.is_empty());
    }

    #[test]
    fn parameter_source_is_camel_case() {
        let p = ParameterEntry {
            name: "id".into(),
            source: ParameterSource::Path,
            type_name: "i32".into(),
            required: true,
        };
        let v = serde_json::to_value(&p).unwrap();
        assert_eq!(v["source"], "path");
        assert_eq!(v["typeName"], "i32");
    }
}
