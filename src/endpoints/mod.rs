//! Endpoint catalog: a descriptive view of a loaded module's routes, built from its manifest.
//! Used for documentation and client generation only; dispatch never reads it.

mod schema;

pub use schema::SchemaTranslator;

use crate::manifest::{ActionEntry, ControllerEntry, Manifest, ParameterSource};
use crate::runtime::full_template;
use axum::http::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointDescriptor {
    pub controller: String,
    pub action: String,
    pub http_method: String,
    pub route: String,
    pub description: String,
    pub parameters: Vec<ParamDescriptor>,
    pub responses: Vec<ResponseDescriptor>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParamDescriptor {
    pub name: String,
    pub source: ParameterSource,
    pub required: bool,
    pub type_name: String,
    /// JSON schema, serialized.
    pub schema: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseDescriptor {
    pub status: u16,
    pub description: String,
    #[serde(default)]
    pub type_name: Option<String>,
    #[serde(default)]
    pub schema: Option<String>,
}

/// Describe every action of `manifest`. An action that cannot be described is logged and skipped.
pub fn extract(manifest: &Manifest) -> Vec<EndpointDescriptor> {
    let translator = SchemaTranslator::new(&manifest.types);
    let mut out = Vec::with_capacity(manifest.action_count());
    for controller in &manifest.controllers {
        for action in &controller.actions {
            match describe(&translator, controller, action) {
                Ok(endpoint) => out.push(endpoint),
                Err(e) => tracing::warn!(
                    module = %manifest.module,
                    controller = %controller.name,
                    action = %action.name,
                    error = %e,
                    "skipping endpoint description"
                ),
            }
        }
    }
    out
}

fn describe(
    translator: &SchemaTranslator<'_>,
    controller: &ControllerEntry,
    action: &ActionEntry,
) -> Result<EndpointDescriptor, String> {
    let method = Method::from_bytes(action.method.to_ascii_uppercase().as_bytes())
        .map_err(|_| format!("invalid HTTP method '{}'", action.method))?;
    if !action.route.starts_with('/') {
        return Err(format!("route '{}' is not absolute", action.route));
    }
    let parameters = action
        .parameters
        .iter()
        .map(|p| {
            Ok(ParamDescriptor {
                name: p.name.clone(),
                source: p.source,
                required: p.required,
                type_name: p.type_name.clone(),
                schema: translator.schema_json(&p.type_name)?,
            })
        })
        .collect::<Result<Vec<_>, String>>()?;
    let responses = action
        .responses
        .iter()
        .map(|r| {
            let schema = match &r.type_name {
                Some(t) => Some(translator.schema_json(t)?),
                None => None,
            };
            Ok(ResponseDescriptor {
                status: r.status,
                description: r.description.clone(),
                type_name: r.type_name.clone(),
                schema,
            })
        })
        .collect::<Result<Vec<_>, String>>()?;
    Ok(EndpointDescriptor {
        controller: controller.name.clone(),
        action: action.name.clone(),
        http_method: method.as_str().to_string(),
        route: action.route.clone(),
        description: action.description.clone().unwrap_or_default(),
        parameters,
        responses,
    })
}

/// `/customers/:id` -> `/customers/{id}`
fn openapi_path(route: &str) -> String {
    route
        .split('/')
        .map(|s| match s.strip_prefix(':') {
            Some(name) => format!("{{{}}}", name),
            None => s.to_string(),
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn parse_schema(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| json!({ "type": "object" }))
}

/// OpenAPI 3.1 document for one connection's endpoints, rooted at `/api/v1/<prefix>`.
pub fn openapi_document(title: &str, prefix: &str, endpoints: &[EndpointDescriptor]) -> Value {
    let mut paths = Map::new();
    for endpoint in endpoints {
        let path = format!("/api/v1{}", openapi_path(&full_template(prefix, &endpoint.route)));
        let mut parameters = Vec::new();
        let mut request_body = None;
        for p in &endpoint.parameters {
            match p.source {
                ParameterSource::Body => {
                    request_body = Some(json!({
                        "required": p.required,
                        "content": { "application/json": { "schema": parse_schema(&p.schema) } }
                    }));
                }
                ParameterSource::Path | ParameterSource::Query => parameters.push(json!({
                    "name": p.name,
                    "in": if p.source == ParameterSource::Path { "path" } else { "query" },
                    "required": p.required,
                    "schema": parse_schema(&p.schema),
                })),
            }
        }
        let mut responses = Map::new();
        for r in &endpoint.responses {
            let mut body = json!({ "description": r.description });
            if let Some(schema) = &r.schema {
                body["content"] = json!({ "application/json": { "schema": parse_schema(schema) } });
            }
            responses.insert(r.status.to_string(), body);
        }
        let mut operation = json!({
            "operationId": format!("{}_{}", endpoint.controller, endpoint.action),
            "tags": [endpoint.controller],
            "summary": endpoint.description,
            "parameters": parameters,
            "responses": responses,
        });
        if let Some(body) = request_body {
            operation["requestBody"] = body;
        }
        let item = paths.entry(path).or_insert_with(|| json!({}));
        item[endpoint.http_method.to_ascii_lowercase()] = operation;
    }
    json!({
        "openapi": "3.1.0",
        "info": { "title": title, "version": env!("CARGO_PKG_VERSION") },
        "paths": paths,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{ParameterEntry, ResponseEntry, ServiceLifetime, TypeShape};
    use std::collections::BTreeMap;

    fn action(name: &str, method: &str, route: &str) -> ActionEntry {
        ActionEntry {
            name: name.into(),
            method: method.into(),
            route: route.into(),
            description: Some(format!("{} action", name)),
            parameters: vec![],
            responses: vec![],
        }
    }

    fn manifest() -> Manifest {
        let mut get = action("get_item", "GET", "/customers/:id");
        get.parameters.push(ParameterEntry {
            name: "id".into(),
            source: ParameterSource::Path,
            type_name: "i32".into(),
            required: true,
        });
        get.responses.push(ResponseEntry {
            status: 200,
            type_name: Some("CustomerDto".into()),
            description: "The row".into(),
        });
        let mut broken = action("create_item", "POST", "/customers");
        broken.parameters.push(ParameterEntry {
            name: "body".into(),
            source: ParameterSource::Body,
            type_name: "Vec<CustomerWrite".into(),
            required: true,
        });
        let mut types = BTreeMap::new();
        types.insert("CustomerDto".to_string(), TypeShape::default());
        Manifest {
            module: "shop".into(),
            format_version: 1,
            database_kind: "postgres".into(),
            controllers: vec![ControllerEntry {
                name: "CustomerController".into(),
                service: "CustomerService".into(),
                lifetime: ServiceLifetime::Scoped,
                actions: vec![
                    action("list_items", "GET", "/customers"),
                    broken,
                    get,
                    action("odd", "NOT A VERB", "/x"),
                ],
            }],
            types,
        }
    }

    #[test]
    fn broken_actions_are_skipped_not_fatal() {
        let endpoints = extract(&manifest());
        let names: Vec<&str> = endpoints.iter().map(|e| e.action.as_str()).collect();
        assert_eq!(names, vec!["list_items", "get_item"]);
        let get = &endpoints[1];
        assert_eq!(get.http_method, "GET");
        assert_eq!(get.parameters[0].source, ParameterSource::Path);
        let schema: Value = serde_json::from_str(&get.parameters[0].schema).unwrap();
        assert_eq!(schema["type"], "integer");
        assert!(get.responses[0].schema.is_some());
    }

    #[test]
    fn openapi_paths_use_brace_parameters() {
        let endpoints = extract(&manifest());
        let doc = openapi_document("shop", "shop", &endpoints);
        assert_eq!(doc["openapi"], "3.1.0");
        let op = &doc["paths"]["/api/v1/shop/customers/{id}"]["get"];
        assert_eq!(op["parameters"][0]["in"], "path");
        assert_eq!(op["responses"]["200"]["description"], "The row");
        assert!(doc["paths"]["/api/v1/shop/customers"]["get"].is_object());
    }

    #[test]
    fn descriptor_wire_format_is_camel_case() {
        let endpoints = extract(&manifest());
        let v = serde_json::to_value(&endpoints[1]).unwrap();
        assert_eq!(v["httpMethod"], "GET");
        assert_eq!(v["parameters"][0]["typeName"], "i32");
    }
}
