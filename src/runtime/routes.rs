//! Live route table. Loaded modules append their routes here; the API fallback dispatches
//! through it, so new endpoints become reachable without restarting the host.

use std::sync::RwLock;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteEntry {
    pub connection: String,
    pub method: String,
    /// Full template under the API root, e.g. `/shop/customers/:id`.
    pub template: String,
    /// `http://127.0.0.1:<port>` of the module process.
    pub upstream: String,
    /// Length of the `/<prefix>` part stripped before proxying.
    prefix_len: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteMatch {
    pub connection: String,
    pub upstream: String,
    /// Path as the module sees it, e.g. `/customers/7`.
    pub module_path: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    Matched(RouteMatch),
    MethodNotAllowed,
    NotFound,
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// `:name` segments match any one non-empty segment.
fn template_matches(template: &str, path: &str) -> bool {
    let mut t = segments(template);
    let mut p = segments(path);
    loop {
        match (t.next(), p.next()) {
            (None, None) => return true,
            (Some(ts), Some(ps)) if ts.starts_with(':') || ts == ps => {}
            _ => return false,
        }
    }
}

/// `/shop/` + `/customers` -> `/shop/customers`
pub fn full_template(prefix: &str, module_route: &str) -> String {
    let prefix = prefix.trim_matches('/');
    let route = module_route.trim_start_matches('/');
    if route.is_empty() {
        format!("/{}", prefix)
    } else {
        format!("/{}/{}", prefix, route)
    }
}

#[derive(Debug, Default)]
pub struct RouteRegistry {
    entries: RwLock<Vec<RouteEntry>>,
}

impl RouteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `(method, module route)` pairs for one connection. Returns how many were added.
    pub fn register<'a>(
        &self,
        connection: &str,
        prefix: &str,
        upstream: &str,
        routes: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> usize {
        let prefix_len = full_template(prefix, "").len();
        let new: Vec<RouteEntry> = routes
            .into_iter()
            .map(|(method, route)| RouteEntry {
                connection: connection.to_string(),
                method: method.to_ascii_uppercase(),
                template: full_template(prefix, route),
                upstream: upstream.to_string(),
                prefix_len,
            })
            .collect();
        let added = new.len();
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.extend(new);
        tracing::info!(connection = %connection, routes = added, "routes registered");
        added
    }

    /// Drop every route of a connection. Returns how many were removed.
    pub fn remove_connection(&self, connection: &str) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|e| e.connection != connection);
        before - entries.len()
    }

    pub fn routes_for(&self, connection: &str) -> Vec<RouteEntry> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.iter().filter(|e| e.connection == connection).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `path` is relative to the API root, e.g. `/shop/customers/7`.
    pub fn resolve(&self, method: &str, path: &str) -> Resolution {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let mut path_seen = false;
        for entry in entries.iter() {
            if !template_matches(&entry.template, path) {
                continue;
            }
            if !entry.method.eq_ignore_ascii_case(method) {
                path_seen = true;
                continue;
            }
            let rest = path.get(entry.prefix_len..).unwrap_or("");
            let module_path = if rest.is_empty() { "/".to_string() } else { rest.to_string() };
            return Resolution::Matched(RouteMatch {
                connection: entry.connection.clone(),
                upstream: entry.upstream.clone(),
                module_path,
            });
        }
        if path_seen {
            Resolution::MethodNotAllowed
        } else {
            Resolution::NotFound
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> RouteRegistry {
        let r = RouteRegistry::new();
        r.register(
            "shop",
            "/shop/",
            "http://127.0.0.1:4000",
            [("GET", "/customers"), ("POST", "/customers"), ("GET", "/customers/:id")],
        );
        r
    }

    #[test]
    fn matches_templates_and_strips_prefix() {
        let r = registry();
        match r.resolve("get", "/shop/customers/7") {
            Resolution::Matched(m) => {
                assert_eq!(m.connection, "shop");
                assert_eq!(m.module_path, "/customers/7");
                assert_eq!(m.upstream, "http://127.0.0.1:4000");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn method_mismatch_and_unknown_paths() {
        let r = registry();
        assert_eq!(r.resolve("DELETE", "/shop/customers"), Resolution::MethodNotAllowed);
        assert_eq!(r.resolve("GET", "/shop/orders"), Resolution::NotFound);
        assert_eq!(r.resolve("GET", "/shopping/customers"), Resolution::NotFound);
        assert_eq!(r.resolve("GET", "/shop/customers/7/extra"), Resolution::NotFound);
    }

    #[test]
    fn removal_is_per_connection() {
        let r = registry();
        r.register("crm", "crm", "http://127.0.0.1:4001", [("GET", "/leads")]);
        assert_eq!(r.remove_connection("shop"), 3);
        assert!(r.routes_for("shop").is_empty());
        assert_eq!(r.routes_for("crm")[0].template, "/crm/leads");
        assert_eq!(r.len(), 1);
    }
}
