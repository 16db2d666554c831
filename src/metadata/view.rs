//! Flattened view models for the template engine. Every derived string (SQL, bind chains,
//! key signatures, routes, cache-key formats) is computed here so templates stay pure substitution.

use super::{EntityMetadata, ForeignKeyMeta, ProcedureMetadata, PropertyMeta};
use crate::case::{to_field_ident, to_snake_case};
use crate::dialect::call_sql;
use crate::schema::DatabaseKind;
use std::collections::BTreeMap;

/// Key/value context for one template render.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ViewModel {
    values: BTreeMap<&'static str, String>,
}

impl ViewModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: &'static str, value: impl Into<String>) -> &mut Self {
        self.values.insert(key, value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Copy of `self` with every entry of `other` layered on top.
    pub fn merged(&self, other: &ViewModel) -> ViewModel {
        let mut values = self.values.clone();
        values.extend(other.values.iter().map(|(k, v)| (*k, v.clone())));
        ViewModel { values }
    }
}

#[derive(Clone, Debug)]
pub struct EntityView {
    pub module: String,
    pub is_view: bool,
    pub accepts_create: bool,
    pub context: ViewModel,
    /// One context per resolved relation, rendered through the navigation sub-templates.
    pub navigations: Vec<ViewModel>,
}

#[derive(Clone, Debug)]
pub struct ProcedureView {
    pub module: String,
    pub has_output: bool,
    pub context: ViewModel,
}

/// Rust string literal with escapes, e.g. `"SELECT \"Id\" FROM ..."`.
pub fn rust_str(s: &str) -> String {
    format!("{:?}", s)
}

/// Raw string literal with as many `#` as needed to enclose `s` verbatim.
pub fn raw_str(s: &str) -> String {
    let mut hashes = 1;
    while s.contains(&format!("\"{}", "#".repeat(hashes))) {
        hashes += 1;
    }
    let h = "#".repeat(hashes);
    format!("r{h}\"{s}\"{h}")
}

const INDENT_CHAIN: &str = "            ";

/// Local names used by generated method bodies; key parameters must not shadow them.
const RESERVED_LOCALS: &[&str] = &[
    "body", "ctx", "page", "input", "done", "cache_key", "found", "hit", "created", "updated",
    "limit", "offset", "total", "items", "service",
];

/// Identifier used for a key property in generated signatures and route segments.
pub fn key_ident(p: &PropertyMeta) -> String {
    if RESERVED_LOCALS.contains(&p.field_name.as_str()) {
        format!("{}_key", p.field_name)
    } else {
        p.field_name.clone()
    }
}

/// `/customers`
pub fn collection_route(entity: &EntityMetadata) -> String {
    format!("/{}", entity.route)
}

/// `/customers/:id`, one segment per key property.
pub fn item_route(entity: &EntityMetadata) -> String {
    let segments: Vec<String> = entity.key_properties().map(|k| format!(":{}", key_ident(k))).collect();
    format!("/{}/{}", entity.route, segments.join("/"))
}

/// `/orders/:id/order_lines`
pub fn navigation_route(entity: &EntityMetadata, fk: &ForeignKeyMeta) -> String {
    format!("{}/{}", item_route(entity), to_snake_case(&fk.name))
}

/// Target entity and the column on it a resolved relation joins on. None for unresolved relations,
/// which are omitted from generated navigation code.
pub fn navigation_target<'a>(fk: &ForeignKeyMeta, all: &'a [EntityMetadata]) -> Option<(&'a EntityMetadata, &'a str)> {
    let referenced_property = fk.referenced_column.as_deref()?;
    let other = all.iter().find(|e| e.name == fk.referenced_entity_singular)?;
    let column = other.properties.iter().find(|p| p.name == referenced_property)?;
    Some((other, column.column.as_str()))
}

pub fn dto_name(entity_name: &str) -> String {
    format!("{}Dto", entity_name)
}

struct Sql<'a> {
    kind: DatabaseKind,
    entity: &'a EntityMetadata,
}

impl<'a> Sql<'a> {
    fn table(&self) -> String {
        self.kind.qualified(&self.entity.schema, &self.entity.table)
    }

    fn columns(&self) -> String {
        self.entity
            .properties
            .iter()
            .map(|p| self.kind.quote(&p.column))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// `k1 = $start AND k2 = $start+1`
    fn key_filter(&self, start: usize) -> String {
        self.entity
            .key_properties()
            .enumerate()
            .map(|(i, k)| format!("{} = {}", self.kind.quote(&k.column), self.kind.placeholder(start + i)))
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    fn key_order(&self) -> String {
        self.entity
            .key_properties()
            .map(|k| self.kind.quote(&k.column))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn returning(&self) -> String {
        if self.kind.supports_returning() {
            format!(" RETURNING {}", self.columns())
        } else {
            String::new()
        }
    }

    fn list(&self) -> String {
        format!(
            "SELECT {} FROM {} ORDER BY {} LIMIT {} OFFSET {}",
            self.columns(),
            self.table(),
            self.key_order(),
            self.kind.placeholder(1),
            self.kind.placeholder(2)
        )
    }

    fn count(&self) -> String {
        format!("SELECT COUNT(*) FROM {}", self.table())
    }

    fn find(&self) -> String {
        format!("SELECT {} FROM {} WHERE {}", self.columns(), self.table(), self.key_filter(1))
    }

    fn insert(&self, writable: &[&PropertyMeta]) -> String {
        if writable.is_empty() {
            return match self.kind {
                DatabaseKind::Postgres => format!("INSERT INTO {} DEFAULT VALUES{}", self.table(), self.returning()),
                DatabaseKind::Mysql => format!("INSERT INTO {} () VALUES ()", self.table()),
            };
        }
        let cols: Vec<String> = writable.iter().map(|p| self.kind.quote(&p.column)).collect();
        let params: Vec<String> = (1..=writable.len()).map(|i| self.kind.placeholder(i)).collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({}){}",
            self.table(),
            cols.join(", "),
            params.join(", "),
            self.returning()
        )
    }

    fn update(&self, settable: &[&PropertyMeta]) -> String {
        if settable.is_empty() {
            return self.find();
        }
        let sets: Vec<String> = settable
            .iter()
            .enumerate()
            .map(|(i, p)| format!("{} = {}", self.kind.quote(&p.column), self.kind.placeholder(i + 1)))
            .collect();
        format!(
            "UPDATE {} SET {} WHERE {}{}",
            self.table(),
            sets.join(", "),
            self.key_filter(settable.len() + 1),
            self.returning()
        )
    }

    fn delete(&self) -> String {
        format!("DELETE FROM {} WHERE {}", self.table(), self.key_filter(1))
    }
}

fn dto_fields(properties: &[PropertyMeta]) -> String {
    let mut out = String::new();
    for p in properties {
        out.push_str(&format!("    #[serde(rename = {})]\n", rust_str(&p.json_name())));
        out.push_str(&format!("    #[sqlx(rename = {})]\n", rust_str(&p.column)));
        out.push_str(&format!("    pub {}: {},\n", p.field_name, p.field_type()));
    }
    out
}

fn write_fields(writable: &[&PropertyMeta]) -> String {
    let mut out = String::new();
    for p in writable {
        if p.nullable {
            out.push_str(&format!("    #[serde(rename = {}, default)]\n", rust_str(&p.json_name())));
        } else {
            out.push_str(&format!("    #[serde(rename = {})]\n", rust_str(&p.json_name())));
        }
        out.push_str(&format!("    pub {}: {},\n", p.field_name, p.field_type()));
    }
    out
}

fn binds(exprs: impl Iterator<Item = String>) -> String {
    exprs.map(|e| format!("{}.bind({})\n", INDENT_CHAIN, e)).collect()
}

/// Key-related fragments shared by every entity template and its navigations.
fn key_context(ctx: &mut ViewModel, entity: &EntityMetadata) {
    let keys: Vec<&PropertyMeta> = entity.key_properties().collect();
    let idents: Vec<String> = keys.iter().map(|k| key_ident(k)).collect();
    let params: Vec<String> = keys
        .iter()
        .zip(&idents)
        .map(|(k, ident)| format!("{}: {}", ident, k.ty.rust_type()))
        .collect();
    let types: Vec<&str> = keys.iter().map(|k| k.ty.rust_type()).collect();
    let (pattern, path_type) = if keys.len() == 1 {
        (idents[0].clone(), types[0].to_string())
    } else {
        (format!("({})", idents.join(", ")), format!("({})", types.join(", ")))
    };
    let placeholders = vec!["{:?}"; keys.len()].join(":");

    ctx.set("key_params", params.join(", "))
        .set("key_args", idents.join(", "))
        .set("key_binds", binds(idents.iter().cloned()))
        .set("key_pattern", pattern)
        .set("key_path_type", path_type)
        .set("cache_key_format", rust_str(&format!("{}:{}", entity.name, placeholders)))
        .set("cache_prefix", rust_str(&format!("{}:", entity.name)));
}

/// Without `RETURNING` a created row is read back through `last_insert_id`, so every generated
/// key must be an integer.
pub fn accepts_create(kind: DatabaseKind, entity: &EntityMetadata) -> bool {
    !entity.is_view
        && (kind.supports_returning()
            || entity
                .key_properties()
                .filter(|k| k.is_auto_generated)
                .all(|k| k.ty.is_integer()))
}

fn create_body(kind: DatabaseKind, entity: &EntityMetadata, writable: &[&PropertyMeta]) -> String {
    let dto = dto_name(&entity.name);
    let insert_binds = binds(writable.iter().map(|p| format!("body.{}", p.field_name)));
    if kind.supports_returning() {
        return format!(
            "        sqlx::query_as::<_, {dto}>(INSERT_SQL)\n{insert_binds}{INDENT_CHAIN}.fetch_one(&self.ctx.write)\n{INDENT_CHAIN}.await\n"
        );
    }
    let mut out = String::new();
    let keys: Vec<&PropertyMeta> = entity.key_properties().collect();
    for k in keys.iter().filter(|k| !k.is_auto_generated) {
        if k.nullable {
            out.push_str(&format!(
                "        let key_{f} = body.{f}.clone().ok_or_else(|| sqlx::Error::Protocol(\"key column is null\".into()))?;\n",
                f = k.field_name
            ));
        } else {
            out.push_str(&format!("        let key_{f} = body.{f}.clone();\n", f = k.field_name));
        }
    }
    out.push_str(&format!(
        "        let done = sqlx::query(INSERT_SQL)\n{insert_binds}{INDENT_CHAIN}.execute(&self.ctx.write)\n{INDENT_CHAIN}.await?;\n"
    ));
    for k in keys.iter().filter(|k| k.is_auto_generated) {
        if !k.ty.is_integer() {
            out.push_str(
                "        let _ = done;\n        Err(sqlx::Error::Protocol(\"inserted row cannot be read back: generated key is not an integer\".into()))\n",
            );
            return out;
        }
        out.push_str(&format!(
            "        let key_{} = done.last_insert_id() as {};\n",
            k.field_name,
            k.ty.rust_type()
        ));
    }
    let args: Vec<String> = keys.iter().map(|k| format!("key_{}", k.field_name)).collect();
    out.push_str(&format!(
        "        self.find({}).await?.ok_or(sqlx::Error::RowNotFound)\n",
        args.join(", ")
    ));
    out
}

fn update_body(kind: DatabaseKind, entity: &EntityMetadata, settable: &[&PropertyMeta], key_args: &str) -> String {
    if settable.is_empty() {
        return format!("        let _ = body;\n        self.find({}).await\n", key_args);
    }
    let dto = dto_name(&entity.name);
    let set_binds = binds(settable.iter().map(|p| format!("body.{}", p.field_name)));
    let idents: Vec<String> = entity.key_properties().map(key_ident).collect();
    if kind.supports_returning() {
        let key_binds = binds(idents.into_iter());
        return format!(
            "        sqlx::query_as::<_, {dto}>(UPDATE_SQL)\n{set_binds}{key_binds}{INDENT_CHAIN}.fetch_optional(&self.ctx.write)\n{INDENT_CHAIN}.await\n"
        );
    }
    let key_binds = binds(idents.iter().map(|i| format!("{}.clone()", i)));
    format!(
        "        sqlx::query(UPDATE_SQL)\n{set_binds}{key_binds}{INDENT_CHAIN}.execute(&self.ctx.write)\n{INDENT_CHAIN}.await?;\n        self.find({key_args}).await\n"
    )
}

/// Build the entity context. `all` is the full mapped set, used to resolve navigation targets.
pub fn entity_view(kind: DatabaseKind, entity: &EntityMetadata, all: &[EntityMetadata]) -> EntityView {
    let sql = Sql { kind, entity };
    let writable: Vec<&PropertyMeta> = entity.properties.iter().filter(|p| !p.is_auto_generated).collect();
    let settable: Vec<&PropertyMeta> = writable.iter().copied().filter(|p| !p.is_key).collect();

    let creatable = accepts_create(kind, entity);
    if !entity.is_view && !creatable {
        tracing::warn!(
            entity = %entity.name,
            kind = %kind,
            "generated key cannot be read back after insert; create endpoint omitted"
        );
    }

    let mut ctx = ViewModel::new();
    key_context(&mut ctx, entity);
    let key_args = ctx.get("key_args").unwrap_or_default().to_string();
    ctx.set("entity", entity.name.clone())
        .set("entity_plural", entity.plural_name.clone())
        .set("dto", dto_name(&entity.name))
        .set("write_dto", format!("{}Write", entity.name))
        .set("repository_trait", format!("{}Repository", entity.name))
        .set("repository", format!("Sql{}Repository", entity.name))
        .set("service_trait", format!("{}ServiceApi", entity.name))
        .set("service", format!("{}Service", entity.name))
        .set("collection_route", rust_str(&collection_route(entity)))
        .set("item_route", rust_str(&item_route(entity)))
        .set("collection_methods", if creatable { "get(list_items).post(create_item)" } else { "get(list_items)" })
        .set("dto_fields", dto_fields(&entity.properties))
        .set("write_fields", write_fields(&writable))
        .set("list_sql", rust_str(&sql.list()))
        .set("count_sql", rust_str(&sql.count()))
        .set("find_sql", rust_str(&sql.find()))
        .set("insert_sql", rust_str(&sql.insert(&writable)))
        .set("update_sql", rust_str(&sql.update(&settable)))
        .set("delete_sql", rust_str(&sql.delete()))
        .set("create_body", create_body(kind, entity, &writable))
        .set("update_body", update_body(kind, entity, &settable, &key_args));

    let navigations = entity
        .foreign_keys
        .iter()
        .filter_map(|fk| navigation_view(kind, entity, fk, all))
        .collect();

    EntityView {
        module: entity.module_name(),
        is_view: entity.is_view,
        accepts_create: creatable,
        context: ctx,
        navigations,
    }
}

fn navigation_view(
    kind: DatabaseKind,
    entity: &EntityMetadata,
    fk: &ForeignKeyMeta,
    all: &[EntityMetadata],
) -> Option<ViewModel> {
    let (other, other_column) = navigation_target(fk, all)?;
    let own_column = &fk.column;

    let own = Sql { kind, entity };
    let theirs = Sql { kind, entity: other };
    // to-one: own fk column -> other column; collection: own column <- other fk column.
    let sql = format!(
        "SELECT {} FROM {} WHERE {} IN (SELECT {} FROM {} WHERE {})",
        theirs.columns(),
        theirs.table(),
        kind.quote(other_column),
        kind.quote(own_column),
        own.table(),
        own.key_filter(1)
    );
    let dto_path = format!("crate::entities::{}::{}", other.module_name(), dto_name(&other.name));
    let (ret, fetch) = if fk.is_collection {
        (format!("Vec<{}>", dto_path), "fetch_all")
    } else {
        (format!("Option<{}>", dto_path), "fetch_optional")
    };
    let method = to_field_ident(&fk.name);

    let mut ctx = ViewModel::new();
    ctx.set("nav_method", method.clone())
        .set("nav_handler", format!("get_{}", method))
        .set("nav_return", ret)
        .set("nav_dto", dto_path)
        .set("nav_fetch", fetch)
        .set("nav_sql", rust_str(&sql))
        .set("nav_route", rust_str(&navigation_route(entity, fk)));
    Some(ctx)
}

pub fn procedure_view(kind: DatabaseKind, procedure: &ProcedureMetadata) -> ProcedureView {
    let name = &procedure.normalized_name;
    let module = procedure.module_name();
    let params: Vec<(&str, bool)> = procedure
        .parameters
        .iter()
        .map(|p| (p.property.column.as_str(), p.is_output))
        .collect();
    let sql = call_sql(kind, procedure.kind, &procedure.schema, &procedure.name, &params);

    let mut input_fields = String::new();
    for p in procedure.inputs() {
        input_fields.push_str(&format!(
            "    #[serde(rename = {}, default)]\n",
            rust_str(&p.property.json_name())
        ));
        input_fields.push_str(&format!(
            "    pub {}: Option<{}>,\n",
            p.property.field_name,
            p.property.ty.rust_type()
        ));
    }

    let mut ctx = ViewModel::new();
    ctx.set("procedure", name.clone())
        .set("input", format!("{}Input", name))
        .set("output", format!("{}Output", name))
        .set("repository", format!("{}Repository", name))
        .set("service", format!("{}Service", name))
        .set("input_fields", input_fields)
        .set("output_fields", dto_fields(&procedure.output_set))
        .set("input_binds", binds(procedure.inputs().map(|p| format!("input.{}", p.property.field_name))))
        .set("call_sql", rust_str(&sql))
        .set("route", rust_str(&format!("/procedures/{}", module)))
        .set("output_module", if procedure.has_output { "pub mod output;\n" } else { "" });

    ProcedureView {
        module,
        has_output: procedure.has_output,
        context: ctx,
    }
}

/// Module-wide context: data context pool types, route assembly, module lists, embedded manifest.
pub fn module_view(
    kind: DatabaseKind,
    module_name: &str,
    entities: &[EntityMetadata],
    procedures: &[ProcedureMetadata],
    manifest_json: &str,
) -> ViewModel {
    let (pool_type, pool_options) = match kind {
        DatabaseKind::Postgres => ("sqlx::PgPool", "sqlx::postgres::PgPoolOptions"),
        DatabaseKind::Mysql => ("sqlx::MySqlPool", "sqlx::mysql::MySqlPoolOptions"),
    };
    let entity_modules: Vec<String> = entities.iter().map(|e| e.module_name()).collect();
    let procedure_modules: Vec<(String, String)> = procedures
        .iter()
        .map(|p| (p.module_name(), p.normalized_name.clone()))
        .collect();

    let mut ctx = ViewModel::new();
    ctx.set("module_name", module_name.to_string())
        .set("module_literal", rust_str(module_name))
        .set("database_kind", kind.as_str())
        .set("pool_type", pool_type)
        .set("pool_options", pool_options)
        .set("manifest_literal", raw_str(manifest_json))
        .set(
            "entity_modules",
            entity_modules.iter().map(|m| format!("pub mod {};\n", m)).collect::<String>(),
        )
        .set(
            "procedure_modules",
            procedure_modules.iter().map(|(m, _)| format!("pub mod {};\n", m)).collect::<String>(),
        )
        .set(
            "entity_routes",
            entity_modules
                .iter()
                .map(|m| format!("        .merge(crate::entities::{}::controller::routes())\n", m))
                .collect::<String>(),
        )
        .set(
            "procedure_routes",
            procedure_modules
                .iter()
                .map(|(m, _)| format!("        .merge(crate::procedures::{}::controller::routes())\n", m))
                .collect::<String>(),
        )
        .set(
            "procedure_layers",
            procedure_modules
                .iter()
                .map(|(m, n)| {
                    format!(
                        "        .layer(axum::Extension(std::sync::Arc::new(crate::procedures::{}::service::{}Service::new(&ctx))))\n",
                        m, n
                    )
                })
                .collect::<String>(),
        );
    ctx
}
