//! Tables and views -> EntityMetadata. Pass one maps entities and keys; pass two links foreign keys.

use super::{map_type, pluralize, EntityMetadata, ForeignKeyMeta, PropertyMeta};
use crate::case::{to_field_ident, to_snake_case, to_type_ident};
use crate::schema::{ColumnDef, DatabaseKind, DatabaseModel, RelationDef};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Navigation names that would collide with generated repository/service/handler methods.
const RESERVED_MEMBERS: &[&str] = &[
    "List", "Count", "Find", "Get", "Create", "Update", "Delete", "New", "Item", "Items", "Routes",
];

pub fn map_entities(kind: DatabaseKind, model: &DatabaseModel) -> Vec<EntityMetadata> {
    let mut relations: Vec<(&RelationDef, bool)> = model
        .tables
        .iter()
        .map(|t| (t, false))
        .chain(model.views.iter().map(|v| (v, true)))
        .collect();
    relations.sort_by(|a, b| {
        (a.0.schema.as_str(), a.0.name.as_str(), a.1).cmp(&(b.0.schema.as_str(), b.0.name.as_str(), b.1))
    });

    let mut base_counts: HashMap<String, usize> = HashMap::new();
    for (rel, _) in &relations {
        *base_counts.entry(to_type_ident(&rel.name)).or_default() += 1;
    }

    let mut used_names: HashSet<String> = HashSet::new();
    // "procedures" is the route root of generated routine endpoints.
    let mut used_routes: HashSet<String> = HashSet::from(["procedures".to_string()]);
    let mut entities: Vec<EntityMetadata> = Vec::with_capacity(relations.len());
    let mut sources: Vec<&RelationDef> = Vec::with_capacity(relations.len());
    for (rel, is_view) in relations {
        let base = to_type_ident(&rel.name);
        let preferred = if base_counts.get(&base).copied().unwrap_or(0) > 1 {
            format!("{}{}", to_type_ident(&rel.schema), base)
        } else {
            base
        };
        let name = unique(&preferred, &mut used_names);
        match map_relation(kind, rel, is_view, name, &mut used_routes) {
            Some(entity) => {
                entities.push(entity);
                sources.push(rel);
            }
            None => tracing::warn!(
                schema = %rel.schema,
                table = %rel.name,
                "no column has a mappable type; relation skipped"
            ),
        }
    }

    link_foreign_keys(&mut entities, &sources);
    entities
}

fn map_relation(
    kind: DatabaseKind,
    rel: &RelationDef,
    is_view: bool,
    name: String,
    used_routes: &mut HashSet<String>,
) -> Option<EntityMetadata> {
    let mut columns: Vec<&ColumnDef> = rel.columns.iter().collect();
    columns.sort_by_key(|c| c.ordinal);

    let mut used_props: HashSet<String> = HashSet::new();
    let mut used_fields: HashSet<String> = HashSet::new();
    let mut properties: Vec<PropertyMeta> = Vec::with_capacity(columns.len());
    for col in columns {
        let ty = map_type(kind, &col.data_type);
        if !ty.is_known() {
            tracing::warn!(
                table = %rel.name,
                column = %col.name,
                data_type = %col.data_type,
                "unmapped column type; column skipped"
            );
            continue;
        }
        properties.push(PropertyMeta {
            name: unique(&to_type_ident(&col.name), &mut used_props),
            column: col.name.clone(),
            field_name: unique_field(&to_field_ident(&col.name), &mut used_fields),
            ty,
            nullable: col.nullable,
            is_key: false,
            is_foreign_key: col.is_foreign_key,
            is_required: !col.nullable && !col.is_auto_generated,
            is_auto_generated: col.is_auto_generated,
        });
    }
    if properties.is_empty() {
        return None;
    }

    for i in key_indexes(rel, &properties) {
        properties[i].is_key = true;
    }
    let keys: BTreeMap<String, _> = properties
        .iter()
        .filter(|p| p.is_key)
        .map(|p| (p.name.clone(), p.ty))
        .collect();

    let plural_name = pluralize(&name);
    let route = unique_field(&to_snake_case(&plural_name), used_routes);
    Some(EntityMetadata {
        schema: rel.schema.clone(),
        table: rel.name.clone(),
        name,
        plural_name,
        route,
        keys,
        properties,
        foreign_keys: Vec::new(),
        is_view,
    })
}

/// Primary-key columns; else a column named `id`; else the first ending in `id`; else the first column.
fn key_indexes(rel: &RelationDef, properties: &[PropertyMeta]) -> Vec<usize> {
    let pk: Vec<usize> = properties
        .iter()
        .enumerate()
        .filter(|(_, p)| {
            rel.columns
                .iter()
                .any(|c| c.name == p.column && c.is_primary_key)
        })
        .map(|(i, _)| i)
        .collect();
    if !pk.is_empty() {
        return pk;
    }
    if let Some(i) = properties.iter().position(|p| p.column.eq_ignore_ascii_case("id")) {
        return vec![i];
    }
    if let Some(i) = properties
        .iter()
        .position(|p| p.column.to_lowercase().ends_with("id"))
    {
        return vec![i];
    }
    vec![0]
}

struct PendingLink {
    dependent: usize,
    to_one: ForeignKeyMeta,
    collection: Option<(usize, ForeignKeyMeta)>,
}

/// Second pass: every entity and key is known, so targets resolve regardless of input order.
fn link_foreign_keys(entities: &mut [EntityMetadata], sources: &[&RelationDef]) {
    let index: HashMap<(String, String), usize> = entities
        .iter()
        .enumerate()
        .map(|(i, e)| ((e.schema.clone(), e.table.clone()), i))
        .collect();

    let mut pending: Vec<PendingLink> = Vec::new();
    for (i, rel) in sources.iter().enumerate() {
        let dependent = &entities[i];
        let mut fk_columns: Vec<&ColumnDef> = rel.columns.iter().filter(|c| c.is_foreign_key).collect();
        fk_columns.sort_by_key(|c| c.ordinal);
        for col in fk_columns {
            let (Some(local), Some(ref_table)) = (dependent.property_by_column(&col.name), col.referenced_table.as_ref())
            else {
                continue;
            };
            let ref_schema = col.referenced_schema.clone().unwrap_or_else(|| dependent.schema.clone());
            let target = index.get(&(ref_schema, ref_table.clone())).copied();
            let nav_base = navigation_base(&local.column);

            let Some(t) = target else {
                tracing::warn!(
                    entity = %dependent.name,
                    column = %col.name,
                    referenced_table = %ref_table,
                    "foreign key target not mapped; navigation omitted"
                );
                let singular = to_type_ident(ref_table);
                pending.push(PendingLink {
                    dependent: i,
                    to_one: ForeignKeyMeta {
                        name: nav_base.unwrap_or_else(|| singular.clone()),
                        column: local.column.clone(),
                        referenced_entity_plural: pluralize(&singular),
                        referenced_entity_singular: singular,
                        referenced_column: None,
                        is_collection: false,
                    },
                    collection: None,
                });
                continue;
            };

            let target_entity = &entities[t];
            let referenced = col
                .referenced_column
                .as_deref()
                .and_then(|c| target_entity.property_by_column(c))
                .or_else(|| target_entity.key_properties().next());
            let Some(referenced) = referenced else { continue };

            pending.push(PendingLink {
                dependent: i,
                to_one: ForeignKeyMeta {
                    name: nav_base.unwrap_or_else(|| target_entity.name.clone()),
                    column: local.column.clone(),
                    referenced_entity_singular: target_entity.name.clone(),
                    referenced_entity_plural: target_entity.plural_name.clone(),
                    referenced_column: Some(referenced.name.clone()),
                    is_collection: false,
                },
                collection: Some((
                    t,
                    ForeignKeyMeta {
                        name: dependent.plural_name.clone(),
                        column: referenced.column.clone(),
                        referenced_entity_singular: dependent.name.clone(),
                        referenced_entity_plural: dependent.plural_name.clone(),
                        referenced_column: Some(local.name.clone()),
                        is_collection: true,
                    },
                )),
            });
        }
    }

    let mut used: Vec<HashSet<String>> = entities
        .iter()
        .map(|e| {
            e.properties
                .iter()
                .map(|p| p.name.clone())
                .chain(RESERVED_MEMBERS.iter().map(|s| s.to_string()))
                .collect()
        })
        .collect();
    for link in pending {
        let mut to_one = link.to_one;
        to_one.name = unique(&to_one.name, &mut used[link.dependent]);
        entities[link.dependent].foreign_keys.push(to_one);
        if let Some((t, mut many)) = link.collection {
            many.name = unique(&many.name, &mut used[t]);
            entities[t].foreign_keys.push(many);
        }
    }
}

/// "customer_id" -> Some("Customer"); "id" -> None.
fn navigation_base(column: &str) -> Option<String> {
    let lower = column.to_lowercase();
    let stem_len = if lower.ends_with("_id") {
        column.len() - 3
    } else if lower.ends_with("id") {
        column.len() - 2
    } else {
        column.len()
    };
    let stem = to_type_ident(column.get(..stem_len).unwrap_or(column));
    if stem.is_empty() || stem == "Unnamed" {
        None
    } else {
        Some(stem)
    }
}

/// `base`, or `base2`, `base3`, ... if already taken. Records the result.
pub(crate) fn unique(base: &str, used: &mut HashSet<String>) -> String {
    let mut candidate = base.to_string();
    let mut n = 2;
    while used.contains(&candidate) {
        candidate = format!("{}{}", base, n);
        n += 1;
    }
    used.insert(candidate.clone());
    candidate
}

/// Like `unique` with an underscore separator for snake_case names.
pub(crate) fn unique_field(base: &str, used: &mut HashSet<String>) -> String {
    let mut candidate = base.to_string();
    let mut n = 2;
    while used.contains(&candidate) {
        candidate = format!("{}_{}", base, n);
        n += 1;
    }
    used.insert(candidate.clone());
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::TargetType;

    fn table(name: &str, columns: Vec<ColumnDef>) -> RelationDef {
        RelationDef {
            schema: "public".into(),
            name: name.into(),
            columns,
        }
    }

    fn orders_model() -> DatabaseModel {
        DatabaseModel {
            tables: vec![
                table(
                    "OrderLine",
                    vec![
                        ColumnDef::new("Id", "integer", false, 1).primary_key(),
                        ColumnDef::new("OrderId", "integer", false, 2).references("public", "Order", "Id"),
                        ColumnDef::new("Qty", "integer", false, 3),
                    ],
                ),
                table("Order", vec![ColumnDef::new("Id", "integer", false, 1).primary_key()]),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn single_customer_table() {
        let model = DatabaseModel {
            tables: vec![table(
                "Customer",
                vec![
                    ColumnDef::new("Id", "int", false, 1).primary_key(),
                    ColumnDef::new("Name", "varchar", true, 2),
                ],
            )],
            ..Default::default()
        };
        let entities = map_entities(DatabaseKind::Postgres, &model);
        assert_eq!(entities.len(), 1);
        let c = &entities[0];
        assert_eq!(c.name, "Customer");
        assert_eq!(c.plural_name, "Customers");
        assert_eq!(c.route, "customers");
        assert_eq!(c.keys.len(), 1);
        assert_eq!(c.keys.get("Id"), Some(&TargetType::I32));
        let names: Vec<&str> = c.properties.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Id", "Name"]);
    }

    #[test]
    fn foreign_key_resolves_to_referenced_key() {
        let entities = map_entities(DatabaseKind::Postgres, &orders_model());
        let line = entities.iter().find(|e| e.name == "OrderLine").unwrap();
        assert_eq!(line.foreign_keys.len(), 1);
        let fk = &line.foreign_keys[0];
        assert_eq!(fk.referenced_entity_singular, "Order");
        assert_eq!(fk.referenced_column.as_deref(), Some("Id"));
        assert!(!fk.is_collection);
        assert_eq!(fk.name, "Order");

        let order = entities.iter().find(|e| e.name == "Order").unwrap();
        assert_eq!(order.foreign_keys.len(), 1);
        assert!(order.foreign_keys[0].is_collection);
        assert_eq!(order.foreign_keys[0].name, "OrderLines");
    }

    #[test]
    fn resolution_ignores_input_order() {
        let model = orders_model();
        let mut reversed = model.clone();
        reversed.tables.reverse();
        for t in reversed.tables.iter_mut() {
            t.columns.reverse();
        }
        assert_eq!(map_entities(DatabaseKind::Postgres, &model), map_entities(DatabaseKind::Postgres, &reversed));
    }

    #[test]
    fn missing_target_leaves_fk_unresolved() {
        let model = DatabaseModel {
            tables: vec![table(
                "invoice",
                vec![
                    ColumnDef::new("id", "bigint", false, 1).primary_key(),
                    ColumnDef::new("tenant_id", "bigint", false, 2).references("public", "tenant", "id"),
                ],
            )],
            ..Default::default()
        };
        let entities = map_entities(DatabaseKind::Postgres, &model);
        let fk = &entities[0].foreign_keys[0];
        assert_eq!(fk.name, "Tenant");
        assert_eq!(fk.referenced_column, None);
    }

    #[test]
    fn key_fallbacks() {
        let model = DatabaseModel {
            tables: vec![
                table("a", vec![ColumnDef::new("name", "text", false, 1), ColumnDef::new("ID", "int", false, 2)]),
                table("b", vec![ColumnDef::new("label", "text", false, 1), ColumnDef::new("b_id", "int", false, 2)]),
                table("c", vec![ColumnDef::new("label", "text", false, 1), ColumnDef::new("n", "int", false, 2)]),
            ],
            ..Default::default()
        };
        let entities = map_entities(DatabaseKind::Postgres, &model);
        let keys: Vec<Vec<&String>> = entities.iter().map(|e| e.keys.keys().collect()).collect();
        assert_eq!(keys[0], vec!["Id"]);
        assert_eq!(keys[1], vec!["BId"]);
        assert_eq!(keys[2], vec!["Label"]);
    }

    #[test]
    fn unknown_columns_dropped_and_empty_relations_skipped() {
        let model = DatabaseModel {
            tables: vec![
                table("geo", vec![ColumnDef::new("shape", "USER-DEFINED", false, 1)]),
                table(
                    "place",
                    vec![
                        ColumnDef::new("id", "integer", false, 1).primary_key(),
                        ColumnDef::new("shape", "USER-DEFINED", true, 2),
                    ],
                ),
            ],
            ..Default::default()
        };
        let entities = map_entities(DatabaseKind::Postgres, &model);
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].properties.len(), 1);
    }

    #[test]
    fn cross_schema_collision_prefixes_schema() {
        let mut a = table("customer", vec![ColumnDef::new("id", "integer", false, 1)]);
        a.schema = "sales".into();
        let b = table("customer", vec![ColumnDef::new("id", "integer", false, 1)]);
        let model = DatabaseModel {
            tables: vec![a, b],
            ..Default::default()
        };
        let names: Vec<String> = map_entities(DatabaseKind::Postgres, &model)
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["PublicCustomer", "SalesCustomer"]);
    }

    #[test]
    fn views_are_flagged() {
        let model = DatabaseModel {
            views: vec![table("active_customers", vec![ColumnDef::new("id", "integer", true, 1)])],
            ..Default::default()
        };
        let entities = map_entities(DatabaseKind::Postgres, &model);
        assert!(entities[0].is_view);
        assert_eq!(entities[0].name, "ActiveCustomers");
        assert_eq!(entities[0].route, "active_customers");
    }
}
