//! Builds the registration manifest from metadata. The same routes and type names are
//! rendered into the generated controllers, so the manifest describes the module exactly.

use crate::manifest::{
    ActionEntry, ControllerEntry, FieldShape, Manifest, ParameterEntry, ParameterSource, ResponseEntry,
    ServiceLifetime, TypeShape, FORMAT_VERSION,
};
use crate::metadata::view::{
    accepts_create, collection_route, dto_name, item_route, key_ident, navigation_route, navigation_target,
};
use crate::metadata::{EntityMetadata, ProcedureMetadata, PropertyMeta};
use crate::schema::DatabaseKind;
use std::collections::BTreeMap;

pub const PROCEDURE_OUTCOME: &str = "ProcedureOutcome";

pub fn build_manifest(
    module: &str,
    kind: DatabaseKind,
    entities: &[EntityMetadata],
    procedures: &[ProcedureMetadata],
) -> Manifest {
    let mut types = BTreeMap::new();
    let mut controllers = Vec::with_capacity(entities.len() + procedures.len());
    for entity in entities {
        controllers.push(entity_controller(kind, entity, entities, &mut types));
    }
    for procedure in procedures {
        controllers.push(procedure_controller(procedure, &mut types));
    }
    Manifest {
        module: module.to_string(),
        format_version: FORMAT_VERSION,
        database_kind: kind.as_str().to_string(),
        controllers,
        types,
    }
}

fn field(p: &PropertyMeta) -> FieldShape {
    FieldShape {
        name: p.json_name(),
        type_name: p.ty.rust_type().to_string(),
        nullable: p.nullable,
    }
}

fn response(status: u16, type_name: Option<String>, description: &str) -> ResponseEntry {
    ResponseEntry {
        status,
        type_name,
        description: description.to_string(),
    }
}

fn action(
    name: &str,
    method: &str,
    route: String,
    description: String,
    parameters: Vec<ParameterEntry>,
    responses: Vec<ResponseEntry>,
) -> ActionEntry {
    ActionEntry {
        name: name.to_string(),
        method: method.to_string(),
        route,
        description: Some(description),
        parameters,
        responses,
    }
}

fn entity_controller(
    kind: DatabaseKind,
    entity: &EntityMetadata,
    all: &[EntityMetadata],
    types: &mut BTreeMap<String, TypeShape>,
) -> ControllerEntry {
    let dto = dto_name(&entity.name);
    let write = format!("{}Write", entity.name);
    types.insert(
        dto.clone(),
        TypeShape {
            fields: entity.properties.iter().map(field).collect(),
        },
    );

    let key_params: Vec<ParameterEntry> = entity
        .key_properties()
        .map(|k| ParameterEntry {
            name: key_ident(k),
            source: ParameterSource::Path,
            type_name: k.ty.rust_type().to_string(),
            required: true,
        })
        .collect();
    let page_params = vec![
        ParameterEntry {
            name: "page".into(),
            source: ParameterSource::Query,
            type_name: "i64".into(),
            required: false,
        },
        ParameterEntry {
            name: "pageSize".into(),
            source: ParameterSource::Query,
            type_name: "i64".into(),
            required: false,
        },
    ];
    let collection = collection_route(entity);
    let item = item_route(entity);
    let not_found = response(404, None, "No row with this key");

    let mut actions = vec![
        action(
            "list_items",
            "GET",
            collection.clone(),
            format!("List {} (paged)", entity.plural_name),
            page_params,
            vec![response(200, Some(format!("Paged<{}>", dto)), "One page of rows")],
        ),
        action(
            "get_item",
            "GET",
            item.clone(),
            format!("Get one {} by key", entity.name),
            key_params.clone(),
            vec![response(200, Some(dto.clone()), "The row"), not_found.clone()],
        ),
    ];

    if !entity.is_view {
        types.insert(
            write.clone(),
            TypeShape {
                fields: entity.properties.iter().filter(|p| !p.is_auto_generated).map(field).collect(),
            },
        );
        let body = ParameterEntry {
            name: "body".into(),
            source: ParameterSource::Body,
            type_name: write.clone(),
            required: true,
        };
        let mut update_params = key_params.clone();
        update_params.push(body.clone());
        if accepts_create(kind, entity) {
            actions.push(action(
                "create_item",
                "POST",
                collection,
                format!("Create a {}", entity.name),
                vec![body],
                vec![
                    response(201, Some(dto.clone()), "The created row"),
                    response(409, None, "Constraint violation"),
                ],
            ));
        }
        actions.push(action(
            "update_item",
            "PUT",
            item.clone(),
            format!("Replace a {}", entity.name),
            update_params,
            vec![response(200, Some(dto.clone()), "The updated row"), not_found.clone()],
        ));
        actions.push(action(
            "delete_item",
            "DELETE",
            item,
            format!("Delete a {}", entity.name),
            key_params.clone(),
            vec![response(204, None, "Deleted"), not_found],
        ));
    }

    for fk in &entity.foreign_keys {
        let Some((other, _)) = navigation_target(fk, all) else {
            continue;
        };
        let other_dto = dto_name(&other.name);
        let returns = if fk.is_collection {
            format!("Vec<{}>", other_dto)
        } else {
            format!("Option<{}>", other_dto)
        };
        actions.push(action(
            &format!("get_{}", crate::case::to_field_ident(&fk.name)),
            "GET",
            navigation_route(entity, fk),
            format!("{} of a {}", fk.name, entity.name),
            key_params.clone(),
            vec![response(200, Some(returns), "Related rows")],
        ));
    }

    ControllerEntry {
        name: format!("{}Controller", entity.name),
        service: format!("{}Service", entity.name),
        lifetime: ServiceLifetime::Scoped,
        actions,
    }
}

fn procedure_controller(procedure: &ProcedureMetadata, types: &mut BTreeMap<String, TypeShape>) -> ControllerEntry {
    let name = &procedure.normalized_name;
    let input = format!("{}Input", name);
    types.insert(
        input.clone(),
        TypeShape {
            fields: procedure
                .inputs()
                .map(|p| FieldShape {
                    nullable: true,
                    ..field(&p.property)
                })
                .collect(),
        },
    );
    let returns = if procedure.has_output {
        let output = format!("{}Output", name);
        types.insert(
            output.clone(),
            TypeShape {
                fields: procedure.output_set.iter().map(field).collect(),
            },
        );
        format!("Vec<{}>", output)
    } else {
        types.insert(
            PROCEDURE_OUTCOME.to_string(),
            TypeShape {
                fields: vec![FieldShape {
                    name: "rowsAffected".into(),
                    type_name: "u64".into(),
                    nullable: false,
                }],
            },
        );
        PROCEDURE_OUTCOME.to_string()
    };

    ControllerEntry {
        name: format!("{}Controller", name),
        service: format!("{}Service", name),
        lifetime: ServiceLifetime::Singleton,
        actions: vec![action(
            "execute",
            "POST",
            format!("/procedures/{}", procedure.module_name()),
            format!("Execute {}.{}", procedure.schema, procedure.name),
            vec![ParameterEntry {
                name: "body".into(),
                source: ParameterSource::Body,
                type_name: input,
                required: false,
            }],
            vec![response(200, Some(returns), "Routine result")],
        )],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::map_entities;
    use crate::schema::{ColumnDef, DatabaseModel, RelationDef};

    fn model() -> DatabaseModel {
        DatabaseModel {
            tables: vec![
                RelationDef {
                    schema: "public".into(),
                    name: "Order".into(),
                    columns: vec![ColumnDef::new("Id", "integer", false, 1).primary_key()],
                },
                RelationDef {
                    schema: "public".into(),
                    name: "OrderLine".into(),
                    columns: vec![
                        ColumnDef::new("Id", "integer", false, 1).primary_key(),
                        ColumnDef::new("OrderId", "integer", false, 2).references("public", "Order", "Id"),
                    ],
                },
            ],
            views: vec![RelationDef {
                schema: "public".into(),
                name: "open_orders".into(),
                columns: vec![ColumnDef::new("id", "integer", false, 1)],
            }],
            ..Default::default()
        }
    }

    #[test]
    fn entity_actions_and_types() {
        let entities = map_entities(DatabaseKind::Postgres, &model());
        let m = build_manifest("shop", DatabaseKind::Postgres, &entities, &[]);
        assert_eq!(m.database_kind, "postgres");

        let order = m.controllers.iter().find(|c| c.name == "OrderController").unwrap();
        assert_eq!(order.lifetime, ServiceLifetime::Scoped);
        let names: Vec<&str> = order.actions.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["list_items", "get_item", "create_item", "update_item", "delete_item", "get_order_lines"]
        );
        let nav = order.actions.last().unwrap();
        assert_eq!(nav.route, "/orders/:id/order_lines");
        assert_eq!(nav.responses[0].type_name.as_deref(), Some("Vec<OrderLineDto>"));

        assert!(m.types.contains_key("OrderDto"));
        assert!(m.types.contains_key("OrderLineWrite"));
    }

    #[test]
    fn mysql_text_generated_key_is_not_creatable() {
        let model = DatabaseModel {
            tables: vec![RelationDef {
                schema: "shop".into(),
                name: "voucher".into(),
                columns: vec![ColumnDef::new("code", "varchar", false, 1).primary_key().auto_generated()],
            }],
            ..Default::default()
        };
        let entities = map_entities(DatabaseKind::Mysql, &model);
        let m = build_manifest("shop", DatabaseKind::Mysql, &entities, &[]);
        let names: Vec<&str> = m.controllers[0].actions.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["list_items", "get_item", "update_item", "delete_item"]);
    }

    #[test]
    fn views_only_read() {
        let entities = map_entities(DatabaseKind::Postgres, &model());
        let m = build_manifest("shop", DatabaseKind::Postgres, &entities, &[]);
        let view = m.controllers.iter().find(|c| c.name == "OpenOrdersController").unwrap();
        assert!(view.actions.iter().all(|a| a.method == "GET"));
        assert!(!m.types.contains_key("OpenOrdersWrite"));
    }
}
