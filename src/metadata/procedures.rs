//! Stored procedures and functions -> ProcedureMetadata. Routines whose output probe failed are dropped.

use super::entities::{unique, unique_field};
use super::{map_type, ParameterMeta, ProcedureMetadata, PropertyMeta};
use crate::case::{to_field_ident, to_type_ident};
use crate::schema::{ColumnDef, DatabaseKind, DatabaseModel, OutputProbe, RoutineDef};
use std::collections::HashSet;

pub fn map_procedures(kind: DatabaseKind, model: &DatabaseModel) -> Vec<ProcedureMetadata> {
    let mut routines: Vec<&RoutineDef> = model.procedures.iter().chain(model.functions.iter()).collect();
    routines.sort_by(|a, b| {
        (a.schema.as_str(), a.name.as_str(), a.kind as u8, a.parameters.len())
            .cmp(&(b.schema.as_str(), b.name.as_str(), b.kind as u8, b.parameters.len()))
    });

    let mut used_names: HashSet<String> = HashSet::new();
    let mut seen: HashSet<(&str, &str)> = HashSet::new();
    let mut out = Vec::with_capacity(routines.len());
    for routine in routines {
        if let OutputProbe::Failed(reason) = &routine.output {
            tracing::warn!(
                schema = %routine.schema,
                routine = %routine.name,
                reason = %reason,
                "output shape unknown; routine excluded from generation"
            );
            continue;
        }
        let Some(parameters) = map_parameters(kind, routine) else {
            continue;
        };
        let output_set = match &routine.output {
            OutputProbe::Columns(columns) => map_output(kind, routine, columns),
            _ => Vec::new(),
        };

        if !seen.insert((routine.schema.as_str(), routine.name.as_str())) {
            tracing::warn!(
                schema = %routine.schema,
                routine = %routine.name,
                "overloaded routine name; only the first signature is generated"
            );
            continue;
        }
        let base = to_type_ident(&routine.name);
        let preferred = if used_names.contains(&base) {
            format!("{}{}", to_type_ident(&routine.schema), base)
        } else {
            base
        };
        let name = unique(&preferred, &mut used_names);

        out.push(ProcedureMetadata {
            schema: routine.schema.clone(),
            name: routine.name.clone(),
            normalized_name: name,
            kind: routine.kind,
            has_parameters: parameters.iter().any(|p| !p.is_output),
            has_output: !output_set.is_empty(),
            parameters,
            output_set,
        });
    }
    out
}

/// Parameters in declaration order; None when an input has no mappable type.
fn map_parameters(kind: DatabaseKind, routine: &RoutineDef) -> Option<Vec<ParameterMeta>> {
    let mut params: Vec<_> = routine.parameters.iter().collect();
    params.sort_by_key(|p| p.order);
    let mut used_props = HashSet::new();
    let mut used_fields = HashSet::new();
    let mut out = Vec::with_capacity(params.len());
    for p in params {
        let ty = map_type(kind, &p.data_type);
        if !ty.is_known() && !p.is_output {
            tracing::warn!(
                routine = %routine.name,
                parameter = %p.name,
                data_type = %p.data_type,
                "unmapped parameter type; routine excluded from generation"
            );
            return None;
        }
        out.push(ParameterMeta {
            property: PropertyMeta {
                name: unique(&to_type_ident(&p.name), &mut used_props),
                column: p.name.clone(),
                field_name: unique_field(&to_field_ident(&p.name), &mut used_fields),
                ty,
                nullable: true,
                is_key: false,
                is_foreign_key: false,
                is_required: false,
                is_auto_generated: false,
            },
            sql_type: p.data_type.clone(),
            order: p.order,
            is_output: p.is_output,
        });
    }
    Some(out)
}

fn map_output(kind: DatabaseKind, routine: &RoutineDef, columns: &[ColumnDef]) -> Vec<PropertyMeta> {
    let mut used_props = HashSet::new();
    let mut used_fields = HashSet::new();
    let mut out = Vec::with_capacity(columns.len());
    for col in columns {
        let ty = map_type(kind, &col.data_type);
        if !ty.is_known() {
            tracing::warn!(
                routine = %routine.name,
                column = %col.name,
                data_type = %col.data_type,
                "unmapped output column type; column skipped"
            );
            continue;
        }
        out.push(PropertyMeta {
            name: unique(&to_type_ident(&col.name), &mut used_props),
            column: col.name.clone(),
            field_name: unique_field(&to_field_ident(&col.name), &mut used_fields),
            ty,
            nullable: col.nullable,
            is_key: false,
            is_foreign_key: false,
            is_required: false,
            is_auto_generated: false,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ParameterDef, RoutineKind};

    fn param(name: &str, data_type: &str, order: u32, is_output: bool) -> ParameterDef {
        ParameterDef {
            name: name.into(),
            data_type: data_type.into(),
            length: None,
            precision: None,
            scale: None,
            order,
            is_output,
            is_nullable: true,
        }
    }

    fn routine(name: &str, kind: RoutineKind, output: OutputProbe) -> RoutineDef {
        RoutineDef {
            schema: "public".into(),
            name: name.into(),
            kind,
            parameters: vec![param("region", "text", 1, false), param("total", "integer", 2, true)],
            output,
        }
    }

    fn columns() -> OutputProbe {
        OutputProbe::Columns(vec![
            ColumnDef::new("order_id", "INT4", false, 1),
            ColumnDef::new("amount", "NUMERIC", true, 2),
        ])
    }

    #[test]
    fn failed_probes_are_excluded_without_error() {
        let model = DatabaseModel {
            procedures: vec![
                routine("purge_old", RoutineKind::Procedure, OutputProbe::Failed("writes data".into())),
                routine("archive", RoutineKind::Procedure, OutputProbe::NoResultSet),
                routine("reindex", RoutineKind::Procedure, OutputProbe::Failed("timeout".into())),
            ],
            functions: vec![routine("top_orders", RoutineKind::Function, columns())],
            ..Default::default()
        };
        let procs = map_procedures(DatabaseKind::Postgres, &model);
        assert_eq!(procs.len(), 2);
        let archive = procs.iter().find(|p| p.name == "archive").unwrap();
        assert!(!archive.has_output);
        let top = procs.iter().find(|p| p.name == "top_orders").unwrap();
        assert!(top.has_output);
        assert_eq!(top.normalized_name, "TopOrders");
        assert_eq!(top.output_set.len(), 2);
        assert!(top.output_set[1].nullable);
    }

    #[test]
    fn output_parameters_are_not_inputs() {
        let model = DatabaseModel {
            functions: vec![routine("top_orders", RoutineKind::Function, columns())],
            ..Default::default()
        };
        let procs = map_procedures(DatabaseKind::Postgres, &model);
        assert_eq!(procs[0].parameters.len(), 2);
        let inputs: Vec<_> = procs[0].inputs().collect();
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].property.field_name, "region");
        assert_eq!(inputs[0].sql_type, "text");
        assert!(procs[0].has_parameters);
    }

    #[test]
    fn overloads_keep_first_signature() {
        let mut second = routine("calc", RoutineKind::Function, columns());
        second.parameters.push(param("extra", "integer", 3, false));
        let model = DatabaseModel {
            functions: vec![second, routine("calc", RoutineKind::Function, columns())],
            ..Default::default()
        };
        let procs = map_procedures(DatabaseKind::Postgres, &model);
        assert_eq!(procs.len(), 1);
        assert_eq!(procs[0].inputs().count(), 1);
    }

    #[test]
    fn mapping_is_idempotent() {
        let model = DatabaseModel {
            functions: vec![routine("top_orders", RoutineKind::Function, columns())],
            procedures: vec![routine("archive", RoutineKind::Procedure, OutputProbe::NoResultSet)],
            ..Default::default()
        };
        let a = serde_json::to_string(&map_procedures(DatabaseKind::Postgres, &model)).unwrap();
        let b = serde_json::to_string(&map_procedures(DatabaseKind::Postgres, &model)).unwrap();
        assert_eq!(a, b);
    }
}
