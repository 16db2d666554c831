//! Turn flat catalog rows into nested relation and routine definitions.

use super::group_sorted;
use super::{ColumnDef, OutputProbe, ParameterDef, RelationDef, RoutineDef, RoutineKind};

/// One row of the column catalog query, dialect-neutral.
#[derive(Clone, Debug)]
pub(crate) struct CatalogColumn {
    pub schema: String,
    pub table: String,
    pub is_view: bool,
    pub column: ColumnDef,
}

/// One row of the routine/parameter catalog query. `parameter` is None for parameterless routines.
#[derive(Clone, Debug)]
pub(crate) struct CatalogRoutine {
    pub schema: String,
    /// Distinguishes overloads; equals `name` where the database has no overloading.
    pub specific_name: String,
    pub name: String,
    pub kind: RoutineKind,
    pub parameter: Option<ParameterDef>,
}

/// Split column rows into (tables, views). A column listed twice (several FK rows) keeps its first row.
pub(crate) fn assemble_relations(rows: Vec<CatalogColumn>) -> (Vec<RelationDef>, Vec<RelationDef>) {
    let mut tables = Vec::new();
    let mut views = Vec::new();
    for ((schema, table, is_view), group) in
        group_sorted(rows, |r| (r.schema.clone(), r.table.clone(), r.is_view))
    {
        let mut columns: Vec<ColumnDef> = Vec::with_capacity(group.len());
        for row in group {
            if columns.iter().any(|c| c.name == row.column.name) {
                continue;
            }
            columns.push(row.column);
        }
        let rel = RelationDef {
            schema,
            name: table,
            columns,
        };
        if is_view {
            views.push(rel);
        } else {
            tables.push(rel);
        }
    }
    (tables, views)
}

/// Split routine rows into (procedures, functions). Output probes start as `NoResultSet`.
pub(crate) fn assemble_routines(rows: Vec<CatalogRoutine>) -> (Vec<RoutineDef>, Vec<RoutineDef>) {
    let mut procedures = Vec::new();
    let mut functions = Vec::new();
    for ((schema, _specific), group) in
        group_sorted(rows, |r| (r.schema.clone(), r.specific_name.clone()))
    {
        let Some(first) = group.first() else { continue };
        let name = first.name.clone();
        let kind = first.kind;
        let parameters: Vec<ParameterDef> = group.into_iter().filter_map(|r| r.parameter).collect();
        let def = RoutineDef {
            schema,
            name,
            kind,
            parameters,
            output: OutputProbe::NoResultSet,
        };
        match kind {
            RoutineKind::Procedure => procedures.push(def),
            RoutineKind::Function => functions.push(def),
        }
    }
    (procedures, functions)
}

/// Parameter name fallback for unnamed parameters.
pub(crate) fn parameter_name(name: Option<String>, order: u32) -> String {
    name.filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| format!("p{}", order))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(schema: &str, table: &str, is_view: bool, name: &str, ordinal: u32) -> CatalogColumn {
        CatalogColumn {
            schema: schema.into(),
            table: table.into(),
            is_view,
            column: ColumnDef::new(name, "integer", false, ordinal),
        }
    }

    #[test]
    fn nests_columns_under_relations() {
        let rows = vec![
            col("public", "customer", false, "id", 1),
            col("public", "customer", false, "name", 2),
            col("public", "customer_view", true, "id", 1),
            col("public", "order", false, "id", 1),
            col("public", "order", false, "id", 1),
        ];
        let (tables, views) = assemble_relations(rows);
        assert_eq!(tables.len(), 2);
        assert_eq!(views.len(), 1);
        assert_eq!(tables[0].columns.len(), 2);
        assert_eq!(tables[1].name, "order");
        assert_eq!(tables[1].columns.len(), 1);
        assert_eq!(views[0].name, "customer_view");
    }

    #[test]
    fn routines_split_by_kind_and_overload() {
        let p = |order: u32| ParameterDef {
            name: parameter_name(None, order),
            data_type: "integer".into(),
            length: None,
            precision: None,
            scale: None,
            order,
            is_output: false,
            is_nullable: true,
        };
        let rows = vec![
            CatalogRoutine {
                schema: "public".into(),
                specific_name: "calc_1".into(),
                name: "calc".into(),
                kind: RoutineKind::Function,
                parameter: Some(p(1)),
            },
            CatalogRoutine {
                schema: "public".into(),
                specific_name: "calc_2".into(),
                name: "calc".into(),
                kind: RoutineKind::Function,
                parameter: Some(p(1)),
            },
            CatalogRoutine {
                schema: "public".into(),
                specific_name: "purge".into(),
                name: "purge".into(),
                kind: RoutineKind::Procedure,
                parameter: None,
            },
        ];
        let (procedures, functions) = assemble_routines(rows);
        assert_eq!(functions.len(), 2);
        assert_eq!(procedures.len(), 1);
        assert!(procedures[0].parameters.is_empty());
        assert_eq!(functions[0].parameters[0].name, "p1");
    }
}
