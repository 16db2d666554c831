//! MySQL catalog queries. Functions are probed prepare-only; procedures can only be observed by
//! executing them, which happens inside a transaction that is always rolled back.

use super::assemble::{assemble_relations, assemble_routines, parameter_name, CatalogColumn, CatalogRoutine};
use super::{
    connect_error, query_error, ColumnDef, DatabaseKind, DatabaseModel, IntrospectOptions, OutputProbe,
    ParameterDef, RoutineDef, RoutineKind,
};
use crate::dialect::routine_call_sql;
use crate::error::PipelineError;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use sqlx::{Column, Executor, Row, TypeInfo};

const COLUMNS_SQL: &str = r#"
SELECT CAST(c.TABLE_SCHEMA AS CHAR) AS table_schema,
       CAST(c.TABLE_NAME AS CHAR) AS table_name,
       CAST(t.TABLE_TYPE AS CHAR) AS table_type,
       CAST(c.COLUMN_NAME AS CHAR) AS column_name,
       CAST(c.ORDINAL_POSITION AS SIGNED) AS ordinal,
       CAST(c.COLUMN_TYPE AS CHAR) AS column_type,
       CAST(c.IS_NULLABLE AS CHAR) AS is_nullable,
       CAST(c.COLUMN_DEFAULT AS CHAR) AS column_default,
       CAST(c.EXTRA AS CHAR) AS extra,
       CAST(c.COLUMN_KEY AS CHAR) AS column_key,
       CAST(k.REFERENCED_TABLE_SCHEMA AS CHAR) AS ref_schema,
       CAST(k.REFERENCED_TABLE_NAME AS CHAR) AS ref_table,
       CAST(k.REFERENCED_COLUMN_NAME AS CHAR) AS ref_column
FROM information_schema.COLUMNS c
JOIN information_schema.TABLES t
  ON t.TABLE_SCHEMA = c.TABLE_SCHEMA AND t.TABLE_NAME = c.TABLE_NAME
LEFT JOIN information_schema.KEY_COLUMN_USAGE k
  ON k.TABLE_SCHEMA = c.TABLE_SCHEMA
 AND k.TABLE_NAME = c.TABLE_NAME
 AND k.COLUMN_NAME = c.COLUMN_NAME
 AND k.REFERENCED_TABLE_NAME IS NOT NULL
WHERE c.TABLE_SCHEMA = DATABASE()
  AND t.TABLE_TYPE IN ('BASE TABLE', 'VIEW')
ORDER BY c.TABLE_SCHEMA, c.TABLE_NAME, c.ORDINAL_POSITION
"#;

const ROUTINES_SQL: &str = r#"
SELECT CAST(r.ROUTINE_SCHEMA AS CHAR) AS routine_schema,
       CAST(r.ROUTINE_NAME AS CHAR) AS routine_name,
       CAST(r.ROUTINE_TYPE AS CHAR) AS routine_type,
       CAST(p.PARAMETER_NAME AS CHAR) AS parameter_name,
       CAST(p.DTD_IDENTIFIER AS CHAR) AS parameter_type,
       CAST(p.PARAMETER_MODE AS CHAR) AS parameter_mode,
       CAST(p.ORDINAL_POSITION AS SIGNED) AS parameter_ordinal,
       CAST(p.CHARACTER_MAXIMUM_LENGTH AS SIGNED) AS char_length,
       CAST(p.NUMERIC_PRECISION AS SIGNED) AS numeric_precision,
       CAST(p.NUMERIC_SCALE AS SIGNED) AS numeric_scale
FROM information_schema.ROUTINES r
LEFT JOIN information_schema.PARAMETERS p
  ON p.SPECIFIC_SCHEMA = r.ROUTINE_SCHEMA
 AND p.SPECIFIC_NAME = r.SPECIFIC_NAME
 AND p.ORDINAL_POSITION > 0
WHERE r.ROUTINE_SCHEMA = DATABASE()
ORDER BY r.ROUTINE_SCHEMA, r.ROUTINE_NAME, p.ORDINAL_POSITION
"#;

#[derive(sqlx::FromRow)]
struct ColumnRow {
    table_schema: String,
    table_name: String,
    table_type: String,
    column_name: String,
    ordinal: i64,
    column_type: String,
    is_nullable: String,
    column_default: Option<String>,
    extra: Option<String>,
    column_key: Option<String>,
    ref_schema: Option<String>,
    ref_table: Option<String>,
    ref_column: Option<String>,
}

#[derive(sqlx::FromRow)]
struct RoutineRow {
    routine_schema: String,
    routine_name: String,
    routine_type: String,
    parameter_name: Option<String>,
    parameter_type: Option<String>,
    parameter_mode: Option<String>,
    parameter_ordinal: Option<i64>,
    char_length: Option<i64>,
    numeric_precision: Option<i64>,
    numeric_scale: Option<i64>,
}

pub(super) async fn extract(
    connection_string: &str,
    options: &IntrospectOptions,
) -> Result<DatabaseModel, PipelineError> {
    let pool = MySqlPoolOptions::new()
        .max_connections(2)
        .acquire_timeout(options.timeout)
        .connect(connection_string)
        .await
        .map_err(connect_error)?;
    let result = extract_from_pool(&pool, options).await;
    pool.close().await;
    result
}

async fn extract_from_pool(
    pool: &MySqlPool,
    options: &IntrospectOptions,
) -> Result<DatabaseModel, PipelineError> {
    tracing::debug!(sql = %COLUMNS_SQL, "catalog query");
    let column_rows: Vec<ColumnRow> = sqlx::query_as(COLUMNS_SQL)
        .fetch_all(pool)
        .await
        .map_err(query_error)?;
    let (tables, views) = assemble_relations(column_rows.into_iter().map(catalog_column).collect());

    tracing::debug!(sql = %ROUTINES_SQL, "catalog query");
    let routine_rows: Vec<RoutineRow> = sqlx::query_as(ROUTINES_SQL)
        .fetch_all(pool)
        .await
        .map_err(query_error)?;
    let (mut procedures, mut functions) =
        assemble_routines(routine_rows.into_iter().map(catalog_routine).collect());

    for routine in functions.iter_mut() {
        routine.output = probe_function(pool, routine).await;
    }
    for routine in procedures.iter_mut() {
        routine.output = match disabled_probe(options) {
            Some(skipped) => skipped,
            None => probe_procedure(pool, routine).await,
        };
    }
    for routine in procedures.iter().chain(functions.iter()) {
        if let OutputProbe::Failed(reason) = &routine.output {
            tracing::warn!(
                schema = %routine.schema,
                routine = %routine.name,
                reason = %reason,
                "output shape probe failed; routine will be skipped"
            );
        }
    }

    Ok(DatabaseModel {
        tables,
        views,
        procedures,
        functions,
    })
}

/// Procedures are only executed when the host opted in.
fn disabled_probe(options: &IntrospectOptions) -> Option<OutputProbe> {
    (!options.probe_execute).then(|| OutputProbe::Failed("execution probe disabled".into()))
}

fn catalog_column(r: ColumnRow) -> CatalogColumn {
    let extra = r.extra.unwrap_or_default().to_lowercase();
    let auto_generated = extra.contains("auto_increment") || extra.contains("generated");
    let is_foreign_key = r.ref_table.is_some();
    CatalogColumn {
        schema: r.table_schema,
        table: r.table_name,
        is_view: r.table_type.eq_ignore_ascii_case("VIEW"),
        column: ColumnDef {
            name: r.column_name,
            data_type: r.column_type,
            nullable: r.is_nullable.eq_ignore_ascii_case("YES"),
            is_primary_key: r.column_key.as_deref() == Some("PRI"),
            is_foreign_key,
            referenced_schema: r.ref_schema,
            referenced_table: r.ref_table,
            referenced_column: r.ref_column,
            ordinal: r.ordinal.max(0) as u32,
            has_default: r.column_default.is_some() || auto_generated,
            is_auto_generated: auto_generated,
        },
    }
}

fn catalog_routine(r: RoutineRow) -> CatalogRoutine {
    let kind = if r.routine_type.eq_ignore_ascii_case("PROCEDURE") {
        RoutineKind::Procedure
    } else {
        RoutineKind::Function
    };
    let parameter = r.parameter_ordinal.map(|ordinal| {
        let order = ordinal.max(0) as u32;
        ParameterDef {
            name: parameter_name(r.parameter_name, order),
            data_type: r.parameter_type.unwrap_or_default(),
            length: r.char_length,
            precision: r.numeric_precision,
            scale: r.numeric_scale,
            order,
            is_output: r.parameter_mode.as_deref() == Some("OUT"),
            is_nullable: true,
        }
    });
    CatalogRoutine {
        schema: r.routine_schema,
        specific_name: r.routine_name.clone(),
        name: r.routine_name,
        kind,
        parameter,
    }
}

async fn probe_function(pool: &MySqlPool, routine: &RoutineDef) -> OutputProbe {
    let sql = routine_call_sql(DatabaseKind::Mysql, routine);
    tracing::debug!(sql = %sql, "describe probe");
    match pool.describe(&sql).await {
        Ok(described) => {
            let columns: Vec<ColumnDef> = described
                .columns()
                .iter()
                .enumerate()
                .map(|(i, c)| {
                    ColumnDef::new(
                        c.name(),
                        c.type_info().name(),
                        described.nullable(i).unwrap_or(true),
                        i as u32 + 1,
                    )
                })
                .collect();
            if columns.is_empty() {
                OutputProbe::NoResultSet
            } else {
                OutputProbe::Columns(columns)
            }
        }
        Err(e) => OutputProbe::Failed(e.to_string()),
    }
}

/// Execute with NULL inputs and roll back. An empty result leaves the shape unknown and the
/// procedure is treated as having no result set.
async fn probe_procedure(pool: &MySqlPool, routine: &RoutineDef) -> OutputProbe {
    let sql = routine_call_sql(DatabaseKind::Mysql, routine);
    tracing::debug!(sql = %sql, "execution probe (rolled back)");
    let mut tx = match pool.begin().await {
        Ok(tx) => tx,
        Err(e) => return OutputProbe::Failed(e.to_string()),
    };
    let inputs = routine.parameters.iter().filter(|p| !p.is_output).count();
    let mut query = sqlx::query(&sql);
    for _ in 0..inputs {
        query = query.bind(None::<String>);
    }
    let rows = query.fetch_all(&mut *tx).await;
    if let Err(e) = tx.rollback().await {
        tracing::warn!(routine = %routine.name, error = %e, "rollback after probe failed");
    }
    match rows {
        Ok(rows) => match rows.first() {
            Some(row) => OutputProbe::Columns(
                row.columns()
                    .iter()
                    .enumerate()
                    .map(|(i, c)| ColumnDef::new(c.name(), c.type_info().name(), true, i as u32 + 1))
                    .collect(),
            ),
            None => OutputProbe::NoResultSet,
        },
        Err(e) => OutputProbe::Failed(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::map_procedures;
    use crate::schema::{DatabaseKind, ParameterDef, RoutineKind};

    #[test]
    fn default_options_never_execute_procedures() {
        let options = IntrospectOptions::default();
        let output = disabled_probe(&options).unwrap();
        assert_eq!(output, OutputProbe::Failed("execution probe disabled".into()));

        let model = DatabaseModel {
            procedures: vec![RoutineDef {
                schema: "shop".into(),
                name: "close_month".into(),
                kind: RoutineKind::Procedure,
                parameters: vec![ParameterDef {
                    name: "p_month".into(),
                    data_type: "int".into(),
                    length: None,
                    precision: None,
                    scale: None,
                    order: 1,
                    is_output: false,
                    is_nullable: true,
                }],
                output,
            }],
            ..Default::default()
        };
        assert!(map_procedures(DatabaseKind::Mysql, &model).is_empty());
    }

    #[test]
    fn opted_in_options_execute_procedures() {
        let options = IntrospectOptions {
            probe_execute: true,
            ..Default::default()
        };
        assert!(disabled_probe(&options).is_none());
    }
}
