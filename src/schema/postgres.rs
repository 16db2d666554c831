//! PostgreSQL catalog queries and prepare-only output probes.

use super::assemble::{assemble_relations, assemble_routines, parameter_name, CatalogColumn, CatalogRoutine};
use super::{
    connect_error, query_error, ColumnDef, DatabaseKind, DatabaseModel, IntrospectOptions, OutputProbe,
    ParameterDef, RoutineDef, RoutineKind, SYSTEM_SCHEMAS,
};
use crate::dialect::routine_call_sql;
use crate::error::PipelineError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Column, Executor, TypeInfo};

const COLUMNS_SQL: &str = r#"
SELECT c.table_schema::text AS table_schema,
       c.table_name::text AS table_name,
       (t.table_type = 'VIEW') AS is_view,
       c.column_name::text AS column_name,
       c.ordinal_position::int4 AS ordinal,
       c.data_type::text AS data_type,
       (c.is_nullable = 'YES') AS nullable,
       (c.column_default IS NOT NULL) AS has_default,
       (c.is_identity = 'YES'
        OR c.is_generated = 'ALWAYS'
        OR COALESCE(c.column_default, '') LIKE 'nextval(%') AS auto_generated,
       EXISTS (
           SELECT 1
           FROM information_schema.table_constraints tc
           JOIN information_schema.key_column_usage k
             ON k.constraint_schema = tc.constraint_schema
            AND k.constraint_name = tc.constraint_name
            AND k.table_name = tc.table_name
           WHERE tc.constraint_type = 'PRIMARY KEY'
             AND tc.table_schema = c.table_schema
             AND tc.table_name = c.table_name
             AND k.column_name = c.column_name
       ) AS is_pk,
       fk.ref_schema,
       fk.ref_table,
       fk.ref_column
FROM information_schema.columns c
JOIN information_schema.tables t
  ON t.table_schema = c.table_schema AND t.table_name = c.table_name
LEFT JOIN LATERAL (
    SELECT fn.nspname::text AS ref_schema,
           fc.relname::text AS ref_table,
           fa.attname::text AS ref_column
    FROM pg_constraint con
    JOIN pg_class cl ON cl.oid = con.conrelid
    JOIN pg_namespace n ON n.oid = cl.relnamespace
    JOIN pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = con.conkey[1]
    JOIN pg_class fc ON fc.oid = con.confrelid
    JOIN pg_namespace fn ON fn.oid = fc.relnamespace
    JOIN pg_attribute fa ON fa.attrelid = con.confrelid AND fa.attnum = con.confkey[1]
    WHERE con.contype = 'f'
      AND array_length(con.conkey, 1) = 1
      AND n.nspname = c.table_schema
      AND cl.relname = c.table_name
      AND a.attname = c.column_name
    ORDER BY con.conname
    LIMIT 1
) fk ON true
WHERE t.table_type IN ('BASE TABLE', 'VIEW')
  AND c.table_schema::text <> ALL($1::text[])
ORDER BY c.table_schema, c.table_name, c.ordinal_position
"#;

const ROUTINES_SQL: &str = r#"
SELECT r.routine_schema::text AS routine_schema,
       r.specific_name::text AS specific_name,
       r.routine_name::text AS routine_name,
       r.routine_type::text AS routine_type,
       p.parameter_name::text AS parameter_name,
       p.data_type::text AS parameter_type,
       p.parameter_mode::text AS parameter_mode,
       p.ordinal_position::int4 AS parameter_ordinal,
       p.character_maximum_length::int4 AS char_length,
       p.numeric_precision::int4 AS numeric_precision,
       p.numeric_scale::int4 AS numeric_scale
FROM information_schema.routines r
LEFT JOIN information_schema.parameters p
  ON p.specific_schema = r.specific_schema AND p.specific_name = r.specific_name
WHERE r.routine_type IN ('FUNCTION', 'PROCEDURE')
  AND COALESCE(r.data_type, '') NOT IN ('trigger', 'event_trigger')
  AND r.routine_schema::text <> ALL($1::text[])
ORDER BY r.routine_schema, r.specific_name, p.ordinal_position
"#;

#[derive(sqlx::FromRow)]
struct ColumnRow {
    table_schema: String,
    table_name: String,
    is_view: bool,
    column_name: String,
    ordinal: i32,
    data_type: String,
    nullable: bool,
    has_default: bool,
    auto_generated: bool,
    is_pk: bool,
    ref_schema: Option<String>,
    ref_table: Option<String>,
    ref_column: Option<String>,
}

#[derive(sqlx::FromRow)]
struct RoutineRow {
    routine_schema: String,
    specific_name: String,
    routine_name: String,
    routine_type: String,
    parameter_name: Option<String>,
    parameter_type: Option<String>,
    parameter_mode: Option<String>,
    parameter_ordinal: Option<i32>,
    char_length: Option<i32>,
    numeric_precision: Option<i32>,
    numeric_scale: Option<i32>,
}

pub(super) async fn extract(
    connection_string: &str,
    options: &IntrospectOptions,
) -> Result<DatabaseModel, PipelineError> {
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .acquire_timeout(options.timeout)
        .connect(connection_string)
        .await
        .map_err(connect_error)?;
    let result = extract_from_pool(&pool).await;
    pool.close().await;
    result
}

async fn extract_from_pool(pool: &PgPool) -> Result<DatabaseModel, PipelineError> {
    let excluded: Vec<String> = SYSTEM_SCHEMAS.iter().map(|s| s.to_string()).collect();

    tracing::debug!(sql = %COLUMNS_SQL, "catalog query");
    let column_rows: Vec<ColumnRow> = sqlx::query_as(COLUMNS_SQL)
        .bind(&excluded)
        .fetch_all(pool)
        .await
        .map_err(query_error)?;
    let (tables, views) = assemble_relations(column_rows.into_iter().map(catalog_column).collect());

    tracing::debug!(sql = %ROUTINES_SQL, "catalog query");
    let routine_rows: Vec<RoutineRow> = sqlx::query_as(ROUTINES_SQL)
        .bind(&excluded)
        .fetch_all(pool)
        .await
        .map_err(query_error)?;
    let (mut procedures, mut functions) =
        assemble_routines(routine_rows.into_iter().map(catalog_routine).collect());

    for routine in procedures.iter_mut().chain(functions.iter_mut()) {
        routine.output = probe(pool, routine).await;
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

fn catalog_column(r: ColumnRow) -> CatalogColumn {
    let is_foreign_key = r.ref_table.is_some();
    CatalogColumn {
        schema: r.table_schema,
        table: r.table_name,
        is_view: r.is_view,
        column: ColumnDef {
            name: r.column_name,
            data_type: r.data_type,
            nullable: r.nullable,
            is_primary_key: r.is_pk,
            is_foreign_key,
            referenced_schema: r.ref_schema,
            referenced_table: r.ref_table,
            referenced_column: r.ref_column,
            ordinal: r.ordinal.max(0) as u32,
            has_default: r.has_default,
            is_auto_generated: r.auto_generated,
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
            length: r.char_length.map(i64::from),
            precision: r.numeric_precision.map(i64::from),
            scale: r.numeric_scale.map(i64::from),
            order,
            is_output: r.parameter_mode.as_deref() == Some("OUT"),
            is_nullable: true,
        }
    });
    CatalogRoutine {
        schema: r.routine_schema,
        specific_name: r.specific_name,
        name: r.routine_name,
        kind,
        parameter,
    }
}

/// Prepare (never execute) the invocation and read the row description back.
async fn probe(pool: &PgPool, routine: &RoutineDef) -> OutputProbe {
    let sql = routine_call_sql(DatabaseKind::Postgres, routine);
    tracing::debug!(sql = %sql, "describe probe");
    match pool.describe(&sql).await {
        Ok(described) => {
            let columns: Vec<ColumnDef> = described
                .columns()
                .iter()
                .enumerate()
                .filter(|(_, c)| !c.type_info().name().eq_ignore_ascii_case("VOID"))
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
