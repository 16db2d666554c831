//! SQL dialect helpers shared by introspection probes and generated data-access code.

use crate::schema::{DatabaseKind, RoutineDef, RoutineKind};

impl DatabaseKind {
    /// Quote an identifier. Only catalog-derived names pass through here.
    pub fn quote(&self, ident: &str) -> String {
        match self {
            DatabaseKind::Postgres => format!("\"{}\"", ident.replace('"', "\"\"")),
            DatabaseKind::Mysql => format!("`{}`", ident.replace('`', "``")),
        }
    }

    pub fn qualified(&self, schema: &str, name: &str) -> String {
        format!("{}.{}", self.quote(schema), self.quote(name))
    }

    /// Positional placeholder, 1-based.
    pub fn placeholder(&self, n: usize) -> String {
        match self {
            DatabaseKind::Postgres => format!("${}", n),
            DatabaseKind::Mysql => "?".to_string(),
        }
    }

    pub fn supports_returning(&self) -> bool {
        matches!(self, DatabaseKind::Postgres)
    }
}

/// Invocation SQL for a routine. Input parameters become placeholders in declaration order;
/// output parameters are passed as NULL (Postgres) or a session variable (MySQL).
pub fn routine_call_sql(kind: DatabaseKind, routine: &RoutineDef) -> String {
    let params: Vec<(&str, bool)> = routine
        .parameters
        .iter()
        .map(|p| (p.name.as_str(), p.is_output))
        .collect();
    call_sql(kind, routine.kind, &routine.schema, &routine.name, &params)
}

/// Same as `routine_call_sql` over `(name, is_output)` pairs already in call order.
pub fn call_sql(
    kind: DatabaseKind,
    routine_kind: RoutineKind,
    schema: &str,
    name: &str,
    params: &[(&str, bool)],
) -> String {
    let target = kind.qualified(schema, name);
    let mut n = 0usize;
    let mut args = Vec::with_capacity(params.len());
    for (param, is_output) in params {
        if *is_output {
            match (kind, routine_kind) {
                (DatabaseKind::Postgres, RoutineKind::Function) => {}
                (DatabaseKind::Postgres, RoutineKind::Procedure) => args.push("NULL".to_string()),
                (DatabaseKind::Mysql, _) => args.push(format!("@{}", crate::case::to_field_ident(param))),
            }
        } else {
            n += 1;
            args.push(kind.placeholder(n));
        }
    }
    let args = args.join(", ");
    match (kind, routine_kind) {
        (DatabaseKind::Postgres, RoutineKind::Function) => format!("SELECT * FROM {}({})", target, args),
        (DatabaseKind::Mysql, RoutineKind::Function) => {
            format!("SELECT {}({}) AS {}", target, args, kind.quote("result"))
        }
        (_, RoutineKind::Procedure) => format!("CALL {}({})", target, args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{OutputProbe, ParameterDef};

    fn param(name: &str, order: u32, is_output: bool) -> ParameterDef {
        ParameterDef {
            name: name.into(),
            data_type: "integer".into(),
            length: None,
            precision: None,
            scale: None,
            order,
            is_output,
            is_nullable: true,
        }
    }

    fn routine(kind: RoutineKind) -> RoutineDef {
        RoutineDef {
            schema: "sales".into(),
            name: "top_orders".into(),
            kind,
            parameters: vec![param("limit", 1, false), param("total", 2, true), param("region", 3, false)],
            output: OutputProbe::NoResultSet,
        }
    }

    #[test]
    fn quotes_per_dialect() {
        assert_eq!(DatabaseKind::Postgres.quote("a\"b"), "\"a\"\"b\"");
        assert_eq!(DatabaseKind::Mysql.quote("a`b"), "`a``b`");
        assert_eq!(DatabaseKind::Mysql.qualified("shop", "orders"), "`shop`.`orders`");
    }

    #[test]
    fn postgres_function_skips_output_params() {
        let sql = routine_call_sql(DatabaseKind::Postgres, &routine(RoutineKind::Function));
        assert_eq!(sql, "SELECT * FROM \"sales\".\"top_orders\"($1, $2)");
    }

    #[test]
    fn postgres_procedure_passes_null_for_outputs() {
        let sql = routine_call_sql(DatabaseKind::Postgres, &routine(RoutineKind::Procedure));
        assert_eq!(sql, "CALL \"sales\".\"top_orders\"($1, NULL, $2)");
    }

    #[test]
    fn mysql_procedure_uses_session_variables() {
        let sql = routine_call_sql(DatabaseKind::Mysql, &routine(RoutineKind::Procedure));
        assert_eq!(sql, "CALL `sales`.`top_orders`(?, @total, ?)");
    }
}
