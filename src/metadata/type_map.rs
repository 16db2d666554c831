//! Static map from database-native type names to generation primitives.
//! Accepts both catalog spellings ("timestamp with time zone", "int unsigned") and
//! driver-reported names ("TIMESTAMPTZ", "INT UNSIGNED").

use super::TargetType;
use crate::schema::DatabaseKind;

const POSTGRES: &[(&str, TargetType)] = &[
    ("smallint", TargetType::I16),
    ("int2", TargetType::I16),
    ("smallserial", TargetType::I16),
    ("integer", TargetType::I32),
    ("int", TargetType::I32),
    ("int4", TargetType::I32),
    ("serial", TargetType::I32),
    ("bigint", TargetType::I64),
    ("int8", TargetType::I64),
    ("bigserial", TargetType::I64),
    ("real", TargetType::F32),
    ("float4", TargetType::F32),
    ("double precision", TargetType::F64),
    ("float8", TargetType::F64),
    ("numeric", TargetType::Decimal),
    ("decimal", TargetType::Decimal),
    ("boolean", TargetType::Bool),
    ("bool", TargetType::Bool),
    ("text", TargetType::String),
    ("character varying", TargetType::String),
    ("varchar", TargetType::String),
    ("character", TargetType::String),
    ("char", TargetType::String),
    ("bpchar", TargetType::String),
    ("name", TargetType::String),
    ("citext", TargetType::String),
    ("uuid", TargetType::Guid),
    ("timestamp with time zone", TargetType::OffsetDateTime),
    ("timestamptz", TargetType::OffsetDateTime),
    ("timestamp without time zone", TargetType::DateTime),
    ("timestamp", TargetType::DateTime),
    ("date", TargetType::Date),
    ("time without time zone", TargetType::Time),
    ("time", TargetType::Time),
    ("bytea", TargetType::Bytes),
    ("json", TargetType::Json),
    ("jsonb", TargetType::Json),
];

const MYSQL: &[(&str, TargetType)] = &[
    ("tinyint", TargetType::I8),
    ("smallint", TargetType::I16),
    ("mediumint", TargetType::I32),
    ("int", TargetType::I32),
    ("integer", TargetType::I32),
    ("bigint", TargetType::I64),
    ("tinyint unsigned", TargetType::U8),
    ("smallint unsigned", TargetType::U16),
    ("mediumint unsigned", TargetType::U32),
    ("int unsigned", TargetType::U32),
    ("integer unsigned", TargetType::U32),
    ("bigint unsigned", TargetType::U64),
    ("float", TargetType::F32),
    ("double", TargetType::F64),
    ("double precision", TargetType::F64),
    ("real", TargetType::F64),
    ("decimal", TargetType::Decimal),
    ("numeric", TargetType::Decimal),
    ("bool", TargetType::Bool),
    ("boolean", TargetType::Bool),
    ("char", TargetType::String),
    ("varchar", TargetType::String),
    ("tinytext", TargetType::String),
    ("text", TargetType::String),
    ("mediumtext", TargetType::String),
    ("longtext", TargetType::String),
    ("enum", TargetType::String),
    ("set", TargetType::String),
    ("datetime", TargetType::DateTime),
    ("timestamp", TargetType::OffsetDateTime),
    ("date", TargetType::Date),
    ("time", TargetType::Time),
    ("binary", TargetType::Bytes),
    ("varbinary", TargetType::Bytes),
    ("tinyblob", TargetType::Bytes),
    ("blob", TargetType::Bytes),
    ("mediumblob", TargetType::Bytes),
    ("longblob", TargetType::Bytes),
    ("json", TargetType::Json),
];

/// Map a native type name. Unlisted names yield `TargetType::Unknown`.
pub fn map_type(kind: DatabaseKind, native: &str) -> TargetType {
    let lowered = native.trim().to_lowercase();
    if kind == DatabaseKind::Mysql && lowered.starts_with("tinyint(1)") {
        return TargetType::Bool;
    }
    let normalized = normalize(&lowered);
    let table = match kind {
        DatabaseKind::Postgres => POSTGRES,
        DatabaseKind::Mysql => MYSQL,
    };
    table
        .iter()
        .find(|(name, _)| *name == normalized)
        .map(|(_, ty)| *ty)
        .unwrap_or(TargetType::Unknown)
}

/// Drop length/precision arguments and `zerofill`, collapse whitespace.
/// "decimal(10,2) unsigned" -> "decimal unsigned", "varchar(255)" -> "varchar"
fn normalize(lowered: &str) -> String {
    let mut out = String::with_capacity(lowered.len());
    let mut depth = 0usize;
    for c in lowered.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    let words: Vec<&str> = out.split_whitespace().filter(|w| *w != "zerofill").collect();
    let joined = words.join(" ");
    // Unsigned only changes width for integers.
    match joined.strip_suffix(" unsigned") {
        Some(base) if !base.contains("int") => base.to_string(),
        _ => joined,
    }
}
