//! Generation-ready metadata produced by the mapper.

use crate::schema::RoutineKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Closed set of primitives the generator knows how to emit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TargetType {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Decimal,
    Bool,
    String,
    Guid,
    OffsetDateTime,
    DateTime,
    Date,
    Time,
    Bytes,
    Json,
    Unknown,
}

impl TargetType {
    /// Rust type path used in generated source.
    pub fn rust_type(&self) -> &'static str {
        match self {
            TargetType::I8 => "i8",
            TargetType::I16 => "i16",
            TargetType::I32 => "i32",
            TargetType::I64 => "i64",
            TargetType::U8 => "u8",
            TargetType::U16 => "u16",
            TargetType::U32 => "u32",
            TargetType::U64 => "u64",
            TargetType::F32 => "f32",
            TargetType::F64 => "f64",
            TargetType::Decimal => "rust_decimal::Decimal",
            TargetType::Bool => "bool",
            TargetType::String => "String",
            TargetType::Guid => "uuid::Uuid",
            TargetType::OffsetDateTime => "chrono::DateTime<chrono::Utc>",
            TargetType::DateTime => "chrono::NaiveDateTime",
            TargetType::Date => "chrono::NaiveDate",
            TargetType::Time => "chrono::NaiveTime",
            TargetType::Bytes => "Vec<u8>",
            TargetType::Json => "serde_json::Value",
            // Never emitted: unknown columns are dropped before rendering.
            TargetType::Unknown => "()",
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, TargetType::Unknown)
    }

    /// Integer key types that MySQL's `last_insert_id()` can be cast into.
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            TargetType::I8
                | TargetType::I16
                | TargetType::I32
                | TargetType::I64
                | TargetType::U8
                | TargetType::U16
                | TargetType::U32
                | TargetType::U64
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyMeta {
    /// PascalCase property name, e.g. "CustomerId".
    pub name: String,
    /// Source column (or parameter) name as it appears in the catalog.
    pub column: String,
    /// Rust field identifier in generated code.
    pub field_name: String,
    #[serde(rename = "type")]
    pub ty: TargetType,
    pub nullable: bool,
    pub is_key: bool,
    pub is_foreign_key: bool,
    /// Must be supplied in write bodies.
    pub is_required: bool,
    pub is_auto_generated: bool,
}

impl PropertyMeta {
    /// Wire name in JSON bodies.
    pub fn json_name(&self) -> String {
        crate::case::to_camel_case(&self.field_name)
    }

    /// Field type in generated DTOs: `Option<T>` for nullable properties.
    pub fn field_type(&self) -> String {
        if self.nullable {
            format!("Option<{}>", self.ty.rust_type())
        } else {
            self.ty.rust_type().to_string()
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKeyMeta {
    /// Navigation name, e.g. "Order" on OrderLine or "OrderLines" on Order.
    pub name: String,
    /// Local column holding (to-one) or referenced by (collection) the relation.
    pub column: String,
    pub referenced_entity_singular: String,
    pub referenced_entity_plural: String,
    /// Property on the other side of the relation. None when the referenced entity is absent.
    pub referenced_column: Option<String>,
    pub is_collection: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityMetadata {
    pub schema: String,
    /// Source table or view name.
    pub table: String,
    pub name: String,
    pub plural_name: String,
    /// URL segment, snake_case of the plural.
    pub route: String,
    pub keys: BTreeMap<String, TargetType>,
    pub properties: Vec<PropertyMeta>,
    pub foreign_keys: Vec<ForeignKeyMeta>,
    pub is_view: bool,
}

impl EntityMetadata {
    /// Key properties in declaration order.
    pub fn key_properties(&self) -> impl Iterator<Item = &PropertyMeta> {
        self.properties.iter().filter(|p| p.is_key)
    }

    pub fn property_by_column(&self, column: &str) -> Option<&PropertyMeta> {
        self.properties.iter().find(|p| p.column == column)
    }

    /// snake_case module name for generated files.
    pub fn module_name(&self) -> String {
        crate::case::to_field_ident(&self.name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterMeta {
    #[serde(flatten)]
    pub property: PropertyMeta,
    /// Native type name as declared in the database.
    pub sql_type: String,
    pub order: u32,
    /// Output parameters keep their call position but are not part of the request body.
    pub is_output: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcedureMetadata {
    pub schema: String,
    pub name: String,
    /// PascalCase name used for generated types.
    pub normalized_name: String,
    pub kind: RoutineKind,
    /// All parameters in call order.
    pub parameters: Vec<ParameterMeta>,
    pub output_set: Vec<PropertyMeta>,
    pub has_output: bool,
    pub has_parameters: bool,
}

impl ProcedureMetadata {
    pub fn module_name(&self) -> String {
        crate::case::to_field_ident(&self.normalized_name)
    }

    pub fn inputs(&self) -> impl Iterator<Item = &ParameterMeta> {
        self.parameters.iter().filter(|p| !p.is_output)
    }
}
