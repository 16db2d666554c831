//! Translates manifest type names into JSON-schema fragments.

use crate::manifest::TypeShape;
use std::collections::BTreeMap;
use utoipa::openapi::schema::{
    AdditionalProperties, ArrayBuilder, KnownFormat, ObjectBuilder, OneOfBuilder, Schema, SchemaFormat, Type,
};
use utoipa::openapi::RefOr;

const MAX_DEPTH: usize = 8;

/// A parsed type expression: `Name` or `Name<arg, ...>`.
#[derive(Debug, PartialEq, Eq)]
struct TypeExpr<'a> {
    name: &'a str,
    args: Vec<TypeExpr<'a>>,
}

fn parse(text: &str) -> Result<TypeExpr<'_>, String> {
    let (expr, rest) = parse_expr(text.trim())?;
    if !rest.trim().is_empty() {
        return Err(format!("unexpected '{}' in type '{}'", rest.trim(), text));
    }
    Ok(expr)
}

fn parse_expr(text: &str) -> Result<(TypeExpr<'_>, &str), String> {
    let end = text.find(['<', '>', ',']).unwrap_or(text.len());
    let name = text[..end].trim();
    if name.is_empty() {
        return Err(format!("missing type name in '{}'", text));
    }
    let mut rest = &text[end..];
    let mut args = Vec::new();
    if let Some(inner) = rest.strip_prefix('<') {
        rest = inner;
        loop {
            let (arg, after) = parse_expr(rest.trim_start())?;
            args.push(arg);
            let after = after.trim_start();
            if let Some(next) = after.strip_prefix(',') {
                rest = next;
            } else if let Some(next) = after.strip_prefix('>') {
                rest = next;
                break;
            } else {
                return Err(format!("unclosed generic in '{}'", text));
            }
        }
    }
    Ok((TypeExpr { name, args }, rest))
}

/// Last path segment: `chrono::NaiveDate` -> `NaiveDate`.
fn short(name: &str) -> &str {
    name.rsplit("::").next().unwrap_or(name)
}

fn typed(ty: Type, format: Option<SchemaFormat>) -> Schema {
    Schema::Object(ObjectBuilder::new().schema_type(ty).format(format).build())
}

fn custom(ty: Type, format: &str) -> Schema {
    typed(ty, Some(SchemaFormat::Custom(format.to_string())))
}

fn generic_object() -> Schema {
    Schema::Object(
        ObjectBuilder::new()
            .schema_type(Type::Object)
            .additional_properties(Some(AdditionalProperties::<Schema>::FreeForm(true)))
            .build(),
    )
}

fn array_of(items: Schema) -> Schema {
    Schema::Array(ArrayBuilder::new().items(RefOr::T(items)).build())
}

fn nullable(inner: Schema) -> Schema {
    Schema::OneOf(
        OneOfBuilder::new()
            .item(RefOr::T(inner))
            .item(RefOr::T(typed(Type::Null, None)))
            .build(),
    )
}

fn primitive(name: &str) -> Option<Schema> {
    let schema = match short(name) {
        "i8" | "i16" | "i32" | "u8" | "u16" => typed(Type::Integer, Some(SchemaFormat::KnownFormat(KnownFormat::Int32))),
        "i64" | "u32" | "u64" => typed(Type::Integer, Some(SchemaFormat::KnownFormat(KnownFormat::Int64))),
        "f32" => typed(Type::Number, Some(SchemaFormat::KnownFormat(KnownFormat::Float))),
        "f64" => typed(Type::Number, Some(SchemaFormat::KnownFormat(KnownFormat::Double))),
        "Decimal" => custom(Type::String, "decimal"),
        "bool" => typed(Type::Boolean, None),
        "String" | "str" => typed(Type::String, None),
        "Uuid" => custom(Type::String, "uuid"),
        "NaiveDateTime" => custom(Type::String, "date-time"),
        "NaiveDate" => custom(Type::String, "date"),
        "NaiveTime" => custom(Type::String, "time"),
        "Value" => generic_object(),
        _ => return None,
    };
    Some(schema)
}

/// Resolves names against a manifest's type table.
pub struct SchemaTranslator<'a> {
    types: &'a BTreeMap<String, TypeShape>,
}

impl<'a> SchemaTranslator<'a> {
    pub fn new(types: &'a BTreeMap<String, TypeShape>) -> Self {
        SchemaTranslator { types }
    }

    /// Schema for a type name such as `Paged<CustomerDto>` or `Option<i32>`.
    /// Fails only when the name is not a well-formed type expression.
    pub fn schema(&self, type_name: &str) -> Result<Schema, String> {
        let expr = parse(type_name)?;
        Ok(self.translate(&expr, 0))
    }

    /// Same as [`schema`](Self::schema), serialized to a JSON string.
    pub fn schema_json(&self, type_name: &str) -> Result<String, String> {
        let schema = self.schema(type_name)?;
        serde_json::to_string(&schema).map_err(|e| e.to_string())
    }

    fn translate(&self, expr: &TypeExpr<'_>, depth: usize) -> Schema {
        if depth > MAX_DEPTH {
            return generic_object();
        }
        let name = short(expr.name);
        match (name, expr.args.as_slice()) {
            ("Vec", [item]) if short(item.name) == "u8" && item.args.is_empty() => {
                custom(Type::String, "byte")
            }
            ("Vec", [item]) => array_of(self.translate(item, depth + 1)),
            ("Option", [inner]) => nullable(self.translate(inner, depth + 1)),
            ("Paged", [item]) => self.paged(self.translate(item, depth + 1)),
            ("DateTime", _) => custom(Type::String, "date-time"),
            (_, []) => primitive(name).unwrap_or_else(|| self.named(name, depth)),
            _ => generic_object(),
        }
    }

    fn paged(&self, item: Schema) -> Schema {
        let integer = || RefOr::T(typed(Type::Integer, Some(SchemaFormat::KnownFormat(KnownFormat::Int64))));
        Schema::Object(
            ObjectBuilder::new()
                .schema_type(Type::Object)
                .property("items", RefOr::T(array_of(item)))
                .property("page", integer())
                .property("pageSize", integer())
                .property("total", integer())
                .required("items")
                .required("page")
                .required("pageSize")
                .required("total")
                .build(),
        )
    }

    fn named(&self, name: &str, depth: usize) -> Schema {
        let Some(shape) = self.types.get(name) else {
            return generic_object();
        };
        let mut object = ObjectBuilder::new().schema_type(Type::Object).title(Some(name.to_string()));
        for field in &shape.fields {
            let schema = match parse(&field.type_name) {
                Ok(expr) => self.translate(&expr, depth + 1),
                Err(_) => generic_object(),
            };
            if field.nullable {
                object = object.property(field.name.clone(), RefOr::T(nullable(schema)));
            } else {
                object = object
                    .property(field.name.clone(), RefOr::T(schema))
                    .required(field.name.clone());
            }
        }
        Schema::Object(object.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::FieldShape;
    use serde_json::Value;

    fn types() -> BTreeMap<String, TypeShape> {
        let mut t = BTreeMap::new();
        t.insert(
            "CustomerDto".to_string(),
            TypeShape {
                fields: vec![
                    FieldShape { name: "id".into(), type_name: "i32".into(), nullable: false },
                    FieldShape { name: "name".into(), type_name: "String".into(), nullable: true },
                ],
            },
        );
        t
    }

    fn json(t: &SchemaTranslator<'_>, name: &str) -> Value {
        serde_json::from_str(&t.schema_json(name).unwrap()).unwrap()
    }

    #[test]
    fn parses_nested_generics() {
        let e = parse("Paged<Option<chrono::DateTime<chrono::Utc>>>").unwrap();
        assert_eq!(e.name, "Paged");
        assert_eq!(e.args[0].args[0].name, "chrono::DateTime");
        assert_eq!(e.args[0].args[0].args[0].name, "chrono::Utc");
        assert!(parse("Vec<").is_err());
        assert!(parse("Vec<i32>>").is_err());
        assert!(parse("").is_err());
    }

    #[test]
    fn primitives_carry_formats() {
        let t_types = BTreeMap::new();
        let t = SchemaTranslator::new(&t_types);
        assert_eq!(json(&t, "i64")["type"], "integer");
        assert_eq!(json(&t, "i64")["format"], "int64");
        assert_eq!(json(&t, "uuid::Uuid")["format"], "uuid");
        assert_eq!(json(&t, "chrono::DateTime<chrono::Utc>")["format"], "date-time");
        assert_eq!(json(&t, "Vec<u8>")["type"], "string");
    }

    #[test]
    fn paged_wraps_item_schema() {
        let types = types();
        let t = SchemaTranslator::new(&types);
        let v = json(&t, "Paged<CustomerDto>");
        assert_eq!(v["type"], "object");
        assert_eq!(v["properties"]["pageSize"]["type"], "integer");
        let item = &v["properties"]["items"]["items"];
        assert_eq!(item["title"], "CustomerDto");
        assert_eq!(item["properties"]["id"]["type"], "integer");
        assert!(item["properties"]["name"]["oneOf"].is_array());
        assert_eq!(item["required"], serde_json::json!(["id"]));
    }

    #[test]
    fn collections_options_and_unknown_names() {
        let types = types();
        let t = SchemaTranslator::new(&types);
        assert_eq!(json(&t, "Vec<CustomerDto>")["type"], "array");
        let opt = json(&t, "Option<i32>");
        assert_eq!(opt["oneOf"][1]["type"], "null");
        let unknown = json(&t, "Mystery");
        assert_eq!(unknown["type"], "object");
        assert_eq!(unknown["additionalProperties"], true);
    }
}
