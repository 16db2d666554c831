//! Identifier case conversion for generated code: catalog names -> Rust type names, field names, route segments.

/// Split an identifier into lowercase words on `_`, `-`, spaces, and case boundaries.
/// e.g. "OrderLine" -> ["order", "line"], "HTTPStatus_code" -> ["http", "status", "code"]
fn words(s: &str) -> Vec<String> {
    let chars: Vec<char> = s.chars().collect();
    let mut out: Vec<String> = Vec::new();
    let mut current = String::new();
    for (i, &c) in chars.iter().enumerate() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
            continue;
        }
        if c.is_uppercase() && !current.is_empty() {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).map(|n| n.is_lowercase()).unwrap_or(false);
            if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_lower) {
                out.push(std::mem::take(&mut current));
            }
        }
        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// "user_id" -> "userId", "OrderLine" -> "orderLine"
pub fn to_camel_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for (i, w) in words(s).iter().enumerate() {
        if i == 0 {
            out.push_str(w);
        } else {
            out.push_str(&capitalize(w));
        }
    }
    out
}

/// "userId" -> "user_id", "Order Details" -> "order_details"
pub fn to_snake_case(s: &str) -> String {
    words(s).join("_")
}

/// "order_line" -> "OrderLine", "customer" -> "Customer"
pub fn to_pascal_case(s: &str) -> String {
    words(s).iter().map(|w| capitalize(w)).collect()
}

const RUST_KEYWORDS: &[&str] = &[
    "as", "async", "await", "break", "const", "continue", "crate", "dyn", "else", "enum", "extern",
    "false", "fn", "for", "if", "impl", "in", "let", "loop", "match", "mod", "move", "mut", "pub",
    "ref", "return", "self", "static", "struct", "super", "trait", "true", "type", "unsafe", "use",
    "where", "while", "abstract", "become", "box", "do", "final", "macro", "override", "priv",
    "try", "typeof", "unsized", "virtual", "yield",
];

/// snake_case identifier safe to use as a Rust field or function name.
/// Keywords get a trailing underscore; a leading digit gets an underscore prefix; empty input becomes "field".
pub fn to_field_ident(s: &str) -> String {
    let mut ident = to_snake_case(s);
    if ident.is_empty() {
        return "field".into();
    }
    if ident.chars().next().map(|c| c.is_ascii_digit()).unwrap_or(false) {
        ident.insert(0, '_');
    }
    if RUST_KEYWORDS.contains(&ident.as_str()) {
        ident.push('_');
    }
    ident
}

/// PascalCase identifier safe to use as a Rust type name.
pub fn to_type_ident(s: &str) -> String {
    let mut ident = to_pascal_case(s);
    if ident.is_empty() {
        return "Unnamed".into();
    }
    if ident.chars().next().map(|c| c.is_ascii_digit()).unwrap_or(false) {
        ident.insert(0, 'T');
    }
    if ident == "Self" {
        ident.push('_');
    }
    ident
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snake_from_mixed_inputs() {
        assert_eq!(to_snake_case("OrderLine"), "order_line");
        assert_eq!(to_snake_case("order_line"), "order_line");
        assert_eq!(to_snake_case("userId"), "user_id");
        assert_eq!(to_snake_case("HTTPStatus"), "http_status");
        assert_eq!(to_snake_case("Order Details"), "order_details");
    }

    #[test]
    fn pascal_and_camel() {
        assert_eq!(to_pascal_case("order_line"), "OrderLine");
        assert_eq!(to_pascal_case("Customer"), "Customer");
        assert_eq!(to_camel_case("created_at"), "createdAt");
        assert_eq!(to_camel_case("Id"), "id");
    }

    #[test]
    fn field_idents_avoid_keywords_and_digits() {
        assert_eq!(to_field_ident("type"), "type_");
        assert_eq!(to_field_ident("2fa_code"), "_2fa_code");
        assert_eq!(to_field_ident("$$"), "field");
        assert_eq!(to_type_ident("2024_sales"), "T2024Sales");
    }
}
