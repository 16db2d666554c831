//! Deterministic English pluralizer. Irregular plurals (person, child, ...) are not handled.

fn is_vowel(c: char) -> bool {
    matches!(c.to_ascii_lowercase(), 'a' | 'e' | 'i' | 'o' | 'u')
}

/// Pluralize the last word of a PascalCase or snake_case name.
/// A name that already ends in a plain `s` (not `ss`, `us`, `is`) is assumed plural and returned unchanged.
pub fn pluralize(word: &str) -> String {
    let lower = word.to_lowercase();
    if lower.is_empty() {
        return String::new();
    }
    if lower.ends_with('s') && !(lower.ends_with("ss") || lower.ends_with("us") || lower.ends_with("is")) {
        return word.to_string();
    }
    if lower.ends_with('s')
        || lower.ends_with('x')
        || lower.ends_with('z')
        || lower.ends_with("ch")
        || lower.ends_with("sh")
    {
        return format!("{}es", word);
    }
    if lower.ends_with('y') {
        let before = lower.chars().rev().nth(1);
        if let Some(c) = before {
            if c.is_alphabetic() && !is_vowel(c) {
                let stem = &word[..word.len() - 1];
                let suffix = if word.ends_with('Y') { "IES" } else { "ies" };
                return format!("{}{}", stem, suffix);
            }
        }
    }
    let suffix = if word.chars().all(|c| !c.is_lowercase()) && word.chars().any(|c| c.is_uppercase()) {
        "S"
    } else {
        "s"
    };
    format!("{}{}", word, suffix)
}

#[cfg(test)]
mod tests {
    use super::pluralize;

    #[test]
    fn regular_rules() {
        assert_eq!(pluralize("Customer"), "Customers");
        assert_eq!(pluralize("Box"), "Boxes");
        assert_eq!(pluralize("Batch"), "Batches");
        assert_eq!(pluralize("Wish"), "Wishes");
        assert_eq!(pluralize("Category"), "Categories");
        assert_eq!(pluralize("Day"), "Days");
        assert_eq!(pluralize("Address"), "Addresses");
        assert_eq!(pluralize("Status"), "Statuses");
        assert_eq!(pluralize("OrderLine"), "OrderLines");
    }

    #[test]
    fn already_plural_is_kept() {
        assert_eq!(pluralize("Orders"), "Orders");
    }

    #[test]
    fn deterministic_for_irregulars() {
        assert_eq!(pluralize("Person"), "Persons");
        assert_eq!(pluralize("Person"), pluralize("Person"));
    }
}
