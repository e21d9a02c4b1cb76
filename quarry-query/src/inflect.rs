//! Table-name inflection used for default relation keys.

/// Naive English singular of a table name.
///
/// Handles the regular plurals table names actually use: `categories` →
/// `category`, `addresses` → `address`, `boxes` → `box`, `users` → `user`.
/// Words that already look singular (`status`, `class`) are kept.
pub fn singular(word: &str) -> String {
    if let Some(stem) = word.strip_suffix("ies") {
        if !stem.is_empty() {
            return format!("{}y", stem);
        }
    }
    for suffix in ["sses", "shes", "ches", "xes"] {
        if word.ends_with(suffix) {
            return word[..word.len() - 2].to_string();
        }
    }
    if word.ends_with("ss") || word.ends_with("us") || word.ends_with("is") {
        return word.to_string();
    }
    match word.strip_suffix('s') {
        Some(stem) if !stem.is_empty() => stem.to_string(),
        _ => word.to_string(),
    }
}

/// Default foreign key for a table: `singular(table)_id`.
pub fn foreign_key_for(table: &str) -> String {
    format!("{}_id", singular(table))
}

/// Default pivot table name: the two singular names, sorted, joined by `_`.
pub fn pivot_table_for(a: &str, b: &str) -> String {
    let mut names = [singular(a), singular(b)];
    names.sort();
    names.join("_")
}
