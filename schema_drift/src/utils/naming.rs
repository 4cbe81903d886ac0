//! Naming conventions for generated identifiers

use inflector::Inflector;

/// Apply a naming convention to a string
pub fn apply_naming_convention(name: &str, convention: &str) -> String {
    match convention {
        "snake_case" => name.to_snake_case(),
        "camel_case" => name.to_camel_case(),
        "pascal_case" => name.to_pascal_case(),
        "screaming_snake_case" => name.to_screaming_snake_case(),
        _ => name.to_string(),
    }
}

/// Format a name according to a pattern with `{placeholder}` slots
pub fn format_name(pattern: &str, replacements: &[(&str, &str)]) -> String {
    let mut result = pattern.to_string();

    for (placeholder, value) in replacements {
        result = result.replace(&format!("{{{}}}", placeholder), value);
    }

    result
}

/// Table name for an entity type
pub fn get_table_name(entity_name: &str, style: &str, pluralize_tables: bool) -> String {
    let name = apply_naming_convention(entity_name, style);

    if pluralize_tables {
        pluralize(&name)
    } else {
        name
    }
}

/// Column name for an entity field
pub fn get_column_name(field_name: &str, style: &str) -> String {
    apply_naming_convention(field_name, style)
}

pub fn get_index_name(pattern: &str, table_name: &str, columns: &[String]) -> String {
    let columns_str = columns.join("_");

    format_name(pattern, &[("table", table_name), ("columns", &columns_str)])
}

pub fn get_foreign_key_name(pattern: &str, table_name: &str, column_name: &str) -> String {
    format_name(pattern, &[("table", table_name), ("column", column_name)])
}

/// Truncate an identifier to fit database limits
///
/// Truncated names keep a prefix of the original followed by `_` and the
/// first 8 hex digits of its md5, so distinct long names stay distinct.
pub fn truncate_identifier(name: &str, max_length: usize) -> String {
    if name.len() <= max_length {
        return name.to_string();
    }

    let keep_length = max_length.saturating_sub(9);
    let hash = format!("{:x}", md5::compute(name.as_bytes()));

    let mut cut = keep_length.min(name.len());
    while !name.is_char_boundary(cut) {
        cut -= 1;
    }

    format!("{}_{}", &name[..cut], &hash[0..8])
}

/// Maximum identifier length for a driver
pub fn get_max_identifier_length(driver: &str) -> usize {
    match driver.to_lowercase().as_str() {
        "postgres" | "postgresql" => 63,
        "mysql" => 64,
        "sqlite" => 2048,
        _ => 63,
    }
}

/// Convert a singular name to plural
pub fn pluralize(name: &str) -> String {
    match name.to_lowercase().as_str() {
        "person" => "people".to_string(),
        "child" => "children".to_string(),
        "man" => "men".to_string(),
        "woman" => "women".to_string(),
        "mouse" => "mice".to_string(),
        _ => name.to_plural(),
    }
}
