// utils.rs

/// Lowercases and strips everything that is not alphanumeric, so
/// "Living-Room Lamp" and "livingroomlamp" compare equal.
pub fn normalize_name(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}
