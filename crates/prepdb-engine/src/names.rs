//! Unique database names.

use prepdb_core::constants::DATABASE_NAME_PREFIX;

/// A fresh, collision-free database name.
pub fn database_name() -> String {
    format!("{DATABASE_NAME_PREFIX}_{}", uuid::Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_unique_and_identifier_safe() {
        let a = database_name();
        let b = database_name();
        assert_ne!(a, b);
        assert!(a.starts_with("prepdb_"));
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
    }
}
