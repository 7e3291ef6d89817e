// Helper for generating user identifiers.
//
// User ids are UUIDv7 rendered as text: timestamp-sortable, unguessable
// enough for an opaque id, and stable across store implementations.

use uuid::Uuid;

/// Generate a new UUIDv7 (timestamp-sortable).
pub fn uuidv7() -> Uuid {
    Uuid::now_v7()
}

/// Generate a new user id.
pub fn new_user_id() -> String {
    uuidv7().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuidv7_is_valid() {
        let id = uuidv7();
        assert_eq!(id.get_version(), Some(uuid::Version::SortRand));
    }

    #[test]
    fn user_ids_are_unique_and_sortable() {
        let a = new_user_id();
        let b = new_user_id();
        assert_ne!(a, b);
        assert!(b >= a);
    }
}
