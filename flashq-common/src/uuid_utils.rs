//! UUID utilities

use uuid::Uuid;

/// Generate a new time-sortable UUIDv7
pub fn generate() -> Uuid {
    Uuid::now_v7()
}

/// Parse UUID from string
pub fn parse(s: &str) -> Result<Uuid, uuid::Error> {
    Uuid::parse_str(s)
}
