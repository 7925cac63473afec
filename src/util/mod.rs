use uuid::Uuid;

pub mod persistence;
pub mod version;

/// Backend-style identifier: `PREFIX-<uuid v4>`.
pub fn generate_id(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4().simple())
}
