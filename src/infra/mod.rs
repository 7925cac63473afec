//! Backend access: the CRUD client, its envelope adapter and the picker
//! driver built on top of it.

pub mod client;
pub mod envelope;
pub mod picker;

pub use client::{
    AdminClient, AdminClientError, ApplyOutcome, CacheStatus, CachedPayload, ProcessType, Resource,
    DEFAULT_BASE_URL, DEFAULT_TTL,
};
pub use envelope::{decode_records, unwrap_envelope, EnvelopeShape, Records};
pub use picker::{CatalogSource, Picker};
