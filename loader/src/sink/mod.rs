//! Destinations for parsed records.
//!
//! A [`RecordSink`] stands for the LCA data library: it receives the flows of
//! one database at a time and stores a method's complete factor list.
//!
//! - [`LocalStore`] - JSON files in a directory
//! - [`RemoteSink`] - JSON over HTTP

pub mod local;
pub mod remote;

pub use local::{LocalStore, StoredDatabase, StoredMethod};
pub use remote::RemoteSink;

use uuid::Uuid;

use crate::error::SinkResult;
use crate::models::{CharacterizationEntry, FlowRecord, MethodName};

/// Namespace for storage keys; unrelated to flow identifiers.
const STORAGE_NAMESPACE: Uuid = Uuid::from_u128(0x2b7e_9c41_d3a0_5f86_b214_7ce5_0a93_d168);

/// Write access to an LCA data store.
#[allow(async_fn_in_trait)]
pub trait RecordSink {
    /// Insert or update `flows` in `database`, creating the database if needed.
    async fn write_database(&mut self, database: &str, flows: &[FlowRecord]) -> SinkResult<()>;

    /// Current factor list of `method`; empty when the method does not exist.
    async fn load_method(&mut self, method: &MethodName) -> SinkResult<Vec<CharacterizationEntry>>;

    /// Replace the factor list of `method`.
    async fn write_method(
        &mut self,
        method: &MethodName,
        factors: &[CharacterizationEntry],
        unit: Option<&str>,
    ) -> SinkResult<()>;
}

/// URL and file name safe form of `name`.
///
/// ```text
/// "ReCiPe 2016::Ecotoxicity" → "recipe-2016-ecotoxicity"
/// ```
pub fn slugify(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Slug plus a short hash of the exact name, so names that only differ in
/// punctuation or case get different keys.
pub fn storage_key(name: &str) -> String {
    let hash = Uuid::new_v5(&STORAGE_NAMESPACE, name.as_bytes()).simple().to_string();
    let slug = slugify(name);
    if slug.is_empty() {
        hash[..12].to_string()
    } else {
        format!("{}-{}", slug, &hash[..8])
    }
}
