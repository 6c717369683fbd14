//! Derived flow identifiers.
//!
//! Both parsers call [`derive_flow_id`] on the identity columns of a row, so a
//! characterization entry and the flow parsed from the same logical row always
//! resolve to the same key without a shared index.

use uuid::Uuid;

use crate::models::FlowId;

/// Namespace of the name-based UUIDs behind every [`FlowId`].
const FLOW_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2a4e_9b3d_5c17_a8e2_40d9_71b6_c35f);

/// Derive the identifier of the flow `(database, name, categories)`.
///
/// Components are trimmed and length-prefixed before hashing, so no choice of
/// field contents can make two different tuples encode to the same bytes.
pub fn derive_flow_id<S: AsRef<str>>(database: &str, name: &str, categories: &[S]) -> FlowId {
    let mut encoded = Vec::with_capacity(64);
    push_component(&mut encoded, database);
    push_component(&mut encoded, name);
    encoded.extend_from_slice(&(categories.len() as u64).to_be_bytes());
    for category in categories {
        push_component(&mut encoded, category.as_ref());
    }

    let uuid = Uuid::new_v5(&FLOW_NAMESPACE, &encoded);
    let mut head = [0u8; 8];
    head.copy_from_slice(&uuid.as_bytes()[..8]);
    FlowId(u64::from_be_bytes(head) & (i64::MAX as u64))
}

fn push_component(buf: &mut Vec<u8>, value: &str) {
    let value = value.trim();
    buf.extend_from_slice(&(value.len() as u64).to_be_bytes());
    buf.extend_from_slice(value.as_bytes());
}
