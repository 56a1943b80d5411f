use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Derive the opaque public identifier for a document.
///
/// The hash is stable for the lifetime of the document and safe to expose
/// outside the system in place of the internal UUID.
pub fn public_hash(kind: &str, id: Uuid) -> String {
    let digest = Sha256::digest(format!("{}:{}", kind, id).as_bytes());
    hex::encode(&digest[..10])
}
