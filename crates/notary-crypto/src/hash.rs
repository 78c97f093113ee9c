use notary_core::types::{NymId, TransactionId};

/// Compute BLAKE3 hash of arbitrary bytes → 32-byte array.
pub fn blake3_hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// Derive a NymId from raw public key bytes using BLAKE3 (§4.1 identifiers
/// are content addresses; a Nym's identifier addresses its public key).
pub fn nym_id_from_pubkey(pubkey_bytes: &[u8]) -> NymId {
    NymId::from_bytes(blake3_hash(pubkey_bytes))
}

/// Derive a TransactionId from canonical transaction body bytes.
pub fn transaction_id_from_body(body_bytes: &[u8]) -> TransactionId {
    TransactionId::from_bytes(blake3_hash(body_bytes))
}
