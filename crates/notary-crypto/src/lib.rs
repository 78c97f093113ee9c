pub mod dilithium;
pub mod hash;
pub mod keypair;

pub use dilithium::{verify_signature, NotarySigner};
pub use hash::{blake3_hash, nym_id_from_pubkey, transaction_id_from_body};
pub use keypair::KeyPair;
