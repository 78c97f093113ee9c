//! Value & Identifier primitives (C1).
//!
//! An `Identifier` is the content hash of a canonical payload; equality is
//! byte equality. Every entity kind (Nym, Notary, Unit, Account, CronItem,
//! Market, Transaction, Token) gets its own newtype so the compiler catches
//! cross-kind mix-ups — you cannot hand a `MarketId` where an `AccountId` is
//! expected.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical signed amount. Conservation-tracked per operation; negative
/// values represent debits in a delta, never a stored balance.
pub type Amount = i128;

/// Unix timestamp, UTC seconds.
pub type Timestamp = i64;

/// A transaction number, unique per Notary, issued into a Nym's ledger (C3).
pub type TransactionNumber = u64;

/// Market quantity scale (the unit of quantity on a market).
pub type Scale = u64;

/// Declares a 32-byte content-addressed identifier newtype with the
/// standard encoding helpers.
macro_rules! identifier {
    ($name:ident) => {
        #[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub [u8; 32]);

        impl $name {
            pub fn from_bytes(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
                let bytes = hex::decode(s)?;
                if bytes.len() != 32 {
                    return Err(hex::FromHexError::InvalidStringLength);
                }
                let mut arr = [0u8; 32];
                arr.copy_from_slice(&bytes);
                Ok(Self(arr))
            }

            /// Content-address a canonical payload into this identifier kind.
            pub fn of(canonical_bytes: &[u8]) -> Self {
                Self(*blake3::hash(canonical_bytes).as_bytes())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.to_hex())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({}…)", stringify!($name), &self.to_hex()[..8])
            }
        }
    };
}

identifier!(NymId);
identifier!(NotaryId);
identifier!(UnitId);
identifier!(AccountId);
identifier!(CronItemId);
identifier!(MarketId);
identifier!(TransactionId);
identifier!(TokenId);

/// `MarketId = H(canonical(unit, currency, scale))` (§4.6).
pub fn market_id(unit: &UnitId, currency: &UnitId, scale: Scale) -> MarketId {
    #[derive(Serialize)]
    struct Canonical<'a> {
        unit: &'a UnitId,
        currency: &'a UnitId,
        scale: Scale,
    }
    let bytes = bincode::serialize(&Canonical { unit, currency, scale })
        .expect("market id canonical serialization is infallible");
    MarketId::of(&bytes)
}

/// Dilithium2 public key (1312 bytes per NIST FIPS 204).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DilithiumPublicKey(pub Vec<u8>);

impl fmt::Debug for DilithiumPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DilithiumPublicKey({}b)", self.0.len())
    }
}

/// Dilithium2 signature (2420 bytes per NIST FIPS 204).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DilithiumSignature(pub Vec<u8>);

impl fmt::Debug for DilithiumSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DilithiumSignature({}b)", self.0.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_round_trips_through_hex() {
        let id = AccountId::from_bytes([7u8; 32]);
        let hex = id.to_hex();
        let back = AccountId::from_hex(&hex).unwrap();
        assert_eq!(id, back);
    }

    #[test]
    fn market_id_is_deterministic_and_scale_sensitive() {
        let unit = UnitId::from_bytes([1u8; 32]);
        let currency = UnitId::from_bytes([2u8; 32]);
        let a = market_id(&unit, &currency, 10);
        let b = market_id(&unit, &currency, 10);
        assert_eq!(a, b);
        let c = market_id(&unit, &currency, 20);
        assert_ne!(a, c);
    }
}
