//! Registry entities: Nym, Notary, Unit, Account (§3).
//!
//! The key/identity subsystem itself (credentials, asymmetric primitives) is
//! out of scope (§1); what the notary core needs is the thin slice of a Nym
//! that participates in the transaction-number ledger and owns accounts.

use serde::{Deserialize, Serialize};

use notary_core::types::{AccountId, Amount, DilithiumPublicKey, NotaryId, NymId, Scale, UnitId};

/// A cryptographic identity known to this notary (§3 "Nym").
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Nym {
    pub nym_id: NymId,
    pub public_key: DilithiumPublicKey,
    /// Monotonic per-Nym request counter (§6, `getRequestNumber`); rate-limits
    /// read-only queries without consuming a transaction number.
    pub request_num: u64,
    /// `false` after `unregisterNym` (§6); an inactive Nym may still be read
    /// (its accounts and receipt history stay queryable) but accepts no new
    /// requests.
    pub active: bool,
}

impl Nym {
    pub fn new(nym_id: NymId, public_key: DilithiumPublicKey) -> Self {
        Self { nym_id, public_key, request_num: 0, active: true }
    }

    pub fn next_request_num(&mut self) -> u64 {
        self.request_num += 1;
        self.request_num
    }
}

/// This notary's own identity (signing authority).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Notary {
    pub notary_id: NotaryId,
    pub public_key: DilithiumPublicKey,
}

/// An asset or currency definition, created by an issuer Nym.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Unit {
    pub unit_id: UnitId,
    pub issuer: NymId,
    pub symbol: String,
    pub scale: Scale,
}

/// Owned by exactly one Nym, denominated in one Unit (§3 "Account").
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Account {
    pub account_id: AccountId,
    pub owner: NymId,
    pub notary_id: NotaryId,
    pub unit_id: UnitId,
    pub balance: Amount,
    /// Latest inbox-hash, used for balance-agreement comparisons (§4.3).
    pub inbox_hash: [u8; 32],
}

impl Account {
    pub fn new(account_id: AccountId, owner: NymId, notary_id: NotaryId, unit_id: UnitId) -> Self {
        Self { account_id, owner, notary_id, unit_id, balance: 0, inbox_hash: [0u8; 32] }
    }
}
