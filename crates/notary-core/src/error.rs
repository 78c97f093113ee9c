use thiserror::Error;

use crate::types::{AccountId, MarketId, NotaryId, NymId, TransactionNumber, UnitId};

/// Every error kind named in spec.md §7, grouped by the module that raises
/// it. Parsing/validation failures surface as a signed rejection reply
/// without account mutation (§7); programmer-invariant violations (lock
/// order, purse-state table) are not represented here — those abort the
/// process per §5/§9 rather than propagate as a `Result`.
#[derive(Debug, Error)]
pub enum NotaryError {
    // ── Armored frame (C2) ───────────────────────────────────────────────────
    #[error("malformed armor: {0}")]
    MalformedArmor(String),

    #[error("base64 decode failed: {0}")]
    DecodeFailure(String),

    #[error("inflate failed: {0}")]
    DecompressFailure(String),

    // ── Signatures / identity ────────────────────────────────────────────────
    #[error("signature verification failed")]
    BadSignature,

    #[error("unknown nym: {0}")]
    UnknownNym(NymId),

    #[error("unknown unit: {0}")]
    UnknownUnit(UnitId),

    #[error("unknown notary: {0}")]
    UnknownNotary(NotaryId),

    #[error("unknown account: {0}")]
    UnknownAccount(AccountId),

    // ── Transaction-number ledger (C3) ───────────────────────────────────────
    #[error("number {number} is not available for nym {nym}")]
    NumberNotAvailable { nym: NymId, number: TransactionNumber },

    #[error("number {number} is not issued to nym {nym}")]
    NumberNotIssued { nym: NymId, number: TransactionNumber },

    #[error("balance agreement mismatch: client and notary disagree on issued-number set or inbox hash")]
    BalanceAgreementMismatch,

    // ── Accounts / units ──────────────────────────────────────────────────────
    #[error("insufficient funds: need {need}, have {have}")]
    InsufficientFunds { need: i128, have: i128 },

    #[error("unit mismatch: expected {expected}, got {got}")]
    UnitMismatch { expected: UnitId, got: UnitId },

    #[error("notary mismatch: expected {expected}, got {got}")]
    NotaryMismatch { expected: NotaryId, got: NotaryId },

    #[error("scale mismatch: expected {expected}, got {got}")]
    ScaleMismatch { expected: u64, got: u64 },

    #[error("conflicting accounts in the same match: {0}")]
    ConflictingAccounts(AccountId),

    // ── Offer/Trade/Market (C6/C7) ────────────────────────────────────────────
    #[error("invalid offer: {0}")]
    InvalidOffer(String),

    #[error("market order found no counter-offer within limits")]
    MarketOrderUnmatched,

    #[error("market not found: {0}")]
    UnknownMarket(MarketId),

    // ── Cron (C5) ──────────────────────────────────────────────────────────────
    #[error("cron item already activated")]
    AlreadyActivated,

    #[error("cron item not yet active (validFrom in the future)")]
    NotYetActive,

    #[error("cron item or instrument has expired")]
    Expired,

    // ── Cash purse & token (C8) ───────────────────────────────────────────────
    #[error("double spend detected for token")]
    DoubleSpend,

    #[error("bad mint: {0}")]
    BadMint(String),

    #[error("cryptographic operation failed: {0}")]
    BadCrypto(String),

    // ── General / invariant ───────────────────────────────────────────────────
    #[error("invalid state transition: {0}")]
    InvalidState(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("{0}")]
    Other(String),
}

impl From<bincode::Error> for NotaryError {
    fn from(e: bincode::Error) -> Self {
        NotaryError::Serialization(e.to_string())
    }
}
