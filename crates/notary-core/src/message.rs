//! External wire Message envelope (§6).
//!
//! Every client→notary request and notary→client reply is a signed
//! `Message`: a stable `Command`, the acting Nym and target Notary, a
//! monotonic per-Nym request number, and a command-specific payload. The
//! signature covers `MessageBody` — everything except the signature itself —
//! the same split the teacher used for `TransactionBody` to avoid signing a
//! field that contains the signature.

use serde::{Deserialize, Serialize};

use crate::types::{AccountId, DilithiumPublicKey, DilithiumSignature, NotaryId, NymId, Timestamp};

/// Stable wire command names (§6). The name itself — not a numeric opcode —
/// is the contract: new commands are added, never renumbered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    RegisterNym,
    UnregisterNym,
    GetRequestNumber,
    GetTransactionNumbers,
    GetNymbox,
    ProcessNymbox,
    RegisterAccount,
    DeleteAssetAccount,
    GetAccountData,
    NotarizeTransfer,
    NotarizeDeposit,
    NotarizeWithdrawal,
    WithdrawVoucher,
    DepositCheque,
    ProcessInbox,
    IssueMarketOffer,
    KillMarketOffer,
    GetMarketList,
    GetMarketOffers,
    GetMarketRecentTrades,
    ActivateSmartContract,
    TriggerClause,
}

/// Command-specific payload. Kept as an opaque armored blob at this layer —
/// decoding into the concrete C3–C9 request/response type is the caller's
/// job once the command is known. Framing itself (C2) is out of band: the
/// payload here is already-dearmored bytes.
pub type Payload = Vec<u8>;

/// Everything the signature covers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MessageBody {
    pub command: Command,
    pub nym_id: NymId,
    pub notary_id: NotaryId,
    pub request_num: u64,
    /// Client's belief about the current Nymbox hash, used by the notary to
    /// detect a stale client (§7 BalanceAgreementMismatch family).
    pub nymbox_hash: Option<[u8; 32]>,
    /// Present on account-scoped commands (NotarizeTransfer, ProcessInbox, ...).
    pub account_id: Option<AccountId>,
    pub timestamp: Timestamp,
    pub payload: Payload,
}

impl MessageBody {
    fn canonical_bytes(&self) -> Vec<u8> {
        bincode::serialize(self).expect("message body serialization is infallible")
    }
}

/// A `MessageBody` plus the sender's signature over its canonical bytes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub body: MessageBody,
    pub signer: DilithiumPublicKey,
    pub signature: DilithiumSignature,
}

impl Message {
    /// Bytes a signer/verifier must agree on; excludes `signer`/`signature`.
    pub fn signing_bytes(body: &MessageBody) -> Vec<u8> {
        body.canonical_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_body(request_num: u64) -> MessageBody {
        MessageBody {
            command: Command::GetTransactionNumbers,
            nym_id: NymId::from_bytes([1u8; 32]),
            notary_id: NotaryId::from_bytes([2u8; 32]),
            request_num,
            nymbox_hash: None,
            account_id: None,
            timestamp: 1_700_000_000,
            payload: vec![],
        }
    }

    #[test]
    fn signing_bytes_are_deterministic() {
        let body = sample_body(5);
        assert_eq!(Message::signing_bytes(&body), Message::signing_bytes(&body));
    }

    #[test]
    fn differing_request_numbers_sign_different_bytes() {
        let a = sample_body(1);
        let b = sample_body(2);
        assert_ne!(Message::signing_bytes(&a), Message::signing_bytes(&b));
    }
}
