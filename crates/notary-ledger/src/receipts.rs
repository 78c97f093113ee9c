//! Receipt & Inbox ledger (C4), §4.3.

use serde::{Deserialize, Serialize};

use notary_core::error::NotaryError;
use notary_core::types::{AccountId, Amount, DilithiumSignature, NotaryId, NymId, Timestamp, TransactionId, TransactionNumber};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemStatus {
    Request,
    Ack,
    Reject,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemKind {
    MarketReceipt,
    FinalReceipt,
    TransferReceipt,
    DepositReceipt,
    WithdrawalReceipt,
    ChequeReceipt,
}

/// A single entry inside a Transaction (§4.3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Item {
    pub kind: ItemKind,
    pub status: ItemStatus,
    pub amount: Amount,
    pub note: String,
    pub attachment: Vec<u8>,
}

/// A signed record with a transaction number, an `inReferenceTo` number, an
/// origin type, and a list of Items.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: TransactionId,
    pub transaction_num: TransactionNumber,
    pub in_reference_to: TransactionNumber,
    pub account_id: AccountId,
    pub notary_id: NotaryId,
    pub items: Vec<Item>,
    pub timestamp: Timestamp,
    pub notary_signature: DilithiumSignature,
}

impl Transaction {
    fn canonical_bytes_unsigned(
        transaction_num: TransactionNumber,
        in_reference_to: TransactionNumber,
        account_id: &AccountId,
        notary_id: &NotaryId,
        items: &[Item],
        timestamp: Timestamp,
    ) -> Vec<u8> {
        #[derive(Serialize)]
        struct Canonical<'a> {
            transaction_num: TransactionNumber,
            in_reference_to: TransactionNumber,
            account_id: &'a AccountId,
            notary_id: &'a NotaryId,
            items: &'a [Item],
            timestamp: Timestamp,
        }
        bincode::serialize(&Canonical {
            transaction_num,
            in_reference_to,
            account_id,
            notary_id,
            items,
            timestamp,
        })
        .expect("transaction canonical serialization is infallible")
    }

    /// Build and sign a new transaction for `account_id`, deriving its ID by
    /// content-addressing the signed canonical bytes.
    pub fn new_signed(
        transaction_num: TransactionNumber,
        in_reference_to: TransactionNumber,
        account_id: AccountId,
        notary_id: NotaryId,
        items: Vec<Item>,
        timestamp: Timestamp,
        sign: impl FnOnce(&[u8]) -> DilithiumSignature,
    ) -> Self {
        let bytes = Self::canonical_bytes_unsigned(
            transaction_num,
            in_reference_to,
            &account_id,
            &notary_id,
            &items,
            timestamp,
        );
        let notary_signature = sign(&bytes);
        let transaction_id = TransactionId::of(&bytes);
        Self {
            transaction_id,
            transaction_num,
            in_reference_to,
            account_id,
            notary_id,
            items,
            timestamp,
            notary_signature,
        }
    }

    fn chain_bytes(&self) -> Vec<u8> {
        Self::canonical_bytes_unsigned(
            self.transaction_num,
            self.in_reference_to,
            &self.account_id,
            &self.notary_id,
            &self.items,
            self.timestamp,
        )
    }
}

/// Append-only per-account inbox with hash-chaining (§4.3, §8 "Receipt chain
/// monotonicity"): `inboxHash_{k+1} = H(inboxHash_k ‖ canonical(txn_{k+1}))`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Inbox {
    pub account_id: Option<AccountId>,
    pub entries: Vec<Transaction>,
    pub hash: [u8; 32],
}

impl Inbox {
    pub fn new(account_id: AccountId) -> Self {
        Self { account_id: Some(account_id), entries: Vec::new(), hash: [0u8; 32] }
    }

    /// Append `txn`, advancing the hash chain. Returns the new inbox hash.
    pub fn append(&mut self, txn: Transaction) -> [u8; 32] {
        let mut preimage = Vec::with_capacity(32 + 128);
        preimage.extend_from_slice(&self.hash);
        preimage.extend_from_slice(&txn.chain_bytes());
        let new_hash = *blake3::hash(&preimage).as_bytes();
        self.entries.push(txn);
        self.hash = new_hash;
        new_hash
    }

    /// Remove and return the entry that references `transaction_num`, once
    /// the Nym has processed/accepted it (`processInbox`, §6).
    pub fn take_processed(&mut self, transaction_num: TransactionNumber) -> Option<Transaction> {
        let idx = self.entries.iter().position(|t| t.transaction_num == transaction_num)?;
        Some(self.entries.remove(idx))
    }

    /// Numbers referenced by outstanding final receipts awaiting acceptance
    /// (used by `NumberLedger::matches_balance_agreement`, §4.2).
    pub fn pending_final_receipt_numbers(&self) -> Vec<TransactionNumber> {
        self.entries
            .iter()
            .filter(|t| t.items.iter().any(|i| i.kind == ItemKind::FinalReceipt))
            .map(|t| t.in_reference_to)
            .collect()
    }

    pub fn verify_chain(&self) -> Result<(), NotaryError> {
        let mut running = [0u8; 32];
        for txn in &self.entries {
            let mut preimage = Vec::with_capacity(32 + 128);
            preimage.extend_from_slice(&running);
            preimage.extend_from_slice(&txn.chain_bytes());
            running = *blake3::hash(&preimage).as_bytes();
        }
        if running != self.hash {
            return Err(NotaryError::InvalidState("inbox hash chain broken".into()));
        }
        Ok(())
    }
}

/// Construct a marketReceipt Item per the amount-polarity table (§4.6).
pub fn market_receipt_item(amount: Amount, updated_trade: Vec<u8>) -> Item {
    Item {
        kind: ItemKind::MarketReceipt,
        status: ItemStatus::Ack,
        amount,
        note: "updatedTrade".into(),
        attachment: updated_trade,
    }
}

/// Construct a rejection marketReceipt for a trader short of funds (§4.6/§7).
pub fn market_rejection_item(note: &str) -> Item {
    Item { kind: ItemKind::MarketReceipt, status: ItemStatus::Reject, amount: 0, note: note.into(), attachment: vec![] }
}

/// Construct a finalReceipt Item (§4.3/§4.4).
pub fn final_receipt_item() -> Item {
    Item { kind: ItemKind::FinalReceipt, status: ItemStatus::Ack, amount: 0, note: "finalReceipt".into(), attachment: vec![] }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notary_id() -> NotaryId {
        NotaryId::from_bytes([3u8; 32])
    }

    fn acct() -> AccountId {
        AccountId::from_bytes([4u8; 32])
    }

    fn no_sig(_: &[u8]) -> DilithiumSignature {
        DilithiumSignature(vec![])
    }

    #[test]
    fn appending_advances_chain_and_is_verifiable() {
        let mut inbox = Inbox::new(acct());
        let txn = Transaction::new_signed(1, 0, acct(), notary_id(), vec![final_receipt_item()], 100, no_sig);
        let h1 = inbox.append(txn);
        assert_ne!(h1, [0u8; 32]);
        inbox.verify_chain().unwrap();
    }

    #[test]
    fn chain_extends_with_each_append() {
        let mut inbox = Inbox::new(acct());
        let t1 = Transaction::new_signed(1, 0, acct(), notary_id(), vec![], 100, no_sig);
        let h1 = inbox.append(t1);
        let t2 = Transaction::new_signed(2, 0, acct(), notary_id(), vec![], 101, no_sig);
        let h2 = inbox.append(t2);
        assert_ne!(h1, h2);
        inbox.verify_chain().unwrap();
    }

    #[test]
    fn pending_final_receipts_tracked_by_in_reference_to() {
        let mut inbox = Inbox::new(acct());
        let txn = Transaction::new_signed(9, 5, acct(), notary_id(), vec![final_receipt_item()], 100, no_sig);
        inbox.append(txn);
        assert_eq!(inbox.pending_final_receipt_numbers(), vec![5]);
    }

    #[test]
    fn take_processed_removes_entry() {
        let mut inbox = Inbox::new(acct());
        let txn = Transaction::new_signed(1, 0, acct(), notary_id(), vec![], 100, no_sig);
        inbox.append(txn);
        let taken = inbox.take_processed(1);
        assert!(taken.is_some());
        assert!(inbox.entries.is_empty());
    }

    #[test]
    fn tampered_entry_breaks_chain_verification() {
        let mut inbox = Inbox::new(acct());
        let txn = Transaction::new_signed(1, 0, acct(), notary_id(), vec![], 100, no_sig);
        inbox.append(txn);
        inbox.entries[0].timestamp = 999;
        assert!(inbox.verify_chain().is_err());
    }
}
