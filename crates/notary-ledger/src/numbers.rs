//! Transaction-number ledger (C3), §4.2.
//!
//! Three disjoint sets per (Nym, Notary): `Available`, `Issued`, `Closing`.
//! `Available ∩ Issued = ∅` is maintained by construction — every transfer
//! between sets goes through `HashSet::remove`/`insert` pairs, never a bare
//! insert into the destination.

use std::collections::HashSet;

use notary_core::error::NotaryError;
use notary_core::types::{NymId, TransactionNumber};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NumberLedger {
    pub nym_id: Option<NymId>,
    available: HashSet<TransactionNumber>,
    issued: HashSet<TransactionNumber>,
    /// Opening numbers of Cron items this Nym currently participates in.
    /// Separate from `issued`: closing a Cron item does not release the
    /// closing numbers staked on it (§4.2 `closeCronItem`).
    closing: HashSet<TransactionNumber>,
}

impl NumberLedger {
    pub fn new(nym_id: NymId) -> Self {
        Self { nym_id: Some(nym_id), ..Default::default() }
    }

    /// Notary-side: add `n` to `Available`.
    pub fn issue(&mut self, n: TransactionNumber) {
        self.available.insert(n);
    }

    /// Move `n` from `Available` to `Issued`.
    pub fn consume(&mut self, n: TransactionNumber) -> Result<(), NotaryError> {
        if !self.available.remove(&n) {
            return Err(NotaryError::NumberNotAvailable {
                nym: self.nym_id.clone().unwrap_or_else(|| NymId::from_bytes([0u8; 32])),
                number: n,
            });
        }
        self.issued.insert(n);
        Ok(())
    }

    /// Membership query over `Issued`.
    pub fn verify_issued(&self, n: TransactionNumber) -> bool {
        self.issued.contains(&n)
    }

    /// Untag a Cron opening number from the closing-tracking set without
    /// touching `Issued` (§4.2).
    pub fn close_cron_item(&mut self, opening_num: TransactionNumber) {
        self.closing.remove(&opening_num);
    }

    /// Register that `opening_num` now tracks an active Cron item.
    pub fn open_cron_item(&mut self, opening_num: TransactionNumber) {
        self.closing.insert(opening_num);
    }

    /// Final removal from `Issued` when a final receipt is accepted.
    pub fn release_issued(&mut self, n: TransactionNumber) -> Result<(), NotaryError> {
        if !self.issued.remove(&n) {
            return Err(NotaryError::NumberNotIssued {
                nym: self.nym_id.clone().unwrap_or_else(|| NymId::from_bytes([0u8; 32])),
                number: n,
            });
        }
        Ok(())
    }

    /// Return numbers directly to `Available` (cancellation before
    /// activation, §4.4/§7 — no finalReceipt is produced for this path).
    pub fn return_to_available(&mut self, n: TransactionNumber) -> Result<(), NotaryError> {
        self.release_issued(n)?;
        self.available.insert(n);
        Ok(())
    }

    pub fn available(&self) -> &HashSet<TransactionNumber> {
        &self.available
    }

    pub fn issued(&self) -> &HashSet<TransactionNumber> {
        &self.issued
    }

    pub fn closing(&self) -> &HashSet<TransactionNumber> {
        &self.closing
    }

    /// Balance agreements must list exactly `Issued \ {pending final
    /// receipts}` (§4.2). The caller supplies the pending set (numbers whose
    /// final receipts already sit in the inbox awaiting acceptance).
    pub fn matches_balance_agreement(
        &self,
        claimed: &HashSet<TransactionNumber>,
        pending_final_receipts: &HashSet<TransactionNumber>,
    ) -> bool {
        let expected: HashSet<_> = self.issued.difference(pending_final_receipts).cloned().collect();
        expected == *claimed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nym() -> NymId {
        NymId::from_bytes([9u8; 32])
    }

    #[test]
    fn issue_then_consume_moves_between_sets() {
        let mut ledger = NumberLedger::new(nym());
        ledger.issue(1);
        assert!(ledger.available().contains(&1));
        ledger.consume(1).unwrap();
        assert!(!ledger.available().contains(&1));
        assert!(ledger.verify_issued(1));
    }

    #[test]
    fn consume_unavailable_number_fails() {
        let mut ledger = NumberLedger::new(nym());
        let err = ledger.consume(42).unwrap_err();
        assert!(matches!(err, NotaryError::NumberNotAvailable { .. }));
    }

    #[test]
    fn available_and_issued_never_overlap() {
        let mut ledger = NumberLedger::new(nym());
        ledger.issue(7);
        ledger.consume(7).unwrap();
        assert!(ledger.available().is_disjoint(ledger.issued()));
    }

    #[test]
    fn release_issued_requires_membership() {
        let mut ledger = NumberLedger::new(nym());
        let err = ledger.release_issued(3).unwrap_err();
        assert!(matches!(err, NotaryError::NumberNotIssued { .. }));
    }

    #[test]
    fn return_to_available_round_trips() {
        let mut ledger = NumberLedger::new(nym());
        ledger.issue(5);
        ledger.consume(5).unwrap();
        ledger.return_to_available(5).unwrap();
        assert!(ledger.available().contains(&5));
        assert!(!ledger.issued().contains(&5));
    }

    #[test]
    fn balance_agreement_excludes_pending_final_receipts() {
        let mut ledger = NumberLedger::new(nym());
        ledger.issue(1);
        ledger.issue(2);
        ledger.consume(1).unwrap();
        ledger.consume(2).unwrap();
        let pending: HashSet<_> = [2].into_iter().collect();
        let claimed: HashSet<_> = [1].into_iter().collect();
        assert!(ledger.matches_balance_agreement(&claimed, &pending));
    }
}
