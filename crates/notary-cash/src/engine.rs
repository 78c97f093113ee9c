//! Bridges the purse/token state machine (C8) to account balances (C4):
//! `withdrawVoucher`/`depositCheque`'s cash counterparts, `WithdrawCash` and
//! `DepositCash` (§6). Grounded on the debit-then-mint /
//! verify-then-credit shape of `notary_ledger::LedgerEngine`'s account
//! operations, reusing its `StateDb` rather than opening a second one.

use std::sync::Arc;

use notary_core::error::NotaryError;
use notary_core::types::{AccountId, Amount};
use notary_ledger::StateDb;

use crate::mint::MintBackend;
use crate::purse::{Purse, PurseType};
use crate::spend::{SpendLedger, SpendResult};
use crate::token::{Token, TokenState};

pub struct CashEngine {
    db: Arc<StateDb>,
    spent: SpendLedger,
}

impl CashEngine {
    pub fn new(db: Arc<StateDb>, spent: SpendLedger) -> Self {
        Self { db, spent }
    }

    /// `WithdrawCash` (§4.8/§6): debit `account` by the sum of
    /// `denominations`, then mint and fully process a purse of that many
    /// blinded tokens. Fails `InsufficientFunds` before any token is minted.
    pub fn withdraw(
        &self,
        account_id: &AccountId,
        mint: &dyn MintBackend,
        series: u64,
        denominations: &[Amount],
        owner_unlock_key: &[u8],
    ) -> Result<Purse, NotaryError> {
        let mut account = self
            .db
            .get_account(account_id)?
            .ok_or_else(|| NotaryError::UnknownAccount(account_id.clone()))?;
        let total: Amount = denominations.iter().sum();
        if account.balance < total {
            return Err(NotaryError::InsufficientFunds { need: total, have: account.balance });
        }

        let mut purse = Purse::new_request(account.notary_id.clone(), account.unit_id.clone(), account.owner.clone(), owner_unlock_key);
        for &denomination in denominations {
            purse.push(Token::generate_request(
                mint,
                account.notary_id.clone(),
                account.unit_id.clone(),
                series,
                denomination,
            )?)?;
        }
        purse.mint_sign_all(mint)?;
        purse.process(mint)?;

        account.balance -= total;
        self.db.put_account(&account)?;
        Ok(purse)
    }

    /// `DepositCash` (§4.8/§6): every token in a Normal purse must be
    /// `Ready` and must `checkAndMarkTokenSpent` as `FreshlyMarked`; on any
    /// `AlreadySpent`, fail `DoubleSpend` without crediting the account (the
    /// notary's double-spend set is still updated for the tokens already
    /// checked — matching §4.7's "atomic with respect to concurrent deposit
    /// attempts" per token, not across the whole purse).
    pub fn deposit(&self, account_id: &AccountId, mint: &dyn MintBackend, mut purse: Purse) -> Result<Amount, NotaryError> {
        if purse.purse_type() != PurseType::Normal {
            return Err(NotaryError::InvalidState("deposit requires a Normal purse".into()));
        }
        let mut account = self
            .db
            .get_account(account_id)?
            .ok_or_else(|| NotaryError::UnknownAccount(account_id.clone()))?;

        let mut credited = 0i128;
        let mut double_spent = false;
        for token in purse.tokens_mut() {
            if token.state != TokenState::Ready {
                continue;
            }
            if !mint.verify(token.series, token.denomination, &spendable_of(token)?)? {
                return Err(NotaryError::BadCrypto("token failed mint verification at deposit".into()));
            }
            let id = token.spendable_id().expect("Ready token carries a spendable id");
            let result = self.spent.check_and_mark_token_spent(&account.notary_id, &account.unit_id, token.series, &id)?;
            match result {
                SpendResult::FreshlyMarked => {
                    credited += token.denomination;
                    token.mark_spent()?;
                }
                SpendResult::AlreadySpent => double_spent = true,
            }
        }

        if double_spent {
            return Err(NotaryError::DoubleSpend);
        }

        account.balance += credited;
        self.db.put_account(&account)?;
        Ok(credited)
    }
}

fn spendable_of(token: &Token) -> Result<crate::token::Spendable, NotaryError> {
    token
        .spendable()
        .cloned()
        .ok_or_else(|| NotaryError::InvalidState("Ready token missing spendable data".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mint::DilithiumMint;
    use notary_core::types::{NotaryId, NymId, UnitId};
    use notary_ledger::Account;
    use tempfile::tempdir;

    fn setup() -> (CashEngine, DilithiumMint, AccountId) {
        let dir = tempdir().unwrap();
        let db = Arc::new(StateDb::open(dir.path()).unwrap());
        let spent_db = sled::Config::new().temporary(true).open().unwrap();
        let spent = SpendLedger::open(&spent_db, "").unwrap();

        let notary_id = NotaryId::from_bytes([1u8; 32]);
        let unit_id = UnitId::from_bytes([2u8; 32]);
        let owner = NymId::from_bytes([5u8; 32]);
        let account_id = AccountId::from_bytes([9u8; 32]);
        let mut account = Account::new(account_id.clone(), owner, notary_id.clone(), unit_id.clone());
        account.balance = 100;
        db.put_account(&account).unwrap();

        let mut mint = DilithiumMint::new(notary_id, unit_id);
        mint.open_series(1, 0, 100_000);
        mint.ensure_denomination_key(1, 10);
        mint.ensure_denomination_key(1, 20);

        (CashEngine::new(db, spent), mint, account_id)
    }

    #[test]
    fn withdraw_then_deposit_round_trip_and_rejects_double_spend() {
        let (engine, mint, account_id) = setup();
        let purse = engine.withdraw(&account_id, &mint, 1, &[10, 20], b"owner-key").unwrap();
        assert_eq!(engine.db.get_account(&account_id).unwrap().unwrap().balance, 70);

        let credited = engine.deposit(&account_id, &mint, purse).unwrap();
        assert_eq!(credited, 30);
        assert_eq!(engine.db.get_account(&account_id).unwrap().unwrap().balance, 100);
    }

    #[test]
    fn redeposit_of_same_tokens_fails_double_spend() {
        let (engine, mint, account_id) = setup();
        let purse1 = engine.withdraw(&account_id, &mint, 1, &[10], b"owner-key").unwrap();
        let purse2 = engine.withdraw(&account_id, &mint, 1, &[10], b"owner-key").unwrap();

        engine.deposit(&account_id, &mint, purse1).unwrap();
        assert!(matches!(engine.deposit(&account_id, &mint, purse2), Err(NotaryError::DoubleSpend)));
    }

    #[test]
    fn withdraw_insufficient_funds() {
        let (engine, mint, account_id) = setup();
        assert!(matches!(
            engine.withdraw(&account_id, &mint, 1, &[1_000], b"owner-key"),
            Err(NotaryError::InsufficientFunds { .. })
        ));
    }
}
