//! Offer/Trade state (C6), §4.5.

use serde::{Deserialize, Serialize};

use notary_core::error::NotaryError;
use notary_core::types::{AccountId, Amount, NotaryId, TransactionNumber, UnitId};
use notary_ledger::NumberLedger;

use crate::offer::Offer;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopSign {
    Less,
    Greater,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Stop {
    pub sign: StopSign,
    pub price: Amount,
    pub activated: bool,
}

/// Wraps an Offer; references two closing numbers (asset-acct, currency-acct)
/// at positions 0 and 1 (§3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Trade {
    pub offer: Offer,
    pub asset_acct: AccountId,
    pub currency_acct: AccountId,
    pub notary_id: NotaryId,
    pub asset_unit: UnitId,
    pub currency_unit: UnitId,
    pub stop: Option<Stop>,
    pub trades_already_done: u64,
    pub has_activated: bool,
    /// `[assetClosingNum, currencyClosingNum]`.
    pub closing_nums: [TransactionNumber; 2],
}

impl Trade {
    /// `IssueTrade(offer, stopSign, stopPrice)` (§4.5): validates that the
    /// offer is well-formed and, if a stop is requested, that `stopPrice >
    /// 0`. Matching notary/unit/currency between trade and offer is the
    /// caller's job once both are resolved from the wire message — this
    /// constructor takes already-resolved, already-matched values.
    #[allow(clippy::too_many_arguments)]
    pub fn issue_trade(
        offer: Offer,
        asset_acct: AccountId,
        currency_acct: AccountId,
        notary_id: NotaryId,
        asset_unit: UnitId,
        currency_unit: UnitId,
        stop_sign: Option<StopSign>,
        stop_price: Amount,
        closing_nums: [TransactionNumber; 2],
    ) -> Result<Self, NotaryError> {
        offer.validate()?;

        let stop = match stop_sign {
            Some(sign) => {
                if stop_price <= 0 {
                    return Err(NotaryError::InvalidOffer("stop price must be > 0".into()));
                }
                Some(Stop { sign, price: stop_price, activated: false })
            }
            None => None,
        };

        Ok(Self {
            offer,
            asset_acct,
            currency_acct,
            notary_id,
            asset_unit,
            currency_unit,
            stop,
            trades_already_done: 0,
            has_activated: false,
            closing_nums,
        })
    }

    pub fn opening_num(&self) -> TransactionNumber {
        self.offer.transaction_num
    }

    /// Evaluate the stop condition against the current best opposing price;
    /// returns `true` if the stop triggers and should enter the book now.
    pub fn stop_triggered(&self, best_opposing_price: Amount) -> bool {
        match &self.stop {
            None => true, // not a stop order: always eligible once added
            Some(stop) if stop.activated => true,
            Some(stop) => match stop.sign {
                StopSign::Less => best_opposing_price < stop.price,
                StopSign::Greater => best_opposing_price > stop.price,
            },
        }
    }

    pub fn activate_stop(&mut self) {
        if let Some(stop) = &mut self.stop {
            stop.activated = true;
        }
    }

    /// `CanRemoveItem(nym)` (§4.5): the originator may cancel iff the nym
    /// owns the opening number (in `Issued`) AND both closing numbers are
    /// still `Issued`.
    pub fn can_remove_item(&self, ledger: &NumberLedger) -> bool {
        ledger.verify_issued(self.opening_num())
            && self.closing_nums.iter().all(|n| ledger.verify_issued(*n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offer::Side;
    use notary_core::types::MarketId;

    fn offer() -> Offer {
        Offer {
            market_id: MarketId::from_bytes([1u8; 32]),
            side: Side::Ask,
            price_limit: 1300,
            total_assets: 100,
            finished_so_far: 0,
            min_increment: 50,
            scale: 10,
            transaction_num: 7,
            valid_from: 0,
            valid_to: 1000,
            date_added_to_market: 0,
        }
    }

    fn ids() -> (AccountId, AccountId, NotaryId, UnitId, UnitId) {
        (
            AccountId::from_bytes([2u8; 32]),
            AccountId::from_bytes([3u8; 32]),
            NotaryId::from_bytes([4u8; 32]),
            UnitId::from_bytes([5u8; 32]),
            UnitId::from_bytes([6u8; 32]),
        )
    }

    #[test]
    fn issue_trade_without_stop_succeeds() {
        let (a, c, n, u, cu) = ids();
        let trade = Trade::issue_trade(offer(), a, c, n, u, cu, None, 0, [1, 2]).unwrap();
        assert!(trade.stop.is_none());
    }

    #[test]
    fn issue_trade_with_nonpositive_stop_price_fails() {
        let (a, c, n, u, cu) = ids();
        let err = Trade::issue_trade(offer(), a, c, n, u, cu, Some(StopSign::Less), 0, [1, 2]).unwrap_err();
        assert!(matches!(err, NotaryError::InvalidOffer(_)));
    }

    #[test]
    fn stop_ask_triggers_when_bid_crosses_below() {
        let (a, c, n, u, cu) = ids();
        let trade = Trade::issue_trade(offer(), a, c, n, u, cu, Some(StopSign::Less), 900, [1, 2]).unwrap();
        assert!(!trade.stop_triggered(950));
        assert!(trade.stop_triggered(890));
    }

    #[test]
    fn can_remove_item_requires_all_numbers_issued() {
        let (a, c, n, u, cu) = ids();
        let trade = Trade::issue_trade(offer(), a, c, n, u, cu, None, 0, [1, 2]).unwrap();
        let mut ledger = NumberLedger::new(notary_core::types::NymId::from_bytes([9u8; 32]));
        ledger.issue(7);
        ledger.consume(7).unwrap();
        assert!(!trade.can_remove_item(&ledger));
        ledger.issue(1);
        ledger.consume(1).unwrap();
        ledger.issue(2);
        ledger.consume(2).unwrap();
        assert!(trade.can_remove_item(&ledger));
    }
}
