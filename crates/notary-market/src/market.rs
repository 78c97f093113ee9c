//! Market matching engine (C7), §4.6.

use std::collections::VecDeque;
use std::sync::Arc;

use notary_core::constants::MARKET_RECENT_TRADES_CAP;
use notary_core::error::NotaryError;
use notary_core::types::{Amount, DilithiumSignature, MarketId, NotaryId, Scale, Timestamp, UnitId};
use notary_ledger::{atomic_four_account_move, market_receipt_item, market_rejection_item, Account, StateDb, Transaction};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::offer::Side;
use crate::trade::Trade;

/// `{openingNum, time, price, amountSold}` journal entry (§4.6).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecentTrade {
    pub opening_num: u64,
    pub time: Timestamp,
    pub price: Amount,
    pub amount_sold: Amount,
}

/// `(unit, currency, scale)` keyed order book (§3, §4.6).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Market {
    pub market_id: MarketId,
    pub unit_id: UnitId,
    pub currency_id: UnitId,
    pub scale: Scale,
    /// Highest `priceLimit` first; stable-sorted so equal prices preserve
    /// insertion (time) order.
    bids: Vec<Trade>,
    /// Lowest `priceLimit` first, same time-priority rule.
    asks: Vec<Trade>,
    last_sale: Option<Amount>,
    recent_trades: VecDeque<RecentTrade>,
}

impl Market {
    pub fn new(market_id: MarketId, unit_id: UnitId, currency_id: UnitId, scale: Scale) -> Self {
        Self {
            market_id,
            unit_id,
            currency_id,
            scale,
            bids: Vec::new(),
            asks: Vec::new(),
            last_sale: None,
            recent_trades: VecDeque::new(),
        }
    }

    pub fn best_bid(&self) -> Option<Amount> {
        self.bids.first().map(|t| t.offer.price_limit)
    }

    pub fn best_ask(&self) -> Option<Amount> {
        self.asks.first().map(|t| t.offer.price_limit)
    }

    pub fn last_sale(&self) -> Option<Amount> {
        self.last_sale
    }

    pub fn recent_trades(&self) -> &VecDeque<RecentTrade> {
        &self.recent_trades
    }

    pub fn bids(&self) -> &[Trade] {
        &self.bids
    }

    pub fn asks(&self) -> &[Trade] {
        &self.asks
    }

    /// Book the given side trades against — the opposing side.
    fn opposing_book_mut(&mut self, side: Side) -> &mut Vec<Trade> {
        match side {
            Side::Bid => &mut self.asks,
            Side::Ask => &mut self.bids,
        }
    }

    fn resort(book: &mut [Trade], side: Side) {
        match side {
            Side::Bid => book.sort_by(|a, b| b.offer.price_limit.cmp(&a.offer.price_limit)),
            Side::Ask => book.sort_by(|a, b| a.offer.price_limit.cmp(&b.offer.price_limit)),
        }
    }

    /// Insert a Trade so it rests on its own side's book at the correct
    /// price-time priority position.
    pub fn rest(&mut self, trade: Trade) {
        let side = trade.offer.side;
        let book = match side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        };
        book.push(trade);
        Self::resort(book, side);
    }

    pub fn remove_resting(&mut self, opening_num: u64) -> Option<Trade> {
        if let Some(pos) = self.bids.iter().position(|t| t.opening_num() == opening_num) {
            return Some(self.bids.remove(pos));
        }
        if let Some(pos) = self.asks.iter().position(|t| t.opening_num() == opening_num) {
            return Some(self.asks.remove(pos));
        }
        None
    }

    fn push_journal(&mut self, entry: RecentTrade) {
        self.recent_trades.push_back(entry);
        while self.recent_trades.len() > MARKET_RECENT_TRADES_CAP {
            self.recent_trades.pop_front();
        }
    }
}

fn same_account_guard(a: &Trade, b: &Trade) -> bool {
    a.asset_acct == b.asset_acct
        || a.asset_acct == b.currency_acct
        || a.currency_acct == b.asset_acct
        || a.currency_acct == b.currency_acct
}

/// Round-sizing (§4.6): single-shot if the relevant debit accounts can cover
/// the full feasible amount, else `roundIncrement`-sized rounds. Execution
/// price is always the resting order's `priceLimit` (the price rule).
#[allow(clippy::too_many_arguments)]
fn compute_execution(
    seller_avail: Amount,
    buyer_avail: Amount,
    seller_min_increment: Amount,
    buyer_min_increment: Amount,
    resting_price_limit: Amount,
    scale: Scale,
    seller_asset_balance: Amount,
    buyer_currency_balance: Amount,
) -> Option<(Amount, Amount)> {
    let scale = scale as Amount;
    let round_increment = seller_min_increment.max(buyer_min_increment);
    let round_price = (round_increment / scale) * resting_price_limit;

    let max_feasible_raw = seller_avail.min(buyer_avail);
    let max_feasible = max_feasible_raw - (max_feasible_raw % scale);
    if max_feasible <= 0 {
        return None;
    }
    let max_feasible_price = (max_feasible / scale) * resting_price_limit;

    if seller_asset_balance >= max_feasible && buyer_currency_balance >= max_feasible_price {
        Some((max_feasible, max_feasible_price))
    } else if seller_asset_balance >= round_increment && buyer_currency_balance >= round_price {
        Some((round_increment, round_price))
    } else {
        None
    }
}

/// Outcome of submitting an aggressor offer to the market.
pub struct MatchReport {
    pub fills: u32,
    /// Whether the (remaining) aggressor now rests on the book.
    pub rests: bool,
    /// The aggressor's post-match state (fills applied), whether or not it
    /// ended up resting — callers (e.g. the Cron bridge) persist this back
    /// into their own record of the order.
    pub remaining: Trade,
}

enum RoundOutcome {
    Filled { amount: Amount, price: Amount },
    Skipped,
    AggressorDisqualified,
    RestingDisqualified,
}

/// Ties the in-memory [`Market`] book to account balances and receipts via
/// [`notary_ledger`]. One per Notary per tick invocation.
pub struct MarketEngine {
    pub db: Arc<StateDb>,
    pub notary_id: NotaryId,
}

impl MarketEngine {
    pub fn new(db: Arc<StateDb>, notary_id: NotaryId) -> Self {
        Self { db, notary_id }
    }

    fn account(&self, trade: &Trade, asset: bool) -> Result<Account, NotaryError> {
        let id = if asset { &trade.asset_acct } else { &trade.currency_acct };
        self.db.get_account(id)?.ok_or_else(|| NotaryError::UnknownAccount(id.clone()))
    }

    fn drop_rejection(
        &self,
        trade: &Trade,
        now: Timestamp,
        sign: &impl Fn(&[u8]) -> DilithiumSignature,
    ) -> Result<(), NotaryError> {
        let num = self.db.next_transaction_number()?;
        let item = market_rejection_item("insufficient funds for match");
        let txn = Transaction::new_signed(num, trade.opening_num(), trade.asset_acct.clone(), self.notary_id.clone(), vec![item], now, sign);
        let mut inbox = self.db.get_inbox(&trade.asset_acct)?;
        inbox.append(txn);
        self.db.put_inbox(&trade.asset_acct, &inbox)?;
        Ok(())
    }

    fn append_market_receipt(
        &self,
        trade: &Trade,
        txn_num: u64,
        asset_delta: Amount,
        currency_delta: Amount,
        now: Timestamp,
        sign: &impl Fn(&[u8]) -> DilithiumSignature,
    ) -> Result<(), NotaryError> {
        for (account_id, delta) in [(&trade.asset_acct, asset_delta), (&trade.currency_acct, currency_delta)] {
            let item = market_receipt_item(delta, vec![]);
            let txn = Transaction::new_signed(txn_num, trade.opening_num(), account_id.clone(), self.notary_id.clone(), vec![item], now, sign);
            let mut inbox = self.db.get_inbox(account_id)?;
            inbox.append(txn);
            self.db.put_inbox(account_id, &inbox)?;
        }
        Ok(())
    }

    /// Execute (or reject) one round between `aggressor` and `resting`.
    /// Exactly one of the two is the seller (Ask side): the asset debit leg.
    fn try_round(
        &self,
        aggressor: &mut Trade,
        resting: &mut Trade,
        now: Timestamp,
        sign: &impl Fn(&[u8]) -> DilithiumSignature,
    ) -> Result<RoundOutcome, NotaryError> {
        if same_account_guard(aggressor, resting) {
            return Ok(RoundOutcome::Skipped);
        }

        let aggressor_opening_num = aggressor.opening_num();
        let (seller, buyer): (&mut Trade, &mut Trade) = match aggressor.offer.side {
            Side::Ask => (aggressor, resting),
            Side::Bid => (resting, aggressor),
        };

        let seller_asset = self.account(seller, true)?;
        let buyer_currency = self.account(buyer, false)?;

        let round_increment = seller.offer.min_increment.max(buyer.offer.min_increment);

        let exec = compute_execution(
            seller.offer.available(),
            buyer.offer.available(),
            seller.offer.min_increment,
            buyer.offer.min_increment,
            resting.offer.price_limit,
            seller.offer.scale,
            seller_asset.balance,
            buyer_currency.balance,
        );

        let Some((filled, price)) = exec else {
            // §4.6/§7: the short leg is disqualified from this tick. If both
            // legs are short, each gets its own rejection marketReceipt on a
            // later round — a party can end up with two rejection receipts
            // in a single tick (§9 open question, preserved as observed
            // behavior, not "fixed").
            let (short, short_opening_num) = if seller_asset.balance < round_increment {
                (&*seller, seller.opening_num())
            } else {
                (&*buyer, buyer.opening_num())
            };
            self.drop_rejection(short, now, sign)?;
            return Ok(if short_opening_num == aggressor_opening_num {
                RoundOutcome::AggressorDisqualified
            } else {
                RoundOutcome::RestingDisqualified
            });
        };

        let buyer_asset = self.account(buyer, true)?;
        let seller_currency = self.account(seller, false)?;

        let staged = atomic_four_account_move(seller_asset, buyer_asset, filled, buyer_currency, seller_currency, price)?;
        for acct in staged.into_accounts() {
            self.db.put_account(&acct)?;
        }

        seller.offer.finished_so_far += filled;
        buyer.offer.finished_so_far += filled;
        seller.trades_already_done += 1;
        buyer.trades_already_done += 1;

        let num = self.db.next_transaction_number()?;
        self.append_market_receipt(seller, num, -filled, price, now, sign)?;
        self.append_market_receipt(buyer, num, filled, -price, now, sign)?;

        info!(%filled, %price, "market fill");
        Ok(RoundOutcome::Filled { amount: filled, price })
    }

    /// Submit `aggressor` against `market`'s opposing book (§4.6). Market
    /// orders (`priceLimit == 0`) never rest; limit orders that still have
    /// availability after exhausting the book do.
    pub fn submit(
        &self,
        market: &mut Market,
        mut aggressor: Trade,
        now: Timestamp,
        sign: impl Fn(&[u8]) -> DilithiumSignature,
    ) -> Result<MatchReport, NotaryError> {
        let side = aggressor.offer.side;
        let mut fills = 0u32;
        let mut disqualified = false;

        loop {
            if aggressor.offer.available() <= 0 {
                break;
            }
            let resting_opening_num = {
                let book = market.opposing_book_mut(side);
                let Some(resting) = book.first() else { break };
                resting.opening_num()
            };
            let mut resting = market.remove_resting(resting_opening_num).expect("just peeked");
            if resting.offer.available() <= 0 {
                continue; // stale entry, drop and keep scanning
            }

            match self.try_round(&mut aggressor, &mut resting, now, &sign)? {
                RoundOutcome::Filled { amount, price } => {
                    fills += 1;
                    market.last_sale = Some(price);
                    market.push_journal(RecentTrade { opening_num: aggressor.opening_num(), time: now, price, amount_sold: amount });
                    if resting.offer.available() > 0 {
                        market.rest(resting);
                    }
                }
                RoundOutcome::Skipped => {
                    market.rest(resting); // both stay on the book (same-account guard)
                    break;
                }
                RoundOutcome::AggressorDisqualified => {
                    if resting.offer.available() > 0 {
                        market.rest(resting);
                    }
                    disqualified = true;
                    break;
                }
                RoundOutcome::RestingDisqualified => {
                    // resting dropped: not re-added to the book
                }
            }
        }

        let rests = !disqualified && aggressor.offer.available() > 0 && !aggressor.offer.is_market_order();
        let remaining = aggressor.clone();
        if rests {
            market.rest(aggressor);
        }
        Ok(MatchReport { fills, rests, remaining })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offer::{Offer, Side};
    use crate::trade::Trade;
    use notary_core::types::{AccountId, NymId, UnitId};
    use notary_ledger::Unit;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn no_sig(_: &[u8]) -> DilithiumSignature {
        DilithiumSignature(vec![])
    }

    struct Fixture {
        engine: MarketEngine,
        market: Market,
        asset_unit: UnitId,
        currency_unit: UnitId,
        notary_id: NotaryId,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        let db = Arc::new(StateDb::open(dir.path()).unwrap());
        let notary_id = NotaryId::from_bytes([1u8; 32]);
        let asset_unit = UnitId::from_bytes([2u8; 32]);
        let currency_unit = UnitId::from_bytes([3u8; 32]);
        db.put_unit(&Unit { unit_id: asset_unit.clone(), issuer: NymId::from_bytes([9u8; 32]), symbol: "GOLD".into(), scale: 10 }).unwrap();
        db.put_unit(&Unit { unit_id: currency_unit.clone(), issuer: NymId::from_bytes([9u8; 32]), symbol: "USD".into(), scale: 1 }).unwrap();
        let market_id = notary_core::types::market_id(&asset_unit, &currency_unit, 10);
        let market = Market::new(market_id, asset_unit.clone(), currency_unit.clone(), 10);
        let engine = MarketEngine::new(db, notary_id.clone());
        Fixture { engine, market, asset_unit, currency_unit, notary_id, _dir: dir }
    }

    fn account(id: u8, owner: u8, fx: &Fixture, unit: &UnitId, balance: Amount) -> AccountId {
        let account_id = AccountId::from_bytes([id; 32]);
        let mut acct = Account::new(account_id.clone(), NymId::from_bytes([owner; 32]), fx.notary_id.clone(), unit.clone());
        acct.balance = balance;
        fx.engine.db.put_account(&acct).unwrap();
        account_id
    }

    #[allow(clippy::too_many_arguments)]
    fn offer(side: Side, price: Amount, total: Amount, min_increment: Amount, num: u64, fx: &Fixture) -> Offer {
        Offer {
            market_id: fx.market.market_id.clone(),
            side,
            price_limit: price,
            total_assets: total,
            finished_so_far: 0,
            min_increment,
            scale: 10,
            transaction_num: num,
            valid_from: 0,
            valid_to: 10_000,
            date_added_to_market: 0,
        }
    }

    /// Scenario 1 (§8): resting ask 1300/min50/avail100 vs aggressor bid
    /// 1400/min50/avail50 — one execution, assetMoved=50, price=6500.
    #[test]
    fn single_bid_vs_ask_sufficient_funds() {
        let mut fx = fixture();
        let seller_asset = account(10, 100, &fx, &fx.asset_unit.clone(), 100);
        let seller_currency = account(11, 100, &fx, &fx.currency_unit.clone(), 0);
        let buyer_asset = account(12, 101, &fx, &fx.asset_unit.clone(), 0);
        let buyer_currency = account(13, 101, &fx, &fx.currency_unit.clone(), 10_000);

        let ask_offer = offer(Side::Ask, 1300, 100, 50, 1, &fx);
        let ask = Trade::issue_trade(ask_offer, seller_asset.clone(), seller_currency.clone(), fx.notary_id.clone(), fx.asset_unit.clone(), fx.currency_unit.clone(), None, 0, [101, 102]).unwrap();
        fx.market.rest(ask);

        let bid_offer = offer(Side::Bid, 1400, 50, 50, 2, &fx);
        let bid = Trade::issue_trade(bid_offer, buyer_asset.clone(), buyer_currency.clone(), fx.notary_id.clone(), fx.asset_unit.clone(), fx.currency_unit.clone(), None, 0, [201, 202]).unwrap();

        let report = fx.engine.submit(&mut fx.market, bid, 1, no_sig).unwrap();
        assert_eq!(report.fills, 1);
        assert!(!report.rests);
        assert_eq!(report.remaining.offer.finished_so_far, 50);

        assert_eq!(fx.engine.db.get_account(&seller_asset).unwrap().unwrap().balance, 50);
        assert_eq!(fx.engine.db.get_account(&seller_currency).unwrap().unwrap().balance, 6500);
        assert_eq!(fx.engine.db.get_account(&buyer_asset).unwrap().unwrap().balance, 50);
        assert_eq!(fx.engine.db.get_account(&buyer_currency).unwrap().unwrap().balance, 3500);

        let remaining_ask = fx.market.asks().iter().find(|t| t.opening_num() == 1).unwrap();
        assert_eq!(remaining_ask.offer.finished_so_far, 50);
    }

    /// Scenario 2 (§8): market order against an empty book never rests and
    /// produces zero receipts.
    #[test]
    fn market_order_against_empty_book_never_rests() {
        let mut fx = fixture();
        let buyer_asset = account(20, 102, &fx, &fx.asset_unit.clone(), 0);
        let buyer_currency = account(21, 102, &fx, &fx.currency_unit.clone(), 10_000);

        let market_order = offer(Side::Bid, 0, 10, 10, 3, &fx);
        let aggressor = Trade::issue_trade(market_order, buyer_asset.clone(), buyer_currency.clone(), fx.notary_id.clone(), fx.asset_unit.clone(), fx.currency_unit.clone(), None, 0, [301, 302]).unwrap();

        let report = fx.engine.submit(&mut fx.market, aggressor, 1, no_sig).unwrap();
        assert_eq!(report.fills, 0);
        assert!(!report.rests);
        assert!(fx.market.bids().is_empty());
        assert_eq!(fx.engine.db.get_inbox(&buyer_asset).unwrap().entries.len(), 0);
    }

    /// Same-account guard (§4.6): a pair sharing an account never matches,
    /// and both stay on the book.
    #[test]
    fn same_account_guard_skips_match() {
        let mut fx = fixture();
        let asset_acct = account(30, 103, &fx, &fx.asset_unit.clone(), 100);
        let currency_acct = account(31, 103, &fx, &fx.currency_unit.clone(), 10_000);

        let ask_offer = offer(Side::Ask, 1300, 100, 50, 4, &fx);
        let ask = Trade::issue_trade(ask_offer, asset_acct.clone(), currency_acct.clone(), fx.notary_id.clone(), fx.asset_unit.clone(), fx.currency_unit.clone(), None, 0, [401, 402]).unwrap();
        fx.market.rest(ask);

        let bid_offer = offer(Side::Bid, 1400, 50, 50, 5, &fx);
        let bid = Trade::issue_trade(bid_offer, asset_acct.clone(), currency_acct, fx.notary_id.clone(), fx.asset_unit.clone(), fx.currency_unit.clone(), None, 0, [501, 502]).unwrap();

        let report = fx.engine.submit(&mut fx.market, bid, 1, no_sig).unwrap();
        assert_eq!(report.fills, 0);
        assert!(report.rests);
        assert_eq!(fx.market.asks().len(), 1);
        assert_eq!(fx.market.bids().len(), 1);
    }
}
