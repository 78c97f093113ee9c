//! Bridges Cron ticks (C5) into the market matching engine (C7): the
//! `CronHandler` implementation notary-node registers for
//! `CronItemKind::Trade`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use notary_core::error::NotaryError;
use notary_core::types::{DilithiumSignature, MarketId, Timestamp};
use notary_cron::{CronHandler, CronItem, ProcessOutcome};

use crate::market::{Market, MarketEngine};
use crate::offer::Side;
use crate::trade::Trade;

fn decode(item: &CronItem) -> Result<Trade, NotaryError> {
    bincode::deserialize(&item.payload).map_err(|e| NotaryError::Serialization(e.to_string()))
}

fn encode(trade: &Trade) -> Vec<u8> {
    bincode::serialize(trade).expect("trade serialization is infallible")
}

/// One per Notary. Owns the live order books (keyed by `MarketId`) and
/// drives each Trade cron item's matching attempts.
pub struct TradeCronHandler {
    engine: MarketEngine,
    markets: Mutex<HashMap<MarketId, Market>>,
    sign: Arc<dyn Fn(&[u8]) -> DilithiumSignature + Send + Sync>,
}

impl TradeCronHandler {
    pub fn new(engine: MarketEngine, sign: Arc<dyn Fn(&[u8]) -> DilithiumSignature + Send + Sync>) -> Self {
        Self { engine, markets: Mutex::new(HashMap::new()), sign }
    }

    fn market_for(&self, trade: &Trade) -> MarketId {
        trade.offer.market_id.clone()
    }

    /// Markets with at least one order ever activated (§6 `getMarketList`).
    pub fn market_ids(&self) -> Vec<MarketId> {
        self.markets.lock().expect("market lock poisoned").keys().cloned().collect()
    }

    /// Read-only access to one market's books and recent-trades journal
    /// (§6 `getMarketOffers` / `getMarketRecentTrades`).
    pub fn with_market<R>(&self, market_id: &MarketId, f: impl FnOnce(Option<&Market>) -> R) -> R {
        let markets = self.markets.lock().expect("market lock poisoned");
        f(markets.get(market_id))
    }
}

impl CronHandler for TradeCronHandler {
    /// `IssueTrade` activation (§4.5): make sure the order's market exists.
    /// The order itself does not rest yet — its first matching attempt
    /// happens on the next tick, same as any other Trade.
    fn on_activate(&self, item: &CronItem) -> Result<(), NotaryError> {
        let trade = decode(item)?;
        let market_id = self.market_for(&trade);
        let mut markets = self.markets.lock().expect("market lock poisoned");
        markets
            .entry(market_id.clone())
            .or_insert_with(|| Market::new(market_id, trade.asset_unit.clone(), trade.currency_unit.clone(), trade.offer.scale));
        Ok(())
    }

    /// One matching attempt per tick (§4.4/§4.6): evaluate any pending stop
    /// first, then resubmit the order as an aggressor against the current
    /// book. Fully filled orders are removed from Cron; everything else is
    /// kept for the next tick.
    fn process_item(&self, item: &mut CronItem, now: Timestamp) -> Result<ProcessOutcome, NotaryError> {
        let mut trade = decode(item)?;
        let market_id = self.market_for(&trade);

        let mut markets = self.markets.lock().expect("market lock poisoned");
        // The book may still hold a stale resting copy from a previous tick
        // (or none, if this order never matched); drop it before resubmitting
        // so the same opening number is never present twice.
        if let Some(market) = markets.get_mut(&market_id) {
            market.remove_resting(trade.opening_num());
        }

        if let Some(stop) = &trade.stop {
            if !stop.activated {
                let market = markets.get(&market_id).ok_or_else(|| NotaryError::UnknownMarket(market_id.clone()))?;
                let best_opposing = match trade.offer.side {
                    Side::Bid => market.best_ask(),
                    Side::Ask => market.best_bid(),
                };
                let triggered = best_opposing.is_some_and(|p| trade.stop_triggered(p));
                if !triggered {
                    item.payload = encode(&trade);
                    return Ok(ProcessOutcome::Keep);
                }
                trade.activate_stop();
            }
        }

        let market = markets.get_mut(&market_id).ok_or_else(|| NotaryError::UnknownMarket(market_id.clone()))?;
        let sign = self.sign.clone();
        let report = self.engine.submit(market, trade, now, move |bytes| sign(bytes))?;

        item.payload = encode(&report.remaining);
        if report.remaining.offer.available() <= 0 {
            Ok(ProcessOutcome::Remove)
        } else {
            Ok(ProcessOutcome::Keep)
        }
    }

    /// Drop the finalReceipt (§4.3/§4.4): the Trade's own exit path runs
    /// through `onRemovalFromCron` instead, since a Trade carries no
    /// separate settlement step beyond the marketReceipts already issued
    /// per fill.
    fn on_final_receipt(&self, _item: &CronItem, _now: Timestamp) -> Result<(), NotaryError> {
        Ok(())
    }

    /// Remove any still-resting copy of the order once Cron drops it.
    fn on_removal_from_cron(&self, item: &CronItem) -> Result<(), NotaryError> {
        let trade = decode(item)?;
        let market_id = self.market_for(&trade);
        let mut markets = self.markets.lock().expect("market lock poisoned");
        if let Some(market) = markets.get_mut(&market_id) {
            market.remove_resting(trade.opening_num());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offer::Offer;
    use crate::trade::Trade;
    use notary_core::types::{AccountId, NotaryId, NymId, UnitId};
    use notary_cron::CronItemKind;
    use notary_ledger::{Account, StateDb, Unit};
    use tempfile::tempdir;

    fn no_sig(_: &[u8]) -> DilithiumSignature {
        DilithiumSignature(vec![])
    }

    fn setup() -> (TradeCronHandler, UnitId, UnitId, NotaryId) {
        let dir = tempdir().unwrap();
        let db = Arc::new(StateDb::open(dir.path()).unwrap());
        let notary_id = NotaryId::from_bytes([1u8; 32]);
        let asset_unit = UnitId::from_bytes([2u8; 32]);
        let currency_unit = UnitId::from_bytes([3u8; 32]);
        db.put_unit(&Unit { unit_id: asset_unit.clone(), issuer: NymId::from_bytes([9u8; 32]), symbol: "GLD".into(), scale: 10 }).unwrap();
        db.put_unit(&Unit { unit_id: currency_unit.clone(), issuer: NymId::from_bytes([9u8; 32]), symbol: "USD".into(), scale: 1 }).unwrap();
        std::mem::forget(dir);
        let engine = MarketEngine::new(db, notary_id.clone());
        let handler = TradeCronHandler::new(engine, Arc::new(no_sig));
        (handler, asset_unit, currency_unit, notary_id)
    }

    fn fund(handler: &TradeCronHandler, asset: &AccountId, currency: &AccountId, owner: &NymId, notary_id: &NotaryId, asset_unit: &UnitId, currency_unit: &UnitId, asset_balance: i128, currency_balance: i128) {
        let mut a = Account::new(asset.clone(), owner.clone(), notary_id.clone(), asset_unit.clone());
        a.balance = asset_balance;
        handler.engine.db.put_account(&a).unwrap();
        let mut c = Account::new(currency.clone(), owner.clone(), notary_id.clone(), currency_unit.clone());
        c.balance = currency_balance;
        handler.engine.db.put_account(&c).unwrap();
    }

    fn trade(side: Side, price: i128, total: i128, opening: u64, asset_acct: AccountId, currency_acct: AccountId, notary_id: NotaryId, asset_unit: UnitId, currency_unit: UnitId) -> Trade {
        let offer = Offer {
            market_id: notary_core::types::market_id(&asset_unit, &currency_unit, 10),
            side,
            price_limit: price,
            total_assets: total,
            finished_so_far: 0,
            min_increment: 10,
            scale: 10,
            transaction_num: opening,
            valid_from: 0,
            valid_to: 10_000,
            date_added_to_market: 0,
        };
        Trade::issue_trade(offer, asset_acct, currency_acct, notary_id, asset_unit, currency_unit, None, 0, [opening + 100, opening + 200]).unwrap()
    }

    #[test]
    fn resting_ask_fills_against_incoming_bid_across_two_ticks() {
        let (handler, asset_unit, currency_unit, notary_id) = setup();
        let seller = NymId::from_bytes([10u8; 32]);
        let buyer = NymId::from_bytes([11u8; 32]);
        let seller_asset = AccountId::from_bytes([20u8; 32]);
        let seller_currency = AccountId::from_bytes([21u8; 32]);
        let buyer_asset = AccountId::from_bytes([22u8; 32]);
        let buyer_currency = AccountId::from_bytes([23u8; 32]);
        fund(&handler, &seller_asset, &seller_currency, &seller, &notary_id, &asset_unit, &currency_unit, 100, 0);
        fund(&handler, &buyer_asset, &buyer_currency, &buyer, &notary_id, &asset_unit, &currency_unit, 0, 10_000);

        let ask = trade(Side::Ask, 1300, 100, 1, seller_asset.clone(), seller_currency, notary_id.clone(), asset_unit.clone(), currency_unit.clone());
        let mut ask_item = CronItem::new(1, vec![101, 201], 0, 0, 10_000, 0, CronItemKind::Trade, encode(&ask));
        handler.on_activate(&ask_item).unwrap();
        assert!(matches!(handler.process_item(&mut ask_item, 1).unwrap(), ProcessOutcome::Keep));

        let bid = trade(Side::Bid, 1300, 60, 2, buyer_asset.clone(), buyer_currency, notary_id, asset_unit, currency_unit);
        let mut bid_item = CronItem::new(2, vec![102, 202], 0, 0, 10_000, 0, CronItemKind::Trade, encode(&bid));
        handler.on_activate(&bid_item).unwrap();
        let outcome = handler.process_item(&mut bid_item, 2).unwrap();
        assert!(matches!(outcome, ProcessOutcome::Remove));

        let db = &handler.engine.db;
        assert_eq!(db.get_account(&buyer_asset).unwrap().unwrap().balance, 60);
        assert_eq!(db.get_account(&seller_asset).unwrap().unwrap().balance, 40);
    }
}
