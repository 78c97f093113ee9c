use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use jsonrpsee::core::{async_trait, RpcResult};
use jsonrpsee::server::{Server, ServerHandle};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use notary_cash::{CashEngine, DilithiumMint, MintBackend, Purse};
use notary_core::error::NotaryError;
use notary_core::types::{Amount, DilithiumPublicKey, UnitId};
use notary_cron::{Cron, CronItem, CronItemKind};
use notary_crypto::KeyPair;
use notary_ledger::{Account, Item, ItemKind, ItemStatus, LedgerEngine, Nym, Transaction};
use notary_market::{Offer, Side, Trade, TradeCronHandler};

use crate::api::NotaryApiServer;
use crate::types::{
    parse_account_id, parse_market_id, parse_nym_id, parse_unit_id, to_rpc_error, RpcAccount,
    RpcOfferRequest, RpcOfferSummary, RpcRecentTrade, RpcTransaction,
};

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_secs() as i64
}

fn parse_side(s: &str) -> Result<Side, NotaryError> {
    match s {
        "Bid" | "bid" => Ok(Side::Bid),
        "Ask" | "ask" => Ok(Side::Ask),
        other => Err(NotaryError::InvalidOffer(format!("unknown side {other}"))),
    }
}

fn item_kind_str(kind: ItemKind) -> &'static str {
    match kind {
        ItemKind::MarketReceipt => "MarketReceipt",
        ItemKind::FinalReceipt => "FinalReceipt",
        ItemKind::TransferReceipt => "TransferReceipt",
        ItemKind::DepositReceipt => "DepositReceipt",
        ItemKind::WithdrawalReceipt => "WithdrawalReceipt",
        ItemKind::ChequeReceipt => "ChequeReceipt",
    }
}

fn item_status_str(status: ItemStatus) -> &'static str {
    match status {
        ItemStatus::Request => "Request",
        ItemStatus::Ack => "Ack",
        ItemStatus::Reject => "Reject",
    }
}

fn item_to_rpc(item: &Item) -> crate::types::RpcItem {
    crate::types::RpcItem {
        kind: item_kind_str(item.kind).to_string(),
        status: item_status_str(item.status).to_string(),
        amount: item.amount,
        note: item.note.clone(),
    }
}

fn transaction_to_rpc(txn: &Transaction) -> RpcTransaction {
    RpcTransaction {
        transaction_num: txn.transaction_num,
        in_reference_to: txn.in_reference_to,
        account_id: txn.account_id.to_hex(),
        notary_id: txn.notary_id.to_hex(),
        timestamp: txn.timestamp,
        items: txn.items.iter().map(item_to_rpc).collect(),
        notary_signature_hex: hex::encode(&txn.notary_signature.0),
    }
}

fn account_to_rpc(account: &Account) -> RpcAccount {
    RpcAccount {
        account_id: account.account_id.to_hex(),
        owner: account.owner.to_hex(),
        notary_id: account.notary_id.to_hex(),
        unit_id: account.unit_id.to_hex(),
        balance: account.balance,
    }
}

/// Debit or credit `account_id` by `delta`, append a signed receipt Item to
/// its inbox, and persist both (§4.3). A negative `delta` is a withdrawal
/// leg; `notarize_deposit`/`notarize_withdrawal`/`withdraw_voucher`/
/// `deposit_cheque` all reduce to this one move.
fn apply_receipt(
    ledger: &LedgerEngine,
    keypair: &KeyPair,
    account_id: &notary_core::types::AccountId,
    delta: Amount,
    kind: ItemKind,
    note: &str,
) -> Result<Transaction, NotaryError> {
    let mut account = ledger
        .db
        .get_account(account_id)?
        .ok_or_else(|| NotaryError::UnknownAccount(account_id.clone()))?;
    if delta < 0 && account.balance < -delta {
        return Err(NotaryError::InsufficientFunds { need: -delta, have: account.balance });
    }
    account.balance += delta;

    let txn_num = ledger.db.next_transaction_number()?;
    let item = Item { kind, status: ItemStatus::Ack, amount: delta, note: note.into(), attachment: vec![] };
    let txn = Transaction::new_signed(
        txn_num,
        0,
        account_id.clone(),
        ledger.notary_id.clone(),
        vec![item],
        now_unix(),
        |bytes| keypair.sign(bytes),
    );

    let mut inbox = ledger.db.get_inbox(account_id)?;
    inbox.append(txn.clone());
    ledger.db.put_account(&account)?;
    ledger.db.put_inbox(account_id, &inbox)?;
    Ok(txn)
}

/// Delegates Cron's `CronHandler` calls to a shared `TradeCronHandler` so the
/// handler can also be queried directly by the RPC layer for market reads
/// (`getMarketList`/`getMarketOffers`/`getMarketRecentTrades`).
struct TradeHandlerRef(Arc<TradeCronHandler>);

impl notary_cron::CronHandler for TradeHandlerRef {
    fn on_activate(&self, item: &CronItem) -> Result<(), NotaryError> {
        self.0.on_activate(item)
    }
    fn process_item(&self, item: &mut CronItem, now: notary_core::types::Timestamp) -> Result<notary_cron::ProcessOutcome, NotaryError> {
        self.0.process_item(item, now)
    }
    fn on_final_receipt(&self, item: &CronItem, now: notary_core::types::Timestamp) -> Result<(), NotaryError> {
        self.0.on_final_receipt(item, now)
    }
    fn on_removal_from_cron(&self, item: &CronItem) -> Result<(), NotaryError> {
        self.0.on_removal_from_cron(item)
    }
}

/// The cash series this notary mints into. A single ever-open series keeps
/// `withdrawCash`/`depositCash` simple; rotating series is a mint-operator
/// concern this build doesn't expose over RPC.
const CASH_SERIES: u64 = 1;

/// Per-unit `DilithiumMint` bank plus the `CashEngine` that bridges tokens to
/// account balances. Mints are created lazily the first time a unit is
/// withdrawn against; denomination keys are created lazily per withdrawal.
pub struct CashBook {
    engine: CashEngine,
    mints: HashMap<UnitId, DilithiumMint>,
}

impl CashBook {
    pub fn new(engine: CashEngine) -> Self {
        Self { engine, mints: HashMap::new() }
    }
}

/// Free function (not a `CashBook` method) so callers can hold a mint
/// borrowed from `mints` and a separate borrow of `engine` at the same time.
fn mint_for<'a>(
    mints: &'a mut HashMap<UnitId, DilithiumMint>,
    notary_id: &notary_core::types::NotaryId,
    unit_id: &UnitId,
) -> &'a mut DilithiumMint {
    mints.entry(unit_id.clone()).or_insert_with(|| {
        let mut mint = DilithiumMint::new(notary_id.clone(), unit_id.clone());
        mint.open_series(CASH_SERIES, 0, i64::MAX);
        mint
    })
}

/// Shared state behind the JSON-RPC surface: the ledger, the per-notary Cron
/// (ticked independently by notary-node's scheduler), the Trade handler
/// (read directly for market queries), the cash mint book, and this notary's
/// signing key.
pub struct RpcServerState {
    pub ledger: LedgerEngine,
    pub cron: Arc<Mutex<Cron>>,
    pub trades: Arc<TradeCronHandler>,
    pub cash: Mutex<CashBook>,
    pub keypair: Arc<KeyPair>,
}

impl RpcServerState {
    /// Wire the Trade handler into `cron` under `CronItemKind::Trade`. Call
    /// once during startup, before the scheduler's first tick.
    pub fn register_trade_handler(&self) {
        self.cron
            .lock()
            .expect("cron lock poisoned")
            .register_handler(CronItemKind::Trade, Box::new(TradeHandlerRef(self.trades.clone())));
    }
}

pub struct RpcServer {
    state: Arc<RpcServerState>,
}

impl RpcServer {
    pub fn new(state: Arc<RpcServerState>) -> Self {
        Self { state }
    }

    /// Start the JSON-RPC server on `addr` with permissive CORS headers.
    pub async fn start(self, addr: SocketAddr) -> anyhow::Result<ServerHandle> {
        let cors = CorsLayer::new().allow_methods(Any).allow_origin(Any).allow_headers(Any);

        let server = Server::builder()
            .set_http_middleware(tower::ServiceBuilder::new().layer(cors))
            .build(addr)
            .await?;

        let module = self.into_rpc();
        let handle = server.start(module);
        info!(%addr, "notary RPC server started");
        Ok(handle)
    }
}

#[async_trait]
impl NotaryApiServer for RpcServer {
    async fn register_nym(&self, nym_id: String, public_key_hex: String) -> RpcResult<u64> {
        let id = parse_nym_id(&nym_id)?;
        let pk_bytes = hex::decode(&public_key_hex)
            .map_err(|e| to_rpc_error(NotaryError::Other(format!("bad publicKeyHex: {e}"))))?;
        self.state
            .ledger
            .register_nym(Nym::new(id.clone(), DilithiumPublicKey(pk_bytes)))
            .map_err(to_rpc_error)?;
        self.state.ledger.next_request_number(&id).map_err(to_rpc_error)
    }

    async fn unregister_nym(&self, nym_id: String) -> RpcResult<()> {
        let id = parse_nym_id(&nym_id)?;
        self.state.ledger.unregister_nym(&id).map_err(to_rpc_error)
    }

    async fn get_request_number(&self, nym_id: String) -> RpcResult<u64> {
        let id = parse_nym_id(&nym_id)?;
        self.state.ledger.next_request_number(&id).map_err(to_rpc_error)
    }

    async fn get_transaction_numbers(&self, nym_id: String, count: u32) -> RpcResult<Vec<u64>> {
        let id = parse_nym_id(&nym_id)?;
        let mut numbers = Vec::with_capacity(count as usize);
        for _ in 0..count {
            numbers.push(self.state.ledger.db.next_transaction_number().map_err(to_rpc_error)?);
        }
        self.state.ledger.issue_numbers(&id, &numbers).map_err(to_rpc_error)?;
        Ok(numbers)
    }

    async fn get_nymbox(&self, nym_id: String) -> RpcResult<Vec<RpcTransaction>> {
        let id = parse_nym_id(&nym_id)?;
        let nymbox = self.state.ledger.nymbox(&id).map_err(to_rpc_error)?;
        Ok(nymbox.entries.iter().map(transaction_to_rpc).collect())
    }

    async fn process_nymbox(&self, nym_id: String, transaction_num: u64) -> RpcResult<()> {
        let id = parse_nym_id(&nym_id)?;
        self.state.ledger.process_nymbox_entry(&id, transaction_num).map_err(to_rpc_error)
    }

    async fn register_account(&self, nym_id: String, unit_id: String) -> RpcResult<String> {
        let nym = parse_nym_id(&nym_id)?;
        let unit = parse_unit_id(&unit_id)?;
        let nonce = self.state.ledger.db.next_transaction_number().map_err(to_rpc_error)?;

        #[derive(serde::Serialize)]
        struct Canonical<'a> {
            nym: &'a notary_core::types::NymId,
            unit: &'a notary_core::types::UnitId,
            nonce: u64,
        }
        let bytes = bincode::serialize(&Canonical { nym: &nym, unit: &unit, nonce })
            .expect("account id canonical serialization is infallible");
        let account_id = notary_core::types::AccountId::of(&bytes);

        let account = Account::new(account_id.clone(), nym, self.state.ledger.notary_id.clone(), unit);
        self.state.ledger.register_account(account).map_err(to_rpc_error)?;
        Ok(account_id.to_hex())
    }

    async fn delete_asset_account(&self, account_id: String) -> RpcResult<()> {
        let id = parse_account_id(&account_id)?;
        self.state.ledger.delete_asset_account(&id).map_err(to_rpc_error)
    }

    async fn get_account_data(&self, account_id: String) -> RpcResult<(RpcAccount, Vec<RpcTransaction>)> {
        let id = parse_account_id(&account_id)?;
        let (account, inbox) = self.state.ledger.get_account_data(&id).map_err(to_rpc_error)?;
        Ok((account_to_rpc(&account), inbox.entries.iter().map(transaction_to_rpc).collect()))
    }

    async fn notarize_transfer(
        &self,
        nym_id: String,
        authorizing_num: u64,
        from: String,
        to: String,
        amount: i128,
    ) -> RpcResult<()> {
        let nym = parse_nym_id(&nym_id)?;
        let from_id = parse_account_id(&from)?;
        let to_id = parse_account_id(&to)?;
        let keypair = self.state.keypair.clone();
        self.state
            .ledger
            .notarize_transfer(&nym, authorizing_num, &from_id, &to_id, amount, now_unix(), |bytes| keypair.sign(bytes))
            .map_err(to_rpc_error)
    }

    async fn notarize_deposit(&self, account_id: String, amount: i128) -> RpcResult<()> {
        let id = parse_account_id(&account_id)?;
        apply_receipt(&self.state.ledger, &self.state.keypair, &id, amount, ItemKind::DepositReceipt, "deposit")
            .map(|_| ())
            .map_err(to_rpc_error)
    }

    async fn notarize_withdrawal(&self, account_id: String, amount: i128) -> RpcResult<()> {
        let id = parse_account_id(&account_id)?;
        apply_receipt(&self.state.ledger, &self.state.keypair, &id, -amount, ItemKind::WithdrawalReceipt, "withdrawal")
            .map(|_| ())
            .map_err(to_rpc_error)
    }

    async fn process_inbox(&self, nym_id: String, account_id: String, transaction_num: u64) -> RpcResult<()> {
        let nym = parse_nym_id(&nym_id)?;
        let account = parse_account_id(&account_id)?;
        self.state.ledger.process_inbox_entry(&nym, &account, transaction_num).map_err(to_rpc_error)
    }

    async fn issue_market_offer(&self, nym_id: String, authorizing_num: u64, offer: RpcOfferRequest) -> RpcResult<u64> {
        let nym = parse_nym_id(&nym_id)?;
        let unit_id = parse_unit_id(&offer.unit_id)?;
        let currency_id = parse_unit_id(&offer.currency_id)?;
        let side = parse_side(&offer.side).map_err(to_rpc_error)?;
        let asset_account = parse_account_id(&offer.asset_account)?;
        let currency_account = parse_account_id(&offer.currency_account)?;
        let stop_sign = offer
            .stop_sign
            .as_deref()
            .map(|s| match s {
                "Less" | "less" => Ok(notary_market::StopSign::Less),
                "Greater" | "greater" => Ok(notary_market::StopSign::Greater),
                other => Err(NotaryError::InvalidOffer(format!("unknown stopSign {other}"))),
            })
            .transpose()
            .map_err(to_rpc_error)?;

        let market_id = notary_core::types::market_id(&unit_id, &currency_id, offer.scale);
        let mut ledger = self.state.ledger.number_ledger(&nym).map_err(to_rpc_error)?;
        ledger.consume(authorizing_num).map_err(to_rpc_error)?;
        let closing = [
            self.state.ledger.db.next_transaction_number().map_err(to_rpc_error)?,
            self.state.ledger.db.next_transaction_number().map_err(to_rpc_error)?,
        ];
        for n in closing {
            ledger.consume(n).ok();
        }
        self.state
            .ledger
            .db
            .put_number_ledger(&nym, &self.state.ledger.notary_id, &ledger)
            .map_err(to_rpc_error)?;

        let now = now_unix();
        let offer_rec = Offer {
            market_id,
            side,
            price_limit: offer.price_limit,
            total_assets: offer.total_assets,
            finished_so_far: 0,
            min_increment: offer.min_increment,
            scale: offer.scale,
            transaction_num: authorizing_num,
            valid_from: offer.valid_from,
            valid_to: offer.valid_to,
            date_added_to_market: now,
        };
        let trade = Trade::issue_trade(
            offer_rec,
            asset_account,
            currency_account,
            self.state.ledger.notary_id.clone(),
            unit_id,
            currency_id,
            stop_sign,
            offer.stop_price,
            closing,
        )
        .map_err(to_rpc_error)?;

        let payload = bincode::serialize(&trade).map_err(|e| to_rpc_error(NotaryError::from(e)))?;
        let item = CronItem::new(authorizing_num, closing.to_vec(), now, offer.valid_from, offer.valid_to, 0, CronItemKind::Trade, payload);
        self.state.cron.lock().expect("cron lock poisoned").add_item(item).map_err(to_rpc_error)?;
        Ok(authorizing_num)
    }

    async fn kill_market_offer(&self, nym_id: String, opening_num: u64) -> RpcResult<()> {
        let nym = parse_nym_id(&nym_id)?;
        let number_ledger = self.state.ledger.number_ledger(&nym).map_err(to_rpc_error)?;
        let mut cron = self.state.cron.lock().expect("cron lock poisoned");
        let item = cron.get(opening_num).ok_or_else(|| to_rpc_error(NotaryError::InvalidState("no such cron item".into())))?;
        let trade: Trade = bincode::deserialize(&item.payload).map_err(|e| to_rpc_error(NotaryError::from(e)))?;
        if !trade.can_remove_item(&number_ledger) {
            return Err(to_rpc_error(NotaryError::InvalidState("nym does not own this offer's numbers".into())));
        }
        cron.flag_for_removal(opening_num);
        Ok(())
    }

    async fn get_market_list(&self) -> RpcResult<Vec<String>> {
        Ok(self.state.trades.market_ids().iter().map(|m| m.to_hex()).collect())
    }

    async fn get_market_offers(&self, market_id: String) -> RpcResult<Vec<RpcOfferSummary>> {
        let id = parse_market_id(&market_id)?;
        Ok(self.state.trades.with_market(&id, |market| match market {
            None => Vec::new(),
            Some(m) => m
                .bids()
                .iter()
                .chain(m.asks().iter())
                .map(|t| RpcOfferSummary {
                    opening_num: t.opening_num(),
                    side: match t.offer.side {
                        Side::Bid => "Bid".to_string(),
                        Side::Ask => "Ask".to_string(),
                    },
                    price_limit: t.offer.price_limit,
                    available: t.offer.available(),
                    scale: t.offer.scale,
                })
                .collect(),
        }))
    }

    async fn get_market_recent_trades(&self, market_id: String) -> RpcResult<Vec<RpcRecentTrade>> {
        let id = parse_market_id(&market_id)?;
        Ok(self.state.trades.with_market(&id, |market| match market {
            None => Vec::new(),
            Some(m) => m
                .recent_trades()
                .iter()
                .map(|t| RpcRecentTrade { opening_num: t.opening_num, time: t.time, price: t.price, amount_sold: t.amount_sold })
                .collect(),
        }))
    }

    async fn withdraw_voucher(&self, account_id: String, amount: i128) -> RpcResult<RpcTransaction> {
        let id = parse_account_id(&account_id)?;
        let txn = apply_receipt(&self.state.ledger, &self.state.keypair, &id, -amount, ItemKind::WithdrawalReceipt, "voucher")
            .map_err(to_rpc_error)?;
        Ok(transaction_to_rpc(&txn))
    }

    async fn deposit_cheque(&self, account_id: String, voucher: RpcTransaction) -> RpcResult<()> {
        let id = parse_account_id(&account_id)?;
        let deposit_amount: Amount = voucher.items.iter().map(|item| item.amount.abs()).sum();
        if deposit_amount <= 0 {
            return Err(to_rpc_error(NotaryError::InvalidOffer("voucher carries no value".into())));
        }
        apply_receipt(&self.state.ledger, &self.state.keypair, &id, deposit_amount, ItemKind::ChequeReceipt, "cheque deposit")
            .map(|_| ())
            .map_err(to_rpc_error)
    }

    async fn withdraw_cash(
        &self,
        nym_id: String,
        account_id: String,
        authorizing_num: u64,
        denominations: Vec<i128>,
        owner_unlock_key_hex: String,
    ) -> RpcResult<Vec<notary_cash::Token>> {
        let nym = parse_nym_id(&nym_id)?;
        let id = parse_account_id(&account_id)?;
        let owner_unlock_key = hex::decode(&owner_unlock_key_hex)
            .map_err(|e| to_rpc_error(NotaryError::Other(format!("bad ownerUnlockKeyHex: {e}"))))?;

        let account = self
            .state
            .ledger
            .db
            .get_account(&id)
            .map_err(to_rpc_error)?
            .ok_or_else(|| to_rpc_error(NotaryError::UnknownAccount(id.clone())))?;
        if account.owner != nym {
            return Err(to_rpc_error(NotaryError::InvalidState("nym does not own this account".into())));
        }

        let mut number_ledger = self.state.ledger.number_ledger(&nym).map_err(to_rpc_error)?;
        number_ledger.consume(authorizing_num).map_err(to_rpc_error)?;
        self.state
            .ledger
            .db
            .put_number_ledger(&nym, &self.state.ledger.notary_id, &number_ledger)
            .map_err(to_rpc_error)?;

        let mut cash = self.state.cash.lock().expect("cash lock poisoned");
        let CashBook { engine, mints } = &mut *cash;
        let mint = mint_for(mints, &self.state.ledger.notary_id, &account.unit_id);
        for &denomination in &denominations {
            mint.ensure_denomination_key(CASH_SERIES, denomination);
        }
        let mut purse = engine.withdraw(&id, mint, CASH_SERIES, &denominations, &owner_unlock_key).map_err(to_rpc_error)?;

        let mut tokens = Vec::with_capacity(denominations.len());
        while let Some(token) = purse.pop() {
            tokens.push(token);
        }
        Ok(tokens)
    }

    async fn deposit_cash(&self, account_id: String, tokens: Vec<notary_cash::Token>) -> RpcResult<i128> {
        let id = parse_account_id(&account_id)?;
        let account = self
            .state
            .ledger
            .db
            .get_account(&id)
            .map_err(to_rpc_error)?
            .ok_or_else(|| to_rpc_error(NotaryError::UnknownAccount(id.clone())))?;

        let purse = Purse::from_ready_tokens(self.state.ledger.notary_id.clone(), account.unit_id.clone(), tokens)
            .map_err(to_rpc_error)?;

        let mut cash = self.state.cash.lock().expect("cash lock poisoned");
        let CashBook { engine, mints } = &mut *cash;
        let mint = mint_for(mints, &self.state.ledger.notary_id, &account.unit_id);
        engine.deposit(&id, mint, purse).map_err(to_rpc_error)
    }

    async fn activate_smart_contract(&self, opening_num: u64) -> RpcResult<()> {
        let item = CronItem::new(opening_num, vec![], now_unix(), 0, i64::MAX, 0, CronItemKind::SmartContract, vec![]);
        self.state.cron.lock().expect("cron lock poisoned").add_item(item).map_err(to_rpc_error)
    }

    async fn trigger_clause(&self, _opening_num: u64, _clause: String) -> RpcResult<String> {
        Err(to_rpc_error(NotaryError::InvalidState("no smart-contract handler registered in this build".into())))
    }
}
