//! The §6 stable wire command set, exposed as a JSON-RPC 2.0 surface under
//! the `notary` namespace. Command names here are the wire contract; they
//! are added to, never renumbered (§6 "the name itself is the contract").

use jsonrpsee::core::RpcResult;
use jsonrpsee::proc_macros::rpc;
use notary_cash::Token;

use crate::types::{RpcAccount, RpcOfferRequest, RpcOfferSummary, RpcRecentTrade, RpcTransaction};

#[rpc(client, server, namespace = "notary")]
pub trait NotaryApi {
    #[method(name = "registerNym")]
    async fn register_nym(&self, nym_id: String, public_key_hex: String) -> RpcResult<u64>;

    #[method(name = "unregisterNym")]
    async fn unregister_nym(&self, nym_id: String) -> RpcResult<()>;

    #[method(name = "getRequestNumber")]
    async fn get_request_number(&self, nym_id: String) -> RpcResult<u64>;

    #[method(name = "getTransactionNumbers")]
    async fn get_transaction_numbers(&self, nym_id: String, count: u32) -> RpcResult<Vec<u64>>;

    #[method(name = "getNymbox")]
    async fn get_nymbox(&self, nym_id: String) -> RpcResult<Vec<RpcTransaction>>;

    #[method(name = "processNymbox")]
    async fn process_nymbox(&self, nym_id: String, transaction_num: u64) -> RpcResult<()>;

    #[method(name = "registerAccount")]
    async fn register_account(&self, nym_id: String, unit_id: String) -> RpcResult<String>;

    #[method(name = "deleteAssetAccount")]
    async fn delete_asset_account(&self, account_id: String) -> RpcResult<()>;

    #[method(name = "getAccountData")]
    async fn get_account_data(&self, account_id: String) -> RpcResult<(RpcAccount, Vec<RpcTransaction>)>;

    #[method(name = "notarizeTransfer")]
    async fn notarize_transfer(
        &self,
        nym_id: String,
        authorizing_num: u64,
        from: String,
        to: String,
        amount: i128,
    ) -> RpcResult<()>;

    #[method(name = "notarizeDeposit")]
    async fn notarize_deposit(&self, account_id: String, amount: i128) -> RpcResult<()>;

    #[method(name = "notarizeWithdrawal")]
    async fn notarize_withdrawal(&self, account_id: String, amount: i128) -> RpcResult<()>;

    #[method(name = "processInbox")]
    async fn process_inbox(&self, nym_id: String, account_id: String, transaction_num: u64) -> RpcResult<()>;

    #[method(name = "issueMarketOffer")]
    async fn issue_market_offer(&self, nym_id: String, authorizing_num: u64, offer: RpcOfferRequest) -> RpcResult<u64>;

    #[method(name = "killMarketOffer")]
    async fn kill_market_offer(&self, nym_id: String, opening_num: u64) -> RpcResult<()>;

    #[method(name = "getMarketList")]
    async fn get_market_list(&self) -> RpcResult<Vec<String>>;

    #[method(name = "getMarketOffers")]
    async fn get_market_offers(&self, market_id: String) -> RpcResult<Vec<RpcOfferSummary>>;

    #[method(name = "getMarketRecentTrades")]
    async fn get_market_recent_trades(&self, market_id: String) -> RpcResult<Vec<RpcRecentTrade>>;

    #[method(name = "withdrawVoucher")]
    async fn withdraw_voucher(&self, account_id: String, amount: i128) -> RpcResult<RpcTransaction>;

    #[method(name = "depositCheque")]
    async fn deposit_cheque(&self, account_id: String, voucher: RpcTransaction) -> RpcResult<()>;

    #[method(name = "withdrawCash")]
    async fn withdraw_cash(
        &self,
        nym_id: String,
        account_id: String,
        authorizing_num: u64,
        denominations: Vec<i128>,
        owner_unlock_key_hex: String,
    ) -> RpcResult<Vec<Token>>;

    #[method(name = "depositCash")]
    async fn deposit_cash(&self, account_id: String, tokens: Vec<Token>) -> RpcResult<i128>;

    #[method(name = "activateSmartContract")]
    async fn activate_smart_contract(&self, opening_num: u64) -> RpcResult<()>;

    #[method(name = "triggerClause")]
    async fn trigger_clause(&self, opening_num: u64, clause: String) -> RpcResult<String>;
}
