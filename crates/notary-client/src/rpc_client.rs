//! Thin wrapper around the generated [`NotaryApiClient`] trait, bound to a
//! `jsonrpsee` HTTP client. Every wire call in §6 is available through this
//! one type; the state machine never builds JSON-RPC payloads itself.

use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use notary_cash::Token;

use notary_rpc::{NotaryApiClient, RpcAccount, RpcOfferRequest, RpcOfferSummary, RpcRecentTrade, RpcTransaction};

pub struct NotaryRpcClient {
    inner: HttpClient,
}

impl NotaryRpcClient {
    pub fn connect(url: &str) -> anyhow::Result<Self> {
        let inner = HttpClientBuilder::default().build(url)?;
        Ok(Self { inner })
    }

    pub async fn register_nym(&self, nym_id: &str, public_key_hex: &str) -> anyhow::Result<u64> {
        Ok(self.inner.register_nym(nym_id.to_string(), public_key_hex.to_string()).await?)
    }

    pub async fn get_request_number(&self, nym_id: &str) -> anyhow::Result<u64> {
        Ok(self.inner.get_request_number(nym_id.to_string()).await?)
    }

    pub async fn get_transaction_numbers(&self, nym_id: &str, count: u32) -> anyhow::Result<Vec<u64>> {
        Ok(self.inner.get_transaction_numbers(nym_id.to_string(), count).await?)
    }

    pub async fn get_nymbox(&self, nym_id: &str) -> anyhow::Result<Vec<RpcTransaction>> {
        Ok(self.inner.get_nymbox(nym_id.to_string()).await?)
    }

    pub async fn process_nymbox(&self, nym_id: &str, transaction_num: u64) -> anyhow::Result<()> {
        Ok(self.inner.process_nymbox(nym_id.to_string(), transaction_num).await?)
    }

    pub async fn register_account(&self, nym_id: &str, unit_id: &str) -> anyhow::Result<String> {
        Ok(self.inner.register_account(nym_id.to_string(), unit_id.to_string()).await?)
    }

    pub async fn delete_asset_account(&self, account_id: &str) -> anyhow::Result<()> {
        Ok(self.inner.delete_asset_account(account_id.to_string()).await?)
    }

    pub async fn get_account_data(&self, account_id: &str) -> anyhow::Result<(RpcAccount, Vec<RpcTransaction>)> {
        Ok(self.inner.get_account_data(account_id.to_string()).await?)
    }

    pub async fn notarize_transfer(
        &self,
        nym_id: &str,
        authorizing_num: u64,
        from: &str,
        to: &str,
        amount: i128,
    ) -> anyhow::Result<()> {
        Ok(self
            .inner
            .notarize_transfer(nym_id.to_string(), authorizing_num, from.to_string(), to.to_string(), amount)
            .await?)
    }

    pub async fn process_inbox(&self, nym_id: &str, account_id: &str, transaction_num: u64) -> anyhow::Result<()> {
        Ok(self.inner.process_inbox(nym_id.to_string(), account_id.to_string(), transaction_num).await?)
    }

    pub async fn issue_market_offer(&self, nym_id: &str, authorizing_num: u64, offer: RpcOfferRequest) -> anyhow::Result<u64> {
        Ok(self.inner.issue_market_offer(nym_id.to_string(), authorizing_num, offer).await?)
    }

    pub async fn kill_market_offer(&self, nym_id: &str, opening_num: u64) -> anyhow::Result<()> {
        Ok(self.inner.kill_market_offer(nym_id.to_string(), opening_num).await?)
    }

    pub async fn get_market_list(&self) -> anyhow::Result<Vec<String>> {
        Ok(self.inner.get_market_list().await?)
    }

    pub async fn get_market_offers(&self, market_id: &str) -> anyhow::Result<Vec<RpcOfferSummary>> {
        Ok(self.inner.get_market_offers(market_id.to_string()).await?)
    }

    pub async fn get_market_recent_trades(&self, market_id: &str) -> anyhow::Result<Vec<RpcRecentTrade>> {
        Ok(self.inner.get_market_recent_trades(market_id.to_string()).await?)
    }

    pub async fn withdraw_voucher(&self, account_id: &str, amount: i128) -> anyhow::Result<RpcTransaction> {
        Ok(self.inner.withdraw_voucher(account_id.to_string(), amount).await?)
    }

    pub async fn deposit_cheque(&self, account_id: &str, voucher: RpcTransaction) -> anyhow::Result<()> {
        Ok(self.inner.deposit_cheque(account_id.to_string(), voucher).await?)
    }

    pub async fn withdraw_cash(
        &self,
        nym_id: &str,
        account_id: &str,
        authorizing_num: u64,
        denominations: Vec<i128>,
        owner_unlock_key_hex: &str,
    ) -> anyhow::Result<Vec<Token>> {
        Ok(self
            .inner
            .withdraw_cash(nym_id.to_string(), account_id.to_string(), authorizing_num, denominations, owner_unlock_key_hex.to_string())
            .await?)
    }

    pub async fn deposit_cash(&self, account_id: &str, tokens: Vec<Token>) -> anyhow::Result<i128> {
        Ok(self.inner.deposit_cash(account_id.to_string(), tokens).await?)
    }

    pub async fn activate_smart_contract(&self, opening_num: u64) -> anyhow::Result<()> {
        Ok(self.inner.activate_smart_contract(opening_num).await?)
    }

    pub async fn trigger_clause(&self, opening_num: u64, clause: &str) -> anyhow::Result<String> {
        Ok(self.inner.trigger_clause(opening_num, clause.to_string()).await?)
    }
}
