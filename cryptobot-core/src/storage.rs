use crate::error::Result;
use crate::models::{
    BotSettings, BotSettingsPatch, NewWallet, Stats, Transaction, TransactionPatch,
    TransactionRecord, TransactionStatus, Wallet, WalletPatch, WebhookConfig,
    WebhookConfigPatch,
};
use crate::stats::TransactionTotals;
use async_trait::async_trait;

/// Persistence seam for every dashboard entity.
///
/// Implementations must enforce wallet-address and transaction-id uniqueness
/// atomically and report violations as `DashboardError::Conflict`. Nothing
/// else is validated here; business rules live in [`crate::service`].
#[async_trait]
pub trait Storage: Send + Sync {
    async fn list_wallets(&self) -> Result<Vec<Wallet>>;
    async fn get_wallet(&self, id: i32) -> Result<Option<Wallet>>;
    async fn get_wallet_by_address(&self, address: &str) -> Result<Option<Wallet>>;
    async fn insert_wallet(&self, wallet: &NewWallet) -> Result<Wallet>;
    async fn update_wallet(&self, id: i32, patch: &WalletPatch) -> Result<Option<Wallet>>;
    async fn delete_wallet(&self, id: i32) -> Result<bool>;

    /// Newest first, optionally restricted to one currency.
    async fn list_transactions(
        &self,
        limit: i64,
        offset: i64,
        currency: Option<&str>,
    ) -> Result<Vec<Transaction>>;
    async fn count_transactions(&self, currency: Option<&str>) -> Result<i64>;
    async fn transaction_totals(&self) -> Result<TransactionTotals>;
    async fn get_transaction(&self, id: i32) -> Result<Option<Transaction>>;
    async fn get_transaction_by_external_id(&self, transaction_id: &str)
        -> Result<Option<Transaction>>;
    async fn insert_transaction(&self, record: &TransactionRecord) -> Result<Transaction>;
    /// Applies `patch` only while the stored status still equals `expected`
    /// and, for a pending row, a supplied confirmation count is not below the
    /// stored one. Both conditions are checked atomically with the write.
    /// `None` means the row is missing or no longer matches.
    async fn update_transaction(
        &self,
        id: i32,
        expected: TransactionStatus,
        patch: &TransactionPatch,
    ) -> Result<Option<Transaction>>;

    async fn get_webhook_config(&self) -> Result<Option<WebhookConfig>>;
    /// Creates the singleton from a complete patch or merges into the existing row.
    /// The flag is true when the row was created by this call.
    async fn upsert_webhook_config(&self, patch: &WebhookConfigPatch)
        -> Result<(WebhookConfig, bool)>;
    async fn update_webhook_config(&self, patch: &WebhookConfigPatch)
        -> Result<Option<WebhookConfig>>;

    async fn get_bot_settings(&self) -> Result<Option<BotSettings>>;
    async fn upsert_bot_settings(&self, patch: &BotSettingsPatch) -> Result<(BotSettings, bool)>;
    async fn update_bot_settings(&self, patch: &BotSettingsPatch) -> Result<Option<BotSettings>>;

    /// The singleton stats row; a default row when none was ever written.
    async fn load_stats(&self) -> Result<Stats>;
    async fn save_stats(&self, stats: &Stats) -> Result<Stats>;
}
