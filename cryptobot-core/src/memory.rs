//! In-process [`Storage`] used when no database is configured and by tests.

use crate::error::{DashboardError, Result};
use crate::models::{
    BotSettings, BotSettingsPatch, NewWallet, Stats, Transaction, TransactionPatch,
    TransactionRecord, TransactionStatus, Wallet, WalletPatch, WebhookConfig,
    WebhookConfigPatch,
};
use crate::stats::TransactionTotals;
use crate::storage::Storage;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

#[derive(Default)]
struct Inner {
    wallets: BTreeMap<i32, Wallet>,
    transactions: BTreeMap<i32, Transaction>,
    next_wallet_id: i32,
    next_transaction_id: i32,
    webhook_config: Option<WebhookConfig>,
    bot_settings: Option<BotSettings>,
    stats: Option<Stats>,
}

impl Inner {
    fn address_taken(&self, address: &str, except: Option<i32>) -> bool {
        self.wallets
            .values()
            .any(|w| w.address == address && Some(w.id) != except)
    }

    fn transaction_id_taken(&self, transaction_id: &str, except: Option<i32>) -> bool {
        self.transactions
            .values()
            .any(|t| t.transaction_id == transaction_id && Some(t.id) != except)
    }
}

/// Uniqueness checks and inserts happen under one write lock, which gives the
/// same atomicity the Postgres unique constraints provide.
#[derive(Default)]
pub struct MemStorage {
    inner: RwLock<Inner>,
}

impl MemStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

fn wallet_conflict() -> DashboardError {
    DashboardError::conflict("Wallet address already exists")
}

fn transaction_conflict() -> DashboardError {
    DashboardError::conflict("Transaction ID already exists")
}

#[async_trait]
impl Storage for MemStorage {
    async fn list_wallets(&self) -> Result<Vec<Wallet>> {
        Ok(self.inner.read().await.wallets.values().cloned().collect())
    }

    async fn get_wallet(&self, id: i32) -> Result<Option<Wallet>> {
        Ok(self.inner.read().await.wallets.get(&id).cloned())
    }

    async fn get_wallet_by_address(&self, address: &str) -> Result<Option<Wallet>> {
        let inner = self.inner.read().await;
        Ok(inner.wallets.values().find(|w| w.address == address).cloned())
    }

    async fn insert_wallet(&self, wallet: &NewWallet) -> Result<Wallet> {
        let mut inner = self.inner.write().await;
        if inner.address_taken(&wallet.address, None) {
            return Err(wallet_conflict());
        }
        inner.next_wallet_id += 1;
        let stored = Wallet {
            id: inner.next_wallet_id,
            name: wallet.name.clone(),
            address: wallet.address.clone(),
            currency: wallet.currency.clone(),
            network: wallet.network.clone(),
            discord_user_id: wallet.discord_user_id.clone(),
            is_active: wallet.is_active,
            created_at: Utc::now(),
        };
        inner.wallets.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn update_wallet(&self, id: i32, patch: &WalletPatch) -> Result<Option<Wallet>> {
        let mut inner = self.inner.write().await;
        if let Some(address) = &patch.address {
            if inner.address_taken(address, Some(id)) {
                return Err(wallet_conflict());
            }
        }
        Ok(inner.wallets.get_mut(&id).map(|w| {
            w.apply(patch);
            w.clone()
        }))
    }

    async fn delete_wallet(&self, id: i32) -> Result<bool> {
        Ok(self.inner.write().await.wallets.remove(&id).is_some())
    }

    async fn list_transactions(
        &self,
        limit: i64,
        offset: i64,
        currency: Option<&str>,
    ) -> Result<Vec<Transaction>> {
        let inner = self.inner.read().await;
        let mut rows: Vec<Transaction> = inner
            .transactions
            .values()
            .filter(|t| currency.map_or(true, |c| t.currency == c))
            .cloned()
            .collect();
        // Ids are issued in insertion order, so this matches created_at DESC.
        rows.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(rows
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn count_transactions(&self, currency: Option<&str>) -> Result<i64> {
        let inner = self.inner.read().await;
        let n = inner
            .transactions
            .values()
            .filter(|t| currency.map_or(true, |c| t.currency == c))
            .count();
        Ok(n as i64)
    }

    async fn transaction_totals(&self) -> Result<TransactionTotals> {
        let inner = self.inner.read().await;
        Ok(inner
            .transactions
            .values()
            .fold(TransactionTotals::default(), |acc, t| TransactionTotals {
                count: acc.count + 1,
                volume: acc.volume + t.amount,
            }))
    }

    async fn get_transaction(&self, id: i32) -> Result<Option<Transaction>> {
        Ok(self.inner.read().await.transactions.get(&id).cloned())
    }

    async fn get_transaction_by_external_id(
        &self,
        transaction_id: &str,
    ) -> Result<Option<Transaction>> {
        let inner = self.inner.read().await;
        Ok(inner
            .transactions
            .values()
            .find(|t| t.transaction_id == transaction_id)
            .cloned())
    }

    async fn insert_transaction(&self, record: &TransactionRecord) -> Result<Transaction> {
        let mut inner = self.inner.write().await;
        if inner.transaction_id_taken(&record.transaction_id, None) {
            return Err(transaction_conflict());
        }
        inner.next_transaction_id += 1;
        let now = Utc::now();
        let stored = Transaction {
            id: inner.next_transaction_id,
            transaction_id: record.transaction_id.clone(),
            amount: record.amount,
            currency: record.currency.clone(),
            network: record.network.clone(),
            confirmations: record.confirmations,
            required_confirmations: record.required_confirmations,
            status: record.status,
            wallet_id: record.wallet_id,
            created_at: now,
            updated_at: now,
        };
        inner.transactions.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn update_transaction(
        &self,
        id: i32,
        expected: TransactionStatus,
        patch: &TransactionPatch,
    ) -> Result<Option<Transaction>> {
        let mut inner = self.inner.write().await;
        if let Some(tx_id) = &patch.transaction_id {
            if inner.transaction_id_taken(tx_id, Some(id)) {
                return Err(transaction_conflict());
            }
        }
        let Some(t) = inner.transactions.get_mut(&id) else {
            return Ok(None);
        };
        if t.status != expected {
            return Ok(None);
        }
        if let Some(confirmations) = patch.confirmations {
            if t.status == TransactionStatus::Pending && confirmations < t.confirmations {
                return Ok(None);
            }
        }
        t.apply(patch, Utc::now());
        Ok(Some(t.clone()))
    }

    async fn get_webhook_config(&self) -> Result<Option<WebhookConfig>> {
        Ok(self.inner.read().await.webhook_config.clone())
    }

    async fn upsert_webhook_config(
        &self,
        patch: &WebhookConfigPatch,
    ) -> Result<(WebhookConfig, bool)> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();
        if let Some(existing) = inner.webhook_config.as_mut() {
            existing.apply(patch, now);
            return Ok((existing.clone(), false));
        }
        let url = patch
            .url
            .clone()
            .ok_or_else(|| DashboardError::validation("url is required"))?;
        let created = WebhookConfig {
            id: 1,
            url,
            notify_success: patch.notify_success.unwrap_or(true),
            notify_pending: patch.notify_pending.unwrap_or(true),
            notify_failed: patch.notify_failed.unwrap_or(true),
            notify_wallet: patch.notify_wallet.unwrap_or(false),
            created_at: now,
            updated_at: now,
        };
        inner.webhook_config = Some(created.clone());
        Ok((created, true))
    }

    async fn update_webhook_config(
        &self,
        patch: &WebhookConfigPatch,
    ) -> Result<Option<WebhookConfig>> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();
        Ok(inner.webhook_config.as_mut().map(|c| {
            c.apply(patch, now);
            c.clone()
        }))
    }

    async fn get_bot_settings(&self) -> Result<Option<BotSettings>> {
        Ok(self.inner.read().await.bot_settings.clone())
    }

    async fn upsert_bot_settings(&self, patch: &BotSettingsPatch) -> Result<(BotSettings, bool)> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();
        if let Some(existing) = inner.bot_settings.as_mut() {
            existing.apply(patch, now);
            return Ok((existing.clone(), false));
        }
        let token = patch
            .token
            .clone()
            .ok_or_else(|| DashboardError::validation("token is required"))?;
        let mut created = BotSettings {
            id: 1,
            token,
            bitcoin_confirmations: crate::models::defaults::bitcoin(),
            ethereum_confirmations: crate::models::defaults::ethereum(),
            litecoin_confirmations: crate::models::defaults::litecoin(),
            erc20_confirmations: crate::models::defaults::erc20(),
            trc20_confirmations: crate::models::defaults::trc20(),
            bep20_confirmations: crate::models::defaults::bep20(),
            polygon_confirmations: crate::models::defaults::polygon(),
            solana_confirmations: crate::models::defaults::solana(),
            discord_client_id: None,
            discord_client_secret: None,
            discord_redirect_uri: None,
            discord_guild_id: None,
            gitbook_api_key: None,
            gitbook_space_id: None,
            created_at: now,
            updated_at: now,
        };
        created.apply(patch, now);
        inner.bot_settings = Some(created.clone());
        Ok((created, true))
    }

    async fn update_bot_settings(&self, patch: &BotSettingsPatch) -> Result<Option<BotSettings>> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();
        Ok(inner.bot_settings.as_mut().map(|s| {
            s.apply(patch, now);
            s.clone()
        }))
    }

    async fn load_stats(&self) -> Result<Stats> {
        Ok(self.inner.read().await.stats.clone().unwrap_or_default())
    }

    async fn save_stats(&self, stats: &Stats) -> Result<Stats> {
        let stored = Stats {
            id: 1,
            ..stats.clone()
        };
        self.inner.write().await.stats = Some(stored.clone());
        Ok(stored)
    }
}
