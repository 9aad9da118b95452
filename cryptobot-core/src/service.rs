//! Transaction lifecycle and stats aggregation.
//!
//! Every request runs to completion against [`Storage`] with no cross-request
//! locking. Stats updates are read-modify-write of the singleton row, so two
//! concurrent mutations can lose one update (last writer wins). Counters can
//! be rebuilt with [`Dashboard::recompute_stats`].

use crate::error::{DashboardError, Result};
use crate::models::{
    BotSettings, BotSettingsInput, BotSettingsPatch, NewTransaction, NewWallet, Stats,
    Transaction, TransactionPatch, TransactionRecord, TransactionStatus, Wallet, WalletPatch,
    WebhookConfig, WebhookConfigInput, WebhookConfigPatch,
};
use crate::notify::{Notifier, TracingNotifier, TransactionEvent, TransactionEventKind};
use crate::policy::ConfirmationThresholds;
use crate::storage::Storage;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

pub const DEFAULT_PAGE_LIMIT: i64 = 50;
pub const MAX_PAGE_LIMIT: i64 = 1_000;

#[derive(Debug, Clone, Default)]
pub struct TransactionQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Pagination {
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransactionPage {
    pub transactions: Vec<Transaction>,
    pub pagination: Pagination,
}

#[derive(Clone)]
pub struct Dashboard {
    storage: Arc<dyn Storage>,
    notifier: Arc<dyn Notifier>,
}

fn wallet_not_found() -> DashboardError {
    DashboardError::not_found("Wallet not found")
}

fn transaction_not_found() -> DashboardError {
    DashboardError::not_found("Transaction not found")
}

impl Dashboard {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            notifier: Arc::new(TracingNotifier),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub async fn stats(&self) -> Result<Stats> {
        self.storage.load_stats().await
    }

    /// Full scan-and-count over all wallets.
    async fn refresh_active_wallets(&self) -> Result<Stats> {
        let active = self
            .storage
            .list_wallets()
            .await?
            .iter()
            .filter(|w| w.is_active)
            .count();
        let mut stats = self.storage.load_stats().await?;
        stats.record_active_wallets(active, Utc::now());
        self.storage.save_stats(&stats).await
    }

    /// Rebuild every derived counter from the wallet and transaction tables.
    pub async fn recompute_stats(&self) -> Result<Stats> {
        let totals = self.storage.transaction_totals().await?;
        let active = self
            .storage
            .list_wallets()
            .await?
            .iter()
            .filter(|w| w.is_active)
            .count();
        let mut stats = self.storage.load_stats().await?;
        stats.reconcile(totals, active, Utc::now());
        let saved = self.storage.save_stats(&stats).await?;
        info!(
            total_transactions = saved.total_transactions,
            total_volume = saved.total_volume,
            active_wallets = saved.active_wallets,
            "stats recomputed"
        );
        Ok(saved)
    }

    async fn dispatch(&self, event: TransactionEvent) -> Result<()> {
        let config = self.storage.get_webhook_config().await?;
        self.notifier.notify(&event, config.as_ref()).await;
        Ok(())
    }

    pub async fn list_wallets(&self) -> Result<Vec<Wallet>> {
        self.storage.list_wallets().await
    }

    pub async fn wallet(&self, id: i32) -> Result<Wallet> {
        self.storage.get_wallet(id).await?.ok_or_else(wallet_not_found)
    }

    pub async fn create_wallet(&self, input: NewWallet) -> Result<Wallet> {
        input.validate()?;
        if self
            .storage
            .get_wallet_by_address(&input.address)
            .await?
            .is_some()
        {
            return Err(DashboardError::conflict("Wallet address already exists"));
        }

        let wallet = self.storage.insert_wallet(&input).await?;
        info!(wallet_id = wallet.id, currency = %wallet.currency, "wallet created");
        self.refresh_active_wallets().await?;
        Ok(wallet)
    }

    pub async fn update_wallet(&self, id: i32, patch: WalletPatch) -> Result<Wallet> {
        patch.validate()?;
        self.wallet(id).await?;

        if let Some(address) = &patch.address {
            if let Some(other) = self.storage.get_wallet_by_address(address).await? {
                if other.id != id {
                    return Err(DashboardError::conflict("Wallet address already exists"));
                }
            }
        }

        let wallet = self
            .storage
            .update_wallet(id, &patch)
            .await?
            .ok_or_else(wallet_not_found)?;

        if patch.is_active.is_some() {
            self.refresh_active_wallets().await?;
        }
        Ok(wallet)
    }

    pub async fn delete_wallet(&self, id: i32) -> Result<bool> {
        self.wallet(id).await?;
        let deleted = self.storage.delete_wallet(id).await?;
        info!(wallet_id = id, deleted, "wallet deleted");
        self.refresh_active_wallets().await?;
        Ok(deleted)
    }

    pub async fn list_transactions(&self, query: TransactionQuery) -> Result<TransactionPage> {
        let limit = query
            .limit
            .unwrap_or(DEFAULT_PAGE_LIMIT)
            .clamp(1, MAX_PAGE_LIMIT);
        let offset = query.offset.unwrap_or(0).max(0);
        let currency = query.currency.as_deref().filter(|c| !c.is_empty());

        let transactions = self
            .storage
            .list_transactions(limit, offset, currency)
            .await?;
        let total = self.storage.count_transactions(currency).await?;

        Ok(TransactionPage {
            transactions,
            pagination: Pagination {
                total,
                limit,
                offset,
            },
        })
    }

    pub async fn transaction(&self, id: i32) -> Result<Transaction> {
        self.storage
            .get_transaction(id)
            .await?
            .ok_or_else(transaction_not_found)
    }

    async fn confirmation_thresholds(&self) -> Result<ConfirmationThresholds> {
        Ok(self
            .storage
            .get_bot_settings()
            .await?
            .as_ref()
            .map(ConfirmationThresholds::from)
            .unwrap_or_default())
    }

    pub async fn create_transaction(&self, input: NewTransaction) -> Result<Transaction> {
        input.validate()?;

        if self
            .storage
            .get_transaction_by_external_id(&input.transaction_id)
            .await?
            .is_some()
        {
            return Err(DashboardError::conflict("Transaction ID already exists"));
        }
        if self.storage.get_wallet(input.wallet_id).await?.is_none() {
            return Err(wallet_not_found());
        }

        let required_confirmations = match input.required_confirmations {
            Some(n) => n,
            None => self
                .confirmation_thresholds()
                .await?
                .required_for(&input.currency, input.network.as_deref()),
        };

        let record = TransactionRecord {
            transaction_id: input.transaction_id,
            amount: input.amount,
            currency: input.currency,
            network: input.network,
            confirmations: input.confirmations.unwrap_or(0),
            required_confirmations,
            status: TransactionStatus::Pending,
            wallet_id: input.wallet_id,
        };
        let tx = self.storage.insert_transaction(&record).await?;

        let mut stats = self.storage.load_stats().await?;
        stats.record_transaction_created(tx.amount, Utc::now());
        self.storage.save_stats(&stats).await?;

        info!(
            id = tx.id,
            transaction_id = %tx.transaction_id,
            amount = tx.amount,
            currency = %tx.currency,
            "transaction created"
        );

        self.dispatch(TransactionEvent {
            kind: TransactionEventKind::Created,
            transaction: tx.clone(),
        })
        .await?;

        Ok(tx)
    }

    pub async fn update_transaction(&self, id: i32, patch: TransactionPatch) -> Result<Transaction> {
        patch.validate()?;
        let existing = self.transaction(id).await?;

        if let Some(wallet_id) = patch.wallet_id {
            if self.storage.get_wallet(wallet_id).await?.is_none() {
                return Err(wallet_not_found());
            }
        }

        if let Some(tx_id) = &patch.transaction_id {
            if let Some(other) = self.storage.get_transaction_by_external_id(tx_id).await? {
                if other.id != id {
                    return Err(DashboardError::conflict("Transaction ID already exists"));
                }
            }
        }

        let status_change = patch.status.filter(|next| *next != existing.status);
        if let Some(next) = status_change {
            if !existing.status.can_transition_to(next) {
                return Err(DashboardError::validation(format!(
                    "Cannot change transaction status from {} to {}",
                    existing.status, next
                )));
            }
        }

        if let Some(confirmations) = patch.confirmations {
            if !existing.status.is_terminal() && confirmations < existing.confirmations {
                return Err(DashboardError::validation(format!(
                    "confirmations cannot decrease from {} to {} while pending",
                    existing.confirmations, confirmations
                )));
            }
        }

        let tx = match self
            .storage
            .update_transaction(id, existing.status, &patch)
            .await?
        {
            Some(tx) => tx,
            // The row changed between the read above and the write.
            None => {
                let current = self.transaction(id).await?;
                return Err(DashboardError::validation(format!(
                    "Transaction was modified concurrently (status {}, {} confirmations); retry",
                    current.status, current.confirmations
                )));
            }
        };

        let volume_change = patch
            .amount
            .map(|_| (existing.amount, tx.amount))
            .filter(|(prev, next)| prev != next);
        if status_change.is_some() || volume_change.is_some() {
            let now = Utc::now();
            let mut stats = self.storage.load_stats().await?;
            if let Some((prev, next)) = volume_change {
                stats.record_amount_change(prev, next, now);
            }
            if status_change.is_some() {
                stats.record_status_change(now);
            }
            self.storage.save_stats(&stats).await?;
        }

        if let Some(next) = status_change {
            info!(id = tx.id, from = %existing.status, to = %next, "transaction status changed");
            self.dispatch(TransactionEvent {
                kind: TransactionEventKind::StatusChanged {
                    from: existing.status,
                },
                transaction: tx.clone(),
            })
            .await?;
        } else if tx.status == TransactionStatus::Pending
            && tx.confirmations >= tx.required_confirmations
        {
            info!(
                id = tx.id,
                confirmations = tx.confirmations,
                required = tx.required_confirmations,
                "pending transaction reached required confirmations, awaiting manual status update"
            );
        }

        Ok(tx)
    }

    pub async fn webhook_config(&self) -> Result<WebhookConfig> {
        self.storage
            .get_webhook_config()
            .await?
            .ok_or_else(|| DashboardError::not_found("Webhook configuration not found"))
    }

    /// Returns the saved row and whether it was created by this call.
    pub async fn save_webhook_config(
        &self,
        input: WebhookConfigInput,
    ) -> Result<(WebhookConfig, bool)> {
        input.validate()?;
        let saved = self
            .storage
            .upsert_webhook_config(&WebhookConfigPatch::from(input))
            .await?;
        info!(created = saved.1, "webhook configuration saved");
        Ok(saved)
    }

    pub async fn patch_webhook_config(&self, patch: WebhookConfigPatch) -> Result<WebhookConfig> {
        patch.validate()?;
        self.storage
            .update_webhook_config(&patch)
            .await?
            .ok_or_else(|| DashboardError::not_found("Webhook configuration not found"))
    }

    pub async fn bot_settings(&self) -> Result<BotSettings> {
        self.storage
            .get_bot_settings()
            .await?
            .map(|s| s.redacted())
            .ok_or_else(|| DashboardError::not_found("Bot settings not found"))
    }

    pub async fn save_bot_settings(&self, input: BotSettingsInput) -> Result<(BotSettings, bool)> {
        input.validate()?;
        let (settings, created) = self
            .storage
            .upsert_bot_settings(&BotSettingsPatch::from(input))
            .await?;
        info!(created, "bot settings saved");
        Ok((settings.redacted(), created))
    }

    pub async fn patch_bot_settings(&self, patch: BotSettingsPatch) -> Result<BotSettings> {
        patch.validate()?;
        self.storage
            .update_bot_settings(&patch)
            .await?
            .map(|s| s.redacted())
            .ok_or_else(|| DashboardError::not_found("Bot settings not found"))
    }
}
