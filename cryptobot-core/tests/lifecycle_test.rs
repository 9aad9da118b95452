use async_trait::async_trait;
use cryptobot_core::memory::MemStorage;
use cryptobot_core::models::{
    BotSettings, BotSettingsInput, BotSettingsPatch, NewTransaction, NewWallet, Stats,
    Transaction, TransactionPatch, TransactionRecord, TransactionStatus, Wallet, WalletPatch,
    WebhookConfig, WebhookConfigInput, WebhookConfigPatch,
};
use cryptobot_core::notify::{Notifier, TransactionEvent, TransactionEventKind};
use cryptobot_core::service::TransactionQuery;
use cryptobot_core::stats::TransactionTotals;
use cryptobot_core::storage::Storage;
use cryptobot_core::{Dashboard, DashboardError};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct RecordingNotifier {
    events: Mutex<Vec<TransactionEventKind>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, event: &TransactionEvent, _config: Option<&WebhookConfig>) {
        self.events.lock().unwrap().push(event.kind);
    }
}

fn dashboard() -> (Dashboard, Arc<RecordingNotifier>) {
    let notifier = Arc::new(RecordingNotifier::default());
    let dash = Dashboard::new(Arc::new(MemStorage::new())).with_notifier(notifier.clone());
    (dash, notifier)
}

fn new_wallet(address: &str, active: bool) -> NewWallet {
    NewWallet {
        name: format!("wallet {address}"),
        address: address.to_string(),
        currency: "BTC".to_string(),
        network: Some("BTC".to_string()),
        discord_user_id: None,
        is_active: active,
    }
}

fn new_tx(tx_id: &str, wallet_id: i32, amount: f64) -> NewTransaction {
    NewTransaction {
        transaction_id: tx_id.to_string(),
        amount,
        currency: "BTC".to_string(),
        network: None,
        confirmations: None,
        required_confirmations: None,
        wallet_id,
    }
}

#[tokio::test]
async fn created_transaction_is_pending_and_counted() {
    let (dash, notifier) = dashboard();
    let w = dash.create_wallet(new_wallet("addr-1", true)).await.unwrap();

    let tx = dash.create_transaction(new_tx("tx-1", w.id, 0.5)).await.unwrap();
    assert_eq!(tx.status, TransactionStatus::Pending);
    assert_eq!(tx.confirmations, 0);
    assert_eq!(tx.required_confirmations, 3);

    let stats = dash.stats().await.unwrap();
    assert_eq!(stats.total_transactions, 1);
    assert!((stats.total_volume - 0.5).abs() < 1e-9);
    assert_eq!(stats.webhook_calls, 1);
    assert_eq!(
        notifier.events.lock().unwrap().as_slice(),
        &[TransactionEventKind::Created]
    );
}

#[tokio::test]
async fn duplicate_transaction_id_conflicts_and_leaves_stats() {
    let (dash, _) = dashboard();
    let w = dash.create_wallet(new_wallet("addr-1", true)).await.unwrap();
    dash.create_transaction(new_tx("tx-1", w.id, 1.0)).await.unwrap();
    let before = dash.stats().await.unwrap();

    let err = dash
        .create_transaction(new_tx("tx-1", w.id, 99.0))
        .await
        .unwrap_err();
    assert!(matches!(err, DashboardError::Conflict(_)));
    assert_eq!(dash.stats().await.unwrap(), before);
}

#[tokio::test]
async fn unknown_wallet_is_not_found_and_leaves_stats() {
    let (dash, notifier) = dashboard();
    let before = dash.stats().await.unwrap();

    let err = dash
        .create_transaction(new_tx("tx-1", 42, 1.0))
        .await
        .unwrap_err();
    assert!(matches!(err, DashboardError::NotFound(_)));

    let after = dash.stats().await.unwrap();
    assert_eq!(after.total_transactions, before.total_transactions);
    assert_eq!(after.webhook_calls, before.webhook_calls);
    assert!(notifier.events.lock().unwrap().is_empty());
}

#[tokio::test]
async fn totals_sum_over_many_creates() {
    let (dash, _) = dashboard();
    let w = dash.create_wallet(new_wallet("addr-1", true)).await.unwrap();
    let amounts = [0.001, 2.5, 10.0, 0.75, 3.0];

    for (i, a) in amounts.iter().enumerate() {
        dash.create_transaction(new_tx(&format!("tx-{i}"), w.id, *a))
            .await
            .unwrap();
    }

    let stats = dash.stats().await.unwrap();
    assert_eq!(stats.total_transactions, amounts.len() as i32);
    assert!((stats.total_volume - amounts.iter().sum::<f64>()).abs() < 1e-9);
    assert_eq!(stats.webhook_calls, amounts.len() as i32);
}

#[tokio::test]
async fn status_change_counts_one_webhook_call() {
    let (dash, notifier) = dashboard();
    let w = dash.create_wallet(new_wallet("addr-1", true)).await.unwrap();
    let tx = dash.create_transaction(new_tx("tx-1", w.id, 1.0)).await.unwrap();
    let calls = dash.stats().await.unwrap().webhook_calls;

    // Non-status updates do not notify.
    dash.update_transaction(
        tx.id,
        TransactionPatch {
            confirmations: Some(2),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(dash.stats().await.unwrap().webhook_calls, calls);

    // Re-sending the current status is not a transition.
    dash.update_transaction(
        tx.id,
        TransactionPatch {
            status: Some(TransactionStatus::Pending),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(dash.stats().await.unwrap().webhook_calls, calls);

    let done = dash
        .update_transaction(
            tx.id,
            TransactionPatch {
                status: Some(TransactionStatus::Completed),
                confirmations: Some(3),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(done.status, TransactionStatus::Completed);
    assert_eq!(dash.stats().await.unwrap().webhook_calls, calls + 1);
    assert_eq!(
        notifier.events.lock().unwrap().last(),
        Some(&TransactionEventKind::StatusChanged {
            from: TransactionStatus::Pending
        })
    );
}

#[tokio::test]
async fn terminal_status_cannot_move() {
    let (dash, _) = dashboard();
    let w = dash.create_wallet(new_wallet("addr-1", true)).await.unwrap();
    let tx = dash.create_transaction(new_tx("tx-1", w.id, 1.0)).await.unwrap();
    dash.update_transaction(
        tx.id,
        TransactionPatch {
            status: Some(TransactionStatus::Failed),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    let calls = dash.stats().await.unwrap().webhook_calls;

    for next in [TransactionStatus::Pending, TransactionStatus::Completed] {
        let err = dash
            .update_transaction(
                tx.id,
                TransactionPatch {
                    status: Some(next),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DashboardError::Validation(_)));
    }
    assert_eq!(dash.stats().await.unwrap().webhook_calls, calls);
    assert_eq!(
        dash.transaction(tx.id).await.unwrap().status,
        TransactionStatus::Failed
    );
}

#[tokio::test]
async fn confirmations_never_decrease_while_pending() {
    let (dash, _) = dashboard();
    let w = dash.create_wallet(new_wallet("addr-1", true)).await.unwrap();
    let mut input = new_tx("tx-1", w.id, 1.0);
    input.confirmations = Some(2);
    let tx = dash.create_transaction(input).await.unwrap();

    let err = dash
        .update_transaction(
            tx.id,
            TransactionPatch {
                confirmations: Some(1),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DashboardError::Validation(_)));

    // Reaching the threshold does not complete the transaction by itself.
    let tx = dash
        .update_transaction(
            tx.id,
            TransactionPatch {
                confirmations: Some(10),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(tx.status, TransactionStatus::Pending);
}

#[tokio::test]
async fn update_checks_references() {
    let (dash, _) = dashboard();
    let w = dash.create_wallet(new_wallet("addr-1", true)).await.unwrap();
    let a = dash.create_transaction(new_tx("tx-a", w.id, 1.0)).await.unwrap();
    dash.create_transaction(new_tx("tx-b", w.id, 1.0)).await.unwrap();

    let err = dash
        .update_transaction(999, TransactionPatch::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DashboardError::NotFound(_)));

    let err = dash
        .update_transaction(
            a.id,
            TransactionPatch {
                wallet_id: Some(999),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DashboardError::NotFound(_)));

    let err = dash
        .update_transaction(
            a.id,
            TransactionPatch {
                transaction_id: Some("tx-b".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DashboardError::Conflict(_)));
}

#[tokio::test]
async fn required_confirmations_follow_bot_settings() {
    let (dash, _) = dashboard();
    let w = dash.create_wallet(new_wallet("addr-1", true)).await.unwrap();

    let settings: BotSettingsInput =
        serde_json::from_str(r#"{"token":"bot-token","trc20Confirmations":20}"#).unwrap();
    dash.save_bot_settings(settings).await.unwrap();

    let mut input = new_tx("tx-usdt", w.id, 25.0);
    input.currency = "USDT".into();
    input.network = Some("TRC20".into());
    let tx = dash.create_transaction(input).await.unwrap();
    assert_eq!(tx.required_confirmations, 20);

    let mut explicit = new_tx("tx-explicit", w.id, 1.0);
    explicit.required_confirmations = Some(1);
    let tx = dash.create_transaction(explicit).await.unwrap();
    assert_eq!(tx.required_confirmations, 1);
}

#[tokio::test]
async fn active_wallets_are_rescanned_on_every_wallet_mutation() {
    let (dash, _) = dashboard();
    let a = dash.create_wallet(new_wallet("a", true)).await.unwrap();
    let b = dash.create_wallet(new_wallet("b", true)).await.unwrap();
    dash.create_wallet(new_wallet("c", false)).await.unwrap();
    assert_eq!(dash.stats().await.unwrap().active_wallets, 2);

    dash.update_wallet(
        b.id,
        WalletPatch {
            is_active: Some(false),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    let stats = dash.stats().await.unwrap();
    assert_eq!(stats.active_wallets, 1);
    assert_eq!(stats.wallets_growth, "-1");

    assert!(dash.delete_wallet(a.id).await.unwrap());
    let remaining_active = dash
        .list_wallets()
        .await
        .unwrap()
        .iter()
        .filter(|w| w.is_active)
        .count();
    assert_eq!(dash.stats().await.unwrap().active_wallets as usize, remaining_active);
    assert_eq!(remaining_active, 0);

    let err = dash.delete_wallet(a.id).await.unwrap_err();
    assert!(matches!(err, DashboardError::NotFound(_)));
}

#[tokio::test]
async fn wallet_address_collisions_conflict() {
    let (dash, _) = dashboard();
    let a = dash.create_wallet(new_wallet("1A1zP1", true)).await.unwrap();
    let b = dash.create_wallet(new_wallet("3J98t1", true)).await.unwrap();
    assert!(a.is_active);

    let err = dash.create_wallet(new_wallet("1A1zP1", true)).await.unwrap_err();
    assert!(matches!(err, DashboardError::Conflict(_)));

    let err = dash
        .update_wallet(
            b.id,
            WalletPatch {
                address: Some("1A1zP1".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DashboardError::Conflict(_)));

    // Case-sensitive: a different casing is a different address.
    assert!(dash.create_wallet(new_wallet("1a1zp1", true)).await.is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_creates_on_one_address_admit_a_single_wallet() {
    let (dash, _) = dashboard();
    let mut handles = Vec::new();
    for _ in 0..8 {
        let dash = dash.clone();
        handles.push(tokio::spawn(async move {
            dash.create_wallet(new_wallet("same-address", true)).await
        }));
    }

    let mut ok = 0;
    let mut conflicts = 0;
    for h in handles {
        match h.await.unwrap() {
            Ok(_) => ok += 1,
            Err(DashboardError::Conflict(_)) => conflicts += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(ok, 1);
    assert_eq!(conflicts, 7);
    assert_eq!(dash.list_wallets().await.unwrap().len(), 1);
}

#[tokio::test]
async fn transaction_listing_filters_and_paginates() {
    let (dash, _) = dashboard();
    let w = dash.create_wallet(new_wallet("addr-1", true)).await.unwrap();
    for i in 0..4 {
        dash.create_transaction(new_tx(&format!("btc-{i}"), w.id, 1.0))
            .await
            .unwrap();
    }
    let mut eth = new_tx("eth-0", w.id, 2.0);
    eth.currency = "ETH".into();
    dash.create_transaction(eth).await.unwrap();

    let page = dash
        .list_transactions(TransactionQuery {
            limit: Some(2),
            offset: Some(1),
            currency: Some("BTC".into()),
        })
        .await
        .unwrap();
    assert_eq!(page.pagination.total, 4);
    assert_eq!(page.pagination.limit, 2);
    let ids: Vec<_> = page.transactions.iter().map(|t| t.transaction_id.as_str()).collect();
    assert_eq!(ids, vec!["btc-2", "btc-1"]);

    let all = dash.list_transactions(TransactionQuery::default()).await.unwrap();
    assert_eq!(all.pagination.total, 5);
    assert_eq!(all.pagination.limit, 50);
    assert_eq!(all.transactions[0].transaction_id, "eth-0");
}

#[tokio::test]
async fn recompute_repairs_drifted_totals() {
    let (dash, _) = dashboard();
    let w = dash.create_wallet(new_wallet("addr-1", true)).await.unwrap();
    dash.create_transaction(new_tx("tx-1", w.id, 4.0)).await.unwrap();

    let mut drifted = dash.stats().await.unwrap();
    drifted.total_transactions = 40;
    drifted.total_volume = 1.0;
    drifted.active_wallets = 9;
    dash.storage().save_stats(&drifted).await.unwrap();

    let fixed = dash.recompute_stats().await.unwrap();
    assert_eq!(fixed.total_transactions, 1);
    assert!((fixed.total_volume - 4.0).abs() < 1e-9);
    assert_eq!(fixed.active_wallets, 1);
    assert_eq!(fixed.webhook_calls, 1);
}

#[tokio::test]
async fn singletons_upsert_and_hide_secrets() {
    let (dash, _) = dashboard();

    let err = dash.webhook_config().await.unwrap_err();
    assert!(matches!(err, DashboardError::NotFound(_)));

    let input: WebhookConfigInput =
        serde_json::from_str(r#"{"url":"https://discord.com/api/webhooks/1/x"}"#).unwrap();
    let (cfg, created) = dash.save_webhook_config(input).await.unwrap();
    assert!(created);
    assert!(cfg.notify_success && cfg.notify_pending && cfg.notify_failed);
    assert!(!cfg.notify_wallet);

    let input: WebhookConfigInput = serde_json::from_str(
        r#"{"url":"https://discord.com/api/webhooks/2/y","notifyFailed":false}"#,
    )
    .unwrap();
    let (cfg, created) = dash.save_webhook_config(input).await.unwrap();
    assert!(!created);
    assert_eq!(cfg.id, 1);
    assert!(!cfg.notify_failed);
    assert!(cfg.notify_success);

    let settings: BotSettingsInput =
        serde_json::from_str(r#"{"token":"very-secret-token"}"#).unwrap();
    let (saved, created) = dash.save_bot_settings(settings).await.unwrap();
    assert!(created);
    assert_ne!(saved.token, "very-secret-token");
    assert_ne!(dash.bot_settings().await.unwrap().token, "very-secret-token");
}

/// Delegates to [`MemStorage`] but stalls every transaction write, so two
/// requests can both read the same row before either one writes.
struct SlowWrites {
    inner: MemStorage,
    delay: std::time::Duration,
}

#[async_trait]
impl Storage for SlowWrites {
    async fn list_wallets(&self) -> cryptobot_core::Result<Vec<Wallet>> {
        self.inner.list_wallets().await
    }
    async fn get_wallet(&self, id: i32) -> cryptobot_core::Result<Option<Wallet>> {
        self.inner.get_wallet(id).await
    }
    async fn get_wallet_by_address(&self, address: &str) -> cryptobot_core::Result<Option<Wallet>> {
        self.inner.get_wallet_by_address(address).await
    }
    async fn insert_wallet(&self, wallet: &NewWallet) -> cryptobot_core::Result<Wallet> {
        self.inner.insert_wallet(wallet).await
    }
    async fn update_wallet(
        &self,
        id: i32,
        patch: &WalletPatch,
    ) -> cryptobot_core::Result<Option<Wallet>> {
        self.inner.update_wallet(id, patch).await
    }
    async fn delete_wallet(&self, id: i32) -> cryptobot_core::Result<bool> {
        self.inner.delete_wallet(id).await
    }
    async fn list_transactions(
        &self,
        limit: i64,
        offset: i64,
        currency: Option<&str>,
    ) -> cryptobot_core::Result<Vec<Transaction>> {
        self.inner.list_transactions(limit, offset, currency).await
    }
    async fn count_transactions(&self, currency: Option<&str>) -> cryptobot_core::Result<i64> {
        self.inner.count_transactions(currency).await
    }
    async fn transaction_totals(&self) -> cryptobot_core::Result<TransactionTotals> {
        self.inner.transaction_totals().await
    }
    async fn get_transaction(&self, id: i32) -> cryptobot_core::Result<Option<Transaction>> {
        self.inner.get_transaction(id).await
    }
    async fn get_transaction_by_external_id(
        &self,
        transaction_id: &str,
    ) -> cryptobot_core::Result<Option<Transaction>> {
        self.inner.get_transaction_by_external_id(transaction_id).await
    }
    async fn insert_transaction(
        &self,
        record: &TransactionRecord,
    ) -> cryptobot_core::Result<Transaction> {
        self.inner.insert_transaction(record).await
    }
    async fn update_transaction(
        &self,
        id: i32,
        expected: TransactionStatus,
        patch: &TransactionPatch,
    ) -> cryptobot_core::Result<Option<Transaction>> {
        tokio::time::sleep(self.delay).await;
        self.inner.update_transaction(id, expected, patch).await
    }
    async fn get_webhook_config(&self) -> cryptobot_core::Result<Option<WebhookConfig>> {
        self.inner.get_webhook_config().await
    }
    async fn upsert_webhook_config(
        &self,
        patch: &WebhookConfigPatch,
    ) -> cryptobot_core::Result<(WebhookConfig, bool)> {
        self.inner.upsert_webhook_config(patch).await
    }
    async fn update_webhook_config(
        &self,
        patch: &WebhookConfigPatch,
    ) -> cryptobot_core::Result<Option<WebhookConfig>> {
        self.inner.update_webhook_config(patch).await
    }
    async fn get_bot_settings(&self) -> cryptobot_core::Result<Option<BotSettings>> {
        self.inner.get_bot_settings().await
    }
    async fn upsert_bot_settings(
        &self,
        patch: &BotSettingsPatch,
    ) -> cryptobot_core::Result<(BotSettings, bool)> {
        self.inner.upsert_bot_settings(patch).await
    }
    async fn update_bot_settings(
        &self,
        patch: &BotSettingsPatch,
    ) -> cryptobot_core::Result<Option<BotSettings>> {
        self.inner.update_bot_settings(patch).await
    }
    async fn load_stats(&self) -> cryptobot_core::Result<Stats> {
        self.inner.load_stats().await
    }
    async fn save_stats(&self, stats: &Stats) -> cryptobot_core::Result<Stats> {
        self.inner.save_stats(stats).await
    }
}

fn slow_dashboard() -> Dashboard {
    Dashboard::new(Arc::new(SlowWrites {
        inner: MemStorage::new(),
        delay: std::time::Duration::from_millis(50),
    }))
}

fn status_patch(status: TransactionStatus) -> TransactionPatch {
    TransactionPatch {
        status: Some(status),
        ..Default::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_status_changes_admit_one_transition() {
    let dash = slow_dashboard();
    let w = dash.create_wallet(new_wallet("addr-1", true)).await.unwrap();
    let tx = dash.create_transaction(new_tx("tx-1", w.id, 1.0)).await.unwrap();

    let completed = {
        let dash = dash.clone();
        tokio::spawn(async move {
            dash.update_transaction(tx.id, status_patch(TransactionStatus::Completed))
                .await
        })
    };
    let failed = {
        let dash = dash.clone();
        tokio::spawn(async move {
            dash.update_transaction(tx.id, status_patch(TransactionStatus::Failed))
                .await
        })
    };
    let results = [completed.await.unwrap(), failed.await.unwrap()];

    let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1);
    for r in &results {
        if let Err(e) = r {
            assert!(matches!(e, DashboardError::Validation(_)), "unexpected error: {e}");
        }
    }

    let stored = dash.transaction(tx.id).await.unwrap();
    assert_eq!(stored.status, winners[0].status);
    // One create plus exactly one status change.
    assert_eq!(dash.stats().await.unwrap().webhook_calls, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stale_confirmation_write_cannot_go_backwards() {
    let dash = slow_dashboard();
    let w = dash.create_wallet(new_wallet("addr-1", true)).await.unwrap();
    let tx = dash.create_transaction(new_tx("tx-1", w.id, 1.0)).await.unwrap();

    let confirm = |n: i32| {
        let dash = dash.clone();
        tokio::spawn(async move {
            dash.update_transaction(
                tx.id,
                TransactionPatch {
                    confirmations: Some(n),
                    ..Default::default()
                },
            )
            .await
        })
    };
    let high = confirm(5);
    // Let the higher count reach storage first.
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    let low = confirm(2);
    let (high, low) = (high.await.unwrap(), low.await.unwrap());

    assert!(high.is_ok());
    assert!(matches!(low, Err(DashboardError::Validation(_))));
    assert_eq!(dash.transaction(tx.id).await.unwrap().confirmations, 5);
}

#[tokio::test]
async fn disabled_toggle_still_counts_the_webhook_call() {
    // Default notifier honours the toggles; the counter does not.
    let dash = Dashboard::new(Arc::new(MemStorage::new()));
    let input: WebhookConfigInput = serde_json::from_str(
        r#"{"url":"https://discord.com/api/webhooks/1/x","notifyPending":false,"notifyFailed":false}"#,
    )
    .unwrap();
    let (cfg, _) = dash.save_webhook_config(input).await.unwrap();
    assert!(!cfg.wants(TransactionStatus::Pending));
    assert!(!cfg.wants(TransactionStatus::Failed));

    let w = dash.create_wallet(new_wallet("addr-1", true)).await.unwrap();
    let tx = dash.create_transaction(new_tx("tx-1", w.id, 1.0)).await.unwrap();
    assert_eq!(dash.stats().await.unwrap().webhook_calls, 1);

    dash.update_transaction(tx.id, status_patch(TransactionStatus::Failed))
        .await
        .unwrap();
    assert_eq!(dash.stats().await.unwrap().webhook_calls, 2);
}

#[tokio::test]
async fn amount_edit_keeps_total_volume_in_step() {
    let (dash, _) = dashboard();
    let w = dash.create_wallet(new_wallet("addr-1", true)).await.unwrap();
    let a = dash.create_transaction(new_tx("tx-a", w.id, 2.0)).await.unwrap();
    dash.create_transaction(new_tx("tx-b", w.id, 3.0)).await.unwrap();

    dash.update_transaction(
        a.id,
        TransactionPatch {
            amount: Some(4.5),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let live = dash.stats().await.unwrap();
    assert!((live.total_volume - 7.5).abs() < 1e-9);
    assert_eq!(live.webhook_calls, 2);

    let rebuilt = dash.recompute_stats().await.unwrap();
    assert!((rebuilt.total_volume - live.total_volume).abs() < 1e-9);
}
