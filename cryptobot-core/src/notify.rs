//! Outbound notification events. Delivery to Discord is handled outside this
//! crate; the default [`TracingNotifier`] only logs what would be sent.

use crate::models::{Transaction, TransactionStatus, WebhookConfig};
use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TransactionEventKind {
    Created,
    StatusChanged { from: TransactionStatus },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionEvent {
    pub kind: TransactionEventKind,
    pub transaction: Transaction,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Called once per counted webhook call. `config` is the current webhook
    /// configuration, if one has been saved.
    async fn notify(&self, event: &TransactionEvent, config: Option<&WebhookConfig>);
}

/// The configuration to deliver `event` to, if any toggle asks for it.
pub fn delivery_target<'a>(
    event: &TransactionEvent,
    config: Option<&'a WebhookConfig>,
) -> Option<&'a WebhookConfig> {
    config.filter(|c| c.wants(event.transaction.status))
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, event: &TransactionEvent, config: Option<&WebhookConfig>) {
        let tx = &event.transaction;
        let Some(config) = delivery_target(event, config) else {
            debug!(
                transaction_id = %tx.transaction_id,
                status = %tx.status,
                configured = config.is_some(),
                "notification not delivered"
            );
            return;
        };
        info!(
            url = %config.url,
            transaction_id = %tx.transaction_id,
            status = %tx.status,
            amount = tx.amount,
            currency = %tx.currency,
            event = ?event.kind,
            "webhook notification"
        );
    }
}
