//! Stats aggregation. Every mutating event is folded into the singleton
//! [`Stats`] row by one of the `record_*` methods; growth strings are
//! recomputed only for the counters the event touched.

use crate::models::Stats;
use chrono::{DateTime, Utc};

/// Sums over the full transaction table, used when rebuilding stats.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TransactionTotals {
    pub count: i64,
    pub volume: f64,
}

/// Relative change from `prev` to `next` as a signed percent string.
pub fn percent_growth(prev: f64, next: f64) -> String {
    if next == prev {
        return "0%".to_string();
    }
    let pct = if prev == 0.0 {
        100.0_f64.copysign(next)
    } else {
        (next - prev) / prev.abs() * 100.0
    };
    format!("{pct:+.1}%")
}

/// Absolute change from `prev` to `next`, e.g. `+2`, `-1`, `0`.
pub fn count_growth(prev: i64, next: i64) -> String {
    match next - prev {
        0 => "0".to_string(),
        d => format!("{d:+}"),
    }
}

fn clamp_i32(v: i64) -> i32 {
    v.clamp(0, i32::MAX as i64) as i32
}

impl Stats {
    fn bump_webhook_calls(&mut self) {
        let prev = self.webhook_calls;
        self.webhook_calls = prev.saturating_add(1);
        self.webhooks_growth = percent_growth(prev as f64, self.webhook_calls as f64);
    }

    /// A transaction was created: count, volume and one outbound notification.
    pub fn record_transaction_created(&mut self, amount: f64, now: DateTime<Utc>) {
        let prev_count = self.total_transactions;
        let prev_volume = self.total_volume;
        self.total_transactions = prev_count.saturating_add(1);
        self.total_volume = prev_volume + amount;
        self.transactions_growth =
            percent_growth(prev_count as f64, self.total_transactions as f64);
        self.volume_growth = percent_growth(prev_volume, self.total_volume);
        self.bump_webhook_calls();
        self.updated_at = now;
    }

    /// A transaction's amount was edited; the volume follows the difference.
    pub fn record_amount_change(&mut self, prev_amount: f64, next_amount: f64, now: DateTime<Utc>) {
        let prev_volume = self.total_volume;
        self.total_volume = prev_volume + (next_amount - prev_amount);
        self.volume_growth = percent_growth(prev_volume, self.total_volume);
        self.updated_at = now;
    }

    /// A transaction changed status: one outbound notification.
    pub fn record_status_change(&mut self, now: DateTime<Utc>) {
        self.bump_webhook_calls();
        self.updated_at = now;
    }

    /// Store a freshly scanned active-wallet count.
    pub fn record_active_wallets(&mut self, active: usize, now: DateTime<Utc>) {
        let prev = self.active_wallets;
        self.active_wallets = clamp_i32(active as i64);
        self.wallets_growth = count_growth(prev as i64, self.active_wallets as i64);
        self.updated_at = now;
    }

    /// Replace the derived totals with values from a full rescan.
    /// `webhook_calls` has no source of truth outside this row and is kept.
    pub fn reconcile(&mut self, totals: TransactionTotals, active: usize, now: DateTime<Utc>) {
        let prev_count = self.total_transactions;
        let prev_volume = self.total_volume;
        self.total_transactions = clamp_i32(totals.count);
        self.total_volume = totals.volume;
        self.transactions_growth =
            percent_growth(prev_count as f64, self.total_transactions as f64);
        self.volume_growth = percent_growth(prev_volume, self.total_volume);
        self.record_active_wallets(active, now);
    }
}
