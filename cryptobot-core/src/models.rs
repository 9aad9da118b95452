use crate::error::{DashboardError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Placeholder returned instead of any stored secret.
pub const SECRET_MASK: &str = "••••••••••••••••••••••••••";

fn default_true() -> bool {
    true
}

fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(DashboardError::validation(format!("{field} must not be empty")));
    }
    Ok(())
}

fn require_non_negative(field: &str, value: Option<i32>) -> Result<()> {
    match value {
        Some(v) if v < 0 => Err(DashboardError::validation(format!(
            "{field} must not be negative"
        ))),
        _ => Ok(()),
    }
}

fn require_positive_amount(amount: f64) -> Result<()> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(DashboardError::validation("amount must be a positive number"));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    pub id: i32,
    pub name: String,
    pub address: String,
    pub currency: String,
    pub network: Option<String>,
    pub discord_user_id: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewWallet {
    pub name: String,
    pub address: String,
    pub currency: String,
    #[serde(default)]
    pub network: Option<String>,
    #[serde(default)]
    pub discord_user_id: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl NewWallet {
    pub fn validate(&self) -> Result<()> {
        require_non_empty("name", &self.name)?;
        require_non_empty("address", &self.address)?;
        require_non_empty("currency", &self.currency)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletPatch {
    pub name: Option<String>,
    pub address: Option<String>,
    pub currency: Option<String>,
    pub network: Option<String>,
    pub discord_user_id: Option<String>,
    pub is_active: Option<bool>,
}

impl WalletPatch {
    pub fn validate(&self) -> Result<()> {
        if let Some(name) = &self.name {
            require_non_empty("name", name)?;
        }
        if let Some(address) = &self.address {
            require_non_empty("address", address)?;
        }
        if let Some(currency) = &self.currency {
            require_non_empty("currency", currency)?;
        }
        Ok(())
    }
}

impl Wallet {
    pub fn apply(&mut self, patch: &WalletPatch) {
        if let Some(v) = &patch.name {
            self.name = v.clone();
        }
        if let Some(v) = &patch.address {
            self.address = v.clone();
        }
        if let Some(v) = &patch.currency {
            self.currency = v.clone();
        }
        if let Some(v) = &patch.network {
            self.network = Some(v.clone());
        }
        if let Some(v) = &patch.discord_user_id {
            self.discord_user_id = Some(v.clone());
        }
        if let Some(v) = patch.is_active {
            self.is_active = v;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }

    /// Only pending transactions may move, and only to a terminal status.
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        matches!(
            (self, next),
            (TransactionStatus::Pending, TransactionStatus::Completed)
                | (TransactionStatus::Pending, TransactionStatus::Failed)
        )
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = DashboardError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "completed" => Ok(TransactionStatus::Completed),
            "failed" => Ok(TransactionStatus::Failed),
            other => Err(DashboardError::Internal(format!(
                "unknown transaction status: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: i32,
    pub transaction_id: String,
    pub amount: f64,
    pub currency: String,
    pub network: Option<String>,
    pub confirmations: i32,
    pub required_confirmations: i32,
    pub status: TransactionStatus,
    pub wallet_id: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    pub fn apply(&mut self, patch: &TransactionPatch, now: DateTime<Utc>) {
        if let Some(v) = &patch.transaction_id {
            self.transaction_id = v.clone();
        }
        if let Some(v) = patch.amount {
            self.amount = v;
        }
        if let Some(v) = &patch.currency {
            self.currency = v.clone();
        }
        if let Some(v) = &patch.network {
            self.network = Some(v.clone());
        }
        if let Some(v) = patch.confirmations {
            self.confirmations = v;
        }
        if let Some(v) = patch.required_confirmations {
            self.required_confirmations = v;
        }
        if let Some(v) = patch.wallet_id {
            self.wallet_id = v;
        }
        if let Some(v) = patch.status {
            self.status = v;
        }
        self.updated_at = now;
    }
}

/// Request body for creating a transaction.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTransaction {
    pub transaction_id: String,
    pub amount: f64,
    pub currency: String,
    #[serde(default)]
    pub network: Option<String>,
    #[serde(default)]
    pub confirmations: Option<i32>,
    #[serde(default)]
    pub required_confirmations: Option<i32>,
    pub wallet_id: i32,
}

impl NewTransaction {
    pub fn validate(&self) -> Result<()> {
        require_non_empty("transactionId", &self.transaction_id)?;
        require_non_empty("currency", &self.currency)?;
        require_positive_amount(self.amount)?;
        require_non_negative("confirmations", self.confirmations)?;
        require_non_negative("requiredConfirmations", self.required_confirmations)
    }
}

/// Fully resolved transaction row handed to storage.
#[derive(Debug, Clone)]
pub struct TransactionRecord {
    pub transaction_id: String,
    pub amount: f64,
    pub currency: String,
    pub network: Option<String>,
    pub confirmations: i32,
    pub required_confirmations: i32,
    pub status: TransactionStatus,
    pub wallet_id: i32,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionPatch {
    pub transaction_id: Option<String>,
    pub amount: Option<f64>,
    pub currency: Option<String>,
    pub network: Option<String>,
    pub confirmations: Option<i32>,
    pub required_confirmations: Option<i32>,
    pub wallet_id: Option<i32>,
    pub status: Option<TransactionStatus>,
}

impl TransactionPatch {
    pub fn validate(&self) -> Result<()> {
        if let Some(v) = &self.transaction_id {
            require_non_empty("transactionId", v)?;
        }
        if let Some(v) = &self.currency {
            require_non_empty("currency", v)?;
        }
        if let Some(v) = self.amount {
            require_positive_amount(v)?;
        }
        require_non_negative("confirmations", self.confirmations)?;
        require_non_negative("requiredConfirmations", self.required_confirmations)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct WebhookConfig {
    pub id: i32,
    pub url: String,
    pub notify_success: bool,
    pub notify_pending: bool,
    pub notify_failed: bool,
    pub notify_wallet: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WebhookConfig {
    /// Whether a transaction in `status` should produce an outbound notification.
    pub fn wants(&self, status: TransactionStatus) -> bool {
        match status {
            TransactionStatus::Pending => self.notify_pending,
            TransactionStatus::Completed => self.notify_success,
            TransactionStatus::Failed => self.notify_failed,
        }
    }

    pub fn apply(&mut self, patch: &WebhookConfigPatch, now: DateTime<Utc>) {
        if let Some(v) = &patch.url {
            self.url = v.clone();
        }
        if let Some(v) = patch.notify_success {
            self.notify_success = v;
        }
        if let Some(v) = patch.notify_pending {
            self.notify_pending = v;
        }
        if let Some(v) = patch.notify_failed {
            self.notify_failed = v;
        }
        if let Some(v) = patch.notify_wallet {
            self.notify_wallet = v;
        }
        self.updated_at = now;
    }
}

fn validate_webhook_url(raw: &str) -> Result<()> {
    let parsed = url::Url::parse(raw)
        .map_err(|e| DashboardError::validation(format!("url is not valid: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(DashboardError::validation(format!(
            "url scheme must be http or https, got {other}"
        ))),
    }
}

/// POST body: `url` is required, toggles fall back to their column defaults
/// on creation and are left untouched when omitted on an existing row.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookConfigInput {
    pub url: String,
    #[serde(default)]
    pub notify_success: Option<bool>,
    #[serde(default)]
    pub notify_pending: Option<bool>,
    #[serde(default)]
    pub notify_failed: Option<bool>,
    #[serde(default)]
    pub notify_wallet: Option<bool>,
}

impl WebhookConfigInput {
    pub fn validate(&self) -> Result<()> {
        validate_webhook_url(&self.url)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookConfigPatch {
    pub url: Option<String>,
    pub notify_success: Option<bool>,
    pub notify_pending: Option<bool>,
    pub notify_failed: Option<bool>,
    pub notify_wallet: Option<bool>,
}

impl WebhookConfigPatch {
    pub fn validate(&self) -> Result<()> {
        match &self.url {
            Some(url) => validate_webhook_url(url),
            None => Ok(()),
        }
    }
}

impl From<WebhookConfigInput> for WebhookConfigPatch {
    fn from(input: WebhookConfigInput) -> Self {
        WebhookConfigPatch {
            url: Some(input.url),
            notify_success: input.notify_success,
            notify_pending: input.notify_pending,
            notify_failed: input.notify_failed,
            notify_wallet: input.notify_wallet,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct BotSettings {
    pub id: i32,
    pub token: String,
    pub bitcoin_confirmations: i32,
    pub ethereum_confirmations: i32,
    pub litecoin_confirmations: i32,
    pub erc20_confirmations: i32,
    pub trc20_confirmations: i32,
    pub bep20_confirmations: i32,
    pub polygon_confirmations: i32,
    pub solana_confirmations: i32,
    pub discord_client_id: Option<String>,
    pub discord_client_secret: Option<String>,
    pub discord_redirect_uri: Option<String>,
    pub discord_guild_id: Option<String>,
    pub gitbook_api_key: Option<String>,
    pub gitbook_space_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BotSettings {
    /// Copy safe to hand to API callers: every secret is replaced by [`SECRET_MASK`].
    pub fn redacted(&self) -> BotSettings {
        let mask = |v: &Option<String>| v.as_ref().map(|_| SECRET_MASK.to_string());
        BotSettings {
            token: SECRET_MASK.to_string(),
            discord_client_secret: mask(&self.discord_client_secret),
            gitbook_api_key: mask(&self.gitbook_api_key),
            ..self.clone()
        }
    }

    pub fn apply(&mut self, patch: &BotSettingsPatch, now: DateTime<Utc>) {
        macro_rules! set {
            ($($field:ident),*) => {
                $(if let Some(v) = &patch.$field { self.$field = v.clone(); })*
            };
        }
        macro_rules! set_opt {
            ($($field:ident),*) => {
                $(if let Some(v) = &patch.$field { self.$field = Some(v.clone()); })*
            };
        }
        set!(
            token,
            bitcoin_confirmations,
            ethereum_confirmations,
            litecoin_confirmations,
            erc20_confirmations,
            trc20_confirmations,
            bep20_confirmations,
            polygon_confirmations,
            solana_confirmations
        );
        set_opt!(
            discord_client_id,
            discord_client_secret,
            discord_redirect_uri,
            discord_guild_id,
            gitbook_api_key,
            gitbook_space_id
        );
        self.updated_at = now;
    }
}

/// POST body: only `token` is required.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotSettingsInput {
    pub token: String,
    #[serde(flatten)]
    pub rest: BotSettingsPatch,
}

/// Default confirmation thresholds per chain / token network.
pub mod defaults {
    pub fn bitcoin() -> i32 {
        3
    }
    pub fn ethereum() -> i32 {
        15
    }
    pub fn litecoin() -> i32 {
        6
    }
    pub fn erc20() -> i32 {
        12
    }
    pub fn trc20() -> i32 {
        15
    }
    pub fn bep20() -> i32 {
        10
    }
    pub fn polygon() -> i32 {
        15
    }
    pub fn solana() -> i32 {
        32
    }
}

fn require_threshold(field: &str, value: Option<i32>) -> Result<()> {
    match value {
        Some(v) if v < 1 => Err(DashboardError::validation(format!(
            "{field} must be at least 1"
        ))),
        _ => Ok(()),
    }
}

impl BotSettingsInput {
    pub fn validate(&self) -> Result<()> {
        require_non_empty("token", &self.token)?;
        self.rest.validate()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotSettingsPatch {
    pub token: Option<String>,
    pub bitcoin_confirmations: Option<i32>,
    pub ethereum_confirmations: Option<i32>,
    pub litecoin_confirmations: Option<i32>,
    pub erc20_confirmations: Option<i32>,
    pub trc20_confirmations: Option<i32>,
    pub bep20_confirmations: Option<i32>,
    pub polygon_confirmations: Option<i32>,
    pub solana_confirmations: Option<i32>,
    pub discord_client_id: Option<String>,
    pub discord_client_secret: Option<String>,
    pub discord_redirect_uri: Option<String>,
    pub discord_guild_id: Option<String>,
    pub gitbook_api_key: Option<String>,
    pub gitbook_space_id: Option<String>,
}

impl BotSettingsPatch {
    pub fn validate(&self) -> Result<()> {
        if let Some(token) = &self.token {
            require_non_empty("token", token)?;
        }
        require_threshold("bitcoinConfirmations", self.bitcoin_confirmations)?;
        require_threshold("ethereumConfirmations", self.ethereum_confirmations)?;
        require_threshold("litecoinConfirmations", self.litecoin_confirmations)?;
        require_threshold("erc20Confirmations", self.erc20_confirmations)?;
        require_threshold("trc20Confirmations", self.trc20_confirmations)?;
        require_threshold("bep20Confirmations", self.bep20_confirmations)?;
        require_threshold("polygonConfirmations", self.polygon_confirmations)?;
        require_threshold("solanaConfirmations", self.solana_confirmations)
    }
}

impl From<BotSettingsInput> for BotSettingsPatch {
    fn from(input: BotSettingsInput) -> Self {
        BotSettingsPatch {
            token: Some(input.token),
            ..input.rest
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub id: i32,
    pub total_transactions: i32,
    pub total_volume: f64,
    pub active_wallets: i32,
    pub webhook_calls: i32,
    pub transactions_growth: String,
    pub volume_growth: String,
    pub wallets_growth: String,
    pub webhooks_growth: String,
    pub updated_at: DateTime<Utc>,
}

impl Default for Stats {
    fn default() -> Self {
        Stats {
            id: 1,
            total_transactions: 0,
            total_volume: 0.0,
            active_wallets: 0,
            webhook_calls: 0,
            transactions_growth: "0%".to_string(),
            volume_growth: "0%".to_string(),
            wallets_growth: "0".to_string(),
            webhooks_growth: "0%".to_string(),
            updated_at: Utc::now(),
        }
    }
}
