use crate::error::Result;
use crate::models::{
    BotSettings, BotSettingsPatch, NewWallet, Stats, Transaction, TransactionPatch,
    TransactionRecord, TransactionStatus, Wallet, WalletPatch, WebhookConfig, WebhookConfigPatch,
};
use crate::stats::TransactionTotals;
use crate::storage::Storage;
use async_trait::async_trait;
use sqlx::{
    postgres::{PgPoolOptions, PgRow},
    FromRow, PgPool, Row,
};

pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;
    Ok(pool)
}

pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    // Embed migrations from the workspace-level `migrations` directory.
    sqlx::migrate!("../migrations").run(pool).await?;
    Ok(())
}

const WALLET_COLUMNS: &str =
    "id, name, address, currency, network, discord_user_id, is_active, created_at";

const TRANSACTION_COLUMNS: &str = "id, transaction_id, amount, currency, network, confirmations, \
     required_confirmations, status, wallet_id, created_at, updated_at";

const WEBHOOK_COLUMNS: &str = "id, url, notify_success, notify_pending, notify_failed, \
     notify_wallet, created_at, updated_at";

const BOT_SETTINGS_COLUMNS: &str = "id, token, bitcoin_confirmations, ethereum_confirmations, \
     litecoin_confirmations, erc20_confirmations, trc20_confirmations, bep20_confirmations, \
     polygon_confirmations, solana_confirmations, discord_client_id, discord_client_secret, \
     discord_redirect_uri, discord_guild_id, gitbook_api_key, gitbook_space_id, created_at, \
     updated_at";

const STATS_COLUMNS: &str = "id, total_transactions, total_volume, active_wallets, webhook_calls, \
     transactions_growth, volume_growth, wallets_growth, webhooks_growth, updated_at";

// Status is stored as TEXT, so transactions are mapped by hand.
fn transaction_from_row(row: &PgRow) -> Result<Transaction> {
    let status: String = row.try_get("status")?;
    Ok(Transaction {
        id: row.try_get("id")?,
        transaction_id: row.try_get("transaction_id")?,
        amount: row.try_get("amount")?,
        currency: row.try_get("currency")?,
        network: row.try_get("network")?,
        confirmations: row.try_get("confirmations")?,
        required_confirmations: row.try_get("required_confirmations")?,
        status: status.parse()?,
        wallet_id: row.try_get("wallet_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub async fn get_wallets(pool: &PgPool) -> Result<Vec<Wallet>> {
    let rows = sqlx::query_as::<_, Wallet>(&format!(
        "SELECT {WALLET_COLUMNS} FROM wallets ORDER BY id ASC"
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn get_wallet_by_id(pool: &PgPool, id: i32) -> Result<Option<Wallet>> {
    let row = sqlx::query_as::<_, Wallet>(&format!(
        "SELECT {WALLET_COLUMNS} FROM wallets WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn get_wallet_by_address(pool: &PgPool, address: &str) -> Result<Option<Wallet>> {
    let row = sqlx::query_as::<_, Wallet>(&format!(
        "SELECT {WALLET_COLUMNS} FROM wallets WHERE address = $1"
    ))
    .bind(address)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn insert_wallet(pool: &PgPool, w: &NewWallet) -> Result<Wallet> {
    let row = sqlx::query_as::<_, Wallet>(&format!(
        r#"
        INSERT INTO wallets (name, address, currency, network, discord_user_id, is_active)
        VALUES ($1,$2,$3,$4,$5,$6)
        RETURNING {WALLET_COLUMNS}
        "#
    ))
    .bind(&w.name)
    .bind(&w.address)
    .bind(&w.currency)
    .bind(&w.network)
    .bind(&w.discord_user_id)
    .bind(w.is_active)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn update_wallet(pool: &PgPool, id: i32, patch: &WalletPatch) -> Result<Option<Wallet>> {
    let row = sqlx::query_as::<_, Wallet>(&format!(
        r#"
        UPDATE wallets SET
            name = COALESCE($2, name),
            address = COALESCE($3, address),
            currency = COALESCE($4, currency),
            network = COALESCE($5, network),
            discord_user_id = COALESCE($6, discord_user_id),
            is_active = COALESCE($7, is_active)
        WHERE id = $1
        RETURNING {WALLET_COLUMNS}
        "#
    ))
    .bind(id)
    .bind(&patch.name)
    .bind(&patch.address)
    .bind(&patch.currency)
    .bind(&patch.network)
    .bind(&patch.discord_user_id)
    .bind(patch.is_active)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn delete_wallet(pool: &PgPool, id: i32) -> Result<bool> {
    let result = sqlx::query("DELETE FROM wallets WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn get_transactions(
    pool: &PgPool,
    limit: i64,
    offset: i64,
    currency: Option<&str>,
) -> Result<Vec<Transaction>> {
    let rows = if let Some(currency) = currency {
        sqlx::query(&format!(
            r#"
            SELECT {TRANSACTION_COLUMNS}
            FROM transactions
            WHERE currency = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(currency)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?
    } else {
        sqlx::query(&format!(
            r#"
            SELECT {TRANSACTION_COLUMNS}
            FROM transactions
            ORDER BY created_at DESC, id DESC
            LIMIT $1 OFFSET $2
            "#
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?
    };

    rows.iter().map(transaction_from_row).collect()
}

pub async fn count_transactions(pool: &PgPool, currency: Option<&str>) -> Result<i64> {
    let count: i64 = if let Some(currency) = currency {
        sqlx::query_scalar("SELECT COUNT(*) FROM transactions WHERE currency = $1")
            .bind(currency)
            .fetch_one(pool)
            .await?
    } else {
        sqlx::query_scalar("SELECT COUNT(*) FROM transactions")
            .fetch_one(pool)
            .await?
    };
    Ok(count)
}

pub async fn get_transaction_totals(pool: &PgPool) -> Result<TransactionTotals> {
    let row = sqlx::query(
        r#"
        SELECT COUNT(*) AS count, COALESCE(SUM(amount), 0)::DOUBLE PRECISION AS volume
        FROM transactions
        "#,
    )
    .fetch_one(pool)
    .await?;

    Ok(TransactionTotals {
        count: row.try_get("count")?,
        volume: row.try_get("volume")?,
    })
}

pub async fn get_transaction_by_id(pool: &PgPool, id: i32) -> Result<Option<Transaction>> {
    let row = sqlx::query(&format!(
        "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(transaction_from_row).transpose()
}

pub async fn get_transaction_by_external_id(
    pool: &PgPool,
    transaction_id: &str,
) -> Result<Option<Transaction>> {
    let row = sqlx::query(&format!(
        "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE transaction_id = $1"
    ))
    .bind(transaction_id)
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(transaction_from_row).transpose()
}

pub async fn insert_transaction(pool: &PgPool, t: &TransactionRecord) -> Result<Transaction> {
    let row = sqlx::query(&format!(
        r#"
        INSERT INTO transactions (
            transaction_id,
            amount,
            currency,
            network,
            confirmations,
            required_confirmations,
            status,
            wallet_id
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8)
        RETURNING {TRANSACTION_COLUMNS}
        "#
    ))
    .bind(&t.transaction_id)
    .bind(t.amount)
    .bind(&t.currency)
    .bind(&t.network)
    .bind(t.confirmations)
    .bind(t.required_confirmations)
    .bind(t.status.as_str())
    .bind(t.wallet_id)
    .fetch_one(pool)
    .await?;
    transaction_from_row(&row)
}

/// Conditional on the stored status; see [`Storage::update_transaction`].
pub async fn update_transaction(
    pool: &PgPool,
    id: i32,
    expected: TransactionStatus,
    patch: &TransactionPatch,
) -> Result<Option<Transaction>> {
    let row = sqlx::query(&format!(
        r#"
        UPDATE transactions SET
            transaction_id = COALESCE($2, transaction_id),
            amount = COALESCE($3, amount),
            currency = COALESCE($4, currency),
            network = COALESCE($5, network),
            confirmations = COALESCE($6, confirmations),
            required_confirmations = COALESCE($7, required_confirmations),
            wallet_id = COALESCE($8, wallet_id),
            status = COALESCE($9, status),
            updated_at = NOW()
        WHERE id = $1
          AND status = $10
          AND ($6::INT IS NULL OR status <> 'pending' OR confirmations <= $6)
        RETURNING {TRANSACTION_COLUMNS}
        "#
    ))
    .bind(id)
    .bind(&patch.transaction_id)
    .bind(patch.amount)
    .bind(&patch.currency)
    .bind(&patch.network)
    .bind(patch.confirmations)
    .bind(patch.required_confirmations)
    .bind(patch.wallet_id)
    .bind(patch.status.map(|s| s.as_str()))
    .bind(expected.as_str())
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(transaction_from_row).transpose()
}

pub async fn get_webhook_config(pool: &PgPool) -> Result<Option<WebhookConfig>> {
    let row = sqlx::query_as::<_, WebhookConfig>(&format!(
        "SELECT {WEBHOOK_COLUMNS} FROM webhook_configs WHERE id = 1"
    ))
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn upsert_webhook_config(
    pool: &PgPool,
    patch: &WebhookConfigPatch,
) -> Result<(WebhookConfig, bool)> {
    // xmax is zero only for a row version created by this statement's INSERT.
    let row = sqlx::query(&format!(
        r#"
        INSERT INTO webhook_configs (id, url, notify_success, notify_pending, notify_failed, notify_wallet)
        VALUES (1, $1, COALESCE($2, TRUE), COALESCE($3, TRUE), COALESCE($4, TRUE), COALESCE($5, FALSE))
        ON CONFLICT (id) DO UPDATE SET
            url = COALESCE($1, webhook_configs.url),
            notify_success = COALESCE($2, webhook_configs.notify_success),
            notify_pending = COALESCE($3, webhook_configs.notify_pending),
            notify_failed = COALESCE($4, webhook_configs.notify_failed),
            notify_wallet = COALESCE($5, webhook_configs.notify_wallet),
            updated_at = NOW()
        RETURNING {WEBHOOK_COLUMNS}, (xmax = 0) AS inserted
        "#
    ))
    .bind(&patch.url)
    .bind(patch.notify_success)
    .bind(patch.notify_pending)
    .bind(patch.notify_failed)
    .bind(patch.notify_wallet)
    .fetch_one(pool)
    .await?;

    let inserted: bool = row.try_get("inserted")?;
    Ok((WebhookConfig::from_row(&row)?, inserted))
}

pub async fn update_webhook_config(
    pool: &PgPool,
    patch: &WebhookConfigPatch,
) -> Result<Option<WebhookConfig>> {
    let row = sqlx::query_as::<_, WebhookConfig>(&format!(
        r#"
        UPDATE webhook_configs SET
            url = COALESCE($1, url),
            notify_success = COALESCE($2, notify_success),
            notify_pending = COALESCE($3, notify_pending),
            notify_failed = COALESCE($4, notify_failed),
            notify_wallet = COALESCE($5, notify_wallet),
            updated_at = NOW()
        WHERE id = 1
        RETURNING {WEBHOOK_COLUMNS}
        "#
    ))
    .bind(&patch.url)
    .bind(patch.notify_success)
    .bind(patch.notify_pending)
    .bind(patch.notify_failed)
    .bind(patch.notify_wallet)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn get_bot_settings(pool: &PgPool) -> Result<Option<BotSettings>> {
    let row = sqlx::query_as::<_, BotSettings>(&format!(
        "SELECT {BOT_SETTINGS_COLUMNS} FROM bot_settings WHERE id = 1"
    ))
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn upsert_bot_settings(
    pool: &PgPool,
    patch: &BotSettingsPatch,
) -> Result<(BotSettings, bool)> {
    let row = sqlx::query(&format!(
        r#"
        INSERT INTO bot_settings (
            id,
            token,
            bitcoin_confirmations,
            ethereum_confirmations,
            litecoin_confirmations,
            erc20_confirmations,
            trc20_confirmations,
            bep20_confirmations,
            polygon_confirmations,
            solana_confirmations,
            discord_client_id,
            discord_client_secret,
            discord_redirect_uri,
            discord_guild_id,
            gitbook_api_key,
            gitbook_space_id
        ) VALUES (
            1, $1,
            COALESCE($2, 3), COALESCE($3, 15), COALESCE($4, 6), COALESCE($5, 12),
            COALESCE($6, 15), COALESCE($7, 10), COALESCE($8, 15), COALESCE($9, 32),
            $10, $11, $12, $13, $14, $15
        )
        ON CONFLICT (id) DO UPDATE SET
            token = COALESCE($1, bot_settings.token),
            bitcoin_confirmations = COALESCE($2, bot_settings.bitcoin_confirmations),
            ethereum_confirmations = COALESCE($3, bot_settings.ethereum_confirmations),
            litecoin_confirmations = COALESCE($4, bot_settings.litecoin_confirmations),
            erc20_confirmations = COALESCE($5, bot_settings.erc20_confirmations),
            trc20_confirmations = COALESCE($6, bot_settings.trc20_confirmations),
            bep20_confirmations = COALESCE($7, bot_settings.bep20_confirmations),
            polygon_confirmations = COALESCE($8, bot_settings.polygon_confirmations),
            solana_confirmations = COALESCE($9, bot_settings.solana_confirmations),
            discord_client_id = COALESCE($10, bot_settings.discord_client_id),
            discord_client_secret = COALESCE($11, bot_settings.discord_client_secret),
            discord_redirect_uri = COALESCE($12, bot_settings.discord_redirect_uri),
            discord_guild_id = COALESCE($13, bot_settings.discord_guild_id),
            gitbook_api_key = COALESCE($14, bot_settings.gitbook_api_key),
            gitbook_space_id = COALESCE($15, bot_settings.gitbook_space_id),
            updated_at = NOW()
        RETURNING {BOT_SETTINGS_COLUMNS}, (xmax = 0) AS inserted
        "#
    ))
    .bind(&patch.token)
    .bind(patch.bitcoin_confirmations)
    .bind(patch.ethereum_confirmations)
    .bind(patch.litecoin_confirmations)
    .bind(patch.erc20_confirmations)
    .bind(patch.trc20_confirmations)
    .bind(patch.bep20_confirmations)
    .bind(patch.polygon_confirmations)
    .bind(patch.solana_confirmations)
    .bind(&patch.discord_client_id)
    .bind(&patch.discord_client_secret)
    .bind(&patch.discord_redirect_uri)
    .bind(&patch.discord_guild_id)
    .bind(&patch.gitbook_api_key)
    .bind(&patch.gitbook_space_id)
    .fetch_one(pool)
    .await?;

    let inserted: bool = row.try_get("inserted")?;
    Ok((BotSettings::from_row(&row)?, inserted))
}

pub async fn update_bot_settings(
    pool: &PgPool,
    patch: &BotSettingsPatch,
) -> Result<Option<BotSettings>> {
    let row = sqlx::query_as::<_, BotSettings>(&format!(
        r#"
        UPDATE bot_settings SET
            token = COALESCE($1, token),
            bitcoin_confirmations = COALESCE($2, bitcoin_confirmations),
            ethereum_confirmations = COALESCE($3, ethereum_confirmations),
            litecoin_confirmations = COALESCE($4, litecoin_confirmations),
            erc20_confirmations = COALESCE($5, erc20_confirmations),
            trc20_confirmations = COALESCE($6, trc20_confirmations),
            bep20_confirmations = COALESCE($7, bep20_confirmations),
            polygon_confirmations = COALESCE($8, polygon_confirmations),
            solana_confirmations = COALESCE($9, solana_confirmations),
            discord_client_id = COALESCE($10, discord_client_id),
            discord_client_secret = COALESCE($11, discord_client_secret),
            discord_redirect_uri = COALESCE($12, discord_redirect_uri),
            discord_guild_id = COALESCE($13, discord_guild_id),
            gitbook_api_key = COALESCE($14, gitbook_api_key),
            gitbook_space_id = COALESCE($15, gitbook_space_id),
            updated_at = NOW()
        WHERE id = 1
        RETURNING {BOT_SETTINGS_COLUMNS}
        "#
    ))
    .bind(&patch.token)
    .bind(patch.bitcoin_confirmations)
    .bind(patch.ethereum_confirmations)
    .bind(patch.litecoin_confirmations)
    .bind(patch.erc20_confirmations)
    .bind(patch.trc20_confirmations)
    .bind(patch.bep20_confirmations)
    .bind(patch.polygon_confirmations)
    .bind(patch.solana_confirmations)
    .bind(&patch.discord_client_id)
    .bind(&patch.discord_client_secret)
    .bind(&patch.discord_redirect_uri)
    .bind(&patch.discord_guild_id)
    .bind(&patch.gitbook_api_key)
    .bind(&patch.gitbook_space_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn get_stats(pool: &PgPool) -> Result<Option<Stats>> {
    let row = sqlx::query_as::<_, Stats>(&format!(
        "SELECT {STATS_COLUMNS} FROM stats WHERE id = 1"
    ))
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn upsert_stats(pool: &PgPool, s: &Stats) -> Result<Stats> {
    let row = sqlx::query_as::<_, Stats>(&format!(
        r#"
        INSERT INTO stats (
            id,
            total_transactions,
            total_volume,
            active_wallets,
            webhook_calls,
            transactions_growth,
            volume_growth,
            wallets_growth,
            webhooks_growth,
            updated_at
        ) VALUES (1,$1,$2,$3,$4,$5,$6,$7,$8,$9)
        ON CONFLICT (id) DO UPDATE SET
            total_transactions = EXCLUDED.total_transactions,
            total_volume = EXCLUDED.total_volume,
            active_wallets = EXCLUDED.active_wallets,
            webhook_calls = EXCLUDED.webhook_calls,
            transactions_growth = EXCLUDED.transactions_growth,
            volume_growth = EXCLUDED.volume_growth,
            wallets_growth = EXCLUDED.wallets_growth,
            webhooks_growth = EXCLUDED.webhooks_growth,
            updated_at = EXCLUDED.updated_at
        RETURNING {STATS_COLUMNS}
        "#
    ))
    .bind(s.total_transactions)
    .bind(s.total_volume)
    .bind(s.active_wallets)
    .bind(s.webhook_calls)
    .bind(&s.transactions_growth)
    .bind(&s.volume_growth)
    .bind(&s.wallets_growth)
    .bind(&s.webhooks_growth)
    .bind(s.updated_at)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// [`Storage`] backed by Postgres.
#[derive(Clone)]
pub struct PgStorage {
    pool: PgPool,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Storage for PgStorage {
    async fn list_wallets(&self) -> Result<Vec<Wallet>> {
        get_wallets(&self.pool).await
    }

    async fn get_wallet(&self, id: i32) -> Result<Option<Wallet>> {
        get_wallet_by_id(&self.pool, id).await
    }

    async fn get_wallet_by_address(&self, address: &str) -> Result<Option<Wallet>> {
        get_wallet_by_address(&self.pool, address).await
    }

    async fn insert_wallet(&self, wallet: &NewWallet) -> Result<Wallet> {
        insert_wallet(&self.pool, wallet).await
    }

    async fn update_wallet(&self, id: i32, patch: &WalletPatch) -> Result<Option<Wallet>> {
        update_wallet(&self.pool, id, patch).await
    }

    async fn delete_wallet(&self, id: i32) -> Result<bool> {
        delete_wallet(&self.pool, id).await
    }

    async fn list_transactions(
        &self,
        limit: i64,
        offset: i64,
        currency: Option<&str>,
    ) -> Result<Vec<Transaction>> {
        get_transactions(&self.pool, limit, offset, currency).await
    }

    async fn count_transactions(&self, currency: Option<&str>) -> Result<i64> {
        count_transactions(&self.pool, currency).await
    }

    async fn transaction_totals(&self) -> Result<TransactionTotals> {
        get_transaction_totals(&self.pool).await
    }

    async fn get_transaction(&self, id: i32) -> Result<Option<Transaction>> {
        get_transaction_by_id(&self.pool, id).await
    }

    async fn get_transaction_by_external_id(
        &self,
        transaction_id: &str,
    ) -> Result<Option<Transaction>> {
        get_transaction_by_external_id(&self.pool, transaction_id).await
    }

    async fn insert_transaction(&self, record: &TransactionRecord) -> Result<Transaction> {
        insert_transaction(&self.pool, record).await
    }

    async fn update_transaction(
        &self,
        id: i32,
        expected: TransactionStatus,
        patch: &TransactionPatch,
    ) -> Result<Option<Transaction>> {
        update_transaction(&self.pool, id, expected, patch).await
    }

    async fn get_webhook_config(&self) -> Result<Option<WebhookConfig>> {
        get_webhook_config(&self.pool).await
    }

    async fn upsert_webhook_config(
        &self,
        patch: &WebhookConfigPatch,
    ) -> Result<(WebhookConfig, bool)> {
        upsert_webhook_config(&self.pool, patch).await
    }

    async fn update_webhook_config(
        &self,
        patch: &WebhookConfigPatch,
    ) -> Result<Option<WebhookConfig>> {
        update_webhook_config(&self.pool, patch).await
    }

    async fn get_bot_settings(&self) -> Result<Option<BotSettings>> {
        get_bot_settings(&self.pool).await
    }

    async fn upsert_bot_settings(&self, patch: &BotSettingsPatch) -> Result<(BotSettings, bool)> {
        upsert_bot_settings(&self.pool, patch).await
    }

    async fn update_bot_settings(&self, patch: &BotSettingsPatch) -> Result<Option<BotSettings>> {
        update_bot_settings(&self.pool, patch).await
    }

    async fn load_stats(&self) -> Result<Stats> {
        Ok(get_stats(&self.pool).await?.unwrap_or_default())
    }

    async fn save_stats(&self, stats: &Stats) -> Result<Stats> {
        upsert_stats(&self.pool, stats).await
    }
}
