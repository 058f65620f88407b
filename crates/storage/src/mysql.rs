//! MySQL-backed implementation of the store traits.
//!
//! # Table schema
//!
//! The implementation expects (and [`MysqlStore::ensure_schema`] creates) the
//! following tables. Big integers are persisted as decimal strings so the
//! store never rounds them.
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS task_status (
//!     name VARCHAR(64) NOT NULL PRIMARY KEY,
//!     height BIGINT UNSIGNED NOT NULL
//! );
//! CREATE TABLE IF NOT EXISTS chain_status (
//!     height BIGINT UNSIGNED NOT NULL,
//!     tx_count BIGINT UNSIGNED NOT NULL,
//!     producer_number BIGINT UNSIGNED NOT NULL,
//!     fee_income VARCHAR(78) NOT NULL,
//!     token_income VARCHAR(78) NOT NULL,
//!     contract_income VARCHAR(78) NOT NULL
//! );
//! CREATE TABLE IF NOT EXISTS account_balance (
//!     account VARCHAR(64) NOT NULL,
//!     asset_id BIGINT UNSIGNED NOT NULL,
//!     balance VARCHAR(78) NOT NULL,
//!     updated_height BIGINT UNSIGNED NOT NULL,
//!     updated_time BIGINT UNSIGNED NOT NULL,
//!     PRIMARY KEY (account, asset_id)
//! );
//! CREATE TABLE IF NOT EXISTS block_original (
//!     height BIGINT UNSIGNED NOT NULL PRIMARY KEY,
//!     block_hash VARCHAR(66) NOT NULL,
//!     parent_hash VARCHAR(66) NOT NULL,
//!     block_data LONGBLOB NOT NULL
//! );
//! CREATE TABLE IF NOT EXISTS rollback_account (
//!     height BIGINT UNSIGNED NOT NULL,
//!     account VARCHAR(64) NOT NULL,
//!     asset_id BIGINT UNSIGNED NOT NULL,
//!     balance VARCHAR(78) NOT NULL,
//!     KEY idx_rollback_account_height (height)
//! );
//! CREATE TABLE IF NOT EXISTS token_backup (
//!     height BIGINT UNSIGNED NOT NULL,
//!     token_id BIGINT UNSIGNED NOT NULL,
//!     backup_data LONGBLOB NOT NULL,
//!     KEY idx_token_backup_height (height)
//! );
//! ```

use crate::{
    AccountBalance, BlockOriginal, ChainStatus, ChainStatusUpdate, StateStore, StorageError,
    StoreTx, TaskStatus,
};
use alloy_primitives::{B256, U256};
use async_trait::async_trait;
use sqlx::{MySql, MySqlPool, Row, Transaction, mysql::MySqlPoolOptions};
use std::collections::HashMap;
use tracing::error;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS task_status (
        name VARCHAR(64) NOT NULL PRIMARY KEY,
        height BIGINT UNSIGNED NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS chain_status (
        height BIGINT UNSIGNED NOT NULL,
        tx_count BIGINT UNSIGNED NOT NULL,
        producer_number BIGINT UNSIGNED NOT NULL,
        fee_income VARCHAR(78) NOT NULL,
        token_income VARCHAR(78) NOT NULL,
        contract_income VARCHAR(78) NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS account_balance (
        account VARCHAR(64) NOT NULL,
        asset_id BIGINT UNSIGNED NOT NULL,
        balance VARCHAR(78) NOT NULL,
        updated_height BIGINT UNSIGNED NOT NULL,
        updated_time BIGINT UNSIGNED NOT NULL,
        PRIMARY KEY (account, asset_id)
    )",
    "CREATE TABLE IF NOT EXISTS block_original (
        height BIGINT UNSIGNED NOT NULL PRIMARY KEY,
        block_hash VARCHAR(66) NOT NULL,
        parent_hash VARCHAR(66) NOT NULL,
        block_data LONGBLOB NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS rollback_account (
        height BIGINT UNSIGNED NOT NULL,
        account VARCHAR(64) NOT NULL,
        asset_id BIGINT UNSIGNED NOT NULL,
        balance VARCHAR(78) NOT NULL,
        KEY idx_rollback_account_height (height)
    )",
    "CREATE TABLE IF NOT EXISTS token_backup (
        height BIGINT UNSIGNED NOT NULL,
        token_id BIGINT UNSIGNED NOT NULL,
        backup_data LONGBLOB NOT NULL,
        KEY idx_token_backup_height (height)
    )",
];

fn parse_u256(raw: &str) -> Result<U256, StorageError> {
    raw.parse()
        .map_err(|_| StorageError::CorruptValue(format!("not a decimal big integer: {raw}")))
}

fn parse_b256(raw: &str) -> Result<B256, StorageError> {
    raw.parse().map_err(|_| StorageError::CorruptValue(format!("not a block hash: {raw}")))
}

/// [`StateStore`] implementation over a MySQL connection pool.
#[derive(Debug, Clone)]
pub struct MysqlStore {
    pool: MySqlPool,
}

impl MysqlStore {
    /// Connects to the database at `url`.
    pub async fn connect(url: &str) -> Result<Self, StorageError> {
        let pool = MySqlPoolOptions::new().connect(url).await?;
        Ok(Self { pool })
    }

    /// Wraps an existing pool.
    pub const fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Creates missing tables and seeds the all-zero chain-status row on
    /// first boot.
    pub async fn ensure_schema(&self) -> Result<(), StorageError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chain_status")
            .fetch_one(&self.pool)
            .await?;
        if rows == 0 {
            sqlx::query(
                "INSERT INTO chain_status \
                 (height, tx_count, producer_number, fee_income, token_income, contract_income) \
                 VALUES (0, 0, 0, '0', '0', '0')",
            )
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl StateStore for MysqlStore {
    type Tx = MysqlStoreTx;

    async fn begin(&self) -> Result<Self::Tx, StorageError> {
        let tx = self.pool.begin().await?;
        Ok(MysqlStoreTx { tx })
    }

    async fn task_statuses(
        &self,
        names: &[String],
    ) -> Result<HashMap<String, TaskStatus>, StorageError> {
        if names.is_empty() {
            return Ok(HashMap::new());
        }
        let placeholders = vec!["?"; names.len()].join(",");
        let sql =
            format!("SELECT name, height FROM task_status WHERE name IN ({placeholders})");
        let mut query = sqlx::query(&sql);
        for name in names {
            query = query.bind(name);
        }
        let rows = query.fetch_all(&self.pool).await?;
        let mut statuses = HashMap::with_capacity(rows.len());
        for row in rows {
            let name: String = row.try_get("name")?;
            let height: u64 = row.try_get("height")?;
            statuses.insert(name.clone(), TaskStatus { name, height });
        }
        Ok(statuses)
    }

    async fn init_task_status(&self, name: &str) -> Result<(), StorageError> {
        sqlx::query("INSERT INTO task_status (name, height) VALUES (?, 0)")
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn add_reversible_block(&self, block: &BlockOriginal) -> Result<(), StorageError> {
        sqlx::query(
            "REPLACE INTO block_original (height, block_hash, parent_hash, block_data) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(block.height)
        .bind(block.block_hash.to_string())
        .bind(block.parent_hash.to_string())
        .bind(block.block_data.as_slice())
        .execute(&self.pool)
        .await
        .inspect_err(|err| {
            error!(target: "chainscan::storage", height = block.height, %err, "Failed to cache reversible block");
        })?;
        Ok(())
    }

    async fn reversible_block_by_height(
        &self,
        height: u64,
    ) -> Result<Option<BlockOriginal>, StorageError> {
        let row = sqlx::query(
            "SELECT height, block_hash, parent_hash, block_data FROM block_original \
             WHERE height = ?",
        )
        .bind(height)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let block_hash: String = row.try_get("block_hash")?;
        let parent_hash: String = row.try_get("parent_hash")?;
        Ok(Some(BlockOriginal {
            height: row.try_get("height")?,
            block_hash: parse_b256(&block_hash)?,
            parent_hash: parse_b256(&parent_hash)?,
            block_data: row.try_get("block_data")?,
        }))
    }

    async fn delete_reversible_from(&self, height: u64) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM block_original WHERE height >= ?")
            .bind(height)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn prune_reversible_until(&self, height: u64) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM block_original WHERE height <= ?")
            .bind(height)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn prune_rollback_accounts_until(&self, height: u64) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM rollback_account WHERE height <= ?")
            .bind(height)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn prune_token_backups_until(&self, height: u64) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM token_backup WHERE height <= ?")
            .bind(height)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// A MySQL transaction implementing [`StoreTx`].
#[derive(Debug)]
pub struct MysqlStoreTx {
    tx: Transaction<'static, MySql>,
}

#[async_trait]
impl StoreTx for MysqlStoreTx {
    async fn chain_status(&mut self) -> Result<ChainStatus, StorageError> {
        let row = sqlx::query(
            "SELECT height, tx_count, producer_number, fee_income, token_income, \
             contract_income FROM chain_status",
        )
        .fetch_one(&mut *self.tx)
        .await?;
        let fee_income: String = row.try_get("fee_income")?;
        let token_income: String = row.try_get("token_income")?;
        let contract_income: String = row.try_get("contract_income")?;
        Ok(ChainStatus {
            height: row.try_get("height")?,
            tx_count: row.try_get("tx_count")?,
            producer_number: row.try_get("producer_number")?,
            fee_income: parse_u256(&fee_income)?,
            token_income: parse_u256(&token_income)?,
            contract_income: parse_u256(&contract_income)?,
        })
    }

    async fn update_chain_status(
        &mut self,
        update: &ChainStatusUpdate,
    ) -> Result<(), StorageError> {
        enum Arg {
            Int(u64),
            Big(String),
        }

        let mut sets: Vec<&'static str> = Vec::new();
        let mut args: Vec<Arg> = Vec::new();
        if let Some(height) = update.height {
            sets.push("height = ?");
            args.push(Arg::Int(height));
        }
        if let Some(tx_count) = update.tx_count {
            sets.push("tx_count = ?");
            args.push(Arg::Int(tx_count));
        }
        if let Some(producer_number) = update.producer_number {
            sets.push("producer_number = ?");
            args.push(Arg::Int(producer_number));
        }
        if let Some(fee_income) = update.fee_income {
            sets.push("fee_income = ?");
            args.push(Arg::Big(fee_income.to_string()));
        }
        if let Some(token_income) = update.token_income {
            sets.push("token_income = ?");
            args.push(Arg::Big(token_income.to_string()));
        }
        if let Some(contract_income) = update.contract_income {
            sets.push("contract_income = ?");
            args.push(Arg::Big(contract_income.to_string()));
        }
        if sets.is_empty() {
            return Err(StorageError::EmptyUpdate);
        }

        let sql = format!("UPDATE chain_status SET {}", sets.join(", "));
        let mut query = sqlx::query(&sql);
        for arg in args {
            query = match arg {
                Arg::Int(value) => query.bind(value),
                Arg::Big(value) => query.bind(value),
            };
        }
        query.execute(&mut *self.tx).await.inspect_err(|err| {
            error!(target: "chainscan::storage", %err, %sql, "Failed to update chain status");
        })?;
        Ok(())
    }

    async fn account_balance(
        &mut self,
        account: &str,
        asset_id: u64,
    ) -> Result<Option<AccountBalance>, StorageError> {
        let row = sqlx::query(
            "SELECT account, asset_id, balance, updated_height, updated_time \
             FROM account_balance WHERE account = ? AND asset_id = ?",
        )
        .bind(account)
        .bind(asset_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let balance: String = row.try_get("balance")?;
        Ok(Some(AccountBalance {
            account: row.try_get("account")?,
            asset_id: row.try_get("asset_id")?,
            balance: parse_u256(&balance)?,
            updated_height: row.try_get("updated_height")?,
            updated_time: row.try_get("updated_time")?,
        }))
    }

    async fn insert_account_balance(
        &mut self,
        account: &str,
        asset_id: u64,
        balance: U256,
        height: u64,
        time: u64,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO account_balance \
             (account, asset_id, balance, updated_height, updated_time) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(account)
        .bind(asset_id)
        .bind(balance.to_string())
        .bind(height)
        .bind(time)
        .execute(&mut *self.tx)
        .await
        .inspect_err(|err| {
            error!(target: "chainscan::storage", account, asset_id, %err, "Failed to insert account balance");
        })?;
        Ok(())
    }

    async fn update_account_balance(
        &mut self,
        account: &str,
        asset_id: u64,
        balance: U256,
        height: u64,
        time: u64,
    ) -> Result<(), StorageError> {
        let result = sqlx::query(
            "UPDATE account_balance SET balance = ?, updated_height = ?, updated_time = ? \
             WHERE account = ? AND asset_id = ?",
        )
        .bind(balance.to_string())
        .bind(height)
        .bind(time)
        .bind(account)
        .bind(asset_id)
        .execute(&mut *self.tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::EntryNotFound(format!(
                "account balance ({account}, {asset_id})"
            )));
        }
        Ok(())
    }

    async fn set_task_height(&mut self, name: &str, height: u64) -> Result<(), StorageError> {
        sqlx::query("UPDATE task_status SET height = ? WHERE name = ?")
            .bind(height)
            .bind(name)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn commit(self) -> Result<(), StorageError> {
        self.tx.commit().await?;
        Ok(())
    }
}
