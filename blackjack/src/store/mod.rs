//! Persistent per-user totals over SQLite.
//!
//! The store is the only persistence boundary in the system: the table
//! actor calls it after every resolved round and the server calls it at
//! login. Failures are logged by callers and never end a round.

use crate::game::{Outcome, RoundResult};
use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use thiserror::Error;

/// Schema applied when no migration file is configured.
const DEFAULT_SCHEMA: &str = include_str!("schema.sql");

/// Wallet seeded for users the store has never seen.
pub const DEFAULT_WALLET: i64 = 100;

/// One-time bonus for starring the repository.
pub const STAR_BONUS: i64 = 5000;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("unable to read schema: {0}")]
    Schema(#[from] std::io::Error),
}

/// A user's persistent record.
#[derive(Clone, Debug, PartialEq)]
pub struct UserRecord {
    pub provider_id: String,
    pub wallet: i64,
    pub total_bet: i64,
    pub total_won: i64,
    pub total_lost: i64,
    pub hands_played: i64,
    pub hands_won: i64,
    pub hands_lost: i64,
    pub blackjacks: i64,
    pub login_streak: i64,
    pub last_login: Option<DateTime<Utc>>,
    pub starred: bool,
}

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if missing) the configured database file and apply
    /// the schema; `schema_path` overrides the embedded default.
    pub async fn connect(db_name: &str, schema_path: Option<&str>) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{db_name}"))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        let schema = match schema_path {
            Some(path) => std::fs::read_to_string(path)?,
            None => DEFAULT_SCHEMA.to_string(),
        };
        sqlx::raw_sql(&schema).execute(&pool).await?;
        Ok(Self { pool })
    }

    /// An in-memory store with the default schema. A single connection so
    /// every query sees the same database.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        sqlx::raw_sql(DEFAULT_SCHEMA).execute(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn get_or_create_user(&self, provider_id: &str) -> Result<UserRecord, StoreError> {
        sqlx::query("INSERT INTO users (provider_id) VALUES (?) ON CONFLICT(provider_id) DO NOTHING")
            .bind(provider_id)
            .execute(&self.pool)
            .await?;
        self.fetch_user(provider_id).await
    }

    pub async fn get_user(&self, provider_id: &str) -> Result<Option<UserRecord>, StoreError> {
        let row = sqlx::query("SELECT * FROM users WHERE provider_id = ?")
            .bind(provider_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| row_to_user(&r)))
    }

    async fn fetch_user(&self, provider_id: &str) -> Result<UserRecord, StoreError> {
        let row = sqlx::query("SELECT * FROM users WHERE provider_id = ?")
            .bind(provider_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row_to_user(&row))
    }

    /// Credit login-streak income. The first login of a day advances (or
    /// resets) the streak; later logins the same day pay nothing.
    pub async fn process_login(
        &self,
        provider_id: &str,
    ) -> Result<(UserRecord, i64), StoreError> {
        let user = self.get_or_create_user(provider_id).await?;

        if user.last_login.is_some_and(is_today) {
            return Ok((user, 0));
        }

        let streak = match user.last_login {
            Some(last) if is_yesterday(last) => user.login_streak + 1,
            _ => 0,
        };

        let mut income = calculate_income(streak);
        if user.starred {
            income *= 2;
        }

        sqlx::query(
            "UPDATE users SET wallet = wallet + ?, login_streak = ?, last_login = ?
             WHERE provider_id = ?",
        )
        .bind(income)
        .bind(streak)
        .bind(Utc::now())
        .bind(provider_id)
        .execute(&self.pool)
        .await?;

        Ok((self.fetch_user(provider_id).await?, income))
    }

    /// Flip the starred flag, crediting the bonus exactly once. Returns
    /// whether the bonus was awarded by this call.
    pub async fn update_starred(&self, provider_id: &str) -> Result<bool, StoreError> {
        self.get_or_create_user(provider_id).await?;
        let result = sqlx::query(
            "UPDATE users SET starred = 1, wallet = wallet + ?
             WHERE provider_id = ? AND starred = 0",
        )
        .bind(STAR_BONUS)
        .bind(provider_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Fold one round's result into the lifetime totals and write the new
    /// wallet.
    pub async fn record_result(
        &self,
        provider_id: &str,
        result: &RoundResult,
    ) -> Result<(), StoreError> {
        let (won_amount, lost_amount, won, lost) = match result.outcome {
            Outcome::Won => (result.wallet_delta, 0, 1, 0),
            Outcome::Lost => (0, result.bet, 0, 1),
            Outcome::Tied => (0, 0, 0, 0),
        };

        sqlx::query(
            "UPDATE users SET
                total_bet = total_bet + ?,
                total_won = total_won + ?,
                total_lost = total_lost + ?,
                hands_played = hands_played + 1,
                hands_won = hands_won + ?,
                hands_lost = hands_lost + ?,
                blackjacks = blackjacks + ?,
                wallet = ?
             WHERE provider_id = ?",
        )
        .bind(result.bet)
        .bind(won_amount)
        .bind(lost_amount)
        .bind(won)
        .bind(lost)
        .bind(i64::from(result.blackjack))
        .bind(result.wallet)
        .bind(provider_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[cfg(any(test, feature = "test-support"))]
    pub async fn set_last_login(
        &self,
        provider_id: &str,
        at: DateTime<Utc>,
        streak: i64,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET last_login = ?, login_streak = ? WHERE provider_id = ?")
            .bind(at)
            .bind(streak)
            .bind(provider_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn row_to_user(row: &SqliteRow) -> UserRecord {
    UserRecord {
        provider_id: row.get("provider_id"),
        wallet: row.get("wallet"),
        total_bet: row.get("total_bet"),
        total_won: row.get("total_won"),
        total_lost: row.get("total_lost"),
        hands_played: row.get("hands_played"),
        hands_won: row.get("hands_won"),
        hands_lost: row.get("hands_lost"),
        blackjacks: row.get("blackjacks"),
        login_streak: row.get("login_streak"),
        last_login: row.get("last_login"),
        starred: row.get("starred"),
    }
}

fn is_today(at: DateTime<Utc>) -> bool {
    at.date_naive() == Utc::now().date_naive()
}

fn is_yesterday(at: DateTime<Utc>) -> bool {
    at.date_naive() == (Utc::now() - Duration::days(1)).date_naive()
}

/// Daily income by streak length. Base 100, milestone bonuses at 3+, each
/// full week, month, and year of consecutive logins.
fn calculate_income(streak: i64) -> i64 {
    if streak > 0 && streak % 365 == 0 {
        return 100 + 10_000_000;
    }
    if streak > 0 && streak % 30 == 0 {
        return 100 + 10_000;
    }
    if streak > 0 && streak % 7 == 0 {
        return 100 + 1_000;
    }
    match streak {
        s if s >= 3 => 300,
        2 => 200,
        1 => 150,
        _ => 100,
    }
}
