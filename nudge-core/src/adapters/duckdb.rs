//! DuckDB gateway implementation

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use duckdb::{params, Connection};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::{
    AlertStateKey, Budget, BudgetAlertState, Goal, GoalSignals, GoalStatus, NotificationTrigger,
    Transaction, TriggerSource, TriggerType, User, UserPreferences, VersionedAlertState,
};
use crate::ports::{Gateway, TransactionFilter, TriggerLog};
use crate::services::{MigrationResult, MigrationService};

/// Maximum number of attempts when the database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

const DOC_BUDGET: &str = "budget";
const DOC_PREFERENCES: &str = "preferences";

/// Check if an error message indicates a file locking issue that should be retried
fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    // Windows
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        // Unix/macOS
        || lower.contains("resource temporarily unavailable")
        || lower.contains("database is locked")
        || lower.contains("file is already open")
}

/// DuckDB-backed gateway and trigger log
///
/// A single connection guarded by a mutex; every statement runs while the
/// lock is held, which is what makes the conditional writes atomic. Clones
/// share the connection. The async port methods run on the blocking pool
/// so a caller's deadline can fire while the lock is contended.
#[derive(Clone)]
pub struct DuckDbGateway {
    conn: Arc<Mutex<Connection>>,
    db_path: Option<PathBuf>,
}

impl DuckDbGateway {
    /// Open (or create) a database file
    ///
    /// Retries with exponential backoff on file locking errors, which show
    /// up when a scheduled job and the event handler start at the same time.
    pub fn new(db_path: &Path) -> Result<Self> {
        let mut attempt = 0;
        loop {
            match Self::try_open_connection(db_path) {
                Ok(conn) => {
                    return Ok(Self {
                        conn: Arc::new(Mutex::new(conn)),
                        db_path: Some(db_path.to_path_buf()),
                    });
                }
                Err(e) if attempt + 1 < MAX_RETRIES && is_retryable_error(&e.to_string()) => {
                    let delay = Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                    tracing::warn!(
                        attempt = attempt + 1,
                        max = MAX_RETRIES,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "database busy, retrying"
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Throwaway in-memory database with the schema applied
    pub fn in_memory() -> Result<Self> {
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        let conn = Connection::open_in_memory_with_flags(config)?;
        let gateway = Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: None,
        };
        gateway.ensure_schema()?;
        Ok(gateway)
    }

    fn try_open_connection(db_path: &Path) -> Result<Connection> {
        // Extension autoloading stays off; JSON is linked in statically
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        Ok(Connection::open_with_flags(db_path, config)?)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| Error::database(format!("Lock poisoned: {}", e)))
    }

    /// Run a synchronous operation on the blocking pool
    async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&DuckDbGateway) -> Result<T> + Send + 'static,
    {
        let gateway = self.clone();
        tokio::task::spawn_blocking(move || op(&gateway))
            .await
            .map_err(|e| Error::database(format!("Blocking task failed: {}", e)))?
    }

    /// Hold the connection lock from another thread for `hold`.
    ///
    /// Returns once the lock is taken.
    #[cfg(test)]
    pub(crate) fn hold_lock(&self, hold: Duration) -> thread::JoinHandle<()> {
        let conn = Arc::clone(&self.conn);
        let (locked_tx, locked_rx) = std::sync::mpsc::channel();
        let handle = thread::spawn(move || {
            let _guard = conn.lock().unwrap();
            locked_tx.send(()).unwrap();
            thread::sleep(hold);
        });
        locked_rx.recv().unwrap();
        handle
    }

    /// Path of the database file, `None` for in-memory databases
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    pub fn run_migrations(&self) -> Result<MigrationResult> {
        let conn = self.conn()?;
        MigrationService::new(&conn).run_pending()
    }

    /// Ensure the schema exists (runs pending migrations)
    pub fn ensure_schema(&self) -> Result<()> {
        self.run_migrations()?;
        Ok(())
    }

    // === Users ===

    pub fn upsert_user(&self, user: &User) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sys_users (user_id, active) VALUES (?, ?)
             ON CONFLICT (user_id) DO UPDATE SET active = EXCLUDED.active",
            params![user.id, user.active],
        )?;
        Ok(())
    }

    pub fn load_active_users(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT user_id FROM sys_users WHERE active ORDER BY user_id")?;
        let users = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(users)
    }

    // === Transactions ===

    /// Store a transaction. Existing IDs are left untouched (transactions are immutable).
    pub fn insert_transaction(&self, tx: &Transaction) -> Result<bool> {
        let conn = self.conn()?;
        let inserted = conn.execute(
            "INSERT INTO sys_transactions (transaction_id, user_id, transaction_date, amount,
                                           category, merchant, description, created_at)
             VALUES (?, ?, ?, CAST(? AS DECIMAL(18, 2)), ?, ?, ?, ?)
             ON CONFLICT (transaction_id) DO NOTHING",
            params![
                tx.id.to_string(),
                tx.user_id,
                tx.date.to_string(),
                tx.amount.to_string(),
                tx.category,
                tx.merchant,
                tx.description,
                tx.created_at.to_rfc3339(),
            ],
        )?;
        Ok(inserted == 1)
    }

    pub fn load_transactions(
        &self,
        user_id: &str,
        filter: &TransactionFilter,
    ) -> Result<Vec<Transaction>> {
        let mut sql = String::from(
            "SELECT transaction_id, user_id, transaction_date::VARCHAR, amount::VARCHAR,
                    category, merchant, description, created_at
             FROM sys_transactions
             WHERE user_id = ?",
        );
        let mut values: Vec<Box<dyn duckdb::ToSql>> = vec![Box::new(user_id.to_string())];

        if let Some(start) = filter.start_date {
            sql.push_str(" AND transaction_date >= CAST(? AS DATE)");
            values.push(Box::new(start.to_string()));
        }
        if let Some(end) = filter.end_date {
            sql.push_str(" AND transaction_date <= CAST(? AS DATE)");
            values.push(Box::new(end.to_string()));
        }
        if let Some(category) = &filter.category {
            sql.push_str(" AND category = ?");
            values.push(Box::new(Transaction::normalize_label(category)));
        }
        if let Some(merchant) = &filter.merchant {
            sql.push_str(" AND lower(merchant) = lower(?)");
            values.push(Box::new(merchant.trim().to_string()));
        }
        if let Some(id) = filter.exclude_id {
            sql.push_str(" AND transaction_id <> ?");
            values.push(Box::new(id.to_string()));
        }

        if filter.newest_first {
            sql.push_str(" ORDER BY transaction_date DESC, created_at DESC");
        } else {
            sql.push_str(" ORDER BY transaction_date ASC, created_at ASC");
        }
        if let Some(limit) = filter.limit {
            sql.push_str(" LIMIT ?");
            values.push(Box::new(limit as i64));
        }

        let param_refs: Vec<&dyn duckdb::ToSql> = values.iter().map(|b| b.as_ref()).collect();

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(param_refs.as_slice(), |row| {
                Ok(TransactionRow {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    date: row.get(2)?,
                    amount: row.get(3)?,
                    category: row.get(4)?,
                    merchant: row.get(5)?,
                    description: row.get(6)?,
                    created_at: row.get(7)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter().map(TransactionRow::into_transaction).collect()
    }

    // === Documents ===

    fn load_document(&self, user_id: &str, doc_type: &str) -> Result<Option<String>> {
        let conn = self.conn()?;
        optional(conn.query_row(
            "SELECT body FROM sys_documents WHERE user_id = ? AND doc_type = ?",
            params![user_id, doc_type],
            |row| row.get::<_, String>(0),
        ))
    }

    /// Store a raw JSON document body (budget or preferences)
    pub fn put_document(&self, user_id: &str, doc_type: &str, body: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sys_documents (user_id, doc_type, body, updated_at) VALUES (?, ?, ?, ?)
             ON CONFLICT (user_id, doc_type) DO UPDATE SET
                body = EXCLUDED.body,
                updated_at = EXCLUDED.updated_at",
            params![user_id, doc_type, body, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn put_budget(&self, user_id: &str, budget: &Budget) -> Result<()> {
        self.put_document(user_id, DOC_BUDGET, &serde_json::to_string(budget)?)
    }

    pub fn load_budget(&self, user_id: &str) -> Result<Option<Budget>> {
        match self.load_document(user_id, DOC_BUDGET)? {
            Some(body) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }

    pub fn put_preferences(&self, user_id: &str, prefs: &UserPreferences) -> Result<()> {
        self.put_document(user_id, DOC_PREFERENCES, &serde_json::to_string(prefs)?)
    }

    pub fn load_preferences(&self, user_id: &str) -> Result<Option<UserPreferences>> {
        match self.load_document(user_id, DOC_PREFERENCES)? {
            Some(body) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }

    // === Goals ===

    pub fn upsert_goal(&self, goal: &Goal) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sys_goals (goal_id, user_id, name, status, celebration_sent, completed_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT (goal_id) DO UPDATE SET
                name = EXCLUDED.name,
                status = EXCLUDED.status,
                celebration_sent = EXCLUDED.celebration_sent,
                completed_at = EXCLUDED.completed_at",
            params![
                goal.goal_id,
                goal.user_id,
                goal.name,
                goal.status.as_str(),
                goal.celebration_sent,
                goal.completed_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    pub fn load_goals(&self, user_id: &str) -> Result<Vec<Goal>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT goal_id, user_id, name, status, celebration_sent, completed_at
             FROM sys_goals WHERE user_id = ? ORDER BY name",
        )?;
        let rows = stmt
            .query_map([user_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, bool>(4)?,
                    row.get::<_, Option<String>>(5)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(goal_id, user_id, name, status, celebration_sent, completed_at)| {
                let status = GoalStatus::parse(&status)
                    .ok_or_else(|| Error::validation(format!("unknown goal status '{}'", status)))?;
                Ok(Goal {
                    goal_id,
                    user_id,
                    name,
                    status,
                    celebration_sent,
                    completed_at: completed_at.as_deref().map(parse_timestamp).transpose()?,
                })
            })
            .collect()
    }

    pub fn mark_goal_celebrated(&self, user_id: &str, goal_id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE sys_goals SET celebration_sent = TRUE
             WHERE user_id = ? AND goal_id = ? AND celebration_sent = FALSE",
            params![user_id, goal_id],
        )?;
        Ok(changed == 1)
    }

    /// Undo a celebration flip whose trigger never made it into the log
    pub fn unmark_goal_celebrated(&self, user_id: &str, goal_id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE sys_goals SET celebration_sent = FALSE
             WHERE user_id = ? AND goal_id = ? AND celebration_sent = TRUE",
            params![user_id, goal_id],
        )?;
        Ok(changed == 1)
    }

    pub fn put_goal_signals(&self, user_id: &str, signals: &GoalSignals) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sys_goal_signals (user_id, recent_achievements, current_streak_days, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT (user_id) DO UPDATE SET
                recent_achievements = EXCLUDED.recent_achievements,
                current_streak_days = EXCLUDED.current_streak_days,
                updated_at = EXCLUDED.updated_at",
            params![
                user_id,
                serde_json::to_string(&signals.recent_achievements)?,
                signals.current_streak_days,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn load_goal_signals(&self, user_id: &str) -> Result<GoalSignals> {
        let conn = self.conn()?;
        let row = optional(conn.query_row(
            "SELECT recent_achievements, current_streak_days FROM sys_goal_signals WHERE user_id = ?",
            [user_id],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
        ))?;

        match row {
            Some((achievements, streak)) => Ok(GoalSignals {
                recent_achievements: serde_json::from_str(&achievements)?,
                current_streak_days: u32::try_from(streak.max(0)).unwrap_or(u32::MAX),
            }),
            None => Ok(GoalSignals::default()),
        }
    }

    // === Budget alert state ===

    pub fn load_alert_state(&self, key: &AlertStateKey) -> Result<Option<VersionedAlertState>> {
        let conn = self.conn()?;
        let row = optional(conn.query_row(
            "SELECT last_percentage, last_alert_date, version
             FROM sys_budget_alert_states
             WHERE user_id = ? AND category = ? AND billing_period = ?",
            params![key.user_id, key.category, key.period.key()],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            },
        ))?;

        row.map(|(last_percentage, last_alert_date, version)| {
            Ok(VersionedAlertState {
                state: BudgetAlertState {
                    last_percentage,
                    last_alert_date: parse_timestamp(&last_alert_date)?,
                },
                version,
            })
        })
        .transpose()
    }

    /// Conditional write; see [`Gateway::put_alert_state`]
    pub fn compare_and_set_alert_state(
        &self,
        key: &AlertStateKey,
        state: &BudgetAlertState,
        expected_version: Option<i64>,
    ) -> Result<bool> {
        let conn = self.conn()?;
        let changed = match expected_version {
            None => conn.execute(
                "INSERT INTO sys_budget_alert_states
                    (user_id, category, billing_period, last_percentage, last_alert_date, version)
                 VALUES (?, ?, ?, ?, ?, 1)
                 ON CONFLICT (user_id, category, billing_period) DO NOTHING",
                params![
                    key.user_id,
                    key.category,
                    key.period.key(),
                    state.last_percentage,
                    state.last_alert_date.to_rfc3339(),
                ],
            )?,
            // The percentage guard keeps the stored value from ever going down
            Some(version) => conn.execute(
                "UPDATE sys_budget_alert_states
                 SET last_percentage = ?, last_alert_date = ?, version = version + 1
                 WHERE user_id = ? AND category = ? AND billing_period = ?
                   AND version = ? AND last_percentage <= ?",
                params![
                    state.last_percentage,
                    state.last_alert_date.to_rfc3339(),
                    key.user_id,
                    key.category,
                    key.period.key(),
                    version,
                    state.last_percentage,
                ],
            )?,
        };
        Ok(changed == 1)
    }

    /// Undo a claim; see [`Gateway::release_alert_state`]
    pub fn restore_alert_state(
        &self,
        key: &AlertStateKey,
        claimed_version: i64,
        previous: Option<&BudgetAlertState>,
    ) -> Result<bool> {
        let conn = self.conn()?;
        let changed = match previous {
            None => conn.execute(
                "DELETE FROM sys_budget_alert_states
                 WHERE user_id = ? AND category = ? AND billing_period = ? AND version = ?",
                params![key.user_id, key.category, key.period.key(), claimed_version],
            )?,
            Some(state) => conn.execute(
                "UPDATE sys_budget_alert_states
                 SET last_percentage = ?, last_alert_date = ?, version = version + 1
                 WHERE user_id = ? AND category = ? AND billing_period = ? AND version = ?",
                params![
                    state.last_percentage,
                    state.last_alert_date.to_rfc3339(),
                    key.user_id,
                    key.category,
                    key.period.key(),
                    claimed_version,
                ],
            )?,
        };
        Ok(changed == 1)
    }

    // === Notification triggers ===

    pub fn insert_trigger(&self, trigger: &NotificationTrigger) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sys_notification_triggers
                (trigger_id, user_id, trigger_type, template_key, data, timestamp, source)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                trigger.id.to_string(),
                trigger.user_id,
                trigger.trigger_type.as_str(),
                trigger.template_key,
                serde_json::to_string(&trigger.data)?,
                trigger.timestamp.timestamp_millis(),
                trigger.source.as_str(),
            ],
        )?;
        Ok(())
    }

    pub fn load_recent_triggers(
        &self,
        user_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<NotificationTrigger>> {
        let mut sql = String::from(
            "SELECT trigger_id, user_id, trigger_type, template_key, data, timestamp, source
             FROM sys_notification_triggers",
        );
        let mut values: Vec<Box<dyn duckdb::ToSql>> = Vec::new();
        if let Some(user_id) = user_id {
            sql.push_str(" WHERE user_id = ?");
            values.push(Box::new(user_id.to_string()));
        }
        sql.push_str(" ORDER BY timestamp DESC, trigger_id LIMIT ?");
        values.push(Box::new(limit as i64));
        let param_refs: Vec<&dyn duckdb::ToSql> = values.iter().map(|b| b.as_ref()).collect();

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(param_refs.as_slice(), |row| {
                Ok(TriggerRow {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    trigger_type: row.get(2)?,
                    template_key: row.get(3)?,
                    data: row.get(4)?,
                    timestamp_ms: row.get(5)?,
                    source: row.get(6)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter().map(TriggerRow::into_trigger).collect()
    }

    pub fn count_triggers(&self) -> Result<u64> {
        let conn = self.conn()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM sys_notification_triggers", [], |row| {
                row.get(0)
            })?;
        Ok(count as u64)
    }

    /// Delete one batch of triggers older than `cutoff`
    pub fn delete_trigger_batch(&self, cutoff: DateTime<Utc>, limit: usize) -> Result<u64> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM sys_notification_triggers
             WHERE trigger_id IN (
                SELECT trigger_id FROM sys_notification_triggers
                WHERE timestamp < ?
                ORDER BY timestamp
                LIMIT ?
             )",
            params![cutoff.timestamp_millis(), limit as i64],
        )?;
        Ok(deleted as u64)
    }
}

#[async_trait]
impl Gateway for DuckDbGateway {
    async fn get_transactions(
        &self,
        user_id: &str,
        filter: &TransactionFilter,
    ) -> Result<Vec<Transaction>> {
        let user_id = user_id.to_string();
        let filter = filter.clone();
        self.blocking(move |gw| gw.load_transactions(&user_id, &filter))
            .await
    }

    async fn get_budget(&self, user_id: &str) -> Result<Option<Budget>> {
        let user_id = user_id.to_string();
        self.blocking(move |gw| gw.load_budget(&user_id)).await
    }

    async fn get_preferences(&self, user_id: &str) -> Result<Option<UserPreferences>> {
        let user_id = user_id.to_string();
        self.blocking(move |gw| gw.load_preferences(&user_id)).await
    }

    async fn get_goals(&self, user_id: &str) -> Result<Vec<Goal>> {
        let user_id = user_id.to_string();
        self.blocking(move |gw| gw.load_goals(&user_id)).await
    }

    async fn get_goal_signals(&self, user_id: &str) -> Result<GoalSignals> {
        let user_id = user_id.to_string();
        self.blocking(move |gw| gw.load_goal_signals(&user_id)).await
    }

    async fn set_goal_celebrated(&self, user_id: &str, goal_id: &str) -> Result<bool> {
        let (user_id, goal_id) = (user_id.to_string(), goal_id.to_string());
        self.blocking(move |gw| gw.mark_goal_celebrated(&user_id, &goal_id))
            .await
    }

    async fn reset_goal_celebrated(&self, user_id: &str, goal_id: &str) -> Result<bool> {
        let (user_id, goal_id) = (user_id.to_string(), goal_id.to_string());
        self.blocking(move |gw| gw.unmark_goal_celebrated(&user_id, &goal_id))
            .await
    }

    async fn get_alert_state(&self, key: &AlertStateKey) -> Result<Option<VersionedAlertState>> {
        let key = key.clone();
        self.blocking(move |gw| gw.load_alert_state(&key)).await
    }

    async fn put_alert_state(
        &self,
        key: &AlertStateKey,
        state: &BudgetAlertState,
        expected_version: Option<i64>,
    ) -> Result<bool> {
        let (key, state) = (key.clone(), state.clone());
        self.blocking(move |gw| gw.compare_and_set_alert_state(&key, &state, expected_version))
            .await
    }

    async fn release_alert_state(
        &self,
        key: &AlertStateKey,
        claimed_version: i64,
        previous: Option<&BudgetAlertState>,
    ) -> Result<bool> {
        let (key, previous) = (key.clone(), previous.cloned());
        self.blocking(move |gw| gw.restore_alert_state(&key, claimed_version, previous.as_ref()))
            .await
    }

    async fn list_active_users(&self) -> Result<Vec<String>> {
        self.blocking(|gw| gw.load_active_users()).await
    }

    async fn delete_triggers_before(&self, cutoff: DateTime<Utc>, limit: usize) -> Result<u64> {
        self.blocking(move |gw| gw.delete_trigger_batch(cutoff, limit))
            .await
    }
}

#[async_trait]
impl TriggerLog for DuckDbGateway {
    async fn append_trigger(&self, trigger: &NotificationTrigger) -> Result<()> {
        let trigger = trigger.clone();
        self.blocking(move |gw| gw.insert_trigger(&trigger)).await
    }

    async fn recent_triggers(
        &self,
        user_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<NotificationTrigger>> {
        let user_id = user_id.map(str::to_string);
        self.blocking(move |gw| gw.load_recent_triggers(user_id.as_deref(), limit))
            .await
    }
}

/// Raw transaction columns, converted outside the row callback
struct TransactionRow {
    id: String,
    user_id: String,
    date: String,
    amount: String,
    category: String,
    merchant: String,
    description: Option<String>,
    created_at: String,
}

impl TransactionRow {
    fn into_transaction(self) -> Result<Transaction> {
        Ok(Transaction {
            id: Uuid::parse_str(&self.id)
                .map_err(|e| Error::validation(format!("bad transaction id '{}': {}", self.id, e)))?,
            user_id: self.user_id,
            date: parse_date(&self.date)?,
            amount: Decimal::from_str(&self.amount)
                .map_err(|e| Error::validation(format!("bad amount '{}': {}", self.amount, e)))?,
            category: self.category,
            merchant: self.merchant,
            description: self.description,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

struct TriggerRow {
    id: String,
    user_id: String,
    trigger_type: String,
    template_key: String,
    data: String,
    timestamp_ms: i64,
    source: String,
}

impl TriggerRow {
    fn into_trigger(self) -> Result<NotificationTrigger> {
        Ok(NotificationTrigger {
            id: Uuid::parse_str(&self.id)
                .map_err(|e| Error::validation(format!("bad trigger id '{}': {}", self.id, e)))?,
            user_id: self.user_id,
            trigger_type: TriggerType::parse(&self.trigger_type).ok_or_else(|| {
                Error::validation(format!("unknown trigger type '{}'", self.trigger_type))
            })?,
            template_key: self.template_key,
            data: serde_json::from_str(&self.data)?,
            timestamp: Utc
                .timestamp_millis_opt(self.timestamp_ms)
                .single()
                .ok_or_else(|| Error::validation(format!("bad timestamp {}", self.timestamp_ms)))?,
            source: TriggerSource::parse(&self.source)
                .ok_or_else(|| Error::validation(format!("unknown source '{}'", self.source)))?,
        })
    }
}

// Helper functions

/// Map "no rows" to `None`
fn optional<T>(result: duckdb::Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::validation(format!("bad timestamp '{}': {}", s, e)))
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| Error::validation(format!("bad date '{}': {}", s, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::BillingPeriod;
    use chrono::Duration as ChronoDuration;

    fn gateway() -> DuckDbGateway {
        let gw = DuckDbGateway::in_memory().unwrap();
        gw.ensure_schema().unwrap();
        gw
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn test_port_calls_yield_to_deadline_while_locked() {
        let gw = gateway();
        let holder = gw.hold_lock(Duration::from_millis(600));

        let started = std::time::Instant::now();
        let result = tokio::time::timeout(Duration::from_millis(50), gw.get_budget("u1")).await;
        let elapsed = started.elapsed();

        assert!(result.is_err(), "lookup should not finish while the lock is held");
        assert!(elapsed < Duration::from_millis(500), "took {:?}", elapsed);

        holder.join().unwrap();
        // The connection is usable again once released
        assert!(gw.get_budget("u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_release_alert_state_undoes_claim() {
        let gw = gateway();
        let key = AlertStateKey::new("u1", "food", BillingPeriod::containing(date(2025, 4, 2)));
        let at = |pct| BudgetAlertState {
            last_percentage: pct,
            last_alert_date: Utc::now(),
        };

        // Fresh claim is removed
        assert!(gw.put_alert_state(&key, &at(85), None).await.unwrap());
        assert!(gw.release_alert_state(&key, 1, None).await.unwrap());
        assert!(gw.load_alert_state(&key).unwrap().is_none());

        // Update claim restores the earlier band
        assert!(gw.put_alert_state(&key, &at(85), None).await.unwrap());
        assert!(gw.put_alert_state(&key, &at(105), Some(1)).await.unwrap());
        assert!(gw.release_alert_state(&key, 2, Some(&at(85))).await.unwrap());
        let stored = gw.load_alert_state(&key).unwrap().unwrap();
        assert_eq!(stored.state.last_percentage, 85);
        assert_eq!(stored.version, 3);

        // Stale release is refused
        assert!(!gw.release_alert_state(&key, 2, None).await.unwrap());
        assert!(gw.load_alert_state(&key).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_goal_celebration_can_be_reset() {
        let gw = gateway();
        let goal = Goal::new("u1", "Bike").complete();
        gw.upsert_goal(&goal).unwrap();

        assert!(gw.set_goal_celebrated("u1", &goal.goal_id).await.unwrap());
        assert!(gw.reset_goal_celebrated("u1", &goal.goal_id).await.unwrap());
        assert!(!gw.reset_goal_celebrated("u1", &goal.goal_id).await.unwrap());
        assert!(gw.load_goals("u1").unwrap()[0].awaiting_celebration());
    }

    #[test]
    fn test_is_retryable_error() {
        assert!(is_retryable_error("IO Error: Could not set lock on file: Resource temporarily unavailable"));
        assert!(is_retryable_error("The process cannot access the file because it is being used by another process"));
        assert!(!is_retryable_error("Catalog Error: Table does not exist"));
    }

    #[test]
    fn test_transaction_filters() {
        let gw = gateway();
        let a = Transaction::new("u1", date(2025, 3, 1), Decimal::new(1050, 2), "Food", "Deli");
        let b = Transaction::new("u1", date(2025, 3, 5), Decimal::new(2000, 2), "food", "Cafe");
        let c = Transaction::new("u1", date(2025, 3, 9), Decimal::new(500, 2), "fun", "Cinema");
        let other = Transaction::new("u2", date(2025, 3, 5), Decimal::new(999, 2), "food", "Deli");
        for tx in [&a, &b, &c, &other] {
            assert!(gw.insert_transaction(tx).unwrap());
        }
        assert!(!gw.insert_transaction(&a).unwrap(), "duplicate id is ignored");

        let all = gw.load_transactions("u1", &TransactionFilter::new()).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0], a);

        let food = gw
            .load_transactions("u1", &TransactionFilter::new().category("FOOD").newest_first())
            .unwrap();
        assert_eq!(food.iter().map(|t| t.id).collect::<Vec<_>>(), vec![b.id, a.id]);

        let ranged = gw
            .load_transactions(
                "u1",
                &TransactionFilter::new().between(date(2025, 3, 2), date(2025, 3, 9)),
            )
            .unwrap();
        assert_eq!(ranged.len(), 2);

        let deli = gw
            .load_transactions("u1", &TransactionFilter::new().merchant("deli").excluding(a.id))
            .unwrap();
        assert!(deli.is_empty());

        let limited = gw
            .load_transactions("u1", &TransactionFilter::new().newest_first().limit(1))
            .unwrap();
        assert_eq!(limited[0].id, c.id);
    }

    #[test]
    fn test_documents_round_trip() {
        let gw = gateway();
        assert!(gw.load_budget("u1").unwrap().is_none());

        let budget = Budget::new().with_limit("dining", Decimal::new(30000, 2));
        gw.put_budget("u1", &budget).unwrap();
        assert_eq!(gw.load_budget("u1").unwrap(), Some(budget));

        gw.put_document("u1", "budget", "{not json").unwrap();
        assert!(matches!(gw.load_budget("u1"), Err(Error::Json(_))));

        let prefs = UserPreferences::enabled_for(&["weekly_summary"]);
        gw.put_preferences("u1", &prefs).unwrap();
        assert_eq!(gw.load_preferences("u1").unwrap(), Some(prefs));
    }

    #[test]
    fn test_alert_state_compare_and_set() {
        let gw = gateway();
        let key = AlertStateKey::new("u1", "dining", BillingPeriod::containing(date(2025, 3, 4)));
        let state = |pct| BudgetAlertState {
            last_percentage: pct,
            last_alert_date: Utc::now(),
        };

        assert!(gw.load_alert_state(&key).unwrap().is_none());
        assert!(gw.compare_and_set_alert_state(&key, &state(85), None).unwrap());
        assert!(
            !gw.compare_and_set_alert_state(&key, &state(90), None).unwrap(),
            "second insert for the same key must lose"
        );

        let stored = gw.load_alert_state(&key).unwrap().unwrap();
        assert_eq!(stored.state.last_percentage, 85);
        assert_eq!(stored.version, 1);

        assert!(!gw.compare_and_set_alert_state(&key, &state(105), Some(7)).unwrap());
        assert!(!gw.compare_and_set_alert_state(&key, &state(50), Some(1)).unwrap());
        assert!(gw.compare_and_set_alert_state(&key, &state(105), Some(1)).unwrap());

        let stored = gw.load_alert_state(&key).unwrap().unwrap();
        assert_eq!(stored.state.last_percentage, 105);
        assert_eq!(stored.version, 2);
    }

    #[test]
    fn test_goal_celebration_flag_flips_once() {
        let gw = gateway();
        let goal = Goal::new("u1", "Emergency fund").complete();
        gw.upsert_goal(&goal).unwrap();

        assert!(gw.mark_goal_celebrated("u1", &goal.goal_id).unwrap());
        assert!(!gw.mark_goal_celebrated("u1", &goal.goal_id).unwrap());

        let goals = gw.load_goals("u1").unwrap();
        assert_eq!(goals.len(), 1);
        assert!(goals[0].celebration_sent);
        assert_eq!(goals[0].status, GoalStatus::Completed);
    }

    #[test]
    fn test_goal_signals_default_when_absent() {
        let gw = gateway();
        assert_eq!(gw.load_goal_signals("u1").unwrap(), GoalSignals::default());

        let signals = GoalSignals {
            recent_achievements: vec!["Vacation".into()],
            current_streak_days: 4,
        };
        gw.put_goal_signals("u1", &signals).unwrap();
        assert_eq!(gw.load_goal_signals("u1").unwrap(), signals);
    }

    #[test]
    fn test_trigger_log_and_batched_delete() {
        let gw = gateway();
        let old = Utc::now() - ChronoDuration::days(200);
        for i in 0..5 {
            let trigger = NotificationTrigger::new(
                "u1",
                TriggerType::Encouragement,
                "daily",
                TriggerSource::DailyJob,
            )
            .with("n", i)
            .at(old);
            gw.insert_trigger(&trigger).unwrap();
        }
        let fresh = NotificationTrigger::new(
            "u1",
            TriggerType::WeeklySummary,
            "positive",
            TriggerSource::WeeklyJob,
        );
        gw.insert_trigger(&fresh).unwrap();

        let recent = gw.load_recent_triggers(Some("u1"), 1).unwrap();
        assert_eq!(recent[0].id, fresh.id);
        assert_eq!(recent[0].data, fresh.data);

        let cutoff = Utc::now() - ChronoDuration::days(90);
        assert_eq!(gw.delete_trigger_batch(cutoff, 2).unwrap(), 2);
        assert_eq!(gw.delete_trigger_batch(cutoff, 2).unwrap(), 2);
        assert_eq!(gw.delete_trigger_batch(cutoff, 2).unwrap(), 1);
        assert_eq!(gw.delete_trigger_batch(cutoff, 2).unwrap(), 0);
        assert_eq!(gw.count_triggers().unwrap(), 1);
    }

    #[test]
    fn test_active_users() {
        let gw = gateway();
        gw.upsert_user(&User::new("b")).unwrap();
        gw.upsert_user(&User::new("a")).unwrap();
        gw.upsert_user(&User::inactive("c")).unwrap();
        assert_eq!(gw.load_active_users().unwrap(), vec!["a", "b"]);
    }
}
