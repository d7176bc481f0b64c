//! DuckDB repository implementation
//!
//! One connection behind a mutex serves all four repository ports. Amounts
//! are stored as `DECIMAL(18,4)` and read back through their text form, so no
//! value ever passes through a binary float.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use duckdb::{params, Connection};
use rust_decimal::Decimal;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::{
    to_amount_scale, CategorizationStatus, Category, CategoryNode, ColumnMapping, FileType,
    SchemaUpdate, Source, StatementSchema, StatementTransaction, Transaction,
};
use crate::ports::{
    CategoryAssignment, CategoryRepository, HistoricalCategorization, InsertOutcome,
    SourceRepository, StatementSchemaRepository, StatusCounts, TransactionRepository,
};
use crate::services::migration::{MigrationResult, MigrationService};

impl From<duckdb::Error> for Error {
    fn from(e: duckdb::Error) -> Self {
        Error::Database(e.to_string())
    }
}

/// Maximum number of attempts when the database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

/// Whether an open error is a file lock held by another process
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

const TX_COLUMNS: &str = "transaction_id, source_id, transaction_date::VARCHAR, description,
    normalized_description, amount::VARCHAR, currency, balance::VARCHAR, category_id,
    sub_category_id, categorization_status, categorization_confidence,
    created_at::VARCHAR, updated_at::VARCHAR";

const SCHEMA_COLUMNS: &str = "schema_id, statement_hash, column_mapping::VARCHAR, header_row,
    start_row, file_type, source_id, column_names::VARCHAR, created_at::VARCHAR";

const CATEGORY_COLUMNS: &str = "category_id, category_name, parent_category_id, description";

/// DuckDB repository implementation
pub struct DuckDbRepository {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl DuckDbRepository {
    /// Open (or create) the database file and run pending migrations
    ///
    /// Retries with exponential backoff while another process holds the
    /// file lock.
    pub fn new(db_path: &Path) -> Result<Self> {
        let mut attempt = 0;
        let conn = loop {
            match Self::try_open_connection(db_path) {
                Ok(conn) => break conn,
                Err(e) if is_retryable_error(&e.to_string()) && attempt < MAX_RETRIES - 1 => {
                    let delay = Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                    warn!(
                        attempt = attempt + 1,
                        max = MAX_RETRIES,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Database busy, retrying"
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        };

        let repo = Self {
            conn: Mutex::new(conn),
            db_path: Some(db_path.to_path_buf()),
        };
        repo.run_migrations()?;
        Ok(repo)
    }

    /// Throwaway database, used by tests and dry runs
    pub fn open_in_memory() -> Result<Self> {
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        let repo = Self {
            conn: Mutex::new(Connection::open_in_memory_with_flags(config)?),
            db_path: None,
        };
        repo.run_migrations()?;
        Ok(repo)
    }

    fn try_open_connection(db_path: &Path) -> Result<Connection> {
        // JSON is linked statically through the "json" feature; no autoloading
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        Ok(Connection::open_with_flags(db_path, config)?)
    }

    /// Run database migrations; returns what was applied
    pub fn run_migrations(&self) -> Result<MigrationResult> {
        let conn = self.lock()?;
        let result = MigrationService::new(&conn).run_pending()?;
        if !result.applied.is_empty() {
            debug!(applied = ?result.applied, "Applied database migrations");
        }
        Ok(result)
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| Error::database(format!("Lock poisoned: {}", e)))
    }
}

// === Statement schemas ===

fn query_schema(conn: &Connection, filter: &str, param: &str) -> Result<Option<StatementSchema>> {
    let sql = format!(
        "SELECT {} FROM statement_schemas WHERE {} ORDER BY created_at, schema_id LIMIT 1",
        SCHEMA_COLUMNS, filter
    );
    let row = conn.query_row(&sql, [param], |row| {
        Ok(SchemaRow {
            id: row.get(0)?,
            statement_hash: row.get(1)?,
            column_mapping: row.get(2)?,
            header_row: row.get(3)?,
            start_row: row.get(4)?,
            file_type: row.get(5)?,
            source_id: row.get(6)?,
            column_names: row.get(7)?,
            created_at: row.get(8)?,
        })
    });
    match row {
        Ok(row) => row.into_schema().map(Some),
        Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

struct SchemaRow {
    id: String,
    statement_hash: String,
    column_mapping: String,
    header_row: i64,
    start_row: i64,
    file_type: String,
    source_id: Option<i64>,
    column_names: String,
    created_at: String,
}

impl SchemaRow {
    fn into_schema(self) -> Result<StatementSchema> {
        let column_mapping: ColumnMapping = serde_json::from_str(&self.column_mapping)?;
        let column_names: Vec<String> = serde_json::from_str(&self.column_names)?;
        Ok(StatementSchema {
            id: parse_uuid(&self.id)?,
            statement_hash: self.statement_hash,
            column_mapping,
            header_row: to_usize(self.header_row)?,
            start_row: to_usize(self.start_row)?,
            file_type: FileType::parse(&self.file_type),
            source_id: self.source_id,
            column_names,
            created_at: parse_timestamp(&self.created_at),
        })
    }
}

#[async_trait]
impl StatementSchemaRepository for DuckDbRepository {
    async fn find_by_hash(&self, statement_hash: &str) -> Result<Option<StatementSchema>> {
        let conn = self.lock()?;
        query_schema(&conn, "statement_hash = ?", statement_hash)
    }

    async fn save(&self, schema: &StatementSchema) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO statement_schemas (schema_id, statement_hash, column_mapping, header_row,
                                            start_row, file_type, source_id, column_names, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, CAST(? AS TIMESTAMP))",
            params![
                schema.id.to_string(),
                schema.statement_hash,
                serde_json::to_string(&schema.column_mapping)?,
                to_i64(schema.header_row)?,
                to_i64(schema.start_row)?,
                schema.file_type.as_str(),
                schema.source_id,
                serde_json::to_string(&schema.column_names)?,
                format_timestamp(&schema.created_at),
            ],
        )?;
        Ok(())
    }

    async fn update(&self, id: Uuid, update: &SchemaUpdate) -> Result<StatementSchema> {
        let conn = self.lock()?;
        let mut schema = query_schema(&conn, "schema_id = ?", &id.to_string())?
            .ok_or_else(|| Error::not_found(format!("Statement schema {} not found", id)))?;
        update.apply(&mut schema);

        conn.execute(
            "UPDATE statement_schemas
             SET column_mapping = ?, header_row = ?, start_row = ?, source_id = ?
             WHERE schema_id = ?",
            params![
                serde_json::to_string(&schema.column_mapping)?,
                to_i64(schema.header_row)?,
                to_i64(schema.start_row)?,
                schema.source_id,
                id.to_string(),
            ],
        )?;
        Ok(schema)
    }
}

// === Transactions ===

struct TxRow {
    id: String,
    source_id: i64,
    date: String,
    description: String,
    normalized_description: String,
    amount: String,
    currency: String,
    balance: Option<String>,
    category_id: Option<i64>,
    sub_category_id: Option<i64>,
    status: String,
    confidence: Option<f64>,
    created_at: String,
    updated_at: String,
}

impl TxRow {
    fn from_row(row: &duckdb::Row) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            source_id: row.get(1)?,
            date: row.get(2)?,
            description: row.get(3)?,
            normalized_description: row.get(4)?,
            amount: row.get(5)?,
            currency: row.get(6)?,
            balance: row.get(7)?,
            category_id: row.get(8)?,
            sub_category_id: row.get(9)?,
            status: row.get(10)?,
            confidence: row.get(11)?,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
        })
    }

    fn into_transaction(self) -> Result<Transaction> {
        Ok(Transaction {
            id: parse_uuid(&self.id)?,
            source_id: self.source_id,
            date: parse_date(&self.date)?,
            description: self.description,
            normalized_description: self.normalized_description,
            amount: parse_decimal(&self.amount)?,
            currency: self.currency,
            balance: self.balance.as_deref().map(parse_decimal).transpose()?,
            category_id: self.category_id,
            sub_category_id: self.sub_category_id,
            categorization_status: CategorizationStatus::parse(&self.status),
            categorization_confidence: self.confidence,
            created_at: parse_timestamp(&self.created_at),
            updated_at: parse_timestamp(&self.updated_at),
        })
    }
}

fn query_transactions(
    conn: &Connection,
    sql: &str,
    params: &[&dyn duckdb::ToSql],
) -> Result<Vec<Transaction>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, TxRow::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    rows.into_iter().map(TxRow::into_transaction).collect()
}

/// Candidates matching a stored (date, description, amount) for the source
fn duplicates_in(
    conn: &Connection,
    source_id: i64,
    candidates: &[StatementTransaction],
) -> Result<Vec<StatementTransaction>> {
    let mut stmt = conn.prepare(
        "SELECT COUNT(*) FROM transactions
         WHERE source_id = ?
           AND transaction_date = CAST(? AS DATE)
           AND description = ?
           AND amount = CAST(? AS DECIMAL(18, 4))",
    )?;

    let mut duplicates = Vec::new();
    for candidate in candidates {
        let count: i64 = stmt.query_row(
            params![
                source_id,
                candidate.date.to_string(),
                candidate.description,
                to_amount_scale(candidate.amount).to_string(),
            ],
            |row| row.get(0),
        )?;
        if count > 0 {
            duplicates.push(candidate.clone());
        }
    }
    Ok(duplicates)
}

fn insert_transactions(
    conn: &Connection,
    source_id: i64,
    candidates: &[StatementTransaction],
) -> Result<Vec<Transaction>> {
    let mut stmt = conn.prepare(
        "INSERT INTO transactions (transaction_id, source_id, transaction_date, description,
                                   normalized_description, amount, currency, balance,
                                   categorization_status, created_at, updated_at)
         VALUES (?, ?, CAST(? AS DATE), ?, ?, CAST(? AS DECIMAL(18, 4)), ?,
                 CAST(? AS DECIMAL(18, 4)), ?, CAST(? AS TIMESTAMP), CAST(? AS TIMESTAMP))",
    )?;

    let mut inserted = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let tx = Transaction::from_statement(source_id, candidate);
        stmt.execute(params![
            tx.id.to_string(),
            tx.source_id,
            tx.date.to_string(),
            tx.description,
            tx.normalized_description,
            tx.amount.to_string(),
            tx.currency,
            tx.balance.map(|b| b.to_string()),
            tx.categorization_status.as_str(),
            format_timestamp(&tx.created_at),
            format_timestamp(&tx.updated_at),
        ])?;
        inserted.push(tx);
    }
    Ok(inserted)
}

#[async_trait]
impl TransactionRepository for DuckDbRepository {
    async fn find_duplicates(
        &self,
        source_id: i64,
        candidates: &[StatementTransaction],
    ) -> Result<Vec<StatementTransaction>> {
        let conn = self.lock()?;
        duplicates_in(&conn, source_id, candidates)
    }

    async fn create_many(
        &self,
        source_id: i64,
        candidates: &[StatementTransaction],
    ) -> Result<Vec<Transaction>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let inserted = insert_transactions(&tx, source_id, candidates)?;
        tx.commit()?;
        Ok(inserted)
    }

    /// Check and insert under one lock and one DB transaction
    async fn insert_unique(
        &self,
        source_id: i64,
        candidates: &[StatementTransaction],
    ) -> Result<InsertOutcome> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let duplicates = duplicates_in(&tx, source_id, candidates)?;
        let unique: Vec<StatementTransaction> = candidates
            .iter()
            .filter(|c| !duplicates.contains(c))
            .cloned()
            .collect();
        let inserted = insert_transactions(&tx, source_id, &unique)?;

        tx.commit()?;
        Ok(InsertOutcome {
            inserted,
            duplicates,
        })
    }

    async fn get_uncategorized_batch(&self, limit: usize) -> Result<Vec<Transaction>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {} FROM transactions
             WHERE categorization_status = 'pending'
             ORDER BY created_at, transaction_date, transaction_id
             LIMIT ?",
            TX_COLUMNS
        );
        query_transactions(&conn, &sql, &[&(limit as i64)])
    }

    async fn update_category_and_status(&self, assignments: &[CategoryAssignment]) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "UPDATE transactions
                 SET category_id = ?, sub_category_id = ?, categorization_status = ?,
                     categorization_confidence = ?, updated_at = current_timestamp
                 WHERE transaction_id = ?",
            )?;
            for a in assignments {
                stmt.execute(params![
                    a.category_id,
                    a.sub_category_id,
                    a.status.as_str(),
                    a.confidence,
                    a.transaction_id.to_string(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    async fn reset_failed(&self) -> Result<usize> {
        let conn = self.lock()?;
        let moved = conn.execute(
            "UPDATE transactions
             SET categorization_status = 'pending', category_id = NULL, sub_category_id = NULL,
                 categorization_confidence = NULL, updated_at = current_timestamp
             WHERE categorization_status = 'failed'",
            [],
        )?;
        Ok(moved)
    }

    async fn recent_categorized_descriptions(
        &self,
        limit: usize,
    ) -> Result<Vec<HistoricalCategorization>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT normalized_description, COALESCE(sub_category_id, category_id) AS leaf_id
             FROM transactions
             WHERE categorization_status = 'categorized'
               AND category_id IS NOT NULL
               AND normalized_description <> ''
             QUALIFY row_number() OVER (
                 PARTITION BY normalized_description
                 ORDER BY updated_at DESC, transaction_id
             ) = 1
             ORDER BY updated_at DESC
             LIMIT ?",
        )?;
        let pairs = stmt
            .query_map(params![limit as i64], |row| {
                Ok(HistoricalCategorization {
                    normalized_description: row.get(0)?,
                    category_id: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(pairs)
    }

    async fn get_transaction(&self, id: Uuid) -> Result<Option<Transaction>> {
        let conn = self.lock()?;
        let sql = format!("SELECT {} FROM transactions WHERE transaction_id = ?", TX_COLUMNS);
        let id = id.to_string();
        Ok(query_transactions(&conn, &sql, &[&id])?.into_iter().next())
    }

    async fn get_transactions(&self, source_id: Option<i64>) -> Result<Vec<Transaction>> {
        let conn = self.lock()?;
        match source_id {
            Some(source_id) => {
                let sql = format!(
                    "SELECT {} FROM transactions WHERE source_id = ?
                     ORDER BY transaction_date, created_at, transaction_id",
                    TX_COLUMNS
                );
                query_transactions(&conn, &sql, &[&source_id])
            }
            None => {
                let sql = format!(
                    "SELECT {} FROM transactions ORDER BY transaction_date, created_at, transaction_id",
                    TX_COLUMNS
                );
                query_transactions(&conn, &sql, &[])
            }
        }
    }

    async fn count_by_status(&self) -> Result<StatusCounts> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT categorization_status, COUNT(*) FROM transactions GROUP BY categorization_status",
        )?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut counts = StatusCounts::default();
        for (status, count) in rows {
            match CategorizationStatus::parse(&status) {
                CategorizationStatus::Pending => counts.pending += count,
                CategorizationStatus::Categorized => counts.categorized += count,
                CategorizationStatus::Failed => counts.failed += count,
            }
        }
        Ok(counts)
    }
}

// === Categories ===

fn row_to_category(row: &duckdb::Row) -> duckdb::Result<Category> {
    Ok(Category {
        id: row.get(0)?,
        category_name: row.get(1)?,
        parent_category_id: row.get(2)?,
        description: row.get(3)?,
    })
}

fn query_category(conn: &Connection, sql: &str, id: i64) -> Result<Option<Category>> {
    match conn.query_row(sql, [id], row_to_category) {
        Ok(category) => Ok(Some(category)),
        Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl CategoryRepository for DuckDbRepository {
    async fn get_category_tree(&self) -> Result<Vec<CategoryNode>> {
        let conn = self.lock()?;
        let sql = format!("SELECT {} FROM categories ORDER BY category_id", CATEGORY_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let all = stmt
            .query_map([], row_to_category)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let (top, subs): (Vec<Category>, Vec<Category>) =
            all.into_iter().partition(Category::is_top_level);
        Ok(top
            .into_iter()
            .map(|category| {
                let subcategories = subs
                    .iter()
                    .filter(|s| s.parent_category_id == Some(category.id))
                    .cloned()
                    .collect();
                CategoryNode {
                    category,
                    subcategories,
                }
            })
            .collect())
    }

    async fn get_category(&self, id: i64) -> Result<Option<Category>> {
        let conn = self.lock()?;
        let sql = format!("SELECT {} FROM categories WHERE category_id = ?", CATEGORY_COLUMNS);
        query_category(&conn, &sql, id)
    }

    async fn get_parent_of(&self, id: i64) -> Result<Option<Category>> {
        let conn = self.lock()?;
        query_category(
            &conn,
            "SELECT p.category_id, p.category_name, p.parent_category_id, p.description
             FROM categories c
             JOIN categories p ON p.category_id = c.parent_category_id
             WHERE c.category_id = ?",
            id,
        )
    }

    async fn add_category(
        &self,
        category_name: &str,
        parent_category_id: Option<i64>,
        description: Option<&str>,
    ) -> Result<Category> {
        let conn = self.lock()?;
        let id: i64 = conn.query_row("SELECT nextval('seq_categories_id')", [], |row| row.get(0))?;
        conn.execute(
            "INSERT INTO categories (category_id, category_name, parent_category_id, description)
             VALUES (?, ?, ?, ?)",
            params![id, category_name, parent_category_id, description],
        )?;
        Ok(Category {
            id,
            category_name: category_name.to_string(),
            parent_category_id,
            description: description.map(str::to_string),
        })
    }
}

// === Sources ===

fn row_to_source(row: &duckdb::Row) -> duckdb::Result<(i64, String, String)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
}

fn into_source((id, name, created_at): (i64, String, String)) -> Source {
    Source {
        id,
        name,
        created_at: parse_timestamp(&created_at),
    }
}

#[async_trait]
impl SourceRepository for DuckDbRepository {
    async fn add_source(&self, name: &str) -> Result<Source> {
        let conn = self.lock()?;
        let id: i64 = conn.query_row("SELECT nextval('seq_sources_id')", [], |row| row.get(0))?;
        let created_at = Utc::now();
        conn.execute(
            "INSERT INTO sources (source_id, name, created_at) VALUES (?, ?, CAST(? AS TIMESTAMP))",
            params![id, name, format_timestamp(&created_at)],
        )?;
        Ok(Source {
            id,
            name: name.to_string(),
            created_at,
        })
    }

    async fn get_source(&self, id: i64) -> Result<Option<Source>> {
        let conn = self.lock()?;
        match conn.query_row(
            "SELECT source_id, name, created_at::VARCHAR FROM sources WHERE source_id = ?",
            [id],
            row_to_source,
        ) {
            Ok(row) => Ok(Some(into_source(row))),
            Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_sources(&self) -> Result<Vec<Source>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT source_id, name, created_at::VARCHAR FROM sources ORDER BY source_id")?;
        let rows = stmt
            .query_map([], row_to_source)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows.into_iter().map(into_source).collect())
    }
}

// Helper functions

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| Error::database(format!("Invalid stored id '{}': {}", s, e)))
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| Error::database(format!("Invalid stored date '{}': {}", s, e)))
}

fn parse_decimal(s: &str) -> Result<Decimal> {
    Decimal::from_str(s)
        .map(|d| d.normalize())
        .map_err(|e| Error::database(format!("Invalid stored amount '{}': {}", s, e)))
}

fn to_usize(n: i64) -> Result<usize> {
    usize::try_from(n).map_err(|_| Error::database(format!("Invalid stored row index {}", n)))
}

fn to_i64(n: usize) -> Result<i64> {
    i64::try_from(n).map_err(|_| Error::validation(format!("Row index {} is out of range", n)))
}

fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.naive_utc().format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

/// Parse a DuckDB TIMESTAMP rendered as text; timestamps are stored in UTC
fn parse_timestamp(s: &str) -> DateTime<Utc> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .map(|naive| naive.and_utc())
        .unwrap_or_else(|_| Utc::now())
}
