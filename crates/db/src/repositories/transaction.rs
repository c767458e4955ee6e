use std::str::FromStr;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite};
use tracing::debug;

use flowmaster_core::crypto::DetailCipher;
use flowmaster_core::domain::actor::EmployeeId;
use flowmaster_core::domain::transaction::{
    NewTransaction, Transaction, TransactionFilter, TransactionId,
};
use flowmaster_core::reports::period::DateRange;

use super::employee::parse_timestamp;
use super::{RepositoryError, TransactionRepository};
use crate::DbPool;

const DATE_FORMAT: &str = "%Y-%m-%d";

const SELECT_TRANSACTIONS: &str = "SELECT
        t.id,
        t.date,
        t.employee_id,
        u.real_name AS employee_name,
        t.quantity,
        t.total_amount,
        t.amount_details_encrypted,
        t.created_at,
        t.updated_at
     FROM transactions t
     LEFT JOIN users u ON u.id = t.employee_id";

/// SQLite-backed transactions. `amount_details` is encrypted with the injected cipher on
/// write and decrypted on read; a row that fails to decrypt fails the whole read.
pub struct SqlTransactionRepository {
    pool: DbPool,
    cipher: DetailCipher,
}

impl SqlTransactionRepository {
    pub fn new(pool: DbPool, cipher: DetailCipher) -> Self {
        Self { pool, cipher }
    }

    fn transaction_from_row(&self, row: SqliteRow) -> Result<Transaction, RepositoryError> {
        let date_raw: String = row.try_get("date")?;
        let amount_raw: String = row.try_get("total_amount")?;
        let encrypted: String = row.try_get("amount_details_encrypted")?;

        Ok(Transaction {
            id: TransactionId(row.try_get("id")?),
            date: parse_date(&date_raw)?,
            employee_id: EmployeeId(row.try_get("employee_id")?),
            employee_name: row.try_get("employee_name")?,
            quantity: parse_quantity(row.try_get("quantity")?)?,
            total_amount: Decimal::from_str(&amount_raw).map_err(|error| {
                RepositoryError::Decode(format!("invalid total_amount `{amount_raw}` ({error})"))
            })?,
            amount_details: self.cipher.decrypt(&encrypted)?,
            created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
            updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
        })
    }
}

#[async_trait::async_trait]
impl TransactionRepository for SqlTransactionRepository {
    async fn create(&self, transaction: NewTransaction) -> Result<Transaction, RepositoryError> {
        let encrypted = self.cipher.encrypt(&transaction.amount_details)?;
        let now = Utc::now().to_rfc3339();

        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO transactions (
                date,
                employee_id,
                quantity,
                total_amount,
                amount_details_encrypted,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(transaction.date.format(DATE_FORMAT).to_string())
        .bind(transaction.employee_id.0)
        .bind(i64::from(transaction.quantity))
        .bind(transaction.total_amount.to_string())
        .bind(&encrypted)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query(&format!("{SELECT_TRANSACTIONS} WHERE t.id = ?"))
            .bind(inserted.last_insert_rowid())
            .fetch_one(&mut *tx)
            .await?;
        let created = self.transaction_from_row(row)?;

        tx.commit().await?;

        debug!(
            event_name = "db.transaction.created",
            transaction_id = created.id.0,
            employee_id = created.employee_id.0,
            "transaction stored"
        );
        Ok(created)
    }

    async fn query(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>, RepositoryError> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(SELECT_TRANSACTIONS);
        builder.push(" WHERE 1 = 1");
        push_filters(&mut builder, filter.range, filter.employee_id);
        builder.push(" ORDER BY t.date DESC, t.created_at DESC, t.id DESC");
        if let Some(limit) = filter.limit {
            builder.push(" LIMIT ").push_bind(i64::from(limit));
        }

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.into_iter().map(|row| self.transaction_from_row(row)).collect()
    }

    async fn aggregate(
        &self,
        range: DateRange,
        employee_id: Option<EmployeeId>,
    ) -> Result<Vec<Transaction>, RepositoryError> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(SELECT_TRANSACTIONS);
        builder.push(" WHERE 1 = 1");
        push_filters(&mut builder, Some(range), employee_id);
        builder.push(" ORDER BY t.date ASC, t.id ASC");

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.into_iter().map(|row| self.transaction_from_row(row)).collect()
    }
}

fn push_filters(
    builder: &mut QueryBuilder<'_, Sqlite>,
    range: Option<DateRange>,
    employee_id: Option<EmployeeId>,
) {
    if let Some(range) = range {
        builder.push(" AND t.date >= ").push_bind(range.start.format(DATE_FORMAT).to_string());
        builder.push(" AND t.date <= ").push_bind(range.end.format(DATE_FORMAT).to_string());
    }
    if let Some(employee_id) = employee_id {
        builder.push(" AND t.employee_id = ").push_bind(employee_id.0);
    }
}

fn parse_date(value: &str) -> Result<NaiveDate, RepositoryError> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map_err(|error| RepositoryError::Decode(format!("invalid date `{value}` ({error})")))
}

fn parse_quantity(value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value)
        .map_err(|_| RepositoryError::Decode(format!("quantity `{value}` is out of range")))
}
