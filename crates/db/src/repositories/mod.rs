use async_trait::async_trait;
use thiserror::Error;

use flowmaster_core::crypto::CryptoError;
use flowmaster_core::domain::actor::EmployeeId;
use flowmaster_core::domain::transaction::{
    Employee, NewEmployee, NewTransaction, Transaction, TransactionFilter,
};
use flowmaster_core::reports::period::DateRange;

pub mod employee;
pub mod memory;
pub mod transaction;

pub use employee::SqlEmployeeRepository;
pub use memory::{InMemoryEmployeeRepository, InMemoryTransactionRepository};
pub use transaction::SqlTransactionRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("amount details could not be processed: {0}")]
    Crypto(#[from] CryptoError),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("not found: {0}")]
    NotFound(String),
}

/// Persistence for daily transaction records. Writes are all-or-nothing.
#[async_trait]
pub trait TransactionRepository: Send + Sync {
    async fn create(&self, transaction: NewTransaction) -> Result<Transaction, RepositoryError>;

    /// Newest first, capped by `filter.limit` when set.
    async fn query(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>, RepositoryError>;

    /// Every transaction inside `range`, oldest first.
    async fn aggregate(
        &self,
        range: DateRange,
        employee_id: Option<EmployeeId>,
    ) -> Result<Vec<Transaction>, RepositoryError>;
}

#[async_trait]
pub trait EmployeeRepository: Send + Sync {
    async fn list_active(&self) -> Result<Vec<Employee>, RepositoryError>;
    async fn find_by_id(&self, id: EmployeeId) -> Result<Option<Employee>, RepositoryError>;
    async fn find_by_username(&self, username: &str) -> Result<Option<Employee>, RepositoryError>;
    async fn create(&self, employee: NewEmployee) -> Result<Employee, RepositoryError>;
}
