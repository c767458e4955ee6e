use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;
use tokio::sync::RwLock;

use flowmaster_core::domain::actor::EmployeeId;
use flowmaster_core::domain::transaction::{
    Employee, NewEmployee, NewTransaction, Transaction, TransactionFilter, TransactionId,
};
use flowmaster_core::reports::period::DateRange;

use super::{EmployeeRepository, RepositoryError, TransactionRepository};

#[derive(Default)]
pub struct InMemoryEmployeeRepository {
    employees: RwLock<HashMap<i64, Employee>>,
    next_id: AtomicI64,
}

impl InMemoryEmployeeRepository {
    /// Inserts a fully formed record, replacing any employee with the same id.
    pub async fn insert(&self, employee: Employee) {
        self.next_id.fetch_max(employee.id.0, Ordering::SeqCst);
        self.employees.write().await.insert(employee.id.0, employee);
    }

    pub async fn deactivate(&self, id: EmployeeId) {
        if let Some(employee) = self.employees.write().await.get_mut(&id.0) {
            employee.is_active = false;
        }
    }
}

#[async_trait::async_trait]
impl EmployeeRepository for InMemoryEmployeeRepository {
    async fn list_active(&self) -> Result<Vec<Employee>, RepositoryError> {
        let employees = self.employees.read().await;
        let mut active: Vec<Employee> =
            employees.values().filter(|employee| employee.is_active).cloned().collect();
        active.sort_by_key(|employee| employee.id);
        Ok(active)
    }

    async fn find_by_id(&self, id: EmployeeId) -> Result<Option<Employee>, RepositoryError> {
        Ok(self.employees.read().await.get(&id.0).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Employee>, RepositoryError> {
        let employees = self.employees.read().await;
        Ok(employees.values().find(|employee| employee.username == username).cloned())
    }

    async fn create(&self, employee: NewEmployee) -> Result<Employee, RepositoryError> {
        let mut employees = self.employees.write().await;
        if employees.values().any(|existing| existing.username == employee.username) {
            return Err(RepositoryError::Conflict(format!(
                "username `{}` already exists",
                employee.username
            )));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let created = Employee {
            id: EmployeeId(id),
            username: employee.username,
            real_name: employee.real_name,
            role: employee.role,
            is_active: true,
            is_demo: employee.is_demo,
            created_at: Utc::now(),
        };
        employees.insert(id, created.clone());
        Ok(created)
    }
}

/// Keeps `amount_details` in plaintext. Employee names are resolved from the optional
/// directory the repository was built with.
#[derive(Default)]
pub struct InMemoryTransactionRepository {
    transactions: RwLock<Vec<Transaction>>,
    names: RwLock<HashMap<i64, String>>,
}

impl InMemoryTransactionRepository {
    pub async fn register_employee(&self, employee: &Employee) {
        self.names.write().await.insert(employee.id.0, employee.real_name.clone());
    }

    pub async fn len(&self) -> usize {
        self.transactions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.transactions.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl TransactionRepository for InMemoryTransactionRepository {
    async fn create(&self, transaction: NewTransaction) -> Result<Transaction, RepositoryError> {
        let employee_name = self.names.read().await.get(&transaction.employee_id.0).cloned();
        let mut transactions = self.transactions.write().await;
        let now = Utc::now();
        let created = Transaction {
            id: TransactionId(transactions.len() as i64 + 1),
            date: transaction.date,
            employee_id: transaction.employee_id,
            employee_name,
            quantity: transaction.quantity,
            total_amount: transaction.total_amount,
            amount_details: transaction.amount_details,
            created_at: now,
            updated_at: now,
        };
        transactions.push(created.clone());
        Ok(created)
    }

    async fn query(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>, RepositoryError> {
        let transactions = self.transactions.read().await;
        let mut matched: Vec<Transaction> = transactions
            .iter()
            .filter(|transaction| matches(transaction, filter.range, filter.employee_id))
            .cloned()
            .collect();
        matched.sort_by(|left, right| right.date.cmp(&left.date).then(right.id.cmp(&left.id)));
        if let Some(limit) = filter.limit {
            matched.truncate(limit as usize);
        }
        Ok(matched)
    }

    async fn aggregate(
        &self,
        range: DateRange,
        employee_id: Option<EmployeeId>,
    ) -> Result<Vec<Transaction>, RepositoryError> {
        let transactions = self.transactions.read().await;
        let mut matched: Vec<Transaction> = transactions
            .iter()
            .filter(|transaction| matches(transaction, Some(range), employee_id))
            .cloned()
            .collect();
        matched.sort_by(|left, right| left.date.cmp(&right.date).then(left.id.cmp(&right.id)));
        Ok(matched)
    }
}

fn matches(
    transaction: &Transaction,
    range: Option<DateRange>,
    employee_id: Option<EmployeeId>,
) -> bool {
    range.map_or(true, |range| range.contains(transaction.date))
        && employee_id.map_or(true, |id| transaction.employee_id == id)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use flowmaster_core::domain::actor::Role;
    use flowmaster_core::domain::transaction::{NewEmployee, NewTransaction, TransactionFilter};

    use crate::repositories::{
        EmployeeRepository, InMemoryEmployeeRepository, InMemoryTransactionRepository,
        RepositoryError, TransactionRepository,
    };

    #[tokio::test]
    async fn employee_ids_are_assigned_sequentially_and_usernames_are_unique() {
        let repo = InMemoryEmployeeRepository::default();
        let first = repo
            .create(NewEmployee {
                username: "zhangsan".to_string(),
                real_name: "张三".to_string(),
                role: Role::Worker,
                is_demo: false,
            })
            .await
            .expect("create");
        assert_eq!(first.id.0, 1);

        let duplicate = repo
            .create(NewEmployee {
                username: "zhangsan".to_string(),
                real_name: "张三二号".to_string(),
                role: Role::Worker,
                is_demo: false,
            })
            .await;
        assert!(matches!(duplicate, Err(RepositoryError::Conflict(_))));

        repo.deactivate(first.id).await;
        assert!(repo.list_active().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn transactions_resolve_registered_names() {
        let employees = InMemoryEmployeeRepository::default();
        let employee = employees
            .create(NewEmployee {
                username: "lisi".to_string(),
                real_name: "李四".to_string(),
                role: Role::Staff,
                is_demo: false,
            })
            .await
            .expect("create");
        let repo = InMemoryTransactionRepository::default();
        repo.register_employee(&employee).await;

        let date = NaiveDate::from_ymd_opt(2025, 3, 1).expect("date");
        repo.create(NewTransaction {
            date,
            employee_id: employee.id,
            quantity: 2,
            total_amount: Decimal::new(30, 0),
            amount_details: String::new(),
        })
        .await
        .expect("create");

        let rows = repo.query(&TransactionFilter::default()).await.expect("query");
        assert_eq!(rows[0].employee_name.as_deref(), Some("李四"));
        assert_eq!(repo.len().await, 1);
    }
}
