use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use flowmaster_core::domain::actor::{EmployeeId, Role};
use flowmaster_core::domain::transaction::{Employee, NewEmployee};

use super::{EmployeeRepository, RepositoryError};
use crate::DbPool;

const EMPLOYEE_COLUMNS: &str = "id, username, real_name, role, is_active, is_demo, created_at";

pub struct SqlEmployeeRepository {
    pool: DbPool,
}

impl SqlEmployeeRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl EmployeeRepository for SqlEmployeeRepository {
    async fn list_active(&self) -> Result<Vec<Employee>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {EMPLOYEE_COLUMNS} FROM users WHERE is_active = 1 ORDER BY id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(employee_from_row).collect()
    }

    async fn find_by_id(&self, id: EmployeeId) -> Result<Option<Employee>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {EMPLOYEE_COLUMNS} FROM users WHERE id = ?"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(employee_from_row).transpose()
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Employee>, RepositoryError> {
        let row =
            sqlx::query(&format!("SELECT {EMPLOYEE_COLUMNS} FROM users WHERE username = ?"))
                .bind(username)
                .fetch_optional(&self.pool)
                .await?;

        row.map(employee_from_row).transpose()
    }

    async fn create(&self, employee: NewEmployee) -> Result<Employee, RepositoryError> {
        let created_at = Utc::now();
        let result = sqlx::query(
            "INSERT INTO users (username, real_name, role, is_active, is_demo, created_at)
             VALUES (?, ?, ?, 1, ?, ?)",
        )
        .bind(&employee.username)
        .bind(&employee.real_name)
        .bind(employee.role.as_str())
        .bind(employee.is_demo)
        .bind(created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|error| match error {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                RepositoryError::Conflict(format!("username `{}` already exists", employee.username))
            }
            other => RepositoryError::Database(other),
        })?;

        Ok(Employee {
            id: EmployeeId(result.last_insert_rowid()),
            username: employee.username,
            real_name: employee.real_name,
            role: employee.role,
            is_active: true,
            is_demo: employee.is_demo,
            created_at,
        })
    }
}

fn employee_from_row(row: SqliteRow) -> Result<Employee, RepositoryError> {
    let role_raw: String = row.try_get("role")?;
    let role = role_raw
        .parse::<Role>()
        .map_err(|_| RepositoryError::Decode(format!("unknown role `{role_raw}`")))?;

    Ok(Employee {
        id: EmployeeId(row.try_get("id")?),
        username: row.try_get("username")?,
        real_name: row.try_get("real_name")?,
        role,
        is_active: row.try_get("is_active")?,
        is_demo: row.try_get("is_demo")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

pub(crate) fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}
