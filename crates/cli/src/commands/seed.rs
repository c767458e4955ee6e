use flowmaster_core::domain::actor::Role;
use flowmaster_core::domain::transaction::NewEmployee;
use flowmaster_db::{EmployeeRepository, SqlEmployeeRepository};

use crate::commands::{with_migrated_store, CommandResult};

pub const DEMO_USERNAME: &str = "admin";
pub const DEMO_REAL_NAME: &str = "示例管理员（只读）";

enum SeedOutcome {
    Created(i64),
    AlreadyPresent(i64),
}

pub fn run() -> CommandResult {
    let result = with_migrated_store("seed", |_, pool| async move {
        let employees = SqlEmployeeRepository::new(pool);
        let existing = employees
            .find_by_username(DEMO_USERNAME)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 6u8))?;
        if let Some(employee) = existing {
            return Ok(SeedOutcome::AlreadyPresent(employee.id.0));
        }

        let created = employees
            .create(NewEmployee {
                username: DEMO_USERNAME.to_string(),
                real_name: DEMO_REAL_NAME.to_string(),
                role: Role::Manager,
                is_demo: true,
            })
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 6u8))?;
        Ok(SeedOutcome::Created(created.id.0))
    });

    match result {
        Ok(SeedOutcome::Created(id)) => CommandResult::success(
            "seed",
            format!("demo account `{DEMO_USERNAME}` created (id {id}, read-only manager)"),
        ),
        Ok(SeedOutcome::AlreadyPresent(id)) => CommandResult::success(
            "seed",
            format!("demo account `{DEMO_USERNAME}` already present (id {id})"),
        ),
        Err(failure) => failure,
    }
}
