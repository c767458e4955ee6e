use flowmaster_core::domain::actor::Role;
use flowmaster_core::domain::transaction::NewEmployee;
use flowmaster_db::{EmployeeRepository, RepositoryError, SqlEmployeeRepository};

use crate::commands::{with_migrated_store, CommandResult};

const COMMAND: &str = "employee add";

pub fn add(username: &str, real_name: &str, role: &str, demo: bool) -> CommandResult {
    let role = match role.parse::<Role>() {
        Ok(role) => role,
        Err(error) => return CommandResult::failure(COMMAND, "invalid_argument", error.to_string(), 2),
    };
    let (username, real_name) = (username.trim(), real_name.trim());
    if username.is_empty() || real_name.is_empty() {
        return CommandResult::failure(
            COMMAND,
            "invalid_argument",
            "username and real name must not be empty",
            2,
        );
    }

    let employee = NewEmployee {
        username: username.to_string(),
        real_name: real_name.to_string(),
        role,
        is_demo: demo,
    };
    let result = with_migrated_store(COMMAND, |_, pool| async move {
        SqlEmployeeRepository::new(pool).create(employee).await.map_err(|error| match error {
            RepositoryError::Conflict(message) => ("conflict", message, 7u8),
            other => ("storage", other.to_string(), 6u8),
        })
    });

    match result {
        Ok(created) => CommandResult::success(
            COMMAND,
            format!(
                "registered employee `{}` ({}) as {} with id {}{}",
                created.username,
                created.real_name,
                created.role,
                created.id.0,
                if created.is_demo { ", read-only" } else { "" }
            ),
        ),
        Err(failure) => failure,
    }
}
