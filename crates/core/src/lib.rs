//! Domain model, report aggregation, detail encryption and configuration for FlowMaster.

pub mod config;
pub mod crypto;
pub mod domain;
pub mod errors;
pub mod reports;

pub use crypto::{CryptoError, DetailCipher};
pub use domain::actor::{ActorContext, EmployeeId, Role};
pub use domain::command::{CommandResult, ErrorKind};
pub use domain::conversation::{ChatRole, ChatTurn, ConversationState};
pub use domain::intent::Intent;
pub use domain::parameters::ParameterSet;
pub use domain::transaction::{
    Employee, NewEmployee, NewTransaction, Transaction, TransactionFilter, TransactionId,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use reports::period::DateRange;
