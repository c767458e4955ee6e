pub mod actor;
pub mod command;
pub mod conversation;
pub mod intent;
pub mod parameters;
pub mod transaction;
