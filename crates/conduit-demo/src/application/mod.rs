//! Request and event handlers for the order domain.

pub mod automation;
pub mod command_handlers;
pub mod query_handlers;
