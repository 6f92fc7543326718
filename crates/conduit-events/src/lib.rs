//! Conduit Events: tracking, dispatch and commit-time publishing.
//!
//! Aggregates queue events while a request is handled; the unit of work in
//! this crate drains those queues on commit through a publisher that records
//! each event's correlation and causation.

pub mod dispatcher;
pub mod process;
pub mod store;
pub mod tracking;
pub mod unit_of_work;
