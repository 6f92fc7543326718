//! Order placement service assembled from Conduit pipelines.
//!
//! Placing an order runs through authorization, validation, a transaction
//! that drains the order's events (reserving stock along the way) and an
//! automation step that notifies the customer.

pub mod application;
pub mod domain;
pub mod state;
pub mod store;
