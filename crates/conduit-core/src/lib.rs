//! Conduit Core: shared pipeline abstractions.
//!
//! This crate defines the contracts every pipeline stage is written against:
//! the handler trait, the error taxonomy, event tracking types, aggregate
//! roots and the unit-of-work boundary. It contains no decorator logic.

pub mod access;
pub mod aggregate;
pub mod batch;
pub mod clock;
pub mod error;
pub mod event;
pub mod handler;
pub mod id;
pub mod publish;
pub mod stream;
pub mod unit_of_work;

pub use tokio_util::sync::CancellationToken;

/// Success payload for handlers with nothing meaningful to return.
pub type Unit = ();

