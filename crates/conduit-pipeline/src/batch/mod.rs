//! Adapters that run a singular pipeline over collections of requests.
//!
//! Batch responses are positional: output `i` always belongs to input `i`.
//! When any item fails the whole batch fails with a
//! [`BatchError`](conduit_core::batch::BatchError) holding every item's
//! outcome in input order.

pub mod fan_out;
pub mod grouping;
pub mod macro_expansion;

pub use fan_out::FanOutHandler;
pub use grouping::{GroupingHandler, SingleGroup};
pub use macro_expansion::MacroHandler;
