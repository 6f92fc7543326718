//! Conduit Pipeline: decorators, batch adapters and the mediator.
//!
//! Every stage wraps a [`RequestHandler`](conduit_core::handler::RequestHandler)
//! and is one itself. [`builder::PipelineBuilder`] assembles the stages for a
//! request/response pair in their fixed order; [`mediator::Mediator`] routes
//! requests to the assembled pipelines.

use conduit_core::error::PipelineError;
use tokio_util::sync::CancellationToken;

pub mod authorization;
pub mod automation;
pub mod batch;
pub mod boundary;
pub mod builder;
pub mod cache;
#[cfg(test)]
mod log_capture;
pub mod mediator;
pub mod not_found;
pub mod retry;
pub mod settings;
pub mod transaction;
pub mod validation;

/// Fails with [`PipelineError::Cancelled`] once `cancel` has fired.
pub(crate) fn ensure_active(cancel: &CancellationToken) -> Result<(), PipelineError> {
    if cancel.is_cancelled() {
        Err(PipelineError::Cancelled)
    } else {
        Ok(())
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
