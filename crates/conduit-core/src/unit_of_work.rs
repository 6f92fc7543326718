//! Unit-of-work boundary and post-commit contracts.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::aggregate::AggregateRoot;
use crate::error::PipelineError;
use crate::publish::TriggerContext;

/// Opens a transactional boundary for one request.
#[async_trait]
pub trait UnitOfWorkProvider: Send + Sync {
    /// Begins a unit of work for the request described by `trigger`.
    ///
    /// # Errors
    ///
    /// Returns an error if no transaction can be opened.
    async fn begin(
        &self,
        trigger: &TriggerContext,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn UnitOfWork>, PipelineError>;
}

/// An open transactional boundary.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Persists pending work.
    ///
    /// # Errors
    ///
    /// Returns an error if persisting or publishing fails.
    async fn commit(&mut self, cancel: &CancellationToken) -> Result<(), PipelineError>;

    /// Undoes work done in this unit.
    ///
    /// # Errors
    ///
    /// Returns an error if the work cannot be undone.
    async fn revert(&mut self, cancel: &CancellationToken) -> Result<(), PipelineError>;
}

/// Follow-up work that needs the handler's changes to be durable first.
#[async_trait]
pub trait PostCommitHandler<Req, Resp>: Send + Sync
where
    Req: Send + Sync,
    Resp: Send + Sync,
{
    /// Runs after the first commit.
    ///
    /// # Errors
    ///
    /// Any error reverts the unit of work.
    async fn handle(
        &self,
        request: &Req,
        response: &Resp,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError>;
}

/// Opens persistence sessions.
#[async_trait]
pub trait SessionSource: Send + Sync {
    /// Opens a session for one unit of work.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    async fn open(&self, cancel: &CancellationToken) -> Result<Arc<dyn ChangeSet>, PipelineError>;
}

/// The persistence session a unit of work commits.
#[async_trait]
pub trait ChangeSet: Send + Sync {
    /// Writes tracked changes.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the write.
    async fn save_changes(&self, cancel: &CancellationToken) -> Result<(), PipelineError>;

    /// Rolls back whatever was written in this session.
    ///
    /// # Errors
    ///
    /// Returns an error if the rollback fails.
    async fn discard_changes(&self, cancel: &CancellationToken) -> Result<(), PipelineError>;

    /// Aggregates loaded or created in this session.
    fn tracked_aggregates(&self) -> Vec<Arc<dyn AggregateRoot>>;
}

/// Observer of the commit lifecycle.
pub trait CommitListener: Send + Sync {
    /// Fired once, before the first event is published.
    fn committing(&self) {}

    /// Fired once, after the last event was published.
    fn committed(&self) {}
}
