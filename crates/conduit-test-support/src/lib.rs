//! Shared test doubles for the Conduit request mediator.

mod access;
mod clock;
mod events;
mod handlers;
mod unit_of_work;

pub use access::{RecordingCommitListener, StaticAuthorizer, StaticPrincipal};
pub use clock::FixedClock;
pub use events::{NamedEvent, ScriptedPublisher, TestAggregate};
pub use handlers::ScriptedHandler;
pub use unit_of_work::{InMemoryChangeSet, RecordingUnitOfWorkProvider, UnitOfWorkScript};
