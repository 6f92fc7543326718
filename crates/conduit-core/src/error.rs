//! Pipeline error types.
//!
//! Expected failures travel as [`PipelineError`] values. Unexpected failures
//! (the ones an outer boundary must log and convert) are carried in the
//! [`PipelineError::Fault`] variant with their full cause chain intact.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::batch::BatchError;
use crate::handler::RequestMetadata;

/// Top-level error flowing through every pipeline stage.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    /// The request failed structural or business validation.
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    /// The acting principal may not perform the request.
    #[error("permission denied for {principal}")]
    PermissionDenied {
        /// Display name of the principal that was denied.
        principal: String,
    },

    /// A read returned no value.
    #[error("{resource} not found")]
    NotFound {
        /// Name of the resource that was looked up.
        resource: String,
    },

    /// A macro request expanded to zero concrete requests.
    #[error("no matching records")]
    NoMatchingRecords,

    /// A persistence operation kept deadlocking until retries ran out.
    #[error("communication error after {attempts} attempts")]
    Communication {
        /// How many times the operation was attempted.
        attempts: u32,
    },

    /// One or more items of a batch failed.
    #[error("batch failed: {0}")]
    Batch(BatchError),

    /// The write committed but the follow-up automation failed.
    #[error("changes were committed but automation failed: {source}")]
    AutomationFailed {
        /// The error returned by the process manager.
        source: Box<PipelineError>,
    },

    /// An expected business rule failure raised by a handler.
    #[error("{0}")]
    Business(String),

    /// The caller cancelled the request.
    #[error("request cancelled")]
    Cancelled,

    /// No pipeline is registered for the request/response pair.
    #[error("no handler registered for {0}")]
    HandlerNotRegistered(RequestMetadata),

    /// An unexpected failure that has not yet reached the outer boundary.
    #[error("fault: {0}")]
    Fault(Fault),

    /// An unexpected failure after the boundary logged and converted it.
    #[error("unexpected error: {message}")]
    Unexpected {
        /// Rendered description of the original failure.
        message: String,
    },
}

impl PipelineError {
    /// Creates a business error from any message.
    pub fn business(message: impl Into<String>) -> Self {
        Self::Business(message.into())
    }

    /// Wraps an arbitrary error as a [`Fault`].
    pub fn fault(error: impl Into<anyhow::Error>) -> Self {
        Self::Fault(Fault::new(error))
    }

    /// Returns `true` for the variant produced by cooperative cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<anyhow::Error> for PipelineError {
    fn from(error: anyhow::Error) -> Self {
        Self::Fault(Fault::new(error))
    }
}

impl From<ValidationErrors> for PipelineError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors)
    }
}

impl From<BatchError> for PipelineError {
    fn from(error: BatchError) -> Self {
        Self::Batch(error)
    }
}

/// A shared, cloneable unexpected failure.
///
/// Two faults are equal only when they share the same underlying error.
#[derive(Debug, Clone)]
pub struct Fault(Arc<anyhow::Error>);

impl Fault {
    /// Wraps an error.
    pub fn new(error: impl Into<anyhow::Error>) -> Self {
        Self(Arc::new(error.into()))
    }

    /// Returns the wrapped error.
    #[must_use]
    pub fn error(&self) -> &anyhow::Error {
        &self.0
    }

    /// Walks the cause chain looking for an error of type `E`.
    #[must_use]
    pub fn find_cause<E>(&self) -> Option<&E>
    where
        E: StdError + Send + Sync + 'static,
    {
        self.0.chain().find_map(|cause| cause.downcast_ref::<E>())
    }
}

impl PartialEq for Fault {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#}", self.0)
    }
}

/// Error raised by the persistence layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("database error: {message}")]
pub struct DatabaseError {
    message: String,
}

impl DatabaseError {
    /// Creates a database error with the driver's message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The driver's message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns `true` when the message contains `marker`, ignoring case.
    #[must_use]
    pub fn mentions(&self, marker: &str) -> bool {
        self.message
            .to_lowercase()
            .contains(&marker.to_lowercase())
    }
}

/// A single invalid member of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberError {
    member: String,
    message: String,
}

impl MemberError {
    /// Creates a member error.
    ///
    /// # Panics
    ///
    /// Panics if `member` or `message` is empty. A validator producing such
    /// an error is misconfigured.
    pub fn new(member: impl Into<String>, message: impl Into<String>) -> Self {
        let member = member.into();
        let message = message.into();
        assert!(
            !member.trim().is_empty(),
            "validation errors must name the invalid member"
        );
        assert!(
            !message.trim().is_empty(),
            "validation error for `{member}` has no message"
        );
        Self { member, message }
    }

    /// Name of the invalid member.
    #[must_use]
    pub fn member(&self) -> &str {
        &self.member
    }

    /// Human-readable reason.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for MemberError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.member, self.message)
    }
}

/// The collection of member errors for one failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors {
    errors: Vec<MemberError>,
}

impl ValidationErrors {
    /// Creates a validation failure.
    ///
    /// # Panics
    ///
    /// Panics if `errors` is empty.
    #[must_use]
    pub fn new(errors: Vec<MemberError>) -> Self {
        assert!(
            !errors.is_empty(),
            "a validation failure must carry at least one member error"
        );
        Self { errors }
    }

    /// Shorthand for a failure on a single member.
    pub fn single(member: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(vec![MemberError::new(member, message)])
    }

    /// The member errors, in the order the validator reported them.
    #[must_use]
    pub fn errors(&self) -> &[MemberError] {
        &self.errors
    }

    /// Returns the messages reported for `member`.
    pub fn for_member<'a>(&'a self, member: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.errors
            .iter()
            .filter(move |e| e.member == member)
            .map(MemberError::message)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.errors.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("connection reset")]
    struct ConnectionReset(#[source] DatabaseError);

    #[test]
    fn test_result_map_identity_preserves_value() {
        let ok: Result<i32, PipelineError> = Ok(7);
        let err: Result<i32, PipelineError> = Err(PipelineError::NoMatchingRecords);

        assert_eq!(ok.clone().map(|x| x), ok);
        assert_eq!(err.clone().map(|x| x), err);
    }

    #[test]
    fn test_result_and_then_is_associative() {
        let f = |x: i32| -> Result<i32, PipelineError> { Ok(x + 1) };
        let g = |x: i32| -> Result<i32, PipelineError> {
            if x > 5 {
                Err(PipelineError::business("too large"))
            } else {
                Ok(x * 2)
            }
        };

        for start in [Ok(1), Ok(5), Err(PipelineError::Cancelled)] {
            let left = start.clone().and_then(f).and_then(g);
            let right = start.and_then(|x| f(x).and_then(g));
            assert_eq!(left, right);
        }
    }

    #[test]
    fn test_map_on_error_never_invokes_success_function() {
        let err: Result<i32, PipelineError> = Err(PipelineError::NoMatchingRecords);
        let ok: Result<i32, PipelineError> = Ok(1);

        let mapped = err.map(|_| -> i32 { panic!("success function called on Err") });
        let mapped_err = ok.map_err(|_| -> PipelineError { panic!("error function called on Ok") });

        assert_eq!(mapped, Err(PipelineError::NoMatchingRecords));
        assert_eq!(mapped_err, Ok(1));
    }

    #[test]
    fn test_ok_orders_before_error() {
        let ok: Result<i32, i32> = Ok(100);
        let err: Result<i32, i32> = Err(0);

        assert!(ok < err);
        assert!(Ok::<i32, i32>(1) < Ok(2));
        assert!(Err::<i32, i32>(1) < Err(2));
    }

    #[test]
    fn test_fault_finds_database_error_in_cause_chain() {
        let fault = Fault::new(ConnectionReset(DatabaseError::new("Deadlock found")));

        let cause = fault.find_cause::<DatabaseError>();

        assert!(cause.is_some_and(|c| c.mentions("deadlock")));
    }

    #[test]
    fn test_fault_equality_is_identity() {
        let a = Fault::new(anyhow::anyhow!("boom"));
        let b = Fault::new(anyhow::anyhow!("boom"));

        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    #[should_panic(expected = "must name the invalid member")]
    fn test_member_error_without_member_panics() {
        let _ = MemberError::new("", "is required");
    }

    #[test]
    #[should_panic(expected = "has no message")]
    fn test_member_error_without_message_panics() {
        let _ = MemberError::new("name", " ");
    }

    #[test]
    fn test_validation_errors_display_joins_members() {
        let errors = ValidationErrors::new(vec![
            MemberError::new("name", "is required"),
            MemberError::new("age", "must be positive"),
        ]);

        assert_eq!(errors.to_string(), "name: is required; age: must be positive");
        assert_eq!(errors.for_member("age").collect::<Vec<_>>(), vec!["must be positive"]);
    }
}
