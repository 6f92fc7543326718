//! Request validation.

use std::sync::Arc;

use async_trait::async_trait;
use conduit_core::access::Validator;
use conduit_core::error::{MemberError, PipelineError, ValidationErrors};
use conduit_core::handler::RequestHandler;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::ensure_active;

/// Runs a validator before the inner handler.
pub struct ValidationHandler<H, Req> {
    inner: H,
    validator: Arc<dyn Validator<Req>>,
}

impl<H, Req> ValidationHandler<H, Req> {
    /// Wraps `inner` with `validator`.
    pub fn new(inner: H, validator: Arc<dyn Validator<Req>>) -> Self {
        Self { inner, validator }
    }
}

#[async_trait]
impl<H, Req> RequestHandler<Req> for ValidationHandler<H, Req>
where
    Req: Send + Sync,
    H: RequestHandler<Req>,
{
    type Response = H::Response;

    async fn handle(
        &self,
        request: &Req,
        cancel: &CancellationToken,
    ) -> Result<H::Response, PipelineError> {
        ensure_active(cancel)?;
        if let Err(error) = self.validator.validate(request, cancel).await {
            if let PipelineError::Validation(errors) = &error {
                debug!(
                    request = std::any::type_name::<Req>(),
                    errors = %errors,
                    "request rejected by validation"
                );
            }
            return Err(error);
        }
        self.inner.handle(request, cancel).await
    }
}

type Rule<Req> = Box<dyn Fn(&Req) -> bool + Send + Sync>;

/// Validator built from per-member predicates.
///
/// Every failing rule contributes one [`MemberError`]; all rules run.
pub struct RuleValidator<Req> {
    rules: Vec<(String, String, Rule<Req>)>,
}

impl<Req> Default for RuleValidator<Req> {
    fn default() -> Self {
        Self { rules: Vec::new() }
    }
}

impl<Req> RuleValidator<Req> {
    /// Creates a validator without rules.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a rule: `member` is invalid with `message` unless `check` holds.
    ///
    /// # Panics
    ///
    /// Panics if `member` or `message` is empty.
    #[must_use]
    pub fn rule(
        mut self,
        member: impl Into<String>,
        message: impl Into<String>,
        check: impl Fn(&Req) -> bool + Send + Sync + 'static,
    ) -> Self {
        let error = MemberError::new(member, message);
        self.rules.push((
            error.member().to_owned(),
            error.message().to_owned(),
            Box::new(check),
        ));
        self
    }
}

#[async_trait]
impl<Req> Validator<Req> for RuleValidator<Req>
where
    Req: Send + Sync,
{
    async fn validate(&self, request: &Req, _cancel: &CancellationToken) -> Result<(), PipelineError> {
        let failures: Vec<MemberError> = self
            .rules
            .iter()
            .filter(|(_, _, check)| !check(request))
            .map(|(member, message, _)| MemberError::new(member.clone(), message.clone()))
            .collect();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::Validation(ValidationErrors::new(failures)))
        }
    }
}

#[cfg(test)]
mod tests {
    use conduit_test_support::ScriptedHandler;

    use super::*;

    #[derive(Debug, Clone)]
    struct Register {
        email: String,
        age: u8,
    }

    fn validator() -> Arc<RuleValidator<Register>> {
        Arc::new(
            RuleValidator::new()
                .rule("email", "must contain @", |r: &Register| r.email.contains('@'))
                .rule("age", "must be at least 18", |r: &Register| r.age >= 18),
        )
    }

    #[tokio::test]
    async fn test_every_failing_member_is_reported() {
        // Arrange
        let inner = Arc::new(ScriptedHandler::<Register, ()>::always(Ok(())));
        let handler: ValidationHandler<_, Register> =
            ValidationHandler::new(Arc::clone(&inner), validator());
        let request = Register {
            email: "nobody".to_owned(),
            age: 12,
        };

        // Act
        let result = handler.handle(&request, &CancellationToken::new()).await;

        // Assert
        let Err(PipelineError::Validation(errors)) = result else {
            panic!("expected validation errors");
        };
        let members: Vec<&str> = errors.errors().iter().map(MemberError::member).collect();
        assert_eq!(members, vec!["email", "age"]);
        assert_eq!(inner.calls(), 0);
    }

    #[tokio::test]
    async fn test_valid_request_reaches_handler() {
        let inner = Arc::new(ScriptedHandler::<Register, ()>::always(Ok(())));
        let handler: ValidationHandler<_, Register> =
            ValidationHandler::new(Arc::clone(&inner), validator());
        let request = Register {
            email: "ada@example.com".to_owned(),
            age: 36,
        };

        let result = handler.handle(&request, &CancellationToken::new()).await;

        assert_eq!(result, Ok(()));
        assert_eq!(inner.calls(), 1);
    }

    #[test]
    #[should_panic(expected = "must name the invalid member")]
    fn test_rule_without_member_panics() {
        let _ = RuleValidator::<Register>::new().rule("", "is required", |_| true);
    }
}
