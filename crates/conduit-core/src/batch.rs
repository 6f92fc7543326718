//! Batch contracts and the aggregate batch error.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;

/// A type-erased success value held inside a [`BatchError`].
///
/// Values are shared; equality is identity, so a value moved from a nested
/// aggregate into a flattened one still compares equal to itself.
#[derive(Clone)]
pub struct BatchValue(Arc<dyn Any + Send + Sync>);

impl BatchValue {
    /// Wraps a success value.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// Returns the value if it is a `T`.
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl PartialEq for BatchValue {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for BatchValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BatchValue(..)")
    }
}

/// Per-item outcome of a batch in which at least one item failed.
///
/// Holds exactly one result per input position, in input order.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchError {
    items: Vec<Result<BatchValue, PipelineError>>,
}

impl BatchError {
    /// Creates an aggregate from per-item results.
    ///
    /// # Panics
    ///
    /// Panics if no item failed; an all-success batch is not an error.
    #[must_use]
    pub fn new(items: Vec<Result<BatchValue, PipelineError>>) -> Self {
        assert!(
            items.iter().any(Result::is_err),
            "a batch error needs at least one failed item"
        );
        Self { items }
    }

    /// Creates an aggregate from typed per-item results.
    ///
    /// # Panics
    ///
    /// Panics if no item failed.
    #[must_use]
    pub fn from_results<T>(results: Vec<Result<T, PipelineError>>) -> Self
    where
        T: Any + Send + Sync,
    {
        Self::new(
            results
                .into_iter()
                .map(|r| r.map(BatchValue::new))
                .collect(),
        )
    }

    /// Number of items, successful or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Always `false`; kept for the `len` convention.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The per-item results.
    #[must_use]
    pub fn items(&self) -> &[Result<BatchValue, PipelineError>] {
        &self.items
    }

    /// Iterates the per-item results in input order.
    pub fn iter(&self) -> std::slice::Iter<'_, Result<BatchValue, PipelineError>> {
        self.items.iter()
    }

    /// Consumes the aggregate, returning the per-item results.
    #[must_use]
    pub fn into_items(self) -> Vec<Result<BatchValue, PipelineError>> {
        self.items
    }

    /// Failed items with their input position.
    pub fn failures(&self) -> impl Iterator<Item = (usize, &PipelineError)> {
        self.items
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.as_ref().err().map(|e| (i, e)))
    }

    /// The successful value at `index`, if it succeeded and is a `T`.
    #[must_use]
    pub fn value_at<T: Any>(&self, index: usize) -> Option<&T> {
        self.items
            .get(index)
            .and_then(|r| r.as_ref().ok())
            .and_then(BatchValue::downcast_ref::<T>)
    }

    /// Typed view of every item.
    ///
    /// Returns `None` if any success value is not a `T`.
    #[must_use]
    pub fn typed<T: Any + Clone>(&self) -> Option<Vec<Result<T, PipelineError>>> {
        self.items
            .iter()
            .map(|item| match item {
                Ok(value) => value.downcast_ref::<T>().cloned().map(Ok),
                Err(error) => Some(Err(error.clone())),
            })
            .collect()
    }

    /// Splices nested aggregates into this one, depth first.
    ///
    /// An item that failed with a nested [`PipelineError::Batch`] is replaced
    /// by the nested items, keeping their relative order.
    #[must_use]
    pub fn flatten(self) -> Self {
        let mut items = Vec::with_capacity(self.items.len());
        for item in self.items {
            match item {
                Err(PipelineError::Batch(nested)) => items.extend(nested.flatten().items),
                other => items.push(other),
            }
        }
        Self { items }
    }
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let failed = self.items.iter().filter(|r| r.is_err()).count();
        write!(f, "{failed} of {} items failed", self.items.len())
    }
}

impl IntoIterator for BatchError {
    type Item = Result<BatchValue, PipelineError>;
    type IntoIter = std::vec::IntoIter<Self::Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a BatchError {
    type Item = &'a Result<BatchValue, PipelineError>;
    type IntoIter = std::slice::Iter<'a, Result<BatchValue, PipelineError>>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Partitions a batch into sub-batches that are handled independently.
#[async_trait]
pub trait BatchGrouper<Req>: Send + Sync
where
    Req: Send + Sync,
{
    /// Splits `items` into groups. Every item must appear in exactly one group.
    async fn group(&self, items: &[Req], cancel: &CancellationToken) -> Vec<Vec<Req>>;
}

/// Expands one macro request into the concrete requests it stands for.
#[async_trait]
pub trait BatchMacroExpander<M, Req>: Send + Sync
where
    M: Send + Sync,
{
    /// Produces the concrete requests for `request`.
    ///
    /// # Errors
    ///
    /// Returns an error if the records behind the macro cannot be looked up.
    async fn expand(&self, request: &M, cancel: &CancellationToken)
    -> Result<Vec<Req>, PipelineError>;
}
