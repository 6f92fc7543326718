//! Query handlers for reading orders.

use std::sync::Arc;

use async_trait::async_trait;
use conduit_core::error::PipelineError;
use conduit_core::handler::RequestHandler;
use tokio_util::sync::CancellationToken;

use crate::domain::aggregates::OrderView;
use crate::domain::commands::FindOrder;
use crate::store::OrderStore;

/// Reads a saved order; `None` when it does not exist.
pub struct FindOrderHandler {
    store: Arc<OrderStore>,
}

impl FindOrderHandler {
    #[must_use]
    pub fn new(store: Arc<OrderStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl RequestHandler<FindOrder> for FindOrderHandler {
    type Response = Option<OrderView>;

    async fn handle(
        &self,
        request: &FindOrder,
        _cancel: &CancellationToken,
    ) -> Result<Option<OrderView>, PipelineError> {
        Ok(self.store.get(request.order_id).map(|order| order.view()))
    }
}
