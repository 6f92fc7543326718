//! Follow-up work triggered once an order is committed.

use std::sync::Arc;

use async_trait::async_trait;
use conduit_core::error::PipelineError;
use conduit_core::handler::RequestHandler;
use conduit_events::process::{DispatchReaction, ReactiveProcessManager};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use crate::domain::commands::NotifyCustomer;
use crate::domain::events::OrderPlaced;
use crate::store::OrderStore;

/// Notifications that have been sent, in order.
#[derive(Debug, Default)]
pub struct Outbox {
    sent: Mutex<Vec<Uuid>>,
}

impl Outbox {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Orders the customer has been notified about.
    #[must_use]
    pub fn sent(&self) -> Vec<Uuid> {
        self.sent.lock().clone()
    }
}

/// Notifies the customer once stock for their order is reserved.
pub struct NotifyCustomerHandler {
    store: Arc<OrderStore>,
    outbox: Arc<Outbox>,
}

impl NotifyCustomerHandler {
    #[must_use]
    pub fn new(store: Arc<OrderStore>, outbox: Arc<Outbox>) -> Self {
        Self { store, outbox }
    }
}

#[async_trait]
impl RequestHandler<NotifyCustomer> for NotifyCustomerHandler {
    type Response = ();

    async fn handle(
        &self,
        request: &NotifyCustomer,
        _cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        let order = self.store.get(request.order_id).ok_or_else(|| PipelineError::NotFound {
            resource: "Order".to_owned(),
        })?;
        if !order.view().reserved {
            return Err(PipelineError::business(format!(
                "stock for order {} is not reserved",
                request.order_id
            )));
        }
        self.outbox.sent.lock().push(request.order_id);
        info!(order_id = %request.order_id, "customer notified");
        Ok(())
    }
}

/// Process manager that notifies the customer for every placed order.
#[must_use]
pub fn order_automation<H>(notify: H) -> ReactiveProcessManager
where
    H: RequestHandler<NotifyCustomer> + 'static,
{
    ReactiveProcessManager::new().with_reactor(Arc::new(DispatchReaction::new(
        notify,
        |event: &OrderPlaced| {
            Some(NotifyCustomer {
                order_id: event.order_id,
            })
        },
    )))
}

#[cfg(test)]
mod tests {
    use conduit_core::aggregate::AggregateRoot;
    use conduit_core::unit_of_work::ChangeSet;

    use super::*;
    use crate::domain::aggregates::Order;

    #[tokio::test]
    async fn test_unreserved_order_is_not_notified() {
        // Arrange
        let store = Arc::new(OrderStore::new());
        let order = Order::place("SKU-1", 1);
        store.add(order.clone());
        store.save_changes(&CancellationToken::new()).await.unwrap();
        let outbox = Arc::new(Outbox::new());
        let handler = NotifyCustomerHandler::new(store, outbox.clone());

        // Act
        let result = handler
            .handle(
                &NotifyCustomer {
                    order_id: order.aggregate_id(),
                },
                &CancellationToken::new(),
            )
            .await;

        // Assert
        assert!(matches!(result, Err(PipelineError::Business(_))));
        assert!(outbox.sent().is_empty());
    }

    #[tokio::test]
    async fn test_reserved_order_is_notified() {
        let store = Arc::new(OrderStore::new());
        let order = Order::place("SKU-1", 1);
        order.reserve_stock();
        store.add(order.clone());
        store.save_changes(&CancellationToken::new()).await.unwrap();
        let outbox = Arc::new(Outbox::new());
        let handler = NotifyCustomerHandler::new(store, outbox.clone());

        handler
            .handle(
                &NotifyCustomer {
                    order_id: order.aggregate_id(),
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outbox.sent(), vec![order.aggregate_id()]);
    }
}
