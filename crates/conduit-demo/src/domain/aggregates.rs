//! The order aggregate.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use conduit_core::aggregate::{AggregateRoot, EventQueue};
use conduit_core::event::SharedEvent;
use serde::Serialize;
use uuid::Uuid;

use super::events::{OrderPlaced, StockReserved};

/// An order and the events it has raised but not yet published.
#[derive(Debug)]
pub struct Order {
    id: Uuid,
    sku: String,
    quantity: u32,
    reserved: AtomicBool,
    events: EventQueue,
}

/// Read model of a saved order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderView {
    pub order_id: Uuid,
    pub sku: String,
    pub quantity: u32,
    pub reserved: bool,
}

impl Order {
    /// Creates a new order and raises [`OrderPlaced`].
    #[must_use]
    pub fn place(sku: impl Into<String>, quantity: u32) -> Arc<Self> {
        let order = Arc::new(Self {
            id: Uuid::now_v7(),
            sku: sku.into(),
            quantity,
            reserved: AtomicBool::new(false),
            events: EventQueue::new(),
        });
        order.events.add(OrderPlaced {
            order_id: order.id,
            sku: order.sku.clone(),
            quantity,
        });
        order
    }

    /// Marks stock as reserved and raises [`StockReserved`] the first time.
    ///
    /// Returns `None` if stock was already reserved.
    pub fn reserve_stock(&self) -> Option<SharedEvent> {
        if self.reserved.swap(true, Ordering::SeqCst) {
            return None;
        }
        Some(self.events.add(StockReserved {
            order_id: self.id,
            quantity: self.quantity,
        }))
    }

    /// Current read model.
    #[must_use]
    pub fn view(&self) -> OrderView {
        OrderView {
            order_id: self.id,
            sku: self.sku.clone(),
            quantity: self.quantity,
            reserved: self.reserved.load(Ordering::SeqCst),
        }
    }
}

impl AggregateRoot for Order {
    fn aggregate_id(&self) -> Uuid {
        self.id
    }

    fn events(&self) -> &EventQueue {
        &self.events
    }
}
