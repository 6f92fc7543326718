//! Domain events raised by orders.

use conduit_core::event::DomainEvent;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Emitted when an order is accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderPlaced {
    /// The order identifier.
    pub order_id: Uuid,
    /// The ordered stock-keeping unit.
    pub sku: String,
    /// Number of units ordered.
    pub quantity: u32,
}

/// Emitted once stock has been set aside for an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockReserved {
    /// The order identifier.
    pub order_id: Uuid,
    /// Number of units reserved.
    pub quantity: u32,
}

impl DomainEvent for OrderPlaced {
    fn event_name(&self) -> &str {
        "orders.order_placed"
    }

    fn to_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "order_id": self.order_id,
            "sku": self.sku,
            "quantity": self.quantity,
        })
    }
}

impl DomainEvent for StockReserved {
    fn event_name(&self) -> &str {
        "orders.stock_reserved"
    }

    fn to_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "order_id": self.order_id,
            "quantity": self.quantity,
        })
    }
}
