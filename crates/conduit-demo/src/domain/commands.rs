//! Requests accepted by the order service.

use uuid::Uuid;

/// Places an order for `quantity` units of `sku`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceOrder {
    pub sku: String,
    pub quantity: u32,
}

/// Looks up a saved order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FindOrder {
    pub order_id: Uuid,
}

/// Tells the customer their order is on its way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotifyCustomer {
    pub order_id: Uuid,
}
