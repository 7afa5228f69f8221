//! Notification kind, priority and category classification
//!
//! The server labels every notification with a kind string such as
//! `INVENTORY_LOW_STOCK`. Kinds we know map onto [`NotificationKind`];
//! anything else becomes [`NotificationKind::General`]. The category is
//! derived from the raw kind string, so unknown kinds still land in a
//! sensible bucket.

use serde::{Deserialize, Serialize};

/// Control kinds carried on the stream. These describe the connection,
/// not a notification, and are never normalized.
pub const CONNECTION_ESTABLISHED: &str = "CONNECTION_ESTABLISHED";
pub const CONNECTION_LOST: &str = "CONNECTION_LOST";

/// Whether a kind string is a connection-control signal.
///
/// Matches on the `CONNECTION` substring so that any future control kind
/// is filtered too.
pub fn is_control_kind(kind: &str) -> bool {
    kind.to_ascii_uppercase().contains("CONNECTION")
}

/// Priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "LOW",
            Priority::Medium => "MEDIUM",
            Priority::High => "HIGH",
        }
    }

    /// Lenient parse. `URGENT`/`CRITICAL` count as high, `NORMAL` as medium.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "LOW" => Some(Priority::Low),
            "MEDIUM" | "NORMAL" => Some(Priority::Medium),
            "HIGH" | "URGENT" | "CRITICAL" => Some(Priority::High),
            _ => None,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Category {
    Product,
    Inventory,
    Order,
    Discount,
    System,
    #[default]
    General,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Product => "PRODUCT",
            Category::Inventory => "INVENTORY",
            Category::Order => "ORDER",
            Category::Discount => "DISCOUNT",
            Category::System => "SYSTEM",
            Category::General => "GENERAL",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "PRODUCT" => Some(Category::Product),
            "INVENTORY" => Some(Category::Inventory),
            "ORDER" => Some(Category::Order),
            "DISCOUNT" => Some(Category::Discount),
            "SYSTEM" => Some(Category::System),
            "GENERAL" => Some(Category::General),
            _ => None,
        }
    }

    /// Classify a raw kind string by substring.
    pub fn classify(kind: &str) -> Self {
        let kind = kind.to_ascii_uppercase();
        if kind.contains("PRODUCT") {
            Category::Product
        } else if kind.contains("INVENTORY") {
            Category::Inventory
        } else if kind.contains("ORDER") || kind.contains("PAYMENT") || kind.contains("SHIPPING") {
            Category::Order
        } else if kind.contains("DISCOUNT") {
            Category::Discount
        } else if kind.contains("SYSTEM") {
            Category::System
        } else {
            Category::General
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Notification kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    ProductCreated,
    ProductUpdated,
    ProductDeleted,
    InventoryLowStock,
    InventoryOutOfStock,
    InventoryRestocked,
    OrderCreated,
    OrderStatusChanged,
    OrderCancelled,
    PaymentReceived,
    PaymentFailed,
    ShippingUpdate,
    DiscountCreated,
    DiscountExpiring,
    SystemAlert,
    SystemMaintenance,
    #[default]
    General,
}

impl NotificationKind {
    /// Map a raw kind string; unknown kinds fall back to `General`.
    ///
    /// Matching ignores case, and `-`/space are treated like `_`.
    pub fn parse(raw: &str) -> Self {
        let normalized = raw.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "PRODUCT_CREATED" | "NEW_PRODUCT" => NotificationKind::ProductCreated,
            "PRODUCT_UPDATED" => NotificationKind::ProductUpdated,
            "PRODUCT_DELETED" => NotificationKind::ProductDeleted,
            "INVENTORY_LOW_STOCK" | "LOW_STOCK" => NotificationKind::InventoryLowStock,
            "INVENTORY_OUT_OF_STOCK" | "OUT_OF_STOCK" => NotificationKind::InventoryOutOfStock,
            "INVENTORY_RESTOCKED" => NotificationKind::InventoryRestocked,
            "ORDER_CREATED" | "NEW_ORDER" => NotificationKind::OrderCreated,
            "ORDER_STATUS_CHANGED" | "ORDER_UPDATED" => NotificationKind::OrderStatusChanged,
            "ORDER_CANCELLED" => NotificationKind::OrderCancelled,
            "PAYMENT_RECEIVED" => NotificationKind::PaymentReceived,
            "PAYMENT_FAILED" => NotificationKind::PaymentFailed,
            "SHIPPING_UPDATE" => NotificationKind::ShippingUpdate,
            "DISCOUNT_CREATED" => NotificationKind::DiscountCreated,
            "DISCOUNT_EXPIRING" => NotificationKind::DiscountExpiring,
            "SYSTEM_ALERT" => NotificationKind::SystemAlert,
            "SYSTEM_MAINTENANCE" => NotificationKind::SystemMaintenance,
            _ => NotificationKind::General,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::ProductCreated => "PRODUCT_CREATED",
            NotificationKind::ProductUpdated => "PRODUCT_UPDATED",
            NotificationKind::ProductDeleted => "PRODUCT_DELETED",
            NotificationKind::InventoryLowStock => "INVENTORY_LOW_STOCK",
            NotificationKind::InventoryOutOfStock => "INVENTORY_OUT_OF_STOCK",
            NotificationKind::InventoryRestocked => "INVENTORY_RESTOCKED",
            NotificationKind::OrderCreated => "ORDER_CREATED",
            NotificationKind::OrderStatusChanged => "ORDER_STATUS_CHANGED",
            NotificationKind::OrderCancelled => "ORDER_CANCELLED",
            NotificationKind::PaymentReceived => "PAYMENT_RECEIVED",
            NotificationKind::PaymentFailed => "PAYMENT_FAILED",
            NotificationKind::ShippingUpdate => "SHIPPING_UPDATE",
            NotificationKind::DiscountCreated => "DISCOUNT_CREATED",
            NotificationKind::DiscountExpiring => "DISCOUNT_EXPIRING",
            NotificationKind::SystemAlert => "SYSTEM_ALERT",
            NotificationKind::SystemMaintenance => "SYSTEM_MAINTENANCE",
            NotificationKind::General => "GENERAL",
        }
    }

    /// Default title shown when the payload carries none.
    pub fn default_title(&self) -> &'static str {
        match self {
            NotificationKind::ProductCreated => "New Product Added",
            NotificationKind::ProductUpdated => "Product Updated",
            NotificationKind::ProductDeleted => "Product Removed",
            NotificationKind::InventoryLowStock => "Low Stock Alert",
            NotificationKind::InventoryOutOfStock => "Out of Stock",
            NotificationKind::InventoryRestocked => "Product Restocked",
            NotificationKind::OrderCreated => "New Order",
            NotificationKind::OrderStatusChanged => "Order Status Updated",
            NotificationKind::OrderCancelled => "Order Cancelled",
            NotificationKind::PaymentReceived => "Payment Received",
            NotificationKind::PaymentFailed => "Payment Failed",
            NotificationKind::ShippingUpdate => "Shipping Update",
            NotificationKind::DiscountCreated => "New Discount Available",
            NotificationKind::DiscountExpiring => "Discount Expiring Soon",
            NotificationKind::SystemAlert => "System Alert",
            NotificationKind::SystemMaintenance => "Scheduled Maintenance",
            NotificationKind::General => "Notification",
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
