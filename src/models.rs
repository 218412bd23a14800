//! Wire and domain records shared by the cart, the gateway and the view sync.
//!
//! Everything the backend owns (`Product`, fetched `Order`) is held as a
//! read-only snapshot. Outgoing payloads (`NewOrder`, `NewMenuItem`,
//! `OrderStatusUpdate`) are built locally and serialized as-is.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

pub type ProductId = i64;
pub type OrderId = i64;

/// Statuses the backend is known to use. Status strings stay free-form.
pub mod status {
    pub const NEW: &str = "nuovo";
    pub const IN_PREPARATION: &str = "in_preparazione";
    pub const READY: &str = "pronto";
    pub const DELIVERED: &str = "consegnato";
    pub const CANCELLED: &str = "annullato";
}

/// A menu entry as served by `GET /api/menu`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    #[serde(default)]
    pub category: String,
    pub price: f64,
}

/// One cart entry: the product snapshot taken when it was first added, plus a
/// quantity that is always at least 1.
#[derive(Debug, Clone, PartialEq)]
pub struct CartLine {
    pub product: Product,
    pub quantity: u32,
}

impl CartLine {
    pub fn subtotal(&self) -> f64 {
        self.product.price * f64::from(self.quantity)
    }

    pub fn to_order_item(&self) -> OrderItem {
        OrderItem {
            id: self.product.id,
            name: self.product.name.clone(),
            quantity: self.quantity,
            price: self.product.price,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: ProductId,
    pub name: String,
    pub quantity: u32,
    pub price: f64,
}

/// Body of `POST /api/orders`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewOrder {
    pub items: Vec<OrderItem>,
    pub total_price: f64,
}

/// Body of `POST /api/menu`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewMenuItem {
    pub name: String,
    pub category: String,
    pub price: f64,
}

impl Default for NewMenuItem {
    fn default() -> Self {
        Self {
            name: String::new(),
            category: "panini".to_string(),
            price: 0.0,
        }
    }
}

/// Body of `PATCH /api/orders/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderStatusUpdate<'a> {
    pub status: &'a str,
}

/// A server-side order as returned by `GET /api/orders`.
///
/// Only `id` and `status` are relied upon. The backend stores the line items
/// as a JSON string (`items_json`), so both that and a plain `items` array are
/// accepted. Any other field is kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_price: Option<f64>,
    #[serde(
        default,
        alias = "items_json",
        deserialize_with = "items_from_array_or_json_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub items: Option<Vec<OrderItem>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn items_from_array_or_json_string<'de, D>(
    deserializer: D,
) -> Result<Option<Vec<OrderItem>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    let items = match raw {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(Value::String(s)) => {
            Some(serde_json::from_str(&s).map_err(serde::de::Error::custom)?)
        }
        Some(other) => Some(serde_json::from_value(other).map_err(serde::de::Error::custom)?),
    };
    Ok(items)
}
