//! Local cart for the order being assembled at the kiosk.
//!
//! `Cart` is an immutable value. `CartAggregator` owns the current one and
//! replaces it wholesale on every mutation, publishing the new `Arc<Cart>`
//! through a `watch` channel so that presentation code can react to changes
//! by subscription instead of comparing references.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use crate::models::{CartLine, NewOrder, OrderItem, Product, ProductId};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cart {
    lines: BTreeMap<ProductId, CartLine>,
    revision: u64,
}

impl Cart {
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Bumped once for each mutation that produced this value.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn line(&self, id: ProductId) -> Option<&CartLine> {
        self.lines.get(&id)
    }

    pub fn quantity_of(&self, id: ProductId) -> u32 {
        self.lines.get(&id).map(|l| l.quantity).unwrap_or(0)
    }

    /// Lines ordered by product id.
    pub fn lines(&self) -> impl Iterator<Item = &CartLine> {
        self.lines.values()
    }

    pub fn total(&self) -> f64 {
        self.lines.values().map(CartLine::subtotal).sum()
    }

    pub fn to_order_items(&self) -> Vec<OrderItem> {
        self.lines.values().map(CartLine::to_order_item).collect()
    }

    /// Items and total are both taken from `self`, so they always agree.
    pub fn to_new_order(&self) -> NewOrder {
        NewOrder {
            items: self.to_order_items(),
            total_price: self.total(),
        }
    }

    fn with_added(&self, product: &Product) -> Cart {
        let mut lines = self.lines.clone();
        lines
            .entry(product.id)
            .and_modify(|line| line.quantity = line.quantity.saturating_add(1))
            .or_insert_with(|| CartLine {
                product: product.clone(),
                quantity: 1,
            });
        Cart {
            lines,
            revision: self.revision + 1,
        }
    }

    fn without(&self, id: ProductId) -> Option<Cart> {
        if !self.lines.contains_key(&id) {
            return None;
        }
        let mut lines = self.lines.clone();
        lines.remove(&id);
        Some(Cart {
            lines,
            revision: self.revision + 1,
        })
    }
}

/// Owner of the kiosk's cart. Mutated only by operator actions and by a
/// successful order submission.
pub struct CartAggregator {
    current: watch::Sender<Arc<Cart>>,
}

impl Default for CartAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl CartAggregator {
    pub fn new() -> Self {
        let (current, _) = watch::channel(Arc::new(Cart::default()));
        Self { current }
    }

    /// Current cart value. Later mutations never alter the returned value.
    pub fn snapshot(&self) -> Arc<Cart> {
        self.current.borrow().clone()
    }

    /// Receives every new cart value published after a mutation.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Cart>> {
        self.current.subscribe()
    }

    /// Add one unit of `product`. A product already in the cart keeps its
    /// original snapshot and gets its quantity bumped.
    pub fn add_item(&self, product: &Product) {
        let mut quantity = 0;
        self.current.send_modify(|cart| {
            let next = cart.with_added(product);
            quantity = next.quantity_of(product.id);
            *cart = Arc::new(next);
        });
        debug!(product_id = product.id, quantity, "cart: item added");
    }

    /// Drop the whole line for `id`. Absent ids are ignored.
    pub fn remove_item(&self, id: ProductId) {
        let removed = self.current.send_if_modified(|cart| match cart.without(id) {
            Some(next) => {
                *cart = Arc::new(next);
                true
            }
            None => false,
        });
        if removed {
            debug!(product_id = id, "cart: line removed");
        }
    }

    pub fn compute_total(&self) -> f64 {
        self.current.borrow().total()
    }

    pub fn is_empty(&self) -> bool {
        self.current.borrow().is_empty()
    }

    pub fn to_order_items(&self) -> Vec<OrderItem> {
        self.current.borrow().to_order_items()
    }

    pub fn reset(&self) {
        self.current.send_modify(|cart| {
            *cart = Arc::new(Cart {
                lines: BTreeMap::new(),
                revision: cart.revision + 1,
            });
        });
    }
}
