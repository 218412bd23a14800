//! Order and menu snapshots kept in step with the backend.
//!
//! `refresh_now()` fetches orders and menu concurrently and replaces each
//! snapshot wholesale on success. A failed fetch leaves its snapshot as it
//! was. Every refresh is tagged with a generation number and a snapshot only
//! accepts data from a generation newer than the one it already shows, so a
//! slow response from an overlapping poll can never overwrite fresher data.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, trace, warn};

use crate::api::Gateway;
use crate::error::{KioskError, RemoteError};
use crate::models::{NewMenuItem, Order, OrderId, Product};

/// A published copy of server state.
#[derive(Debug)]
pub struct Snapshot<T> {
    pub items: Arc<Vec<T>>,
    /// Generation of the refresh that produced `items`; 0 before the first.
    pub generation: u64,
    pub refreshed_at: Option<DateTime<Utc>>,
}

impl<T> Clone for Snapshot<T> {
    fn clone(&self) -> Self {
        Self {
            items: self.items.clone(),
            generation: self.generation,
            refreshed_at: self.refreshed_at,
        }
    }
}

impl<T> Default for Snapshot<T> {
    fn default() -> Self {
        Self {
            items: Arc::new(Vec::new()),
            generation: 0,
            refreshed_at: None,
        }
    }
}

/// What happened to one snapshot during a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotUpdate {
    Applied,
    /// Response arrived after a newer one had already been applied.
    Stale,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshReport {
    pub generation: u64,
    pub orders: SnapshotUpdate,
    pub menu: SnapshotUpdate,
}

pub struct ViewSyncController {
    gateway: Arc<dyn Gateway>,
    orders: watch::Sender<Snapshot<Order>>,
    menu: watch::Sender<Snapshot<Product>>,
    issued: AtomicU64,
}

fn apply<T>(
    tx: &watch::Sender<Snapshot<T>>,
    what: &'static str,
    generation: u64,
    result: Result<Vec<T>, RemoteError>,
) -> SnapshotUpdate {
    let items = match result {
        Ok(items) => items,
        Err(e) => {
            warn!(generation, error = %e, "Failed to refresh {what}");
            return SnapshotUpdate::Failed;
        }
    };

    let count = items.len();
    let applied = tx.send_if_modified(move |current| {
        if generation <= current.generation {
            return false;
        }
        *current = Snapshot {
            items: Arc::new(items),
            generation,
            refreshed_at: Some(Utc::now()),
        };
        true
    });

    if applied {
        trace!(generation, count, "{what} snapshot replaced");
        SnapshotUpdate::Applied
    } else {
        debug!(generation, "Discarding stale {what} response");
        SnapshotUpdate::Stale
    }
}

impl ViewSyncController {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        let (orders, _) = watch::channel(Snapshot::default());
        let (menu, _) = watch::channel(Snapshot::default());
        Self {
            gateway,
            orders,
            menu,
            issued: AtomicU64::new(0),
        }
    }

    pub fn orders(&self) -> Arc<Vec<Order>> {
        self.orders.borrow().items.clone()
    }

    pub fn menu(&self) -> Arc<Vec<Product>> {
        self.menu.borrow().items.clone()
    }

    pub fn orders_snapshot(&self) -> Snapshot<Order> {
        self.orders.borrow().clone()
    }

    pub fn menu_snapshot(&self) -> Snapshot<Product> {
        self.menu.borrow().clone()
    }

    pub fn subscribe_orders(&self) -> watch::Receiver<Snapshot<Order>> {
        self.orders.subscribe()
    }

    pub fn subscribe_menu(&self) -> watch::Receiver<Snapshot<Product>> {
        self.menu.subscribe()
    }

    /// Number of refreshes started so far.
    pub fn refreshes_issued(&self) -> u64 {
        self.issued.load(Ordering::SeqCst)
    }

    /// Fetch orders and menu concurrently; each snapshot is applied as soon
    /// as its own response arrives.
    pub async fn refresh_now(&self) -> RefreshReport {
        let generation = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let (orders, menu) = tokio::join!(
            async {
                let result = self.gateway.fetch_orders().await;
                apply(&self.orders, "orders", generation, result)
            },
            async {
                let result = self.gateway.fetch_menu().await;
                apply(&self.menu, "menu", generation, result)
            },
        );
        RefreshReport {
            generation,
            orders,
            menu,
        }
    }

    /// Ask the backend to move order `id` to `status`, then refresh whether
    /// or not the change was accepted.
    pub async fn change_order_status(
        &self,
        id: OrderId,
        status: &str,
    ) -> Result<Option<Value>, RemoteError> {
        let result = self.gateway.patch_order_status(id, status).await;
        if let Err(e) = &result {
            warn!(order_id = id, status, error = %e, "Order status change failed");
        }
        self.refresh_now().await;
        result
    }

    /// Create a menu entry and refresh on success. A blank name is rejected
    /// without contacting the backend.
    pub async fn add_menu_item(&self, item: &NewMenuItem) -> Result<Option<Value>, KioskError> {
        if item.name.trim().is_empty() {
            return Err(KioskError::Validation("missing product name".into()));
        }
        match self.gateway.create_menu_item(item).await {
            Ok(created) => {
                self.refresh_now().await;
                Ok(created)
            }
            Err(e) => {
                warn!(name = %item.name, error = %e, "Failed to add menu item");
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::status;
    use crate::testing::{backend_error, order, product, FakeGateway};
    use std::time::Duration;

    fn controller() -> (Arc<FakeGateway>, ViewSyncController) {
        let gateway = Arc::new(FakeGateway::new());
        let view = ViewSyncController::new(gateway.clone());
        (gateway, view)
    }

    #[tokio::test]
    async fn test_refresh_replaces_both_snapshots() {
        let (gateway, view) = controller();
        gateway.script_orders(Ok(vec![order(1, status::NEW), order(2, status::READY)]));
        gateway.script_menu(Ok(vec![product(1, "Classic", 5.0)]));

        let report = view.refresh_now().await;

        assert_eq!(report.orders, SnapshotUpdate::Applied);
        assert_eq!(report.menu, SnapshotUpdate::Applied);
        assert_eq!(view.orders().len(), 2);
        assert_eq!(view.menu()[0].name, "Classic");
        assert!(view.orders_snapshot().refreshed_at.is_some());
        assert_eq!(view.menu_snapshot().generation, 1);
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_previous_snapshot() {
        let (gateway, view) = controller();
        gateway.script_orders(Ok(vec![order(1, status::NEW)]));
        gateway.script_menu(Ok(vec![product(1, "Classic", 5.0)]));
        view.refresh_now().await;

        gateway.script_orders(Err(backend_error(500, Some("db down"))));
        gateway.script_menu(Ok(vec![
            product(1, "Classic", 5.0),
            product(2, "Cheese", 6.0),
        ]));
        let report = view.refresh_now().await;

        assert_eq!(report.orders, SnapshotUpdate::Failed);
        assert_eq!(report.menu, SnapshotUpdate::Applied);
        assert_eq!(view.orders().len(), 1);
        assert_eq!(view.orders_snapshot().generation, 1);
        assert_eq!(view.menu().len(), 2);
    }

    #[tokio::test]
    async fn test_snapshot_is_replaced_not_merged() {
        let (gateway, view) = controller();
        gateway.script_orders(Ok(vec![order(1, status::NEW), order(2, status::NEW)]));
        view.refresh_now().await;
        gateway.script_orders(Ok(vec![order(3, status::READY)]));
        view.refresh_now().await;

        let ids: Vec<_> = view.orders().iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_response_from_older_refresh_is_discarded() {
        let gateway = Arc::new(FakeGateway::new());
        let view = Arc::new(ViewSyncController::new(gateway.clone()));
        gateway.script_orders_after(Duration::from_millis(3000), Ok(vec![order(1, status::NEW)]));
        gateway.script_orders_after(
            Duration::from_millis(100),
            Ok(vec![order(1, status::READY)]),
        );

        let slow_view = view.clone();
        let slow = tokio::spawn(async move { slow_view.refresh_now().await });
        tokio::task::yield_now().await;
        let fast = view.refresh_now().await;
        let slow = slow.await.unwrap();

        assert_eq!(slow.generation, 1);
        assert_eq!(fast.generation, 2);
        assert_eq!(fast.orders, SnapshotUpdate::Applied);
        assert_eq!(slow.orders, SnapshotUpdate::Stale);
        assert_eq!(view.orders()[0].status, status::READY);
        assert_eq!(view.orders_snapshot().generation, 2);
    }

    #[tokio::test]
    async fn test_change_status_refreshes_even_on_failure() {
        let (gateway, view) = controller();
        gateway.script_patch_status(Err(backend_error(400, Some("status required"))));

        let result = view.change_order_status(4, status::DELIVERED).await;

        assert!(result.is_err());
        assert_eq!(
            gateway.patched.lock().unwrap().as_slice(),
            &[(4, status::DELIVERED.to_string())]
        );
        assert_eq!(gateway.fetch_orders_calls(), 1);
        assert_eq!(gateway.fetch_menu_calls(), 1);
    }

    #[tokio::test]
    async fn test_add_menu_item_rejects_blank_name() {
        let (gateway, view) = controller();
        let item = NewMenuItem {
            name: "   ".into(),
            ..NewMenuItem::default()
        };

        let err = view.add_menu_item(&item).await.unwrap_err();

        assert!(err.is_validation());
        assert!(gateway.created_menu_items.lock().unwrap().is_empty());
        assert_eq!(gateway.fetch_menu_calls(), 0);
    }

    #[tokio::test]
    async fn test_add_menu_item_refreshes_after_create() {
        let (gateway, view) = controller();
        gateway.script_create_menu_item(Ok(Some(serde_json::json!({ "id": 9 }))));
        gateway.script_menu(Ok(vec![product(9, "Bacon", 7.5)]));
        let item = NewMenuItem {
            name: "Bacon".into(),
            price: 7.5,
            ..NewMenuItem::default()
        };

        let created = view.add_menu_item(&item).await.unwrap();

        assert_eq!(created, Some(serde_json::json!({ "id": 9 })));
        assert_eq!(view.menu()[0].id, 9);
        assert_eq!(gateway.fetch_menu_calls(), 1);
    }

    #[tokio::test]
    async fn test_add_menu_item_failure_skips_refresh() {
        let (gateway, view) = controller();
        gateway.script_create_menu_item(Err(backend_error(400, None)));
        let item = NewMenuItem {
            name: "Vegan".into(),
            ..NewMenuItem::default()
        };

        let err = view.add_menu_item(&item).await.unwrap_err();

        assert!(!err.is_validation());
        assert_eq!(gateway.fetch_menu_calls(), 0);
    }
}
