//! One operator session: cart, views, submission and the polling loop.

use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use crate::api::Gateway;
use crate::cart::CartAggregator;
use crate::config::POLL_INTERVAL;
use crate::error::KioskError;
use crate::models::{NewMenuItem, OrderId};
use crate::scheduler::{PollingScheduler, SchedulerState};
use crate::submission::OrderSubmissionFlow;
use crate::view_sync::{RefreshReport, ViewSyncController};

pub struct KioskSession {
    cart: Arc<CartAggregator>,
    view: Arc<ViewSyncController>,
    submission: OrderSubmissionFlow,
    scheduler: PollingScheduler,
}

impl KioskSession {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        let cart = Arc::new(CartAggregator::new());
        let view = Arc::new(ViewSyncController::new(gateway.clone()));
        let submission = OrderSubmissionFlow::new(gateway, cart.clone(), view.clone());
        Self {
            cart,
            view,
            submission,
            scheduler: PollingScheduler::new(),
        }
    }

    /// Load orders and menu once, then keep them fresh every
    /// `POLL_INTERVAL` until `teardown()`.
    pub async fn init(&self) -> RefreshReport {
        let report = self.view.refresh_now().await;
        let view = self.view.clone();
        self.scheduler.start(POLL_INTERVAL, move || {
            let view = view.clone();
            async move {
                view.refresh_now().await;
            }
        });
        info!(
            interval_ms = POLL_INTERVAL.as_millis() as u64,
            "Kiosk session started"
        );
        report
    }

    /// Stop polling. Requests already in flight are not cancelled.
    pub fn teardown(&self) {
        self.scheduler.stop();
        info!("Kiosk session stopped");
    }

    pub fn is_polling(&self) -> bool {
        self.scheduler.state() == SchedulerState::Running
    }

    pub fn cart(&self) -> &CartAggregator {
        &self.cart
    }

    pub fn view(&self) -> &Arc<ViewSyncController> {
        &self.view
    }

    pub fn submission(&self) -> &OrderSubmissionFlow {
        &self.submission
    }

    pub async fn submit_order(&self) -> Result<Option<Value>, KioskError> {
        self.submission.submit().await
    }

    /// Status changes are fire-and-refresh; failures are only logged.
    pub async fn change_order_status(&self, id: OrderId, status: &str) {
        let _ = self.view.change_order_status(id, status).await;
    }

    pub async fn add_menu_item(&self, item: &NewMenuItem) -> Result<Option<Value>, KioskError> {
        self.view.add_menu_item(item).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::status;
    use crate::testing::{backend_error, order, product, FakeGateway};
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_init_refreshes_then_polls_every_two_seconds() {
        let gateway = Arc::new(FakeGateway::new());
        gateway.script_menu(Ok(vec![product(1, "Classic", 5.0)]));
        let session = KioskSession::new(gateway.clone());

        session.init().await;
        assert!(session.is_polling());
        assert_eq!(gateway.fetch_orders_calls(), 1);
        assert_eq!(session.view().menu().len(), 1);

        tokio::time::sleep(Duration::from_millis(4100)).await;
        assert_eq!(gateway.fetch_orders_calls(), 3);
        assert_eq!(gateway.fetch_menu_calls(), 3);

        session.teardown();
        assert!(!session.is_polling());
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(gateway.fetch_orders_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_survives_failed_fetches() {
        let gateway = Arc::new(FakeGateway::new());
        gateway.script_orders(Ok(vec![order(1, status::NEW)]));
        gateway.script_orders(Err(backend_error(503, None)));
        gateway.script_orders(Ok(vec![order(1, status::READY)]));
        let session = KioskSession::new(gateway.clone());

        session.init().await;
        tokio::time::sleep(Duration::from_millis(2100)).await;
        assert_eq!(session.view().orders()[0].status, status::NEW);

        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert_eq!(session.view().orders()[0].status, status::READY);
        session.teardown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cart_to_order_round() {
        let gateway = Arc::new(FakeGateway::new());
        let session = KioskSession::new(gateway.clone());
        session.init().await;

        let classic = product(1, "Classic", 5.0);
        session.cart().add_item(&classic);
        session.cart().add_item(&classic);
        assert_eq!(session.cart().compute_total(), 10.0);

        session.submit_order().await.unwrap();
        assert!(session.cart().is_empty());
        assert_eq!(gateway.created_order_count(), 1);

        session.change_order_status(1, status::IN_PREPARATION).await;
        assert_eq!(gateway.patched.lock().unwrap().len(), 1);
        session.teardown();
    }
}
