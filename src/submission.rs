//! Turning the cart into a backend order.
//!
//! The flow runs `Idle -> Validating -> Submitting -> Succeeded | Failed`.
//! A terminal state stays visible until the caller acknowledges it or the
//! next submission starts, which puts the flow back in `Idle`.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api::Gateway;
use crate::cart::CartAggregator;
use crate::error::KioskError;
use crate::view_sync::ViewSyncController;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionState {
    Idle,
    Validating,
    Submitting,
    Succeeded,
    Failed,
}

impl SubmissionState {
    fn is_busy(self) -> bool {
        matches!(self, SubmissionState::Validating | SubmissionState::Submitting)
    }
}

pub struct OrderSubmissionFlow {
    gateway: Arc<dyn Gateway>,
    cart: Arc<CartAggregator>,
    view: Arc<ViewSyncController>,
    state: watch::Sender<SubmissionState>,
}

impl OrderSubmissionFlow {
    pub fn new(
        gateway: Arc<dyn Gateway>,
        cart: Arc<CartAggregator>,
        view: Arc<ViewSyncController>,
    ) -> Self {
        let (state, _) = watch::channel(SubmissionState::Idle);
        Self {
            gateway,
            cart,
            view,
            state,
        }
    }

    pub fn state(&self) -> SubmissionState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SubmissionState> {
        self.state.subscribe()
    }

    /// Return to `Idle` after a terminal state has been shown.
    pub fn acknowledge(&self) {
        self.state.send_if_modified(|state| {
            if state.is_busy() || *state == SubmissionState::Idle {
                return false;
            }
            *state = SubmissionState::Idle;
            true
        });
    }

    fn set(&self, next: SubmissionState) {
        debug!(state = ?next, "order submission");
        self.state.send_replace(next);
    }

    /// Submit the current cart as one order.
    ///
    /// On success the cart is emptied and the views are refreshed once; the
    /// created order is returned if the backend sent one back. On failure the
    /// cart is left untouched and the error carries the text to show.
    pub async fn submit(&self) -> Result<Option<Value>, KioskError> {
        let started = self.state.send_if_modified(|state| {
            if state.is_busy() {
                return false;
            }
            *state = SubmissionState::Validating;
            true
        });
        if !started {
            return Err(KioskError::Busy);
        }

        let cart = self.cart.snapshot();
        if cart.is_empty() {
            self.set(SubmissionState::Failed);
            return Err(KioskError::Validation("empty cart".into()));
        }

        self.set(SubmissionState::Submitting);
        let order = cart.to_new_order();
        info!(
            lines = order.items.len(),
            total_price = order.total_price,
            "Submitting order"
        );

        match self.gateway.create_order(&order).await {
            Ok(created) => {
                self.cart.reset();
                self.set(SubmissionState::Succeeded);
                self.view.refresh_now().await;
                Ok(created)
            }
            Err(e) => {
                warn!(error = %e, "Order creation failed");
                self.set(SubmissionState::Failed);
                Err(e.into())
            }
        }
    }
}
