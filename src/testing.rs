//! Scripted in-memory `Gateway` for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;

use crate::api::Gateway;
use crate::error::RemoteError;
use crate::models::{NewMenuItem, NewOrder, Order, OrderId, Product};

struct Scripted<T> {
    delay: Duration,
    result: Result<T, RemoteError>,
}

type Script<T> = Mutex<VecDeque<Scripted<T>>>;

/// Each operation pops its next scripted response; an empty script yields
/// an empty list or an empty body.
#[derive(Default)]
pub(crate) struct FakeGateway {
    orders: Script<Vec<Order>>,
    menu: Script<Vec<Product>>,
    create_order: Script<Option<Value>>,
    patch_status: Script<Option<Value>>,
    create_menu_item: Script<Option<Value>>,

    pub fetch_orders_calls: AtomicUsize,
    pub fetch_menu_calls: AtomicUsize,
    pub created_orders: Mutex<Vec<NewOrder>>,
    pub patched: Mutex<Vec<(OrderId, String)>>,
    pub created_menu_items: Mutex<Vec<NewMenuItem>>,
}

pub(crate) fn backend_error(code: u16, detail: Option<&str>) -> RemoteError {
    RemoteError::Status {
        status: StatusCode::from_u16(code).unwrap(),
        detail: detail.map(str::to_string),
        message: Some("server error".into()),
    }
}

pub(crate) fn order(id: OrderId, status: &str) -> Order {
    Order {
        id,
        status: status.to_string(),
        total_price: None,
        items: None,
        extra: Default::default(),
    }
}

pub(crate) fn product(id: i64, name: &str, price: f64) -> Product {
    Product {
        id,
        name: name.to_string(),
        category: "panini".to_string(),
        price,
    }
}

fn push<T>(script: &Script<T>, delay: Duration, result: Result<T, RemoteError>) {
    script
        .lock()
        .unwrap()
        .push_back(Scripted { delay, result });
}

async fn next<T: Default>(script: &Script<T>) -> Result<T, RemoteError> {
    let scripted = script.lock().unwrap().pop_front();
    match scripted {
        Some(Scripted { delay, result }) => {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            result
        }
        None => Ok(T::default()),
    }
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_orders(&self, result: Result<Vec<Order>, RemoteError>) {
        push(&self.orders, Duration::ZERO, result);
    }

    pub fn script_orders_after(&self, delay: Duration, result: Result<Vec<Order>, RemoteError>) {
        push(&self.orders, delay, result);
    }

    pub fn script_menu(&self, result: Result<Vec<Product>, RemoteError>) {
        push(&self.menu, Duration::ZERO, result);
    }

    pub fn script_create_order(&self, result: Result<Option<Value>, RemoteError>) {
        push(&self.create_order, Duration::ZERO, result);
    }

    pub fn script_create_order_after(
        &self,
        delay: Duration,
        result: Result<Option<Value>, RemoteError>,
    ) {
        push(&self.create_order, delay, result);
    }

    pub fn script_patch_status(&self, result: Result<Option<Value>, RemoteError>) {
        push(&self.patch_status, Duration::ZERO, result);
    }

    pub fn script_create_menu_item(&self, result: Result<Option<Value>, RemoteError>) {
        push(&self.create_menu_item, Duration::ZERO, result);
    }

    pub fn fetch_orders_calls(&self) -> usize {
        self.fetch_orders_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_menu_calls(&self) -> usize {
        self.fetch_menu_calls.load(Ordering::SeqCst)
    }

    pub fn created_order_count(&self) -> usize {
        self.created_orders.lock().unwrap().len()
    }
}

#[async_trait]
impl Gateway for FakeGateway {
    async fn fetch_orders(&self) -> Result<Vec<Order>, RemoteError> {
        self.fetch_orders_calls.fetch_add(1, Ordering::SeqCst);
        next(&self.orders).await
    }

    async fn fetch_menu(&self) -> Result<Vec<Product>, RemoteError> {
        self.fetch_menu_calls.fetch_add(1, Ordering::SeqCst);
        next(&self.menu).await
    }

    async fn create_order(&self, order: &NewOrder) -> Result<Option<Value>, RemoteError> {
        self.created_orders.lock().unwrap().push(order.clone());
        next(&self.create_order).await
    }

    async fn patch_order_status(
        &self,
        id: OrderId,
        status: &str,
    ) -> Result<Option<Value>, RemoteError> {
        self.patched.lock().unwrap().push((id, status.to_string()));
        next(&self.patch_status).await
    }

    async fn create_menu_item(&self, item: &NewMenuItem) -> Result<Option<Value>, RemoteError> {
        self.created_menu_items.lock().unwrap().push(item.clone());
        next(&self.create_menu_item).await
    }

    async fn check_health(&self) -> Result<Duration, RemoteError> {
        Ok(Duration::ZERO)
    }
}
