//! Client for the order-management service that owns tables and orders.

use crate::domain::order::{OrderRef, OrderSnapshot, OrderUpdate};
use crate::domain::ports::OrderService;
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;

pub struct HttpOrderService {
    client: Client,
    base_url: String,
}

impl HttpOrderService {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(LedgerError::internal)?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, order: &OrderRef, suffix: &str) -> String {
        format!("{}/orders/{order}{suffix}", self.base_url)
    }
}

fn unreachable_service(err: reqwest::Error) -> LedgerError {
    LedgerError::internal(format!("order service unreachable: {err}"))
}

#[async_trait]
impl OrderService for HttpOrderService {
    async fn get_order(&self, order: &OrderRef) -> Result<Option<OrderSnapshot>> {
        let response = self
            .client
            .get(self.url(order, ""))
            .send()
            .await
            .map_err(unreachable_service)?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                Ok(Some(response.json().await.map_err(unreachable_service)?))
            }
            status => Err(LedgerError::internal(format!(
                "order service answered {status} for {order}"
            ))),
        }
    }

    async fn set_order_state(&self, order: &OrderRef, update: OrderUpdate) -> Result<()> {
        let response = self
            .client
            .put(self.url(order, "/state"))
            .json(&update)
            .send()
            .await
            .map_err(unreachable_service)?;
        match response.status() {
            StatusCode::NOT_FOUND => Err(LedgerError::OrderNotFound(order.to_string())),
            status if status.is_success() => Ok(()),
            status => Err(LedgerError::internal(format!(
                "order service answered {status} updating {order}"
            ))),
        }
    }
}
