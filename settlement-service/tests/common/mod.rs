use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use secrecy::Secret;
use serde_json::json;
use tokio::sync::Mutex;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use settlement_service::config::{
    AuditConfig, Config, DatabaseConfig, PesapalConfig, ServerConfig,
};
use settlement_service::models::{Order, OrderStatus, Payment, PaymentOutcome, PaymentStatus};
use settlement_service::services::repository::{OrderStore, OrderTransition, PaymentStore};
use settlement_service::services::{CachedTokenProvider, PesapalClient, TokenProvider};
use settlement_service::{app_router, AppState};

/// In-memory `PaymentStore` with the same uniqueness guarantee the Mongo
/// index enforces.
#[derive(Default)]
pub struct InMemoryPaymentStore {
    payments: Mutex<Vec<Payment>>,
}

impl InMemoryPaymentStore {
    pub async fn all(&self) -> Vec<Payment> {
        self.payments.lock().await.clone()
    }

    pub async fn count(&self) -> usize {
        self.payments.lock().await.len()
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn create_payment(&self, payment: Payment) -> Result<()> {
        let mut payments = self.payments.lock().await;
        if payments.iter().any(|p| p.reference == payment.reference) {
            bail!("duplicate payment reference: {}", payment.reference);
        }
        payments.push(payment);
        Ok(())
    }

    async fn find_by_reference(&self, reference: &str) -> Result<Option<Payment>> {
        let payments = self.payments.lock().await;
        Ok(payments.iter().find(|p| p.reference == reference).cloned())
    }

    async fn record_gateway_status(
        &self,
        reference: &str,
        status: PaymentStatus,
        payment_status: PaymentOutcome,
        payment_reference: &str,
        status_details: serde_json::Value,
    ) -> Result<()> {
        let mut payments = self.payments.lock().await;
        if let Some(payment) = payments.iter_mut().find(|p| p.reference == reference) {
            payment.status = status;
            payment.payment_status = payment_status;
            payment.payment_reference = Some(payment_reference.to_string());
            payment.status_details = Some(status_details);
            payment.updated_at = mongodb::bson::DateTime::now();
        }
        Ok(())
    }

    async fn completed_payments(&self) -> Result<Vec<Payment>> {
        let payments = self.payments.lock().await;
        Ok(payments
            .iter()
            .filter(|p| p.status == PaymentStatus::Completed)
            .cloned()
            .collect())
    }
}

/// In-memory `OrderStore` that counts forward transitions so tests can assert
/// an order was advanced exactly once.
#[derive(Default)]
pub struct InMemoryOrderStore {
    orders: Mutex<HashMap<String, Order>>,
    transitions: AtomicUsize,
}

impl InMemoryOrderStore {
    pub async fn insert(&self, order: Order) {
        self.orders.lock().await.insert(order.id.clone(), order);
    }

    pub async fn get(&self, id: &str) -> Option<Order> {
        self.orders.lock().await.get(id).cloned()
    }

    pub fn transitions(&self) -> usize {
        self.transitions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn find_order(&self, id: &str) -> Result<Option<Order>> {
        Ok(self.orders.lock().await.get(id).cloned())
    }

    async fn mark_paid(&self, id: &str) -> Result<OrderTransition> {
        let mut orders = self.orders.lock().await;
        match orders.get_mut(id) {
            None => Ok(OrderTransition::NotFound),
            Some(order) if order.status == OrderStatus::AwaitingPayment => {
                order.status = OrderStatus::PaidPendingFulfillment;
                self.transitions.fetch_add(1, Ordering::SeqCst);
                Ok(OrderTransition::Advanced)
            }
            Some(_) => Ok(OrderTransition::AlreadySettled),
        }
    }
}

pub fn awaiting_order(id: &str, total: f64) -> Order {
    Order {
        id: id.to_string(),
        products: vec![],
        total,
        status: OrderStatus::AwaitingPayment,
    }
}

pub struct TestApp {
    pub address: String,
    pub gateway: MockServer,
    pub payments: Arc<InMemoryPaymentStore>,
    pub orders: Arc<InMemoryOrderStore>,
    pub client: reqwest::Client,
}

impl TestApp {
    pub async fn spawn() -> Self {
        let gateway = MockServer::start().await;
        let api_base_url = gateway.uri();
        Self::spawn_inner(gateway, api_base_url).await
    }

    /// Spawn against an arbitrary gateway URL, e.g. one nothing listens on.
    /// The mock server field is a stand-in and receives no traffic.
    pub async fn spawn_with_gateway_url(url: &str) -> Self {
        let gateway = MockServer::start().await;
        Self::spawn_inner(gateway, url.to_string()).await
    }

    async fn spawn_inner(gateway: MockServer, api_base_url: String) -> Self {
        let config = Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            database: DatabaseConfig {
                url: Secret::new("mongodb://unused:27017".to_string()),
                db_name: "settlement_test".to_string(),
            },
            pesapal: PesapalConfig {
                consumer_key: "test-key".to_string(),
                consumer_secret: Secret::new("test-secret".to_string()),
                api_base_url,
                callback_url: "https://shop.example/callback".to_string(),
                currency: "KES".to_string(),
                request_timeout_secs: 2,
            },
            audit: AuditConfig {
                enabled: false,
                interval_secs: 300,
            },
            service_name: "settlement-service-test".to_string(),
        };

        let payments = Arc::new(InMemoryPaymentStore::default());
        let orders = Arc::new(InMemoryOrderStore::default());

        let pesapal = PesapalClient::new(config.pesapal.clone());
        let tokens: Arc<dyn TokenProvider> = Arc::new(CachedTokenProvider::new(pesapal.clone()));

        let payments_dyn: Arc<dyn PaymentStore> = payments.clone();
        let orders_dyn: Arc<dyn OrderStore> = orders.clone();
        let state = AppState {
            config,
            payments: payments_dyn,
            orders: orders_dyn,
            gateway: pesapal,
            tokens,
        };

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let address = format!("http://{}", listener.local_addr().unwrap());

        let router = app_router(state);
        tokio::spawn(async move {
            axum::serve(listener, router).await.ok();
        });

        TestApp {
            address,
            gateway,
            payments,
            orders,
            client: reqwest::Client::new(),
        }
    }

    // --- gateway fixtures ---

    pub async fn mount_token(&self) {
        Mock::given(method("POST"))
            .and(path("/api/Auth/RequestToken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "token": "test-token",
                "expiryDate": (chrono::Utc::now() + chrono::Duration::minutes(5)).to_rfc3339(),
            })))
            .mount(&self.gateway)
            .await;
    }

    pub async fn mount_ipn(&self) {
        Mock::given(method("POST"))
            .and(path("/api/URLSetup/RegisterIPN"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ipn_id": "ipn-1",
                "url": "https://shop.example/callback",
            })))
            .mount(&self.gateway)
            .await;
    }

    pub async fn mount_submit_success(&self, tracking_id: &str, redirect_url: &str) {
        Mock::given(method("POST"))
            .and(path("/api/Transactions/SubmitOrderRequest"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "order_tracking_id": tracking_id,
                "merchant_reference": null,
                "redirect_url": redirect_url,
            })))
            .mount(&self.gateway)
            .await;
    }

    pub async fn mount_submit_rejection(&self, status: u16, body: serde_json::Value) {
        Mock::given(method("POST"))
            .and(path("/api/Transactions/SubmitOrderRequest"))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(&self.gateway)
            .await;
    }

    pub async fn mount_transaction_status(&self, tracking_id: &str, description: &str) {
        Mock::given(method("GET"))
            .and(path("/api/Transactions/GetTransactionStatus"))
            .and(query_param("orderTrackingId", tracking_id))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "payment_status_description": description,
                "confirmation_code": "CONF-1",
                "payment_method": "MPESA",
            })))
            .mount(&self.gateway)
            .await;
    }

    pub async fn mount_transaction_status_once(&self, tracking_id: &str, description: &str) {
        Mock::given(method("GET"))
            .and(path("/api/Transactions/GetTransactionStatus"))
            .and(query_param("orderTrackingId", tracking_id))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "payment_status_description": description,
                "confirmation_code": "CONF-1",
                "payment_method": "MPESA",
            })))
            .up_to_n_times(1)
            .mount(&self.gateway)
            .await;
    }

    pub async fn mount_transaction_status_error(&self, status: u16) {
        Mock::given(method("GET"))
            .and(path("/api/Transactions/GetTransactionStatus"))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.gateway)
            .await;
    }

    // --- request helpers ---

    pub async fn initiate(&self, body: &serde_json::Value) -> reqwest::Response {
        self.client
            .post(format!("{}/payment", self.address))
            .json(body)
            .send()
            .await
            .expect("Failed to execute initiate request")
    }

    pub async fn callback(&self, tracking_id: &str, reference: &str) -> reqwest::Response {
        self.client
            .get(format!("{}/callback", self.address))
            .query(&[
                ("OrderTrackingId", tracking_id),
                ("OrderMerchantReference", reference),
            ])
            .send()
            .await
            .expect("Failed to execute callback request")
    }

    pub async fn poll_status(&self, tracking_id: &str, reference: &str) -> reqwest::Response {
        self.client
            .get(format!("{}/status", self.address))
            .query(&[("trackingId", tracking_id), ("reference", reference)])
            .send()
            .await
            .expect("Failed to execute status request")
    }
}

pub fn initiate_body(reference: Option<&str>, amount: f64) -> serde_json::Value {
    json!({
        "email": "jo@example.com",
        "reference": reference,
        "phone": "0712345678",
        "first_name": "Jo",
        "last_name": "Doe",
        "amount": amount,
        "description": "Order payment",
    })
}
