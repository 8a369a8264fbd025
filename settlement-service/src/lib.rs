pub mod config;
pub mod dtos;
pub mod error;
pub mod handlers;
pub mod models;
pub mod services;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use mongodb::{options::ClientOptions, Client};
use secrecy::ExposeSecret;
use tower_http::trace::TraceLayer;

use config::Config;
use services::audit::run_settlement_audit;
use services::{
    CachedTokenProvider, MongoOrderStore, MongoPaymentStore, OrderStore, PaymentStore,
    PesapalClient, TokenProvider,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub payments: Arc<dyn PaymentStore>,
    pub orders: Arc<dyn OrderStore>,
    pub gateway: PesapalClient,
    pub tokens: Arc<dyn TokenProvider>,
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics))
        .route("/payment", post(handlers::checkout::initiate_payment))
        .route("/callback", get(handlers::ipn::payment_callback))
        .route("/status", get(handlers::ipn::payment_status))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            }),
        )
        .with_state(state)
}

pub struct Application {
    port: u16,
    router: Router,
    state: AppState,
}

impl Application {
    pub async fn build(config: Config) -> anyhow::Result<Self> {
        let mut client_options = ClientOptions::parse(config.database.url.expose_secret()).await?;
        client_options.app_name = Some("settlement-service".to_string());

        let client = Client::with_options(client_options)?;
        let db = client.database(&config.database.db_name);

        let payment_store = MongoPaymentStore::new(&db);
        payment_store.init_indexes().await?;
        let payments: Arc<dyn PaymentStore> = Arc::new(payment_store);
        let orders: Arc<dyn OrderStore> = Arc::new(MongoOrderStore::new(&db));

        let gateway = PesapalClient::new(config.pesapal.clone());
        let tokens: Arc<dyn TokenProvider> = Arc::new(CachedTokenProvider::new(gateway.clone()));

        let state = AppState {
            config: config.clone(),
            payments,
            orders,
            gateway,
            tokens,
        };

        let router = app_router(state.clone());

        Ok(Self {
            port: config.server.port,
            router,
            state,
        })
    }

    pub async fn run_until_stopped(self) -> anyhow::Result<()> {
        if self.state.config.audit.enabled {
            let payments = self.state.payments.clone();
            let orders = self.state.orders.clone();
            let interval = self.state.config.audit.interval_secs;
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(Duration::from_secs(interval));
                // The first tick fires immediately; skip it so the sweep runs
                // on the configured cadence after startup.
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    match run_settlement_audit(payments.as_ref(), orders.as_ref()).await {
                        Ok(report) if report.repaired > 0 || report.orphaned > 0 => {
                            tracing::warn!(
                                scanned = report.scanned,
                                repaired = report.repaired,
                                orphaned = report.orphaned,
                                "Settlement audit found inconsistencies"
                            );
                        }
                        Ok(report) => {
                            tracing::debug!(scanned = report.scanned, "Settlement audit clean");
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Settlement audit failed");
                        }
                    }
                }
            });
        }

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        tracing::info!("Listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, self.router).await?;

        Ok(())
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}
