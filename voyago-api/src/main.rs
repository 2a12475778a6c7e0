use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use voyago_api::{app, AppState};
use voyago_billing::{
    settlement_channel, BillingPolicy, MockGateway, PaymentEngine, SettlementWorker, StripeGateway,
};
use voyago_core::{EventSink, PaymentGateway};
use voyago_inventory::{ExpirySweeper, RentalCarLedger, ReservationManager, RoomTypeLedger};
use voyago_store::{DbClient, EventProducer, RedisClient};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voyago=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = voyago_store::app_config::Config::load().expect("Failed to load config");
    tracing::info!("Starting Voyago API on port {}", config.server.port);

    let db = DbClient::new(&config.database.url)
        .await
        .expect("Failed to connect to Postgres");
    db.migrate().await.expect("Failed to run migrations");

    let redis = RedisClient::new(&config.redis.url)
        .await
        .expect("Failed to connect to Redis");

    let kafka = EventProducer::new(&config.kafka.brokers).expect("Failed to create Kafka producer");
    let sink: Arc<dyn EventSink> = Arc::new(kafka);

    let gateway: Arc<dyn PaymentGateway> = if config.gateway.is_mock() {
        tracing::info!("Payment gateway running in mock mode");
        Arc::new(MockGateway)
    } else {
        Arc::new(StripeGateway::new(
            config.gateway.secret_key.clone(),
            config.gateway.base_url.clone(),
        ))
    };

    let (settlement_tx, settlement_rx) = settlement_channel();

    let billing = Arc::new(PaymentEngine::new(
        db.pool.clone(),
        gateway,
        sink,
        Some(redis),
        Some(settlement_tx),
        BillingPolicy {
            idempotency_stale_seconds: config.business_rules.idempotency_stale_seconds,
            response_cache_ttl_seconds: config.business_rules.response_cache_ttl_seconds,
            mock_mode: config.gateway.is_mock(),
        },
    ));

    tokio::spawn(SettlementWorker::new(billing.clone(), settlement_rx).run());

    let hotel = Arc::new(ReservationManager::new(
        db.pool.clone(),
        Arc::new(RoomTypeLedger),
        config.business_rules.hold_ttl_seconds,
    ));
    let cars = Arc::new(ReservationManager::new(
        db.pool.clone(),
        Arc::new(RentalCarLedger),
        config.business_rules.hold_ttl_seconds,
    ));

    tokio::spawn(
        ExpirySweeper::new(hotel.clone(), config.business_rules.sweep_interval_seconds).run(),
    );
    tokio::spawn(
        ExpirySweeper::new(cars.clone(), config.business_rules.sweep_interval_seconds).run(),
    );

    let app_state = AppState {
        hotel,
        cars,
        billing,
        webhook_secret: config.gateway.webhook_secret.clone(),
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");
    axum::serve(listener, app).await.expect("Server error");
}
