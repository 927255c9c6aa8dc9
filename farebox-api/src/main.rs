use std::net::SocketAddr;
use std::sync::Arc;

use farebox_api::{app, metrics::Metrics, requester::JwtRequesterDirectory, AppState};
use farebox_booking::gateway::{PaymentWebhookAdapter, WebhookVerifier};
use farebox_booking::lifecycle::ReservationLifecycle;
use farebox_booking::sweeper::ExpirySweeper;
use farebox_core::repository::NotificationDispatcher;
use farebox_store::{EventProducer, PgStore, RedisClient};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    "farebox_api=debug,farebox_booking=debug,tower_http=debug,axum::rejection=trace"
                        .into()
                }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = farebox_store::app_config::Config::load().expect("Failed to load config");
    tracing::info!("Starting Farebox API on port {}", config.server.port);

    // Postgres
    let store = PgStore::connect(&config.database.url)
        .await
        .expect("Failed to connect to Postgres");
    store.migrate().await.expect("Failed to run migrations");
    let store = Arc::new(store);

    // Redis (rate limiting)
    let redis = RedisClient::new(&config.redis.url)
        .await
        .expect("Failed to connect to Redis");
    let redis = Arc::new(redis);

    // Kafka
    let dispatcher: Arc<dyn NotificationDispatcher> = Arc::new(
        EventProducer::new(&config.kafka.brokers).expect("Failed to create Kafka producer"),
    );

    let lifecycle = Arc::new(ReservationLifecycle::new(
        store.clone(),
        store.clone(),
        store.clone(),
        dispatcher,
        config.booking_rules.clone(),
    ));

    let webhook = Arc::new(PaymentWebhookAdapter::new(
        WebhookVerifier::new(config.payment.webhook_secret.clone()),
        store.clone(),
        lifecycle.clone(),
    ));

    // Background reclamation of lapsed holds.
    ExpirySweeper::new(lifecycle.clone()).spawn();

    let app_state = AppState {
        lifecycle,
        reservations: store.clone(),
        webhook,
        requester: Arc::new(JwtRequesterDirectory::new(config.auth.jwt_secret.clone())),
        redis: Some(redis),
        metrics: Arc::new(Metrics::new()),
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .unwrap();
}
