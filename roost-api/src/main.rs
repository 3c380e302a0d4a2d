use anyhow::Context;
use roost_api::{
    app,
    state::{AppState, AuthConfig},
};
use roost_booking::{
    CheckoutCoordinator, Janitor, MockGateway, Reservations, RetryPolicy, StatusPropagator,
};
use roost_core::payment::PaymentGateway;
use roost_core::repository::{PlaceStore, ReservationStore, UserStore};
use roost_store::{DbClient, PgPlaceStore, PgReservationStore, PgUserStore};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "roost_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = roost_store::app_config::Config::load().context("failed to load config")?;
    tracing::info!("Starting Roost API on port {}", config.server.port);

    let db = DbClient::new(&config.database.url)
        .await
        .context("failed to connect to Postgres")?;
    db.migrate().await.context("failed to run migrations")?;

    let places: Arc<dyn PlaceStore> = Arc::new(PgPlaceStore::new(db.pool.clone()));
    let users: Arc<dyn UserStore> = Arc::new(PgUserStore::new(db.pool.clone()));
    let reservations: Arc<dyn ReservationStore> = Arc::new(PgReservationStore::new(db.pool.clone()));

    // Provider adapter selection is a deployment concern; the in-process
    // gateway stands in until a live provider client is wired.
    let gateway: Arc<dyn PaymentGateway> = Arc::new(MockGateway::new());

    let lifecycle = Arc::new(Reservations::new(places.clone(), reservations.clone()));
    let retry = RetryPolicy::new(
        config.booking_rules.provider_retry_attempts,
        Duration::from_millis(config.booking_rules.provider_retry_backoff_ms),
    );
    let coordinator = Arc::new(CheckoutCoordinator::new(
        gateway,
        lifecycle.clone(),
        reservations.clone(),
        users.clone(),
        places.clone(),
        config.payment.client_url.clone(),
        retry,
    ));
    let propagator = Arc::new(StatusPropagator::new(users.clone(), places.clone()));
    let janitor = Arc::new(Janitor::new(
        reservations.clone(),
        chrono::Duration::minutes(config.booking_rules.checkout_window_minutes as i64),
    ));

    tokio::spawn(janitor.clone().run(Duration::from_secs(
        config.booking_rules.janitor_interval_seconds,
    )));

    let app_state = AppState {
        places,
        users,
        reservations,
        lifecycle,
        coordinator,
        propagator,
        janitor,
        auth: AuthConfig {
            secret: config.auth.jwt_secret.clone(),
            expiration: config.auth.jwt_expiration_seconds,
        },
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind listener")?;
    axum::serve(listener, app).await.context("server exited")?;
    Ok(())
}
