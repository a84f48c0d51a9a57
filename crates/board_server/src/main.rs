#![forbid(unsafe_code)]

mod config;
mod server;

use std::sync::Arc;

use board_util::AllowedOrigins;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::server::auth::AuthResolver;
use crate::server::registry::RoomRegistry;
use crate::server::router::{build_router, AppState, HealthState};
use crate::server::snapshot_store::{PostgresSnapshotStore, SnapshotStore};

fn init_tracing(otlp_endpoint: Option<&str>) {
	let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info,board_server=debug".to_string());

	let base = tracing_subscriber::registry()
		.with(tracing_subscriber::EnvFilter::new(filter))
		.with(tracing_subscriber::fmt::layer().with_target(false));

	let otlp_endpoint = otlp_endpoint.map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

	if let Some(endpoint) = otlp_endpoint {
		use opentelemetry::global;
		use opentelemetry::trace::TracerProvider as _;
		use opentelemetry_otlp::WithExportConfig;

		match opentelemetry_otlp::SpanExporter::builder().with_tonic().with_endpoint(endpoint.clone()).build() {
			Ok(exporter) => {
				let tracer_provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
					.with_batch_exporter(exporter)
					.build();
				let tracer = tracer_provider.tracer("board_server");
				global::set_tracer_provider(tracer_provider);

				let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);
				base.with(otel_layer).init();
				info!(endpoint = %endpoint, "otlp tracing enabled");
			}
			Err(e) => {
				base.init();
				warn!(error = %e, "failed to initialize otlp tracing");
			}
		}
	} else {
		base.init();
	}
}

fn init_metrics(bind: Option<&str>) {
	let Some(bind) = bind else {
		return;
	};

	match bind.parse::<std::net::SocketAddr>() {
		Ok(addr) => {
			if let Err(e) = metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(addr).install() {
				warn!(error = %e, "failed to start metrics exporter");
			} else {
				info!(%addr, "metrics exporter listening");
			}
		}
		Err(e) => {
			warn!(error = %e, %bind, "invalid metrics bind address (expected host:port)");
		}
	}
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let config_path = crate::config::default_config_path()?;
	let cfg = crate::config::load_server_config_from_path(&config_path)?;

	init_tracing(cfg.otlp_endpoint.as_deref());
	info!(path = %config_path.display(), "loaded server config (toml + env overrides)");

	init_metrics(cfg.metrics_bind.as_deref());

	let supabase_url = cfg
		.supabase_url
		.clone()
		.ok_or_else(|| anyhow::anyhow!("SUPABASE_URL must be configured"))?;
	let jwt_secret = cfg
		.supabase_service_role_key
		.clone()
		.ok_or_else(|| anyhow::anyhow!("SUPABASE_SERVICE_ROLE_KEY must be configured"))?;

	let pool = PgPoolOptions::new().max_connections(10).connect(&supabase_url).await?;
	info!("connected to snapshot store");

	let auth = Arc::new(AuthResolver::new(pool.clone(), jwt_secret));
	let store: Arc<dyn SnapshotStore> = Arc::new(PostgresSnapshotStore::new(pool));
	let registry = Arc::new(RoomRegistry::new(auth, store, cfg.limits));

	let allowed_origins = Arc::new(AllowedOrigins::parse(&cfg.allowed_origins));
	let health = HealthState::new();

	let state = AppState { registry, allowed_origins, health: health.clone(), limits: cfg.limits };
	let app = build_router(state);

	let bind_addr: std::net::SocketAddr = cfg.bind.parse()?;
	let listener = tokio::net::TcpListener::bind(bind_addr).await?;
	info!(%bind_addr, "board_server listening");

	health.mark_ready();

	axum::serve(listener, app.into_make_service_with_connect_info::<std::net::SocketAddr>()).await?;

	Ok(())
}
