use std::process::ExitCode;

use axum_statsd_metrics::{
    label::compose_label, ClientConfig, ClientOptions, GetLabel, HealthOptions, LabelMode,
    Metrics, MetricsError, PluginOptions, RoutesOptions,
};
use tracing_subscriber::EnvFilter;

mod server;

const DEFAULT_ADDR: &str = "0.0.0.0:3000";

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,axum_statsd_metrics=debug")),
        )
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "metrics demo failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    // ── 1. Plugin options ────────────────────────────────────────
    let options = load_options()?;

    // ── 2. Root plugin instance ──────────────────────────────────
    let metrics = Metrics::register(options.clone()).await?;

    // ── 3. Nested instance, labels keyed on `x-type` ─────────────
    let tenants = Metrics::register_at(
        "/tenants",
        PluginOptions {
            client: ClientOptions::Sink(metrics.client().clone()),
            routes: RoutesOptions {
                mode: LabelMode::Dynamic,
                get_label: Some(GetLabel::for_dynamic(|req| {
                    let kind = req
                        .request
                        .headers
                        .get("x-type")
                        .and_then(|value| value.to_str().ok())
                        .unwrap_or("default");
                    let route = req.route;
                    compose_label(
                        route.framework_prefix(),
                        route.routes_prefix(),
                        &format!("{kind}.{}", route.route_id()),
                    )
                })),
                ..options.routes.clone()
            },
            health: HealthOptions::Disabled,
        },
    )
    .await?;

    // ── 4. Build Axum router ─────────────────────────────────────
    let app = server::create_router(metrics.clone(), tenants.clone());

    // ── 5. Bind & serve ──────────────────────────────────────────
    let addr = std::env::var("LISTEN_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_owned());
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!(
        %addr,
        namespace = %metrics.namespace(),
        "metrics demo listening, health at /api/health and /api/health/stream"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %err, "cannot listen for ctrl-c");
            }
        })
        .await?;

    tenants.close().await?;
    metrics.close().await?;
    Ok(())
}

/// `METRICS_CONFIG` holds the plugin options as JSON; `STATSD_HOST`
/// overrides the client host.
fn load_options() -> Result<PluginOptions, MetricsError> {
    let mut options = match std::env::var("METRICS_CONFIG") {
        Ok(raw) => {
            let value: serde_json::Value = serde_json::from_str(&raw).map_err(|err| {
                MetricsError::InvalidConfiguration(format!("METRICS_CONFIG is not valid JSON: {err}."))
            })?;
            PluginOptions::from_json(&value)?
        }
        Err(_) => PluginOptions::default(),
    };

    if let Ok(host) = std::env::var("STATSD_HOST") {
        let mut config = match options.client {
            ClientOptions::Connect(config) => config,
            _ => ClientConfig::default(),
        };
        config.host = Some(host);
        options.client = ClientOptions::Connect(config);
    }

    Ok(options)
}
