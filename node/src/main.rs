use anyhow::{Context, Result};
use clap::Parser;
use opentelemetry::trace::TracerProvider as _;
use socialcredit_execution::Economy;
use socialcredit_node::{
    config::ValidatedConfig, gateway, price, Config, Dispatcher, DispatcherConfig, Gateway,
    RedisStore,
};
use std::{path::PathBuf, sync::Arc};
use tracing::{error, info, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about = "Social credit economy gateway")]
struct Args {
    /// Path to the YAML configuration file.
    #[arg(short, long)]
    config: PathBuf,
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Console logging at INFO, plus span export when `OTEL_EXPORTER_OTLP_ENDPOINT` is set.
fn init_tracing() -> Result<()> {
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::{
        trace::{Sampler, SdkTracerProvider},
        Resource,
    };

    let otel = match env_value("OTEL_EXPORTER_OTLP_ENDPOINT") {
        Some(endpoint) => {
            let service =
                env_value("OTEL_SERVICE_NAME").unwrap_or_else(|| "socialcredit-node".to_string());
            let ratio = env_value("OTEL_SAMPLING_RATE")
                .and_then(|value| value.parse::<f64>().ok())
                .map_or(1.0, |value| value.clamp(0.0, 1.0));
            let exporter = opentelemetry_otlp::SpanExporter::builder()
                .with_http()
                .with_endpoint(endpoint)
                .build()
                .context("failed to build OTLP exporter")?;
            let provider = SdkTracerProvider::builder()
                .with_sampler(Sampler::TraceIdRatioBased(ratio))
                .with_resource(
                    Resource::builder_empty()
                        .with_attributes([opentelemetry::KeyValue::new("service.name", service)])
                        .build(),
                )
                .with_batch_exporter(exporter)
                .build();
            let tracer = provider.tracer("socialcredit-node");
            opentelemetry::global::set_tracer_provider(provider);
            Some(tracing_opentelemetry::layer().with_tracer(tracer))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(LevelFilter::INFO))
        .with(otel)
        .init();
    Ok(())
}

fn load_config(path: &std::path::Path) -> Result<ValidatedConfig> {
    let config = Config::load(path).context("failed to load configuration")?;
    config.validate().context("invalid configuration")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing()?;

    let config = match load_config(&args.config) {
        Ok(config) => config,
        Err(err) => {
            error!(path = %args.config.display(), "{err:#}");
            return Err(err);
        }
    };
    info!(?config, "configuration loaded");

    let store = RedisStore::new(&config.store_url, config.store_prefix.clone())
        .context("invalid store url")?;
    if let Err(err) = store.ping().await {
        // The connection is retried lazily on every operation.
        warn!(%err, "store not reachable at startup");
    }

    let (economy, notices) = Economy::new(store, config.economy.clone());
    let prices = economy.prices().clone();
    let metrics = Arc::new(socialcredit_node::metrics::Metrics::default());
    let dispatcher = Arc::new(Dispatcher::new(
        economy,
        DispatcherConfig {
            admins: config.admins.clone(),
            economy_channel: config.economy_channel.clone(),
            rate_limit: config.rate_limit,
        },
        metrics.clone(),
    ));
    let gateway = Arc::new(Gateway::new(
        dispatcher.clone(),
        config.gateway_token.clone(),
    ));

    tokio::spawn(gateway.clone().run_notices(notices));

    let sweeper = dispatcher.clone();
    let sweep_interval = config.sweep_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            sweeper.sweep().await;
        }
    });

    match &config.price_feed {
        Some(settings) => {
            let feed = price::HttpPriceFeed::new(settings.url.clone(), settings.pointer.clone())
                .context("failed to build price feed client")?;
            info!(
                url = %settings.url,
                interval = ?settings.interval,
                "price feed enabled"
            );
            tokio::spawn(price::run_refresh(
                prices,
                feed,
                settings.clone(),
                metrics,
            ));
        }
        None => info!("price feed disabled, multiplier fixed at 1.00x"),
    }

    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("failed to bind {}", config.listen))?;
    info!("Listening on {}", config.listen);
    axum::serve(listener, gateway::router(gateway))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await
        .context("axum server error")?;

    Ok(())
}
