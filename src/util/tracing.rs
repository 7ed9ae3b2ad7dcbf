use anyhow::{Context, Result};
use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::trace::TracerProvider;
use opentelemetry_otlp::SpanExporter;
use opentelemetry_otlp::WithExportConfig;
#[cfg(feature = "otlp-http")]
use opentelemetry_otlp::WithHttpConfig;
use opentelemetry_otlp::WithTonicConfig;
use opentelemetry_otlp::tonic_types;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::SdkTracerProvider;
use opentelemetry_semantic_conventions::resource::{DEPLOYMENT_ENVIRONMENT_NAME, SERVICE_VERSION};
use serde::Deserialize;
use std::env;
use std::fs::File;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::Subscriber;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::Layer;
use tracing_subscriber::{filter, prelude::*};

// default name (fixed)
const APP_SERVICE_NAME: &str = env!("CARGO_PKG_NAME");
static GLOBAL_TRACER_PROVIDER: OnceLock<SdkTracerProvider> = OnceLock::new();

#[derive(Deserialize, Debug, Clone)]
pub struct LoggingConfig {
    pub app_name: Option<String>,
    pub level: Option<String>,
    pub file_name: Option<String>,
    pub file_dir: Option<String>,
    #[serde(default)]
    pub use_json: bool,
    #[serde(default = "default_use_stdout")]
    pub use_stdout: bool,
}

fn default_use_stdout() -> bool {
    true
}

impl LoggingConfig {
    pub fn new() -> Self {
        Self {
            app_name: None,
            level: None,
            file_name: None,
            file_dir: None,
            use_json: false,
            use_stdout: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::new()
    }
}

pub fn shutdown_tracer_provider() {
    if let Some(provider) = GLOBAL_TRACER_PROVIDER.get() {
        let _ = provider.shutdown().inspect_err(|e| {
            eprintln!("failed to shutdown tracer provider: {:?}", e);
        });
    }
}

pub fn load_tracing_config_from_env() -> Result<LoggingConfig> {
    envy::prefixed("LOG_")
        .from_env::<LoggingConfig>()
        .context("cannot read logging config from env:")
}

pub fn tracing_init(conf: LoggingConfig) -> Result<()> {
    let subscriber = setup_layer_from_logging_config(&conf)?;
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;
    Ok(())
}

pub fn tracing_init_from_env() -> Result<()> {
    // no env, use default
    let conf = load_tracing_config_from_env().unwrap_or_default();
    tracing_init(conf)
}

// Create a Resource that captures information about the entity for which telemetry is recorded.
fn resource(app_service_name: String) -> opentelemetry_sdk::Resource {
    opentelemetry_sdk::Resource::builder()
        .with_service_name(app_service_name)
        .with_attribute(KeyValue::new(SERVICE_VERSION, env!("CARGO_PKG_VERSION")))
        .with_attribute(KeyValue::new(
            DEPLOYMENT_ENVIRONMENT_NAME,
            env::var("DEPLOYMENT_ENVIRONMENT_NAME").unwrap_or_else(|_| "development".to_string()),
        ))
        .build()
}

fn otlp_span_exporter_from_env() -> Result<Option<SpanExporter>> {
    let token = env::var("OTLP_AUTH_TOKEN").ok();
    // Basic Auth: base64(public_key:secret_key)
    let auth_header = token.map(|t| format!("Basic {}", t));

    if let Ok(addr) = env::var("OTLP_ADDR") {
        let mut metadata = tonic_types::metadata::MetadataMap::new();
        if let Some(auth) = auth_header {
            metadata.insert(
                "authorization",
                auth.parse().context("invalid OTLP_AUTH_TOKEN")?,
            );
        }
        let exporter = SpanExporter::builder()
            .with_tonic()
            .with_endpoint(&addr)
            .with_timeout(Duration::from_secs(10))
            .with_metadata(metadata)
            .build()?;
        return Ok(Some(exporter));
    }

    #[cfg(feature = "otlp-http")]
    if let Ok(http_addr) = env::var("OTLP_HTTP_ADDR") {
        let mut headers = std::collections::HashMap::new();
        if let Some(auth) = auth_header {
            headers.insert("Authorization".to_string(), auth);
        }
        let exporter = SpanExporter::builder()
            .with_http()
            .with_endpoint(&http_addr)
            .with_timeout(Duration::from_secs(10))
            .with_headers(headers)
            .build()?;
        return Ok(Some(exporter));
    }

    // not specified
    Ok(None)
}

fn otlp_tracer_provider_from_env(app_service_name: String) -> Result<Option<SdkTracerProvider>> {
    let Some(exporter) = otlp_span_exporter_from_env()? else {
        return Ok(None);
    };
    let provider = SdkTracerProvider::builder()
        .with_resource(resource(app_service_name))
        .with_batch_exporter(exporter)
        .build();
    global::set_tracer_provider(provider.clone());
    GLOBAL_TRACER_PROVIDER.set(provider.clone()).ok();
    global::set_text_map_propagator(TraceContextPropagator::new());
    Ok(Some(provider))
}

fn create_log_file(conf: &LoggingConfig) -> Result<Option<File>> {
    let Some(file_name) = conf.file_name.as_deref() else {
        return Ok(None);
    };
    let dir = match conf.file_dir.as_ref() {
        Some(d) => PathBuf::from_str(d).context("Invalid log file directory")?,
        None => env::current_dir()?,
    };
    std::fs::create_dir_all(&dir).context("create log file directory")?;
    let path = dir.join(file_name);
    let file =
        File::create(&path).with_context(|| format!("create log file to {:?}", path.as_os_str()))?;
    Ok(Some(file))
}

pub fn setup_layer_from_logging_config(
    conf: &LoggingConfig,
) -> Result<Box<dyn Subscriber + Send + Sync + 'static>> {
    let lv = tracing::Level::from_str(conf.level.as_deref().unwrap_or("INFO"))
        .unwrap_or(tracing::Level::INFO);
    let filter = filter::Targets::new().with_default(lv);
    let env_filter = EnvFilter::from_default_env();

    let app_service_name = conf
        .app_name
        .clone()
        .unwrap_or_else(|| APP_SERVICE_NAME.to_string());

    let otel_layer = otlp_tracer_provider_from_env(app_service_name.clone())?.map(|provider| {
        tracing_opentelemetry::layer().with_tracer(provider.tracer(app_service_name))
    });
    // keep the exporter's own http client out of the exported spans
    let filter_otel = EnvFilter::new("info")
        .add_directive("hyper=off".parse()?)
        .add_directive("h2=off".parse()?)
        .add_directive("reqwest=off".parse()?);

    let log_file = create_log_file(conf)?;
    let (json_file, plain_file) = match log_file {
        Some(f) if conf.use_json => (Some(f), None),
        Some(f) => (None, Some(f)),
        None => (None, None),
    };

    let subscriber = Box::new(
        tracing_subscriber::registry()
            .with(filter)
            .with(env_filter)
            .with(otel_layer.with_filter(filter_otel))
            .with(json_file.map(|f| {
                Layer::new()
                    .with_writer(f.with_max_level(lv))
                    .with_ansi(false)
                    .json()
            }))
            .with(plain_file.map(|f| {
                Layer::new()
                    .with_writer(f.with_max_level(lv))
                    .with_ansi(false)
            }))
            .with(if !conf.use_json && conf.use_stdout {
                Some(tracing_subscriber::fmt::layer().pretty())
            } else {
                None
            })
            .with(if conf.use_json && conf.use_stdout {
                Some(tracing_subscriber::fmt::layer().json())
            } else {
                None
            }),
    );
    Ok(subscriber)
}

// for simple stdout logging
pub fn tracing_init_test(level: tracing::Level) {
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_test_writer()
        .try_init();
}
