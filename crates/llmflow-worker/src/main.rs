//! `llmflow-worker`: the out-of-process Task Queue consumer (`spec.md`
//! §4.G). Claims jobs from one Redis list, drives the Flow Engine exactly
//! as a foreground call would, and reports progress/health back through
//! the observation store.
//!
//! Provider credentials, the database and Redis are all environment-
//! sourced configuration (`spec.md` §6); which adapters end up
//! constructible follows directly from which API keys are present, a flat
//! table rather than an if/else cascade (`SPEC_FULL.md` §4.D).

use std::sync::Arc;

use clap::Parser;
use llmflow_core::ProviderRegistry;
use llmflow_db::DbHandle;
use llmflow_migration::{Migrator, MigratorTrait};
use llmflow_queue::{RedisHandle, TaskQueue, WorkerDirectory};
use llmflow_service::{LlmService, ServiceConfig};
use llmflow_worker::{FlowHandler, FlowRegistry, HandlerRegistry, WorkerApp};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "llmflow-worker", about = "Background worker for the LLM workflow execution platform's Task Queue")]
struct Args {
    /// Redis connection URL backing the Task Queue transport and
    /// observation store.
    #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    redis_url: String,

    /// Database URL for the ledger, flow run, and task-mirror tables.
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite::memory:")]
    database_url: String,

    /// Name of the Redis list this worker drains.
    #[arg(long, env = "QUEUE_NAME", default_value_t = llmflow_queue::DEFAULT_QUEUE_NAME.to_owned())]
    queue_name: String,

    /// Unique id for this worker process; defaults to a random suffix so
    /// multiple workers can share a host.
    #[arg(long, env = "WORKER_ID")]
    worker_id: Option<String>,

    /// Seconds to block on each Redis `BRPOP` before re-checking for
    /// shutdown.
    #[arg(long, default_value_t = 5.0)]
    poll_timeout_secs: f64,

    /// Default model for LLM-powered steps that don't name one explicitly.
    #[arg(long, env = "DEFAULT_MODEL", default_value = "gpt-4o-mini")]
    default_model: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))).init();

    let args = Args::parse();
    let worker_id = args.worker_id.unwrap_or_else(|| format!("worker-{}", uuid::Uuid::new_v4()));

    let db = DbHandle::connect(&args.database_url).await?;
    Migrator::up(db.connection(), None).await?;

    let redis = RedisHandle::connect(&args.redis_url).await?;
    let queue = Arc::new(TaskQueue::new(redis.clone()));
    let workers = Arc::new(WorkerDirectory::new(redis));

    let registry = build_provider_registry();
    let cache_dir = std::env::var("CACHE_DIR").map(std::path::PathBuf::from).unwrap_or_else(|_| std::env::temp_dir().join("llmflow-cache"));
    let cache_enabled = std::env::var("CACHE_ENABLED").map(|v| v != "false" && v != "0").unwrap_or(true);
    let cache = llmflow_cache::ResponseCache::new(cache_dir, cache_enabled, 24, 500);
    let service = Arc::new(LlmService::new(registry, cache, db.clone(), ServiceConfig { default_model: args.default_model, ..ServiceConfig::default() }));

    // Concrete flow bodies are out of scope for this core (`spec.md` §1);
    // an embedding application links against `llmflow-worker` as a library
    // and populates this registry before calling `WorkerApp::run`. The
    // standalone binary here registers none, so submitted tasks simply
    // fail with "no flow named ... is registered" until one is added.
    let flows = FlowRegistry::new();
    let mut handlers = HandlerRegistry::new();
    handlers.register("flow", Arc::new(FlowHandler::new(service, db.clone(), flows)));

    let app = WorkerApp {
        worker_id,
        queue_name: args.queue_name,
        poll_timeout_secs: args.poll_timeout_secs,
        queue,
        workers,
        handlers,
        db,
    };

    let shutdown = CancellationToken::new();
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        shutdown_signal.cancel();
    });

    app.run(shutdown).await
}

/// One adapter per provider whose required environment variable is
/// present -- `spec.md` §4.B "model->provider routing" plus the
/// REDESIGN FLAGS instruction to express configuration fallback as a
/// flat table consulted once, not a cascade.
fn build_provider_registry() -> ProviderRegistry {
    let mut adapters: Vec<Arc<dyn llmflow_core::ProviderAdapter>> = Vec::new();

    if let Ok(key) = std::env::var("OPENAI_API_KEY") {
        adapters.push(Arc::new(llmflow_providers_openai::OpenAiAdapter::new(llmflow_providers_openai::OpenAiConfig::new(key))));
    }
    if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
        adapters.push(Arc::new(llmflow_providers_anthropic::AnthropicAdapter::new(llmflow_providers_anthropic::AnthropicConfig::new(key))));
    }
    if let Ok(key) = std::env::var("GEMINI_API_KEY") {
        adapters.push(Arc::new(llmflow_providers_gemini::GeminiAdapter::new(llmflow_providers_gemini::GeminiConfig::new(key))));
    }
    if let Ok(key) = std::env::var("OPENROUTER_API_KEY") {
        adapters.push(Arc::new(llmflow_providers_openrouter::OpenRouterAdapter::new(key)));
    }
    if let Ok(region) = std::env::var("AWS_REGION") {
        adapters.push(Arc::new(llmflow_providers_bedrock::BedrockAdapter::new(
            llmflow_providers_bedrock::BedrockConfig::new(region),
            Box::new(llmflow_providers_bedrock::NoopSigner),
        )));
    }
    if let (Ok(key), Ok(base_url), Ok(deployment)) = (std::env::var("AZURE_OPENAI_API_KEY"), std::env::var("AZURE_OPENAI_BASE_URL"), std::env::var("AZURE_OPENAI_DEPLOYMENT")) {
        if let Ok(base_url) = url::Url::parse(&base_url) {
            adapters.push(Arc::new(llmflow_providers_azure::AzureAdapter::new(llmflow_providers_azure::AzureConfig::new(key, base_url, deployment))));
        }
    }
    if let (Ok(key), Ok(base_url)) = (std::env::var("HOSTED_API_KEY"), std::env::var("HOSTED_BASE_URL")) {
        if let Ok(base_url) = url::Url::parse(&base_url) {
            adapters.push(Arc::new(llmflow_providers_hosted::HostedAdapter::new(base_url, key)));
        }
    }

    if adapters.is_empty() {
        tracing::warn!("no provider credentials found in the environment; every model-routed call will fail with ConfigurationError");
    }
    ProviderRegistry::new(adapters)
}
