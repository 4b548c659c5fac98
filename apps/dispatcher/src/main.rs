//! Gatewarden outbox dispatcher runtime.
//!
//! Runs the outbox background tasks as independent periodic loops:
//! dispatch, dead-letter promotion, terminal cleanup, and the role
//! assignment expiration sweep. The tasks communicate only through the
//! persisted tables, so any of them can be moved to a separate process
//! unchanged.

#![forbid(unsafe_code)]

use std::env;
use std::sync::Arc;
use std::time::Duration;

use gatewarden_application::{
    AssignmentSweepService, AuthorizationCache, HealthService, HealthStatus, OutboxConfig,
    OutboxService, RetryPolicy, StoreRouterService, SystemClock,
};
use gatewarden_core::{AppError, AppResult};
use gatewarden_infrastructure::{
    HttpEvaluationEngine, HttpEventPublisher, InMemoryAuthorizationCache,
    PostgresAssignmentRepository, PostgresOutboxRepository, PostgresRoleRepository,
    PostgresTenantStoreRepository, RedisAuthorizationCache,
};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
struct DispatcherConfig {
    database_url: String,
    evaluation_engine_url: String,
    event_webhook_url: String,
    redis_url: Option<String>,
    dispatcher_id: String,
    outbox: OutboxConfig,
    dead_letter_sweep_interval_ms: u64,
    cleanup_interval_ms: u64,
    expiration_sweep_interval_ms: u64,
    expiration_sweep_limit: usize,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = DispatcherConfig::load()?;
    let pool = connect_pool(config.database_url.as_str()).await?;

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .build()
        .map_err(|error| AppError::Internal(format!("failed to build HTTP client: {error}")))?;

    let cache = build_cache(config.redis_url.as_deref())?;
    let outbox_repository = Arc::new(PostgresOutboxRepository::new(pool.clone()));
    let assignment_repository = Arc::new(PostgresAssignmentRepository::new(pool.clone()));
    let clock = Arc::new(SystemClock);

    let router = StoreRouterService::new(
        Arc::new(PostgresTenantStoreRepository::new(pool.clone())),
        Arc::new(HttpEvaluationEngine::new(
            http_client.clone(),
            config.evaluation_engine_url.clone(),
        )),
        Arc::new(PostgresRoleRepository::new(pool.clone())),
        outbox_repository.clone(),
        cache.clone(),
        RetryPolicy::default(),
        false,
    );

    let outbox_service = OutboxService::new(
        outbox_repository,
        Arc::new(HttpEventPublisher::new(
            http_client,
            config.event_webhook_url.clone(),
        )),
        clock.clone(),
        config.outbox.clone(),
        config.dispatcher_id.clone(),
    )?;
    let sweep_service =
        AssignmentSweepService::new(assignment_repository, router, cache.clone(), clock);

    match HealthService::new(cache).cache_health().await {
        HealthStatus::Healthy => info!("cache reachable"),
        HealthStatus::Degraded => warn!("cache unreachable, running degraded"),
    }

    info!(
        dispatcher_id = config.dispatcher_id.as_str(),
        batch_size = config.outbox.batch_size,
        poll_interval_ms = config.outbox.poll_interval_ms,
        max_retries = config.outbox.max_retries,
        "gatewarden-dispatcher started"
    );

    let dispatch_task = tokio::spawn(run_dispatch_loop(
        outbox_service.clone(),
        outbox_service.poll_interval(),
    ));
    let dead_letter_task = tokio::spawn(run_dead_letter_loop(
        outbox_service.clone(),
        Duration::from_millis(config.dead_letter_sweep_interval_ms),
    ));
    let cleanup_task = tokio::spawn(run_cleanup_loop(
        outbox_service,
        Duration::from_millis(config.cleanup_interval_ms),
    ));
    let expiration_task = tokio::spawn(run_expiration_loop(
        sweep_service,
        Duration::from_millis(config.expiration_sweep_interval_ms),
        config.expiration_sweep_limit,
    ));

    tokio::signal::ctrl_c()
        .await
        .map_err(|error| AppError::Internal(format!("failed to listen for shutdown: {error}")))?;
    info!("shutdown signal received, stopping background tasks");

    dispatch_task.abort();
    dead_letter_task.abort();
    cleanup_task.abort();
    expiration_task.abort();

    Ok(())
}

async fn run_dispatch_loop(service: OutboxService, interval: Duration) {
    loop {
        match service.dispatch_once().await {
            Ok(outcome) => {
                if outcome.claimed > 0 {
                    info!(
                        claimed = outcome.claimed,
                        published = outcome.published,
                        failed = outcome.failed,
                        "outbox dispatch round finished"
                    );
                }
            }
            Err(error) => {
                warn!(error = %error, "outbox dispatch round failed");
            }
        }

        tokio::time::sleep(interval).await;
    }
}

async fn run_dead_letter_loop(service: OutboxService, interval: Duration) {
    loop {
        if let Err(error) = service.promote_dead_letters().await {
            warn!(error = %error, "dead-letter sweep failed");
        }

        tokio::time::sleep(interval).await;
    }
}

async fn run_cleanup_loop(service: OutboxService, interval: Duration) {
    loop {
        if let Err(error) = service.cleanup_once().await {
            warn!(error = %error, "outbox cleanup sweep failed");
        }

        tokio::time::sleep(interval).await;
    }
}

async fn run_expiration_loop(service: AssignmentSweepService, interval: Duration, limit: usize) {
    loop {
        if let Err(error) = service.sweep_once(limit).await {
            warn!(error = %error, "assignment expiration sweep failed");
        }

        tokio::time::sleep(interval).await;
    }
}

async fn connect_pool(database_url: &str) -> AppResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))
}

fn build_cache(redis_url: Option<&str>) -> AppResult<Arc<dyn AuthorizationCache>> {
    let Some(redis_url) = redis_url else {
        info!("REDIS_URL not set, using process-local cache");
        return Ok(Arc::new(InMemoryAuthorizationCache::new()));
    };

    let client = redis::Client::open(redis_url)
        .map_err(|error| AppError::Internal(format!("invalid REDIS_URL: {error}")))?;

    Ok(Arc::new(RedisAuthorizationCache::new(client)))
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

impl DispatcherConfig {
    fn load() -> AppResult<Self> {
        let database_url = required_env("DATABASE_URL")?;
        let evaluation_engine_url = required_env("EVALUATION_ENGINE_URL")?;
        let event_webhook_url = required_env("EVENT_WEBHOOK_URL")?;
        let redis_url = env::var("REDIS_URL")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty());
        let dispatcher_id = env::var("DISPATCHER_ID")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| format!("dispatcher-{}", std::process::id()));

        let outbox = OutboxConfig {
            batch_size: parse_env_usize("OUTBOX_BATCH_SIZE", 50)?,
            max_retries: parse_env_u32("OUTBOX_MAX_RETRIES", 5)?,
            claim_seconds: parse_env_u32("OUTBOX_CLAIM_SECONDS", 60)?,
            poll_interval_ms: parse_env_u64("OUTBOX_POLL_INTERVAL_MS", 1_000)?,
            initial_retry_delay_seconds: parse_env_u64("OUTBOX_INITIAL_RETRY_DELAY_SECONDS", 5)?,
            max_retry_delay_seconds: parse_env_u64("OUTBOX_MAX_RETRY_DELAY_SECONDS", 900)?,
            processed_retention_hours: parse_env_i64("OUTBOX_PROCESSED_RETENTION_HOURS", 24)?,
            dead_letter_retention_hours: parse_env_i64("OUTBOX_DEAD_LETTER_RETENTION_HOURS", 168)?,
        };

        let config = Self {
            database_url,
            evaluation_engine_url,
            event_webhook_url,
            redis_url,
            dispatcher_id,
            outbox,
            dead_letter_sweep_interval_ms: parse_env_u64("DEAD_LETTER_SWEEP_INTERVAL_MS", 30_000)?,
            cleanup_interval_ms: parse_env_u64("CLEANUP_INTERVAL_MS", 60_000)?,
            expiration_sweep_interval_ms: parse_env_u64("EXPIRATION_SWEEP_INTERVAL_MS", 60_000)?,
            expiration_sweep_limit: parse_env_usize("EXPIRATION_SWEEP_LIMIT", 200)?,
        };

        config.outbox.validate()?;

        if config.expiration_sweep_limit == 0 {
            return Err(AppError::Validation(
                "EXPIRATION_SWEEP_LIMIT must be greater than zero".to_owned(),
            ));
        }

        Ok(config)
    }
}

fn required_env(name: &str) -> AppResult<String> {
    env::var(name).map_err(|_| AppError::Validation(format!("{name} is required")))
}

fn parse_env_usize(name: &str, default: usize) -> AppResult<usize> {
    match env::var(name) {
        Ok(value) => value.parse::<usize>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}

fn parse_env_u32(name: &str, default: u32) -> AppResult<u32> {
    match env::var(name) {
        Ok(value) => value.parse::<u32>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}

fn parse_env_u64(name: &str, default: u64) -> AppResult<u64> {
    match env::var(name) {
        Ok(value) => value.parse::<u64>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}

fn parse_env_i64(name: &str, default: i64) -> AppResult<i64> {
    match env::var(name) {
        Ok(value) => value.parse::<i64>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}
