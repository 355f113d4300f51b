//! 主应用程序入口
//!
//! 加载配置、初始化存储与协作者，启动 Axum Web API 服务。

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use application::{
    registry::memory::MemorySessionRegistry, repository::memory::InMemoryMessageRepository,
    AuthPolicy, Clock, CredentialVerifier, DeliveryService, DeliveryServiceDependencies,
    MessageRepository, NoopNotificationSink, NotificationPolicy, NotificationSink, SystemClock,
};
use config::{AppConfig, AuthMode, NotificationMode};
use domain::UserId;
use infrastructure::{
    HttpNotificationSink, Infrastructure, InfrastructureConfig, JwtCredentialVerifier,
    SharedSecretVerifier,
};
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState, UploadSettings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load().context("failed to load configuration")?;
    tracing::info!(config = ?config.sanitized(), "configuration loaded");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let message_repository = message_repository(&config, clock.clone()).await?;
    let credential_verifier = credential_verifier(&config)?;
    let notification_sink = notification_sink(&config)?;

    let service = DeliveryService::new(DeliveryServiceDependencies {
        message_repository,
        session_registry: Arc::new(MemorySessionRegistry::new()),
        credential_verifier,
        notification_sink,
        clock,
        auth_policy: if config.auth.revalidate_per_operation {
            AuthPolicy::PerOperation
        } else {
            AuthPolicy::SessionBound
        },
        notification_policy: match config.notification.policy {
            NotificationMode::OfflineOnly => NotificationPolicy::OfflineOnly,
            NotificationMode::Always => NotificationPolicy::Always,
        },
    });

    let uploads = UploadSettings::new(
        &config.upload.dir,
        &config.upload.allowed_extensions,
        config.upload.max_bytes,
    );
    tokio::fs::create_dir_all(&uploads.dir)
        .await
        .with_context(|| format!("failed to create upload directory {}", uploads.dir.display()))?;

    let app = router(
        AppState::new(Arc::new(service), uploads)
            .with_cors_origins(config.server.cors_origins.clone()),
    );
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!("msgrelay listening on http://{addr}");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn message_repository(
    config: &AppConfig,
    clock: Arc<dyn Clock>,
) -> anyhow::Result<Arc<dyn MessageRepository>> {
    if config.database.is_memory() {
        tracing::warn!("using in-memory message store, messages are lost on restart");
        return Ok(Arc::new(InMemoryMessageRepository::new(clock)));
    }

    let infra = Infrastructure::connect(
        InfrastructureConfig {
            database_url: config.database.url.clone(),
            max_connections: config.database.max_connections,
            acquire_timeout: Duration::from_secs(config.database.acquire_timeout_seconds),
            acquire_retries: config.database.acquire_retries,
        },
        clock,
    )
    .await
    .context("failed to initialise database")?;
    let repository: Arc<dyn MessageRepository> = infra.message_repository;
    Ok(repository)
}

fn credential_verifier(config: &AppConfig) -> anyhow::Result<Arc<dyn CredentialVerifier>> {
    let verifier: Arc<dyn CredentialVerifier> = match config.auth.mode {
        AuthMode::Jwt => Arc::new(JwtCredentialVerifier::new(
            config.auth.secret.as_bytes(),
            chrono::Duration::minutes(config.auth.token_ttl_minutes),
        )),
        AuthMode::SharedSecret => {
            tracing::warn!(
                identity = config.auth.shared_secret_identity,
                "shared secret authentication is for development only"
            );
            Arc::new(SharedSecretVerifier::new(
                &config.auth.secret,
                UserId(config.auth.shared_secret_identity),
            )?)
        }
    };
    Ok(verifier)
}

fn notification_sink(config: &AppConfig) -> anyhow::Result<Arc<dyn NotificationSink>> {
    let Some(endpoint) = &config.notification.endpoint else {
        tracing::info!("notification endpoint not configured, push disabled");
        return Ok(Arc::new(NoopNotificationSink));
    };

    let sink = HttpNotificationSink::new(
        endpoint.clone(),
        config.notification.api_key.clone(),
        Duration::from_secs(config.notification.timeout_seconds),
    )?;
    Ok(Arc::new(sink))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
