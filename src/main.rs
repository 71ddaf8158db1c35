use std::sync::Arc;

use anyhow::Context;
use futures::StreamExt;

use fasttrack::agents::{
    AgentInvoker, DailySummaryAgent, FoodAnalyzer, InsightsAgent, QuestionsAgent,
};
use fasttrack::api::{ApiState, api_routes};
use fasttrack::auth::{AuthService, spawn_session_sweep};
use fasttrack::channels::{Channel, TelegramChannel};
use fasttrack::config::AppConfig;
use fasttrack::llm::{LlmConfig, create_provider};
use fasttrack::onboarding::PolygonResolver;
use fasttrack::router::MessageRouter;
use fasttrack::store::{Database, LibSqlBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("invalid configuration")?;

    // Flushes buffered file logs on drop.
    let _log_guard = init_tracing(&config);

    eprintln!("🥗 FastTrack v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Text model: {}", config.llm.text_model);
    eprintln!("   Vision model: {}", config.llm.vision_model);
    eprintln!("   API: http://0.0.0.0:{}/api", config.server.http_port);
    eprintln!("   Database: {}", config.server.db_path.display());
    eprintln!(
        "   Telegram: allowed {}\n",
        if config.telegram.allowed_users.iter().any(|u| u == "*") {
            "everyone".to_string()
        } else {
            config.telegram.allowed_users.join(", ")
        }
    );

    // ── Database ─────────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(&config.server.db_path)
            .await
            .with_context(|| {
                format!("failed to open database at {}", config.server.db_path.display())
            })?,
    );

    // ── Agents ───────────────────────────────────────────────────────────
    let text_llm = create_provider(&LlmConfig::text(&config.llm))?;
    let vision_llm = create_provider(&LlmConfig::vision(&config.llm))?;
    let agents = AgentInvoker::new(config.agents)
        .with_agent(Arc::new(FoodAnalyzer::new(vision_llm, Arc::clone(&db))))
        .with_agent(Arc::new(InsightsAgent::new(Arc::clone(&text_llm), Arc::clone(&db))))
        .with_agent(Arc::new(DailySummaryAgent::new(Arc::clone(&text_llm), Arc::clone(&db))))
        .with_agent(Arc::new(QuestionsAgent::new(text_llm, Arc::clone(&db))));

    // ── Web login ────────────────────────────────────────────────────────
    let auth = Arc::new(AuthService::new(
        Arc::clone(&db),
        &config.auth,
        config.telegram.bot_token.clone(),
    ));
    let _sweep_handle = spawn_session_sweep(Arc::clone(&auth), config.server.session_sweep_interval);

    // ── HTTP API ─────────────────────────────────────────────────────────
    let app = api_routes(ApiState {
        auth: Arc::clone(&auth),
        db: Arc::clone(&db),
    });
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.server.http_port))
        .await
        .with_context(|| format!("failed to bind port {}", config.server.http_port))?;
    let port = config.server.http_port;
    tokio::spawn(async move {
        tracing::info!(port, "HTTP API started");
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "HTTP API stopped");
        }
    });

    // ── Telegram ─────────────────────────────────────────────────────────
    let telegram = Arc::new(TelegramChannel::new(
        config.telegram.bot_token.clone(),
        config.telegram.allowed_users.clone(),
    ));
    telegram
        .health_check()
        .await
        .context("Telegram bot token rejected")?;

    let channel: Arc<dyn Channel> = telegram;
    let router = Arc::new(MessageRouter::new(
        Arc::clone(&channel),
        db,
        auth,
        Arc::new(PolygonResolver::new()),
        agents,
        config.dedup_window,
    ));

    let mut messages = channel.start().await?;
    tracing::info!("FastTrack bot is running");

    loop {
        tokio::select! {
            msg = messages.next() => {
                let Some(msg) = msg else { break };
                let router = Arc::clone(&router);
                tokio::spawn(async move {
                    router.handle(&msg).await;
                });
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                break;
            }
        }
    }

    channel.shutdown().await?;
    Ok(())
}

fn init_tracing(config: &AppConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "fasttrack.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .init();
            None
        }
    }
}
