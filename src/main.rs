mod db;
mod env;
mod line;
mod llm;
mod rate_limit;
mod routes;
mod services;
mod state;

use std::sync::Arc;

use services::admin_auth::AdminConfig;
use services::scheduler::{self, SchedulerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let database_url = std::env::var("DATABASE_URL").map_err(|_| "DATABASE_URL required")?;
    let port: u16 = env::parse("PORT", 3000);

    let pool = db::init_pool(&database_url).await?;

    let admin = AdminConfig::from_env();
    if !admin.is_configured() {
        tracing::warn!("ADMIN_USERNAME / ADMIN_PASSWORD_SHA256 not set — admin login disabled");
    }

    let scheduler_config = SchedulerConfig::from_env();
    let mut state = state::AppState::new(pool, admin)
        .with_rate_limiter(rate_limit::RateLimiter::new(rate_limit::RateLimitConfig::from_env()))
        .with_local_offset(scheduler_config.utc_offset);

    // LLM is optional: without it free-text messages get the generic error reply.
    match llm::LlmClient::from_env() {
        Ok(client) => {
            tracing::info!(model = client.model(), "LLM client initialized");
            state = state.with_llm(Arc::new(client));
        }
        Err(e) => tracing::warn!(error = %e, "LLM client not configured — AI features disabled"),
    }

    match line::LineConfig::from_env() {
        Some(config) => match line::LineClient::new(&config) {
            Ok(client) => {
                tracing::info!(api_base_url = %config.api_base_url, "LINE client initialized");
                state = state.with_line(Arc::new(client), &config.channel_secret);
            }
            Err(e) => tracing::warn!(error = %e, "LINE client build failed — webhook disabled"),
        },
        None => tracing::warn!("LINE_CHANNEL_ACCESS_TOKEN / LINE_CHANNEL_SECRET not set — webhook disabled"),
    }

    let _schedules = scheduler::spawn_schedules(state.clone(), scheduler_config);

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;

    tracing::info!(%port, "secretary listening");
    axum::serve(listener, app).await?;
    Ok(())
}
