use chrono::{Duration, Utc};
use dotenvy::dotenv;
use token_tracker::{
    config::{database, settings},
    core::{cost::DateRange, report},
    errors::Result,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file; env vars can also be set externally
    dotenv().ok();

    // 3. Load application settings
    let app_config = settings::load_default_config()
        .inspect_err(|e| error!("Failed to load configuration: {e}"))?;

    // 4. Connect and make sure the tables exist
    let database_url = database::get_database_url(app_config.database_url.as_deref());
    let db = database::create_connection(&database_url)
        .await
        .inspect_err(|e| error!("Failed to initialize database: {e}"))?;

    // 5. Report over the configured window
    let range = app_config.report.days.map_or_else(DateRange::all, |days| {
        DateRange::since(Utc::now() - Duration::days(i64::from(days)))
    });
    let cost_report = report::generate_cost_report(&db, range).await?;
    info!(
        "Cost report covers {} contribution(s)",
        cost_report.overall.contribution_count
    );

    println!(
        "{}",
        report::format_cost_report(&cost_report, &app_config.currency_symbol)
    );

    Ok(())
}
