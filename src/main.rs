use clap::Parser;
use efir::{settings, storage, user_sync, web};
use miette::Result;
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "efir",
    version,
    about = "Incident report filing and tracking service"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Sync police accounts from a JSON roster before serving
    #[arg(long, value_name = "FILE")]
    sync_officers: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // logging
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    // load settings
    let settings = settings::Settings::load(&cli.config)?;
    tracing::info!(
        listen = %settings.listen_addr(),
        database = %redact_url(&settings.database.url),
        "Loaded configuration"
    );

    // init storage (database)
    let db = storage::init(&settings.database).await?;

    // provision officers: CLI flag wins over the configured roster
    if let Some(roster) = cli.sync_officers.as_ref().or(settings.officers.seed_file.as_ref()) {
        user_sync::sync_officers_from_file(&db, roster).await?;
    }

    // start web server
    web::serve(settings, db).await?;
    Ok(())
}

/// Hide credentials in a connection string before logging it.
fn redact_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***{}", &url[..scheme_end], &url[at..])
        }
        _ => url.to_string(),
    }
}
