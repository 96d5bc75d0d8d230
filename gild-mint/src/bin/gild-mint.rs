use std::sync::Arc;

use clap::Parser;
use gildmint::config::MintConfig;
use gildmint::database::memory::MemoryDatabase;
use gildmint::database::postgres::PostgresDB;
use gildmint::database::Database;
use gildmint::lightning::fake::FakeLightning;
use gildmint::lightning::Lightning;
use gildmint::mint::Mint;
use gildmint::server::run_server;

#[derive(Parser, Debug)]
#[command(version, about = "gild - a cashu mint backed by a Lightning reserve")]
struct Opts {
    /// Lightning backend. Only the in-process fake backend is bundled; real
    /// node backends plug in through the Lightning trait.
    #[arg(long, env = "MINT_LIGHTNING_BACKEND", default_value = "fake")]
    lightning_backend: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let opts = Opts::parse();
    let config = MintConfig::from_env();

    let lightning: Arc<dyn Lightning> = match opts.lightning_backend.as_str() {
        "fake" => Arc::new(FakeLightning::new()),
        other => anyhow::bail!("unknown lightning backend '{other}', expected 'fake'"),
    };

    let db: Arc<dyn Database> = if config.database.db_url.is_empty() {
        eprintln!("MINT_DB_URL not set, using the in-memory store");
        Arc::new(MemoryDatabase::new())
    } else {
        let db = PostgresDB::new(&config.database).await?;
        db.migrate().await?;
        Arc::new(db)
    };

    let mint = Mint::init(db, lightning, config).await?;
    run_server(mint).await
}
