use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vantage_collect::adapters::{
    AcledAdapter, ArxivAdapter, CourtListenerAdapter, EurostatAdapter, FbiCrimeAdapter,
    GdeltAdapter, GtdAdapter, HdxAdapter, HibpAdapter, IcewsAdapter, MispAdapter,
    OpenSanctionsAdapter, OtxAdapter, RedditAdapter, ReliefWebAdapter, RssAdapter,
    SecEdgarAdapter, ShodanAdapter,
};
use vantage_collect::{BroadcastBus, CollectionScheduler};
use vantage_common::Config;
use vantage_store::{ensure_schema, NewsStore, RunStore};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::daemon_from_env();
    config.log_redacted();

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;
    ensure_schema(&pool).await?;

    let news = NewsStore::new(pool.clone());
    let run_store = RunStore::new(pool.clone());
    let bus = Arc::new(BroadcastBus::new());

    let scheduler = Arc::new(CollectionScheduler::new(news, run_store, Arc::clone(&bus)));

    let hour = Duration::from_secs(3600);
    scheduler.register(Arc::new(RssAdapter::new()), Duration::from_secs(1800));
    scheduler.register(Arc::new(GdeltAdapter::new()), hour);
    scheduler.register(Arc::new(ArxivAdapter::new()), 2 * hour);
    scheduler.register(Arc::new(RedditAdapter::new()), hour);
    scheduler.register(Arc::new(ReliefWebAdapter::new()), 2 * hour);
    scheduler.register(
        Arc::new(AcledAdapter::new(&config.acled_api_key, &config.acled_email)),
        6 * hour,
    );
    scheduler.register(
        Arc::new(OpenSanctionsAdapter::new(&config.opensanctions_api_key)),
        6 * hour,
    );
    scheduler.register(
        Arc::new(SecEdgarAdapter::new(&config.sec_contact_email)),
        2 * hour,
    );
    scheduler.register(Arc::new(OtxAdapter::new(&config.otx_api_key)), 2 * hour);
    scheduler.register(Arc::new(HibpAdapter::new(&config.hibp_api_key)), 12 * hour);
    scheduler.register(Arc::new(CourtListenerAdapter::new()), 6 * hour);
    scheduler.register(Arc::new(HdxAdapter::new()), 6 * hour);
    scheduler.register(Arc::new(EurostatAdapter::new()), 24 * hour);
    scheduler.register(
        Arc::new(FbiCrimeAdapter::new(&config.fbi_api_key)),
        24 * hour,
    );
    scheduler.register(
        Arc::new(MispAdapter::new(&config.misp_url, &config.misp_api_key)),
        2 * hour,
    );
    scheduler.register(
        Arc::new(ShodanAdapter::new(&config.shodan_api_key)),
        12 * hour,
    );
    scheduler.register(Arc::new(GtdAdapter::new(&config.gtd_data_file)), 24 * hour);
    scheduler.register(
        Arc::new(IcewsAdapter::new(&config.icews_data_file)),
        24 * hour,
    );

    scheduler.start();
    info!("collection daemon running; press ctrl-c to stop");

    tokio::signal::ctrl_c().await?;
    scheduler.stop(Duration::from_secs(30)).await;
    Ok(())
}
