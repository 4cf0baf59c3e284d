//! Service wiring for the leanstock binary.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use leanstock_core::PartId;
use leanstock_infra::{
    BatchLedger, FifoConsumer, HttpStockGateway, KeyValueStore, RotationPolicy, SqliteKeyValueStore, StockConfig,
    StockGateway, TransactionRecorder, ValuationAggregator,
};

/// Every stock service, sharing one ledger.
pub struct AppServices<G, S> {
    pub ledger: Arc<BatchLedger<G>>,
    pub rotation: RotationPolicy<G>,
    pub consumer: FifoConsumer<G>,
    pub valuation: ValuationAggregator<G>,
    pub recorder: TransactionRecorder<G, S>,
}

pub type LiveServices = AppServices<HttpStockGateway, SqliteKeyValueStore>;

impl<G: StockGateway, S: KeyValueStore> AppServices<G, S> {
    /// Load the location directory and the sale history, then wire services.
    pub async fn build(gateway: G, store: S) -> anyhow::Result<Self> {
        let ledger = Arc::new(BatchLedger::new(gateway));
        let bins = ledger
            .load_locations()
            .await
            .context("failed to load stock locations")?;
        info!(bins, "location directory loaded");

        let recorder = TransactionRecorder::open(Arc::clone(&ledger), store)
            .await
            .context("failed to load sale history")?;

        Ok(Self {
            rotation: RotationPolicy::new(Arc::clone(&ledger)),
            consumer: FifoConsumer::new(Arc::clone(&ledger)),
            valuation: ValuationAggregator::new(Arc::clone(&ledger)),
            recorder,
            ledger,
        })
    }
}

/// Services backed by the REST inventory API and the SQLite history file.
pub async fn build_live(config: &StockConfig) -> anyhow::Result<LiveServices> {
    let gateway = HttpStockGateway::from_config(config).context("failed to build inventory API client")?;
    let store = SqliteKeyValueStore::connect(&config.history_db)
        .await
        .with_context(|| format!("failed to open history database {}", config.history_db))?;
    info!(api_url = %config.api_url, history_db = %config.history_db, "services configured");
    AppServices::build(gateway, store).await
}

/// Parse part ids given on the command line.
pub fn parse_part_ids<I, A>(args: I) -> anyhow::Result<Vec<PartId>>
where
    I: IntoIterator<Item = A>,
    A: AsRef<str>,
{
    args.into_iter()
        .map(|arg| {
            arg.as_ref()
                .parse::<PartId>()
                .with_context(|| format!("'{}' is not a part id", arg.as_ref()))
        })
        .collect()
}
