use tracing::{info, warn};

use leanstock_infra::StockConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    leanstock_observability::init();

    let config = StockConfig::from_env()?;
    let part_ids = leanstock_app::parse_part_ids(std::env::args().skip(1))?;
    if part_ids.is_empty() {
        warn!("no part ids given; valuation will be empty");
    }

    let services = leanstock_app::build_live(&config).await?;
    services.ledger.refresh_parts(part_ids.iter().copied()).await?;

    for part in services.valuation.part_breakdown() {
        info!(
            part_id = %part.part_id,
            quantity = part.total_quantity,
            value = %part.total_value,
            batches = part.batches.len(),
            oldest = part.oldest().map(|b| b.location_label.as_str()).unwrap_or("-"),
            "part valuation"
        );
    }

    let summary = services.valuation.summary();
    info!(
        parts = summary.parts,
        batches = summary.batches,
        units = summary.units,
        total_value = %summary.total_value,
        cumulative_margin = %services.recorder.cumulative_margin(),
        "inventory summary"
    );
    Ok(())
}
