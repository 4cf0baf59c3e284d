//! Shared fixtures for service tests: one split shelf, one solid bin.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use leanstock_core::{LocationId, Money, PartId};

use crate::gateway::InMemoryStockGateway;
use crate::ledger::BatchLedger;

pub type TestLedger = BatchLedger<Arc<InMemoryStockGateway>>;

pub const PART: PartId = PartId::new(1);
pub const OTHER_PART: PartId = PartId::new(2);

pub const NEW_BIN: LocationId = LocationId::new(10);
pub const OLD_BIN: LocationId = LocationId::new(11);
pub const SOLID_BIN: LocationId = LocationId::new(12);
/// New bin whose shelf has no Old counterpart.
pub const LONE_NEW_BIN: LocationId = LocationId::new(14);

pub fn at(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 8, 0, 0).unwrap() + Duration::minutes(minutes)
}

pub fn gateway() -> Arc<InMemoryStockGateway> {
    let gw = InMemoryStockGateway::new();
    gw.add_location(LocationId::new(1), "A");
    gw.add_location(LocationId::new(2), "A-1");
    gw.add_location(NEW_BIN, "A-1-3-A");
    gw.add_location(OLD_BIN, "A-1-3-B");
    gw.add_location(SOLID_BIN, "B-4-1");
    gw.add_location(LONE_NEW_BIN, "C-1-1-A");
    Arc::new(gw)
}

pub async fn ledger_for(gw: &Arc<InMemoryStockGateway>) -> Arc<TestLedger> {
    let ledger = BatchLedger::new(Arc::clone(gw));
    ledger.load_locations().await.unwrap();
    Arc::new(ledger)
}

/// Old{3 @ 2.00} and New{5 @ 3.00} of [`PART`] on shelf A-1-3, already refreshed.
pub async fn shelf_with_stock() -> (Arc<TestLedger>, Arc<InMemoryStockGateway>) {
    let gw = gateway();
    gw.seed_batch(PART, OLD_BIN, 3, Money::from_cents(200), at(0));
    gw.seed_batch(PART, NEW_BIN, 5, Money::from_cents(300), at(10));
    let ledger = ledger_for(&gw).await;
    ledger.refresh(PART).await.unwrap();
    (ledger, gw)
}
