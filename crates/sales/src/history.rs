//! Append-only sale history and its persisted form.
//!
//! The history is the source of truth for every cumulative figure: running
//! margin, revenue and cost are folds over it, never counters updated on the
//! side.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use leanstock_core::{Money, PartId, TransactionId};

use crate::transaction::{Transaction, TransactionLine};

/// Key holding the schema version marker.
pub const SCHEMA_VERSION_KEY: &str = "leanstock.schema_version";
/// Key holding the JSON array of transactions.
pub const TRANSACTIONS_KEY: &str = "leanstock.transactions";
/// Key holding the cumulative margin in cents (derived, rewritten on append).
pub const CUMULATIVE_MARGIN_KEY: &str = "leanstock.cumulative_margin";

/// Prefix of the keys that keep discarded payloads, suffixed with the time
/// they were set aside.
pub const DISCARDED_TRANSACTIONS_KEY_PREFIX: &str = "leanstock.transactions.discarded";

/// Version written by this build.
pub const SCHEMA_VERSION: u32 = 2;

/// Ordered, append-only list of transactions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionHistory {
    transactions: Vec<Transaction>,
}

impl TransactionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, transaction: Transaction) {
        self.transactions.push(transaction);
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn get(&self, id: TransactionId) -> Option<&Transaction> {
        self.transactions.iter().find(|t| t.id() == id)
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub fn cumulative_margin(&self) -> Money {
        self.transactions.iter().map(Transaction::margin).sum()
    }

    pub fn cumulative_revenue(&self) -> Money {
        self.transactions.iter().map(Transaction::sale_amount).sum()
    }

    pub fn cumulative_cost(&self) -> Money {
        self.transactions.iter().map(Transaction::total_cost).sum()
    }

    /// Units of `part_id` sold across the whole history.
    pub fn units_sold(&self, part_id: PartId) -> i64 {
        self.transactions
            .iter()
            .flat_map(|t| t.lines())
            .filter(|l| l.part_id == part_id)
            .map(|l| l.quantity)
            .sum()
    }
}

/// The three values written under the fixed keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedHistory {
    pub schema_version: String,
    pub transactions: String,
    pub cumulative_margin: String,
}

/// Result of reading persisted history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedHistory {
    pub history: TransactionHistory,
    /// Set when records were upgraded from an older schema.
    pub migrated_from: Option<u32>,
    /// Set when the payload decoded under a schema other than its marker says.
    pub marker_mismatch: bool,
    /// Set when stored records were unusable and dropped.
    pub discarded: Option<String>,
}

impl DecodedHistory {
    fn fresh(history: TransactionHistory) -> Self {
        Self {
            history,
            migrated_from: None,
            marker_mismatch: false,
            discarded: None,
        }
    }

    fn discarded(reason: String) -> Self {
        Self {
            discarded: Some(reason),
            ..Self::fresh(TransactionHistory::new())
        }
    }

    /// Whether the stored form differs from what this build would write.
    pub fn needs_rewrite(&self) -> bool {
        self.migrated_from.is_some() || self.marker_mismatch || self.discarded.is_some()
    }
}

pub fn encode_history(history: &TransactionHistory) -> serde_json::Result<EncodedHistory> {
    Ok(EncodedHistory {
        schema_version: SCHEMA_VERSION.to_string(),
        transactions: serde_json::to_string(history.transactions())?,
        cumulative_margin: history.cumulative_margin().cents().to_string(),
    })
}

/// Decode whatever is stored under the history keys.
///
/// A missing version marker with data present is read as schema 1 (written
/// before the marker existed). When the payload does not fit the schema its
/// marker names, the other known schema is tried before giving up, so a save
/// interrupted between the marker and the payload never loses records.
/// Unknown versions and undecodable payloads are discarded instead of failing.
pub fn decode_history(version: Option<&str>, transactions: Option<&str>) -> DecodedHistory {
    let Some(payload) = transactions else {
        return DecodedHistory::fresh(TransactionHistory::new());
    };

    let declared = match version.map(str::trim) {
        None => 1,
        Some(raw) => match raw.parse::<u32>() {
            Ok(v) => v,
            Err(_) => return DecodedHistory::discarded(format!("unreadable schema version '{raw}'")),
        },
    };

    let fallback = match declared {
        SCHEMA_VERSION => 1,
        1 => SCHEMA_VERSION,
        other => return DecodedHistory::discarded(format!("unsupported schema version {other}")),
    };

    let first_error = match decode_as(declared, payload) {
        Ok(decoded) => return DecodedHistory {
            marker_mismatch: version.is_none(),
            ..decoded
        },
        Err(e) => e,
    };

    match decode_as(fallback, payload) {
        Ok(decoded) => DecodedHistory {
            marker_mismatch: true,
            ..decoded
        },
        Err(_) => DecodedHistory::discarded(format!("schema {declared} payload invalid: {first_error}")),
    }
}

fn decode_as(version: u32, payload: &str) -> serde_json::Result<DecodedHistory> {
    if version == SCHEMA_VERSION {
        let transactions = serde_json::from_str::<Vec<Transaction>>(payload)?;
        return Ok(DecodedHistory::fresh(TransactionHistory { transactions }));
    }

    let legacy = serde_json::from_str::<Vec<LegacyTransaction>>(payload)?;
    Ok(DecodedHistory {
        migrated_from: Some(1),
        ..DecodedHistory::fresh(TransactionHistory {
            transactions: legacy.into_iter().map(LegacyTransaction::migrate).collect(),
        })
    })
}

/// Schema 1 record: amounts in decimal currency units, no batch tracking.
#[derive(Debug, Deserialize)]
struct LegacyTransaction {
    #[serde(default)]
    id: Option<uuid::Uuid>,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    components: Vec<LegacyComponent>,
    total_cost: f64,
    sale_price: f64,
}

#[derive(Debug, Deserialize)]
struct LegacyComponent {
    part_id: u64,
    quantity: i64,
    cost: f64,
}

impl LegacyTransaction {
    fn migrate(self) -> Transaction {
        let lines = self
            .components
            .into_iter()
            .map(|c| TransactionLine {
                part_id: PartId::new(c.part_id),
                batch_id: None,
                location_label: None,
                quantity: c.quantity,
                unit_cost: Money::from_major(c.cost).unwrap_or(Money::ZERO),
            })
            .collect();

        Transaction::restored(
            self.id
                .map(TransactionId::from_uuid)
                .unwrap_or_default(),
            self.timestamp,
            self.description,
            lines,
            Money::from_major(self.total_cost).unwrap_or(Money::ZERO),
            Money::from_major(self.sale_price).unwrap_or(Money::ZERO),
        )
    }
}
