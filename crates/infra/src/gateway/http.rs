//! REST adapter for an InvenTree-style inventory backend.
//!
//! Endpoints used (relative to the configured API root):
//! - `GET  stock/?part=<id>&location_detail=true`
//! - `GET  stock/<id>/`
//! - `POST stock/`
//! - `PATCH stock/<id>/`
//! - `POST stock/transfer/`
//! - `GET  stock/location/`
//!
//! Requests are issued once. Quantity mutations are not idempotent, so a
//! transport failure is reported as `RemoteUnavailable` and left to the caller.

use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value as JsonValue, json};

use leanstock_core::{BatchId, LocationId, Money, PartId, StockError, StockResult};

use super::{BatchRecord, LocationRecord, Relocated, StockGateway};
use crate::config::StockConfig;

#[derive(Debug, Clone)]
pub struct HttpStockGateway {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpStockGateway {
    pub fn new(base_url: impl Into<String>, token: Option<String>, timeout: Duration) -> StockResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StockError::unavailable(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn from_config(config: &StockConfig) -> StockResult<Self> {
        Self::new(config.api_url.clone(), config.api_token.clone(), config.http_timeout)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        let req = req.header("Accept", "application/json");
        match &self.token {
            Some(token) => req.header("Authorization", format!("Token {token}")),
            None => req,
        }
    }

    async fn send(&self, what: &str, req: RequestBuilder) -> StockResult<Response> {
        let resp = self
            .authorized(req)
            .send()
            .await
            .map_err(|e| StockError::unavailable(format!("{what}: {e}")))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let body = resp.text().await.unwrap_or_default();
        Err(classify(what, status, &body))
    }

    async fn send_json<T: DeserializeOwned>(&self, what: &str, req: RequestBuilder) -> StockResult<T> {
        self.send(what, req)
            .await?
            .json::<T>()
            .await
            .map_err(|e| StockError::rejected(format!("{what}: unexpected response body: {e}")))
    }

    async fn fetch_item(&self, batch_id: BatchId) -> StockResult<StockItem> {
        let what = format!("fetch batch {batch_id}");
        let req = self.client.get(self.url(&format!("stock/{batch_id}/")));
        self.send_json(&what, req).await.map_err(|e| match e {
            StockError::RemoteRejected(msg) if msg.contains("HTTP 404") => StockError::UnknownBatch(batch_id),
            other => other,
        })
    }
}

fn classify(what: &str, status: StatusCode, body: &str) -> StockError {
    let msg = format!("{what}: HTTP {} {}", status.as_u16(), body.trim());
    if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
    {
        StockError::unavailable(msg)
    } else {
        StockError::rejected(msg)
    }
}

/// List endpoints return either a bare array or a paginated envelope.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Listing<T> {
    Plain(Vec<T>),
    Paged { results: Vec<T> },
}

impl<T> Listing<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Listing::Plain(items) => items,
            Listing::Paged { results } => results,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StockItem {
    pk: u64,
    part: u64,
    location: Option<u64>,
    #[serde(default)]
    location_detail: Option<LocationDetail>,
    quantity: JsonValue,
    #[serde(default)]
    purchase_price: Option<JsonValue>,
    #[serde(default)]
    updated: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LocationDetail {
    name: String,
}

#[derive(Debug, Deserialize)]
struct StockLocation {
    pk: u64,
    name: String,
}

#[derive(Debug, Deserialize)]
struct Created {
    pk: u64,
}

fn decimal(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn timestamp(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

impl StockItem {
    fn into_record(self) -> StockResult<BatchRecord> {
        let batch_id = BatchId::new(self.pk);
        let location_id = self.location.map(LocationId::new).ok_or_else(|| {
            StockError::rejected(format!("batch {batch_id} has no location"))
        })?;

        let quantity = decimal(&self.quantity)
            .filter(|q| q.fract() == 0.0 && *q >= 0.0)
            .map(|q| q as i64)
            .ok_or_else(|| {
                StockError::invalid_quantity(format!(
                    "batch {batch_id} reports non-integral quantity {}",
                    self.quantity
                ))
            })?;

        let unit_cost = match self.purchase_price.as_ref() {
            None | Some(JsonValue::Null) => Money::ZERO,
            Some(raw) => decimal(raw).and_then(Money::from_major).ok_or_else(|| {
                StockError::invalid_quantity(format!("batch {batch_id} reports unit cost {raw}"))
            })?,
        };

        Ok(BatchRecord {
            batch_id,
            part_id: PartId::new(self.part),
            location_id,
            location_label: self.location_detail.map(|d| d.name).unwrap_or_default(),
            quantity,
            unit_cost,
            last_updated_at: timestamp(self.updated.as_deref()).unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
        })
    }
}

#[async_trait::async_trait]
impl StockGateway for HttpStockGateway {
    async fn fetch_batches_for_part(&self, part_id: PartId) -> StockResult<Vec<BatchRecord>> {
        let what = format!("fetch batches for part {part_id}");
        let req = self
            .client
            .get(self.url("stock/"))
            .query(&[("part", part_id.to_string()), ("location_detail", "true".to_string())]);
        let items: Listing<StockItem> = self.send_json(&what, req).await?;

        items
            .into_vec()
            .into_iter()
            .filter(|item| item.location.is_some())
            .map(StockItem::into_record)
            .collect()
    }

    async fn create_batch(
        &self,
        part_id: PartId,
        location_id: LocationId,
        quantity: i64,
        unit_cost: Money,
    ) -> StockResult<BatchId> {
        let what = format!("create batch of part {part_id} at location {location_id}");
        let body = json!({
            "part": part_id.get(),
            "location": location_id.get(),
            "quantity": quantity,
            "purchase_price": unit_cost.to_string(),
        });
        let req = self.client.post(self.url("stock/")).json(&body);

        // Some backend versions answer with the created item, others with a list.
        let created: JsonValue = self.send_json(&what, req).await?;
        let pk = match created {
            JsonValue::Array(items) => items.into_iter().next(),
            other => Some(other),
        }
        .and_then(|v| serde_json::from_value::<Created>(v).ok())
        .map(|c| c.pk)
        .ok_or_else(|| StockError::rejected(format!("{what}: response carried no id")))?;

        Ok(BatchId::new(pk))
    }

    async fn set_batch_quantity(&self, batch_id: BatchId, quantity: i64) -> StockResult<()> {
        let what = format!("set quantity of batch {batch_id}");
        let req = self
            .client
            .patch(self.url(&format!("stock/{batch_id}/")))
            .json(&json!({ "quantity": quantity }));
        match self.send(&what, req).await {
            Ok(_) => Ok(()),
            Err(StockError::RemoteRejected(msg)) if msg.contains("HTTP 404") => {
                Err(StockError::UnknownBatch(batch_id))
            }
            Err(e) => Err(e),
        }
    }

    async fn relocate_batch(
        &self,
        batch_id: BatchId,
        new_location_id: LocationId,
        quantity: i64,
    ) -> StockResult<Relocated> {
        let what = format!("move batch {batch_id} to location {new_location_id}");
        let body = json!({
            "items": [{ "pk": batch_id.get(), "quantity": quantity }],
            "location": new_location_id.get(),
            "notes": "bin rotation",
        });
        self.send(&what, self.client.post(self.url("stock/transfer/")).json(&body))
            .await?;

        // A full transfer moves the item itself; a partial one splits off a
        // new item at the destination, which is the newest one there.
        let source = self.fetch_item(batch_id).await?;
        if source.location == Some(new_location_id.get()) {
            return Ok(Relocated { batch_id });
        }

        let req = self.client.get(self.url("stock/")).query(&[
            ("part", source.part.to_string()),
            ("location", new_location_id.get().to_string()),
            ("ordering", "-pk".to_string()),
        ]);
        let items: Listing<StockItem> = self.send_json(&what, req).await?;
        items
            .into_vec()
            .into_iter()
            .map(|item| item.pk)
            .max()
            .map(|pk| Relocated {
                batch_id: BatchId::new(pk),
            })
            .ok_or_else(|| StockError::rejected(format!("{what}: split batch not found at destination")))
    }

    async fn fetch_locations(&self) -> StockResult<Vec<LocationRecord>> {
        let req = self.client.get(self.url("stock/location/"));
        let locations: Listing<StockLocation> = self.send_json("fetch locations", req).await?;
        Ok(locations
            .into_vec()
            .into_iter()
            .map(|l| LocationRecord {
                location_id: LocationId::new(l.pk),
                label: l.name,
            })
            .collect())
    }
}
