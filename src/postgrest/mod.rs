//! Table operations through the PostgREST API

mod filter;
mod query;

use async_trait::async_trait;
use log::warn;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::GatewayError;
use crate::fetch::Fetch;
use crate::gateway::SupabaseGateway;

pub use filter::*;
pub use query::*;

/// Row-level access to the hosted relational store.
///
/// Every method returns the rows the backend reports as read or affected,
/// so an ownership-scoped mutation that matched nothing comes back empty.
#[async_trait]
pub trait Database: Send + Sync {
    /// Read rows matching the query
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>, GatewayError>;

    /// Insert one row and return it as stored
    async fn insert(&self, table: &str, row: Value) -> Result<Vec<Value>, GatewayError>;

    /// Apply `changes` to every row matching the query's filters
    async fn update(&self, table: &str, query: &Query, changes: Value)
        -> Result<Vec<Value>, GatewayError>;

    /// Insert or merge on the `on_conflict` column
    async fn upsert(&self, table: &str, row: Value, on_conflict: &str)
        -> Result<Vec<Value>, GatewayError>;

    /// Delete every row matching the query's filters
    async fn delete(&self, table: &str, query: &Query) -> Result<Vec<Value>, GatewayError>;
}

/// Decode rows returned by a [`Database`] call
pub fn decode_rows<T: DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<T>, GatewayError> {
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(GatewayError::from))
        .collect()
}

/// Decode rows one by one, skipping (and logging) rows that do not fit `T`
pub fn decode_valid_rows<T: DeserializeOwned>(table: &str, rows: Vec<Value>) -> Vec<T> {
    rows.into_iter()
        .filter_map(|row| {
            let id = row.get("id").cloned().unwrap_or(Value::Null);
            match serde_json::from_value(row) {
                Ok(decoded) => Some(decoded),
                Err(e) => {
                    warn!("skipping undecodable {} row {}: {}", table, id, e);
                    None
                }
            }
        })
        .collect()
}

impl SupabaseGateway {
    fn table_url(&self, table: &str) -> String {
        self.service_url("rest", &format!("/{}", table))
    }
}

#[async_trait]
impl Database for SupabaseGateway {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>, GatewayError> {
        let token = self.bearer().await;
        Fetch::get(&self.client, &self.table_url(table))
            .credentials(&self.key, &token)
            .query(query.to_pairs())
            .execute::<Vec<Value>>()
            .await
    }

    async fn insert(&self, table: &str, row: Value) -> Result<Vec<Value>, GatewayError> {
        let token = self.bearer().await;
        Fetch::post(&self.client, &self.table_url(table))
            .credentials(&self.key, &token)
            .header("Prefer", "return=representation")
            .json(&row)?
            .execute::<Vec<Value>>()
            .await
    }

    async fn update(
        &self,
        table: &str,
        query: &Query,
        changes: Value,
    ) -> Result<Vec<Value>, GatewayError> {
        let token = self.bearer().await;
        Fetch::patch(&self.client, &self.table_url(table))
            .credentials(&self.key, &token)
            .header("Prefer", "return=representation")
            .query(query.to_pairs())
            .json(&changes)?
            .execute::<Vec<Value>>()
            .await
    }

    async fn upsert(
        &self,
        table: &str,
        row: Value,
        on_conflict: &str,
    ) -> Result<Vec<Value>, GatewayError> {
        let token = self.bearer().await;
        Fetch::post(&self.client, &self.table_url(table))
            .credentials(&self.key, &token)
            .header("Prefer", "return=representation,resolution=merge-duplicates")
            .query(vec![("on_conflict".to_string(), on_conflict.to_string())])
            .json(&row)?
            .execute::<Vec<Value>>()
            .await
    }

    async fn delete(&self, table: &str, query: &Query) -> Result<Vec<Value>, GatewayError> {
        let token = self.bearer().await;
        Fetch::delete(&self.client, &self.table_url(table))
            .credentials(&self.key, &token)
            .header("Prefer", "return=representation")
            .query(query.to_pairs())
            .execute::<Vec<Value>>()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Row {
        id: u32,
        name: String,
    }

    #[test]
    fn decode_valid_rows_skips_misfits() {
        let rows = vec![
            json!({ "id": 1, "name": "maize" }),
            json!({ "id": 2, "name": null }),
            json!({ "id": 3, "name": "beans" }),
        ];
        let decoded: Vec<Row> = decode_valid_rows("crops", rows.clone());
        assert_eq!(decoded.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 3]);

        assert!(decode_rows::<Row>(rows).is_err());
    }
}
