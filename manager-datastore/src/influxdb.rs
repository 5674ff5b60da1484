//! Speaks InfluxDB's (v1) HTTP line-protocol write API and `/query`
//! endpoint directly over `reqwest`; there's no first-party InfluxDB
//! client crate in this corpus, and the wire protocol is simple
//! enough that hand-rolling it mirrors what the original's thin
//! `client.Client` wrapper does anyway.

use crate::executor::Executor;
use async_trait::async_trait;
use manager_api::query::{Dialect, Request, Response, Row};
use manager_api::types::device::Value;
use manager_api::types::schema::DeviceDataSchema;
use manager_api::types::DeviceDataRecord;
use manager_api::{Error, Result};
use std::time::Duration;

pub struct InfluxDbConfig {
    pub url: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout: Duration,
}

pub struct InfluxDbExecutor {
    http: reqwest::Client,
    cfg: InfluxDbConfig,
}

impl InfluxDbExecutor {
    pub fn new(cfg: InfluxDbConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(|e| Error::data_store(format!("building influxdb http client: {e}")))?;
        Ok(InfluxDbExecutor { http, cfg })
    }

    fn auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match (&self.cfg.username, &self.cfg.password) {
            (Some(u), Some(p)) => req.basic_auth(u, Some(p)),
            _ => req,
        }
    }

    async fn query_raw(&self, command: &str) -> Result<serde_json::Value> {
        let resp = self
            .auth(self.http.get(format!("{}/query", self.cfg.url)))
            .query(&[("db", self.cfg.database.as_str()), ("q", command)])
            .send()
            .await
            .map_err(|e| Error::data_store(format!("querying influxdb: {e}")))?;

        if !resp.status().is_success() {
            return Err(Error::data_store(format!("influxdb query failed: HTTP {}", resp.status())));
        }
        resp.json()
            .await
            .map_err(|e| Error::data_store(format!("decoding influxdb response: {e}")))
    }
}

fn escape_tag(v: &str) -> String {
    v.replace(' ', "\\ ").replace(',', "\\,").replace('=', "\\=")
}

fn field_literal(value: &Value) -> String {
    match value {
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => format!("{i}i"),
        Value::Uint(u) => format!("{u}u"),
        Value::Flt(f) => f.to_string(),
        Value::Str(s) => format!("\"{}\"", s.replace('"', "\\\"")),
    }
}

/// Renders one record as an InfluxDB line-protocol line.
fn line_protocol(record: &DeviceDataRecord) -> String {
    let measurement = record.aggregated_table_name();

    let mut tags: Vec<_> = record.tags().into_iter().collect();
    tags.sort_by(|a, b| a.0.cmp(b.0));
    let tag_str: String = tags
        .iter()
        .map(|(k, v)| format!(",{}={}", k, escape_tag(v)))
        .collect();

    let mut fields: Vec<_> = record.fields().into_iter().collect();
    fields.sort_by(|a, b| a.0.cmp(&b.0));
    let field_str: String = fields
        .iter()
        .map(|(k, v)| format!("{}={}", k, field_literal(v)))
        .collect::<Vec<_>>()
        .join(",");

    format!("{measurement}{tag_str} {field_str} {}", record.timestamp_ns())
}

#[async_trait]
impl Executor for InfluxDbExecutor {
    async fn connect(&self) -> Result<()> {
        let resp = self
            .auth(self.http.get(format!("{}/ping", self.cfg.url)))
            .send()
            .await
            .map_err(|e| Error::data_store(format!("connecting to influxdb: {e}")))?;
        if resp.status().is_success() || resp.status().as_u16() == 204 {
            Ok(())
        } else {
            Err(Error::data_store(format!("influxdb ping failed: HTTP {}", resp.status())))
        }
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    async fn create_db(&self) -> Result<()> {
        self.query_raw(&format!(r#"CREATE DATABASE "{}""#, self.cfg.database)).await?;
        Ok(())
    }

    async fn use_db(&self) -> Result<()> {
        Ok(())
    }

    /// InfluxDB measurements are created implicitly by the first
    /// write; there's no table to provision ahead of time.
    async fn create_table(&self, _schema: &DeviceDataSchema) -> Result<()> {
        Ok(())
    }

    async fn write(&self, records: &[DeviceDataRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let body = records.iter().map(line_protocol).collect::<Vec<_>>().join("\n");

        let resp = self
            .auth(self.http.post(format!("{}/write", self.cfg.url)))
            .query(&[("db", self.cfg.database.as_str()), ("precision", "ns")])
            .body(body)
            .send()
            .await
            .map_err(|e| Error::data_store(format!("writing to influxdb: {e}")))?;

        if resp.status().is_success() {
            Ok(())
        } else {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            Err(Error::data_store(format!("influxdb write failed: HTTP {status}: {text}")))
        }
    }

    async fn query(&self, req: &Request) -> Result<Response> {
        let command = req.build_statement(Dialect::InfluxDb)?;
        let body = self.query_raw(&command).await?;

        let series = body
            .get("results")
            .and_then(|r| r.get(0))
            .and_then(|r| r.get("series"))
            .and_then(|s| s.get(0));

        let Some(series) = series else {
            return Ok(Response { rows: Vec::new() });
        };

        let columns: Vec<String> = series
            .get("columns")
            .and_then(|c| c.as_array())
            .map(|c| c.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default();

        let values = series.get("values").and_then(|v| v.as_array()).cloned().unwrap_or_default();

        let rows: Vec<Row> = values
            .into_iter()
            .filter_map(|row| row.as_array().cloned())
            .map(|row| {
                columns
                    .iter()
                    .cloned()
                    .zip(row.into_iter())
                    .collect::<Row>()
            })
            .collect();

        Ok(Response { rows })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use manager_api::types::device::{DeviceData, FieldType};
    use manager_api::types::DeviceDataMap;

    #[test]
    fn line_protocol_sorts_tags_and_fields_and_quotes_strings() {
        let mut properties = DeviceDataMap::new();
        properties.insert(
            "temp".into(),
            DeviceData {
                name: "temp".into(),
                field_type: FieldType::Float,
                value: Value::Flt(21.5),
                ts: 1_700_000_000_000_000_000,
            },
        );

        let record = DeviceDataRecord {
            protocol_id: "modbus".into(),
            product_id: "thermostat".into(),
            device_id: "dev-1".into(),
            properties,
        };

        let line = line_protocol(&record);
        assert!(line.starts_with("modbus_thermostat,device=dev-1,product=thermostat,protocol=modbus "));
        assert!(line.contains("temp=21.5"));
        assert!(line.ends_with(" 1700000000000000000"));
    }
}
