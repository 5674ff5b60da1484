//! Speaks TDengine's REST endpoint (`POST /rest/sql`, a bare SQL
//! string as the body) over `reqwest`, the same "no native client
//! crate, talk HTTP directly" call as [`crate::influxdb`]. Query and
//! export are unimplemented here — see DESIGN.md: the original never
//! finished this dialect's read path either.

use crate::executor::Executor;
use async_trait::async_trait;
use manager_api::query::{Request, Response};
use manager_api::types::device::Value;
use manager_api::types::schema::DeviceDataSchema;
use manager_api::types::{DeviceDataRecord, FieldType};
use manager_api::{Error, Result};
use std::time::Duration;

pub struct TDengineConfig {
    pub url: String,
    pub database: String,
    pub username: String,
    pub password: String,
    pub timeout: Duration,
}

pub struct TDengineExecutor {
    http: reqwest::Client,
    cfg: TDengineConfig,
}

impl TDengineExecutor {
    pub fn new(cfg: TDengineConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(|e| Error::data_store(format!("building tdengine http client: {e}")))?;
        Ok(TDengineExecutor { http, cfg })
    }

    async fn exec(&self, sql: &str) -> Result<()> {
        let resp = self
            .http
            .post(format!("{}/rest/sql/{}", self.cfg.url, self.cfg.database))
            .basic_auth(&self.cfg.username, Some(&self.cfg.password))
            .body(sql.to_string())
            .send()
            .await
            .map_err(|e| Error::data_store(format!("executing tdengine sql: {e}")))?;

        if resp.status().is_success() {
            Ok(())
        } else {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            Err(Error::data_store(format!("tdengine sql failed: HTTP {status}: {text}")))
        }
    }
}

fn sql_literal(value: &Value) -> String {
    match value {
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Uint(u) => u.to_string(),
        Value::Flt(f) => f.to_string(),
        Value::Str(s) => format!("'{}'", s.replace('\'', "''")),
    }
}

fn create_stable_sql(schema: &DeviceDataSchema) -> String {
    let fields = schema
        .properties
        .iter()
        .map(|p| format!("{} {}", p.id, field_type_sql(p.field_type)))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "CREATE STABLE IF NOT EXISTS {} (ts TIMESTAMP, {fields}) TAGS (protocol BINARY(64), product BINARY(64), device BINARY(64))",
        schema.aggregated_table_name(),
    )
}

fn field_type_sql(field_type: FieldType) -> &'static str {
    match field_type {
        FieldType::Bool => "BOOL",
        FieldType::Int => "BIGINT",
        FieldType::Uint => "BIGINT UNSIGNED",
        FieldType::Float => "DOUBLE",
        FieldType::String => "BINARY(256)",
    }
}

fn insert_sql(record: &DeviceDataRecord) -> String {
    let mut fields: Vec<_> = record.fields().into_iter().collect();
    fields.sort_by(|a, b| a.0.cmp(&b.0));

    let columns = fields.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>().join(", ");
    let values = fields.iter().map(|(_, v)| sql_literal(v)).collect::<Vec<_>>().join(", ");

    format!(
        "INSERT INTO {} USING {} TAGS ('{}', '{}', '{}') ({}) VALUES ({})",
        record.table_name(),
        record.aggregated_table_name(),
        record.protocol_id,
        record.product_id,
        record.device_id,
        format!("ts, {columns}"),
        format!("{}, {values}", record.timestamp_ns()),
    )
}

#[async_trait]
impl Executor for TDengineExecutor {
    async fn connect(&self) -> Result<()> {
        self.exec("SELECT SERVER_VERSION()").await
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    async fn create_db(&self) -> Result<()> {
        self.exec(&format!("CREATE DATABASE IF NOT EXISTS {}", self.cfg.database)).await
    }

    async fn use_db(&self) -> Result<()> {
        self.exec(&format!("USE {}", self.cfg.database)).await
    }

    async fn create_table(&self, schema: &DeviceDataSchema) -> Result<()> {
        self.exec(&create_stable_sql(schema)).await
    }

    async fn write(&self, records: &[DeviceDataRecord]) -> Result<()> {
        for record in records {
            self.exec(&insert_sql(record)).await?;
        }
        Ok(())
    }

    async fn query(&self, _req: &Request) -> Result<Response> {
        Err(Error::data_store("the tdengine executor does not support ad-hoc queries"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use manager_api::types::device::{DeviceData, FieldType};
    use manager_api::types::DeviceDataMap;

    #[test]
    fn insert_sql_names_the_child_table_and_its_parent() {
        let mut properties = DeviceDataMap::new();
        properties.insert(
            "temp".into(),
            DeviceData {
                name: "temp".into(),
                field_type: FieldType::Float,
                value: Value::Flt(21.5),
                ts: 42,
            },
        );
        let record = DeviceDataRecord {
            protocol_id: "modbus".into(),
            product_id: "thermostat".into(),
            device_id: "dev-1".into(),
            properties,
        };

        let sql = insert_sql(&record);
        assert!(sql.starts_with("INSERT INTO modbus_thermostat_dev-1 USING modbus_thermostat"));
        assert!(sql.contains("VALUES (42, 21.5)"));
    }
}
