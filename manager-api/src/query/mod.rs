//! Back-end-neutral description of a history query, and the
//! dialect-specific statement builders that render it.

mod influxdb;
mod tdengine;

pub use influxdb::InfluxDbBuilder;
pub use tdengine::TDengineBuilder;

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// The aggregation applied to a selected field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Agg {
    Raw,
    Avg,
    Sum,
    Max,
    Min,
    Count,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Select {
    pub field: String,
    pub agg: Agg,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Where {
    #[serde(default)]
    pub begin_ns: i64,
    #[serde(default)]
    pub end_ns: i64,
    #[serde(default)]
    pub timestamp_ns: i64,
    #[serde(default)]
    pub advanced: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FillType {
    None,
    Prev,
    Next,
    Linear,
    Null,
    Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub fill_type: FillType,
    #[serde(default)]
    pub value: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimeInterval {
    pub interval: String,
    #[serde(default)]
    pub offset: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupBy {
    #[serde(default)]
    pub time_interval: Option<TimeInterval>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub fill: Option<Fill>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    #[serde(default)]
    pub desc: bool,
}

/// A back-end-neutral query request. `raw`, if set, is appended
/// verbatim to whatever the rendered clauses produce (it does not
/// replace them — see `InfluxDbBuilder::raw`).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub selects: Vec<Select>,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub where_clause: Option<Where>,
    #[serde(default)]
    pub group_by: Option<GroupBy>,
    #[serde(default)]
    pub order_by: Option<OrderBy>,
    #[serde(default)]
    pub raw: Option<String>,
}

/// One row returned by a history query, keyed by column name.
pub type Row = std::collections::HashMap<String, serde_json::Value>;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub rows: Vec<Row>,
}

/// The time-series dialect a statement should be rendered for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dialect {
    InfluxDb,
    TDengine,
}

/// Exposes, in order, `select`, `from`, `where_clause`, `group_by`,
/// `order_by`, `raw`, `statement` — unset clauses append nothing.
pub trait StatementBuilder: Default {
    fn select(&mut self, selects: &[Select]);
    fn from(&mut self, from: &str);
    fn where_clause(&mut self, where_: Option<&Where>);
    fn group_by(&mut self, group_by: Option<&GroupBy>);
    fn order_by(&mut self, order_by: Option<&OrderBy>);
    fn raw(&mut self, raw: Option<&str>);
    fn statement(self) -> String;
}

impl Request {
    fn render<B: StatementBuilder>(&self) -> String {
        let mut b = B::default();

        b.select(&self.selects);
        b.from(&self.from);
        b.where_clause(self.where_clause.as_ref());
        b.group_by(self.group_by.as_ref());
        b.order_by(self.order_by.as_ref());
        b.raw(self.raw.as_deref());
        b.statement()
    }

    /// Renders this request for the given dialect. TDengine is
    /// write-only in this implementation (see DESIGN.md): ad-hoc
    /// history queries against it fail here, at the statement
    /// boundary, rather than producing a stubbed-empty statement.
    pub fn build_statement(&self, dialect: Dialect) -> Result<String> {
        match dialect {
            Dialect::InfluxDb => Ok(self.render::<InfluxDbBuilder>()),
            Dialect::TDengine => Err(Error::data_store(
                "the tdengine dialect does not support rendering history queries",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_request_renders_empty_statement() {
        let req = Request::default();
        assert_eq!(req.build_statement(Dialect::InfluxDb).unwrap(), "");
    }

    #[test]
    fn tdengine_query_rendering_is_rejected() {
        let req = Request::default();
        assert!(req.build_statement(Dialect::TDengine).is_err());
    }
}
