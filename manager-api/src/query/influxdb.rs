use super::{Agg, Fill, FillType, GroupBy, OrderBy, Select, StatementBuilder, Where};

/// Renders a [`Request`](super::Request) as an InfluxQL statement.
///
/// Clause order and wording follow InfluxQL: `SELECT ... FROM ... WHERE
/// ... GROUP BY ... ORDER BY ...`, with `raw` appended last. Any clause
/// with nothing to say is omitted rather than rendered empty.
#[derive(Default)]
pub struct InfluxDbBuilder {
    select: String,
    from: String,
    where_: String,
    group_by: String,
    order_by: String,
    raw: String,
}

fn render_select(field: &str, agg: Agg) -> String {
    match agg {
        Agg::Raw => field.to_string(),
        Agg::Avg => format!("MEAN({field}) as {field}"),
        Agg::Sum => format!("SUM({field}) as {field}"),
        Agg::Max => format!("MAX({field}) as {field}"),
        Agg::Min => format!("MIN({field}) as {field}"),
        Agg::Count => format!("COUNT({field}) as count"),
    }
}

fn render_fill(fill: &Fill) -> String {
    match fill.fill_type {
        FillType::None => "fill(none)".to_string(),
        FillType::Null => "fill(null)".to_string(),
        FillType::Prev => "fill(previous)".to_string(),
        FillType::Linear => "fill(linear)".to_string(),
        FillType::Value => format!("fill({})", fill.value.unwrap_or_default()),
        // InfluxQL has no forward-fill; render as absent rather than
        // substitute a different fill semantics.
        FillType::Next => String::new(),
    }
}

impl StatementBuilder for InfluxDbBuilder {
    fn select(&mut self, selects: &[Select]) {
        if selects.is_empty() {
            return;
        }
        let fields: Vec<String> = selects
            .iter()
            .map(|s| render_select(&s.field, s.agg))
            .collect();
        self.select = format!("SELECT {}", fields.join(", "));
    }

    fn from(&mut self, from: &str) {
        if from.is_empty() {
            return;
        }
        self.from = format!("FROM {from}");
    }

    fn where_clause(&mut self, where_: Option<&Where>) {
        let Some(w) = where_ else { return };
        let mut conds = Vec::new();

        if w.timestamp_ns != 0 {
            conds.push(format!("time == {}", w.timestamp_ns));
        }
        if w.begin_ns != 0 {
            conds.push(format!("time >= {}", w.begin_ns));
        }
        if w.end_ns != 0 {
            conds.push(format!("time <= {}", w.end_ns));
        }
        if let Some(advanced) = &w.advanced {
            if !advanced.is_empty() {
                conds.push(advanced.clone());
            }
        }

        if !conds.is_empty() {
            self.where_ = format!("WHERE {}", conds.join(" AND "));
        }
    }

    fn group_by(&mut self, group_by: Option<&GroupBy>) {
        let Some(g) = group_by else { return };
        let mut parts = Vec::new();

        if let Some(ti) = &g.time_interval {
            let inner = match &ti.offset {
                Some(offset) if !offset.is_empty() => format!("{}, {offset}", ti.interval),
                _ => ti.interval.clone(),
            };
            parts.push(format!("time({inner})"));
        }
        parts.extend(g.tags.iter().cloned());

        if parts.is_empty() {
            return;
        }

        let mut clause = format!("GROUP BY {}", parts.join(", "));
        if let Some(fill) = &g.fill {
            let rendered = render_fill(fill);
            if !rendered.is_empty() {
                clause.push(' ');
                clause.push_str(&rendered);
            }
        }
        self.group_by = clause;
    }

    fn order_by(&mut self, order_by: Option<&OrderBy>) {
        let Some(o) = order_by else { return };
        if o.field != "time" {
            return;
        }
        self.order_by = format!("ORDER BY time {}", if o.desc { "DESC" } else { "ASC" });
    }

    fn raw(&mut self, raw: Option<&str>) {
        if let Some(raw) = raw {
            self.raw = raw.to_string();
        }
    }

    fn statement(self) -> String {
        [
            self.select.as_str(),
            self.from.as_str(),
            self.where_.as_str(),
            self.group_by.as_str(),
            self.order_by.as_str(),
            self.raw.as_str(),
        ]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Dialect, Request, TimeInterval};

    #[test]
    fn renders_max_with_time_window_group_and_order() {
        let req = Request {
            selects: vec![Select {
                field: "temp".into(),
                agg: Agg::Max,
            }],
            from: "proto_prod".into(),
            where_clause: Some(Where {
                begin_ns: 1000,
                end_ns: 2000,
                ..Default::default()
            }),
            group_by: Some(GroupBy {
                time_interval: Some(TimeInterval {
                    interval: "1m".into(),
                    offset: None,
                }),
                tags: Vec::new(),
                fill: Some(Fill {
                    fill_type: FillType::Null,
                    value: None,
                }),
            }),
            order_by: Some(OrderBy {
                field: "time".into(),
                desc: true,
            }),
            raw: None,
        };

        assert_eq!(
            req.build_statement(Dialect::InfluxDb).unwrap(),
            "SELECT MAX(temp) as temp FROM proto_prod WHERE time >= 1000 AND time <= 2000 \
             GROUP BY time(1m) fill(null) ORDER BY time DESC"
        );
    }

    #[test]
    fn raw_is_appended_rather_than_substituted() {
        let req = Request {
            from: "t".into(),
            raw: Some("LIMIT 10".into()),
            ..Default::default()
        };
        assert_eq!(req.build_statement(Dialect::InfluxDb).unwrap(), "FROM t LIMIT 10");
    }

    #[test]
    fn forward_fill_renders_as_absent_not_null() {
        let req = Request {
            from: "t".into(),
            group_by: Some(GroupBy {
                time_interval: Some(TimeInterval {
                    interval: "1m".into(),
                    offset: None,
                }),
                tags: Vec::new(),
                fill: Some(Fill {
                    fill_type: FillType::Next,
                    value: None,
                }),
            }),
            ..Default::default()
        };

        assert_eq!(req.build_statement(Dialect::InfluxDb).unwrap(), "FROM t GROUP BY time(1m)");
    }

    #[test]
    fn order_by_ignores_non_time_fields() {
        let req = Request {
            from: "t".into(),
            order_by: Some(OrderBy {
                field: "temp".into(),
                desc: false,
            }),
            ..Default::default()
        };
        assert_eq!(req.build_statement(Dialect::InfluxDb).unwrap(), "FROM t");
    }
}
