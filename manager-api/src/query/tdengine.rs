use super::{GroupBy, OrderBy, Select, StatementBuilder, Where};

/// A stand-in for a TDengine statement builder.
///
/// The original implementation never finished this dialect's query
/// side (every clause method panics); this port keeps the type, so
/// callers can still construct one and see it do nothing, but moves
/// the actual refusal up to [`Request::build_statement`] so nothing
/// panics. `raw` is the one clause honored, since it's also how the
/// TDengine back-end issues its hand-written `INSERT`/`CREATE TABLE`
/// statements outside of this AST.
#[derive(Default)]
pub struct TDengineBuilder {
    raw: String,
}

impl StatementBuilder for TDengineBuilder {
    fn select(&mut self, _selects: &[Select]) {}

    fn from(&mut self, _from: &str) {}

    fn where_clause(&mut self, _where_: Option<&Where>) {}

    fn group_by(&mut self, _group_by: Option<&GroupBy>) {}

    fn order_by(&mut self, _order_by: Option<&OrderBy>) {}

    fn raw(&mut self, raw: Option<&str>) {
        if let Some(raw) = raw {
            self.raw = raw.to_string();
        }
    }

    fn statement(self) -> String {
        self.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_raw_survives_rendering() {
        let mut b = TDengineBuilder::default();
        b.select(&[Select {
            field: "temp".into(),
            agg: super::super::Agg::Avg,
        }]);
        b.from("t");
        b.raw(Some("INSERT INTO t VALUES (now, 1)"));
        assert_eq!(b.statement(), "INSERT INTO t VALUES (now, 1)");
    }
}
