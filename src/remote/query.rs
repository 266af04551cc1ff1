use std::fmt::Display;

use crate::activity::ActivityQuery;

/// PostgREST query-string parameters for one table request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestQuery {
    params: Vec<(String, String)>,
}

impl RestQuery {
    pub fn new() -> Self { Self::default() }

    /// Every column.
    pub fn all() -> Self { Self::new().select("*") }

    pub fn select(mut self, columns: &str) -> Self {
        self.params.push(("select".into(), columns.into()));
        self
    }

    pub fn eq<V: Display>(mut self, column: &str, value: V) -> Self {
        self.params.push((column.into(), format!("eq.{}", value)));
        self
    }

    /// Descending sort; later columns break ties left by earlier ones.
    pub fn order_desc(mut self, columns: &[&str]) -> Self {
        let order = columns.iter().map(|c| format!("{}.desc", c)).collect::<Vec<_>>().join(",");
        self.params.push(("order".into(), order));
        self
    }

    pub fn range(mut self, offset: usize, limit: usize) -> Self {
        self.params.push(("offset".into(), offset.to_string()));
        self.params.push(("limit".into(), limit.to_string()));
        self
    }

    pub fn params(&self) -> &[(String, String)] { &self.params }

    pub fn is_empty(&self) -> bool { self.params.is_empty() }

    /// The feed read: newest first with id as tiebreak, windowed, optionally one actor's rows.
    pub fn for_activity(query: &ActivityQuery) -> Self {
        let mut q = Self::all().order_desc(&["timestamp", "id"]);
        if let Some(uid) = &query.user_id {
            q = q.eq("user_id", uid);
        }
        q.range(query.offset, query.limit)
    }
}
