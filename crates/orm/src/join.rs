use sea_query::{JoinType, SelectStatement};

use crate::filter::Filter;
use crate::schema::SchemaConfig;

/// A joined table and its `ON` condition.
#[derive(Debug, Clone)]
pub struct Join {
    kind: JoinKind,
    table: &'static str,
    on: Filter,
}

/// How rows of the joined table are matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    /// Only rows with a match on both sides.
    Inner,
    /// Every row of the selected table, matched or not.
    Left,
}

impl From<JoinKind> for JoinType {
    fn from(kind: JoinKind) -> Self {
        match kind {
            JoinKind::Inner => Self::InnerJoin,
            JoinKind::Left => Self::LeftJoin,
        }
    }
}

impl Join {
    /// Joins `table` on `on` with the given `kind`.
    #[must_use]
    pub const fn new(kind: JoinKind, table: &'static str, on: Filter) -> Self {
        Self { kind, table, on }
    }

    /// `INNER JOIN table ON ...`
    #[must_use]
    pub const fn inner(table: &'static str, on: Filter) -> Self {
        Self::new(JoinKind::Inner, table, on)
    }

    /// `LEFT JOIN table ON ...`
    #[must_use]
    pub const fn left(table: &'static str, on: Filter) -> Self {
        Self::new(JoinKind::Left, table, on)
    }

    /// Unqualified columns in the condition resolve against `default_table`,
    /// the table being selected from.
    pub(crate) fn apply(
        self, statement: &mut SelectStatement, default_table: &'static str, schema: &SchemaConfig,
    ) {
        let on = self.on.into_expr(default_table, schema);
        statement.join(self.kind.into(), schema.table_ref(self.table), on);
    }
}
