use sea_query::{Alias, ColumnRef, Expr, ExprTrait, IntoIden, Query, SimpleExpr, Value};

use crate::schema::SchemaConfig;

/// A `WHERE` predicate, kept free of ``SeaQuery`` types at the call site.
///
/// Values are any type converting into ``sea_query::Value``: integers, strings,
/// ``DateTime<Utc>`` and `ObjectId` all do. Columns without a table resolve
/// against the table of the statement the filter ends up in.
#[derive(Debug, Clone)]
pub enum Filter {
    /// A test on one column.
    Column(Column, Predicate),
    /// `left = right`, for join conditions.
    Same(Column, Column),
    /// Every filter holds. Empty is `TRUE`.
    All(Vec<Self>),
    /// Some filter holds. Empty is `FALSE`.
    Any(Vec<Self>),
    /// Negation.
    Not(Box<Self>),
}

/// A possibly table-qualified column name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    /// Qualifying table, `None` for the statement's own table.
    pub table: Option<&'static str>,

    /// Column name.
    pub name: &'static str,
}

/// What a [`Filter::Column`] checks.
#[derive(Debug, Clone)]
pub enum Predicate {
    /// Binary comparison with a value.
    Compare(Comparison, Value),
    /// Membership in a value list.
    In(Vec<Value>),
    /// Non-membership in a value list.
    NotIn(Vec<Value>),
    /// `IS NULL`
    Null,
    /// `IS NOT NULL`
    NotNull,
    /// `LIKE` pattern match.
    Like(String),
    /// Membership in a subquery's projection.
    InQuery(Box<SubQuery>),
}

/// Binary comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Comparison {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

/// Single-column projection of another table, used by edge predicates.
#[derive(Debug, Clone)]
pub struct SubQuery {
    /// Table selected from.
    pub table: &'static str,

    /// Column projected.
    pub column: &'static str,

    /// Predicates on `table`.
    pub filters: Vec<Filter>,
}

impl Column {
    const fn own(name: &'static str) -> Self {
        Self { table: None, name }
    }

    const fn of(table: &'static str, name: &'static str) -> Self {
        Self {
            table: Some(table),
            name,
        }
    }

    fn expr(self, default_table: &'static str) -> SimpleExpr {
        Expr::col(table_column(self.table.unwrap_or(default_table), self.name)).into()
    }
}

impl Predicate {
    fn apply(self, column: SimpleExpr, schema: &SchemaConfig) -> SimpleExpr {
        match self {
            Self::Compare(op, value) => match op {
                Comparison::Eq => column.eq(value),
                Comparison::Ne => column.ne(value),
                Comparison::Gt => column.gt(value),
                Comparison::Gte => column.gte(value),
                Comparison::Lt => column.lt(value),
                Comparison::Lte => column.lte(value),
            },
            // an empty IN list matches nothing
            Self::In(values) if values.is_empty() => literal(false),
            Self::In(values) => column.is_in(values),
            Self::NotIn(values) if values.is_empty() => literal(true),
            Self::NotIn(values) => column.is_not_in(values),
            Self::Null => column.is_null(),
            Self::NotNull => column.is_not_null(),
            Self::Like(pattern) => column.like(pattern),
            Self::InQuery(sub) => {
                let SubQuery {
                    table,
                    column: projected,
                    filters,
                } = *sub;
                let mut select = Query::select();
                select.column(table_column(table, projected)).from(schema.table_ref(table));
                for filter in filters {
                    select.and_where(filter.into_expr(table, schema));
                }
                column.in_subquery(select)
            }
        }
    }
}

impl Filter {
    /// Renders the filter, resolving unqualified columns against
    /// `default_table` and subquery tables through `schema`.
    #[must_use]
    pub fn into_expr(self, default_table: &'static str, schema: &SchemaConfig) -> SimpleExpr {
        match self {
            Self::Column(column, predicate) => predicate.apply(column.expr(default_table), schema),
            Self::Same(left, right) => left.expr(default_table).eq(right.expr(default_table)),
            Self::All(filters) => filters
                .into_iter()
                .map(|f| f.into_expr(default_table, schema))
                .reduce(SimpleExpr::and)
                .unwrap_or_else(|| literal(true)),
            Self::Any(filters) => filters
                .into_iter()
                .map(|f| f.into_expr(default_table, schema))
                .reduce(SimpleExpr::or)
                .unwrap_or_else(|| literal(false)),
            Self::Not(filter) => filter.into_expr(default_table, schema).not(),
        }
    }

    fn compare(col: &'static str, op: Comparison, val: impl Into<Value>) -> Self {
        Self::Column(Column::own(col), Predicate::Compare(op, val.into()))
    }

    /// `column = value`
    #[must_use]
    pub fn eq(col: &'static str, val: impl Into<Value>) -> Self {
        Self::compare(col, Comparison::Eq, val)
    }

    /// `column != value`
    #[must_use]
    pub fn ne(col: &'static str, val: impl Into<Value>) -> Self {
        Self::compare(col, Comparison::Ne, val)
    }

    /// `column > value`
    #[must_use]
    pub fn gt(col: &'static str, val: impl Into<Value>) -> Self {
        Self::compare(col, Comparison::Gt, val)
    }

    /// `column >= value`
    #[must_use]
    pub fn gte(col: &'static str, val: impl Into<Value>) -> Self {
        Self::compare(col, Comparison::Gte, val)
    }

    /// `column < value`
    #[must_use]
    pub fn lt(col: &'static str, val: impl Into<Value>) -> Self {
        Self::compare(col, Comparison::Lt, val)
    }

    /// `column <= value`
    #[must_use]
    pub fn lte(col: &'static str, val: impl Into<Value>) -> Self {
        Self::compare(col, Comparison::Lte, val)
    }

    /// `column IN (values)`; an empty list matches no rows.
    #[must_use]
    pub fn r#in(col: &'static str, vals: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        Self::Column(Column::own(col), Predicate::In(vals.into_iter().map(Into::into).collect()))
    }

    /// `column NOT IN (values)`; an empty list matches every row.
    #[must_use]
    pub fn not_in(col: &'static str, vals: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        Self::Column(Column::own(col), Predicate::NotIn(vals.into_iter().map(Into::into).collect()))
    }

    /// `column IS NULL`
    #[must_use]
    pub const fn is_null(col: &'static str) -> Self {
        Self::Column(Column::own(col), Predicate::Null)
    }

    /// `column IS NOT NULL`
    #[must_use]
    pub const fn is_not_null(col: &'static str) -> Self {
        Self::Column(Column::own(col), Predicate::NotNull)
    }

    /// `column LIKE pattern`
    #[must_use]
    pub fn like(col: &'static str, pattern: impl Into<String>) -> Self {
        Self::Column(Column::own(col), Predicate::Like(pattern.into()))
    }

    /// Case-sensitive substring match.
    #[must_use]
    pub fn contains(col: &'static str, needle: &str) -> Self {
        Self::like(col, format!("%{needle}%"))
    }

    /// `column IN (SELECT ...)`
    #[must_use]
    pub fn in_query(col: &'static str, sub: SubQuery) -> Self {
        Self::Column(Column::own(col), Predicate::InQuery(Box::new(sub)))
    }

    /// Conjunction.
    #[must_use]
    pub const fn and(filters: Vec<Self>) -> Self {
        Self::All(filters)
    }

    /// Disjunction.
    #[must_use]
    pub const fn or(filters: Vec<Self>) -> Self {
        Self::Any(filters)
    }

    /// Negation.
    #[must_use]
    pub fn not(filter: Self) -> Self {
        Self::Not(Box::new(filter))
    }

    /// `table.column = value`, for joined queries.
    #[must_use]
    pub fn table_eq(table: &'static str, col: &'static str, val: impl Into<Value>) -> Self {
        Self::Column(Column::of(table, col), Predicate::Compare(Comparison::Eq, val.into()))
    }

    /// `table.column IN (values)`
    #[must_use]
    pub fn table_in(
        table: &'static str, col: &'static str, vals: impl IntoIterator<Item = impl Into<Value>>,
    ) -> Self {
        Self::Column(Column::of(table, col), Predicate::In(vals.into_iter().map(Into::into).collect()))
    }

    /// `table.column IS NULL`
    #[must_use]
    pub const fn table_is_null(table: &'static str, col: &'static str) -> Self {
        Self::Column(Column::of(table, col), Predicate::Null)
    }

    /// `table.column IS NOT NULL`
    #[must_use]
    pub const fn table_is_not_null(table: &'static str, col: &'static str) -> Self {
        Self::Column(Column::of(table, col), Predicate::NotNull)
    }

    /// `left_table.left = right_table.right`
    #[must_use]
    pub const fn col_eq(
        left_table: &'static str, left: &'static str, right_table: &'static str,
        right: &'static str,
    ) -> Self {
        Self::Same(Column::of(left_table, left), Column::of(right_table, right))
    }

    /// Whether this is `column = value` on the statement's own table.
    #[must_use]
    pub fn is_eq_on(&self, col: &str) -> bool {
        matches!(
            self,
            Self::Column(Column { table: None, name }, Predicate::Compare(Comparison::Eq, _))
                if *name == col
        )
    }
}

/// Inline `TRUE`/`FALSE`, so constant predicates bind no parameter.
fn literal(value: bool) -> SimpleExpr {
    Expr::cust(if value { "TRUE" } else { "FALSE" })
}

/// Qualified `table.column` reference.
pub(crate) fn table_column(table: &str, column: &str) -> ColumnRef {
    ColumnRef::TableColumn(Alias::new(table).into_iden(), Alias::new(column).into_iden())
}

#[cfg(test)]
mod tests {
    use sea_query::SqliteQueryBuilder;

    use super::*;

    fn render(filter: Filter, schema: &SchemaConfig) -> String {
        Query::select()
            .column(Alias::new("id"))
            .from(Alias::new("services"))
            .and_where(filter.into_expr("services", schema))
            .to_string(SqliteQueryBuilder)
    }

    #[test]
    fn empty_in_list_matches_nothing() {
        let sql = render(Filter::r#in("id", Vec::<String>::new()), &SchemaConfig::default());
        assert!(sql.ends_with("WHERE FALSE"), "{sql}");
    }

    #[test]
    fn empty_conjunction_matches_everything() {
        let sql = render(Filter::and(vec![]), &SchemaConfig::default());
        assert!(sql.ends_with("WHERE TRUE"), "{sql}");
    }

    #[test]
    fn join_condition_compares_columns() {
        let sql = render(
            Filter::col_eq("services", "environment_id", "environments", "id"),
            &SchemaConfig::default(),
        );
        assert!(sql.contains(r#""services"."environment_id" = "environments"."id""#), "{sql}");
    }

    #[test]
    fn subquery_uses_schema() {
        let filter = Filter::in_query("id", SubQuery {
            table: "service_resources",
            column: "service_id",
            filters: vec![Filter::eq("type", "aws_s3_bucket")],
        });
        let sql = render(filter, &SchemaConfig::new("tenant"));
        assert!(
            sql.contains(r#""services"."id" IN (SELECT "service_resources"."service_id" FROM "tenant"."service_resources" WHERE "service_resources"."type" = 'aws_s3_bucket')"#),
            "{sql}"
        );
    }
}
