//! Projections and aggregations scanned into caller-defined types.

use std::marker::PhantomData;

use sea_query::{Asterisk, Expr, Func, SimpleExpr};
use serde::de::DeserializeOwned;

use crate::client::Client;
use crate::error::{Error, Result};
use crate::filter::table_column;
use crate::query::{QuerySpec, first_value, run};
use crate::schema::Schema;
use crate::statement::Statement;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AggregateFunc {
    Count,
    Sum,
    Mean,
    Max,
    Min,
}

/// An aggregate expression selected under an alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregate {
    func: AggregateFunc,
    column: Option<&'static str>,
    alias: &'static str,
}

impl Aggregate {
    /// `COUNT(*) AS count`
    #[must_use]
    pub const fn count() -> Self {
        Self {
            func: AggregateFunc::Count,
            column: None,
            alias: "count",
        }
    }

    /// `SUM(column) AS sum`
    #[must_use]
    pub const fn sum(column: &'static str) -> Self {
        Self::of(AggregateFunc::Sum, column, "sum")
    }

    /// `AVG(column) AS mean`
    #[must_use]
    pub const fn mean(column: &'static str) -> Self {
        Self::of(AggregateFunc::Mean, column, "mean")
    }

    /// `MAX(column) AS max`
    #[must_use]
    pub const fn max(column: &'static str) -> Self {
        Self::of(AggregateFunc::Max, column, "max")
    }

    /// `MIN(column) AS min`
    #[must_use]
    pub const fn min(column: &'static str) -> Self {
        Self::of(AggregateFunc::Min, column, "min")
    }

    const fn of(func: AggregateFunc, column: &'static str, alias: &'static str) -> Self {
        Self {
            func,
            column: Some(column),
            alias,
        }
    }

    /// Report the value under `alias` instead.
    #[must_use]
    pub const fn alias(mut self, alias: &'static str) -> Self {
        self.alias = alias;
        self
    }

    pub(crate) const fn name(&self) -> &'static str {
        self.alias
    }

    pub(crate) fn expr(&self, table: &'static str) -> SimpleExpr {
        let Some(column) = self.column else {
            return Func::count(Expr::col(Asterisk)).into();
        };
        let column = Expr::col(table_column(table, column));
        match self.func {
            AggregateFunc::Count => Func::count(column).into(),
            AggregateFunc::Sum => Func::sum(column).into(),
            AggregateFunc::Mean => Func::avg(column).into(),
            AggregateFunc::Max => Func::max(column).into(),
            AggregateFunc::Min => Func::min(column).into(),
        }
    }
}

/// A query switched to a custom projection.
///
/// ```ignore
/// #[derive(Deserialize)]
/// struct Spend {
///     connector_id: String,
///     sum: f64,
/// }
///
/// let spend: Vec<Spend> = ClusterCost::query()
///     .group_by(&["connector_id"])
///     .aggregate([Aggregate::sum("total_cost")])
///     .scan(&client)
///     .await?;
/// ```
#[derive(Debug)]
pub struct Selector<E: Schema> {
    spec: QuerySpec,
    _marker: PhantomData<E>,
}

impl<E: Schema> Selector<E> {
    pub(crate) const fn new(spec: QuerySpec) -> Self {
        Self {
            spec,
            _marker: PhantomData,
        }
    }

    /// Adds aggregate expressions to the projection.
    #[must_use]
    pub fn aggregate(mut self, aggregates: impl IntoIterator<Item = Aggregate>) -> Self {
        self.spec.aggregates.extend(aggregates);
        self
    }

    /// Compile for `client`'s dialect and schema configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Codec`] if a bound value has no driver representation.
    pub fn statement(&self, client: &Client) -> Result<Statement> {
        self.spec.statement(client.dialect(), client.schema_config())
    }

    /// Deserializes every row into `T`, matching columns by name.
    ///
    /// # Errors
    ///
    /// Returns the driver's error, or [`Error::Codec`] if a row does not
    /// deserialize into `T`.
    pub async fn scan<T: DeserializeOwned>(self, client: &Client) -> Result<Vec<T>> {
        let rows = run(client, self.spec).await?;
        let json = strata_sql::into_json(rows).map_err(|e| Error::Codec(e.to_string()))?;
        serde_json::from_value(json).map_err(|e| Error::Codec(e.to_string()))
    }

    /// Values of the single projected text column.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] unless exactly one expression is
    /// projected.
    pub async fn strings(self, client: &Client) -> Result<Vec<String>> {
        self.single("strings", client).await
    }

    /// Values of the single projected integer column.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] unless exactly one expression is
    /// projected.
    pub async fn ints(self, client: &Client) -> Result<Vec<i64>> {
        self.single("ints", client).await
    }

    /// Values of the single projected floating-point column.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] unless exactly one expression is
    /// projected.
    pub async fn floats(self, client: &Client) -> Result<Vec<f64>> {
        self.single("floats", client).await
    }

    async fn single<T>(self, method: &str, client: &Client) -> Result<Vec<T>>
    where
        T: crate::codec::FetchValue + Default,
    {
        if self.spec.requested().len() != 1 {
            return Err(Error::validation(format!(
                "{method} is not achievable when selecting more than 1 field"
            )));
        }
        let rows = run(client, self.spec).await?;
        rows.iter().map(first_value).collect()
    }
}
