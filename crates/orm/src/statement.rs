use std::fmt;

use sea_query::{
    MysqlQueryBuilder, PostgresQueryBuilder, QueryBuilder, QueryStatementBuilder,
    SqliteQueryBuilder,
};
use strata_sql::{DataType, Dialect};

use crate::codec::values_to_datatypes;
use crate::error::Result;

/// A compiled SQL statement with positional parameters in driver format.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// Rendered SQL, placeholders in the dialect's style.
    pub sql: String,

    /// Bound parameters in placeholder order.
    pub params: Vec<DataType>,
}

impl Statement {
    /// Render a sea-query statement for `dialect`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Codec`] if a bound value has no driver
    /// representation.
    pub fn build(
        statement: &impl QueryStatementBuilder, dialect: Dialect, table: &'static str,
    ) -> Result<Self> {
        let (sql, values) = statement.build_any(query_builder(dialect));
        let params =
            values_to_datatypes(values).map_err(|e| crate::Error::Codec(e.to_string()))?;

        tracing::debug!(table, sql = %sql, param_count = params.len(), "generated SQL");

        Ok(Self { sql, params })
    }

    /// Key identifying this statement and its arguments, used to memoize
    /// lookups within a validation pass.
    #[must_use]
    pub fn cache_key(&self) -> String {
        format!("stmt={}, args={:?}", self.sql, self.params)
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

pub(crate) fn query_builder(dialect: Dialect) -> &'static dyn QueryBuilder {
    match dialect {
        Dialect::Postgres => &PostgresQueryBuilder,
        Dialect::MySql => &MysqlQueryBuilder,
        Dialect::Sqlite => &SqliteQueryBuilder,
    }
}

#[cfg(test)]
mod tests {
    use sea_query::{Alias, Expr, ExprTrait, Query};

    use super::*;

    fn select() -> sea_query::SelectStatement {
        Query::select()
            .column(Alias::new("id"))
            .from(Alias::new("projects"))
            .and_where(Expr::col(Alias::new("name")).eq("dev"))
            .to_owned()
    }

    #[test]
    fn placeholders_follow_dialect() {
        let pg = Statement::build(&select(), Dialect::Postgres, "projects").unwrap();
        assert_eq!(pg.sql, r#"SELECT "id" FROM "projects" WHERE "name" = $1"#);

        let mysql = Statement::build(&select(), Dialect::MySql, "projects").unwrap();
        assert_eq!(mysql.sql, "SELECT `id` FROM `projects` WHERE `name` = ?");

        let sqlite = Statement::build(&select(), Dialect::Sqlite, "projects").unwrap();
        assert_eq!(sqlite.params, vec![DataType::Str(Some("dev".to_string()))]);
    }

    #[test]
    fn cache_key_includes_arguments() {
        let stmt = Statement::build(&select(), Dialect::Sqlite, "projects").unwrap();
        let key = stmt.cache_key();
        assert!(key.starts_with("stmt=SELECT"));
        assert!(key.contains(r#"args=[Str(Some("dev"))]"#));
    }
}
