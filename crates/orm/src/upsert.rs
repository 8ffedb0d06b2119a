//! `INSERT ... ON CONFLICT` resolution layered on the create builders.

use sea_query::{Alias, Expr, Keyword, OnConflict, SimpleExpr, Value};
use strata_sql::Dialect;

use crate::client::Client;
use crate::create::{Create, create_all};
use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::filter::table_column;
use crate::mutation::Outcome;
use crate::query::first_value;
use crate::schema::Schema;

/// Conflict target and resolution carried by a create mutation.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Conflict {
    target: Vec<&'static str>,
    action: ConflictAction,
}

#[derive(Debug, Clone, PartialEq)]
enum ConflictAction {
    Ignore,
    UpdateNewValues { except: Vec<&'static str> },
    Custom(Vec<(&'static str, Resolution)>),
}

#[derive(Debug, Clone, PartialEq)]
enum Resolution {
    Excluded,
    Value(Value),
    Add(Value),
    Null,
}

impl Conflict {
    /// The `ON CONFLICT` clause for a statement inserting `inserted`.
    ///
    /// Resolutions that would update nothing degrade to ignoring the
    /// conflict, since `DO UPDATE SET` needs at least one assignment.
    pub(crate) fn clause<E: Schema>(&self, inserted: &[&'static str]) -> OnConflict {
        let target = if self.target.is_empty() { vec!["id"] } else { self.target.clone() };
        let mut clause = OnConflict::columns(target.into_iter().map(Alias::new));

        match &self.action {
            ConflictAction::UpdateNewValues { except } => {
                let columns: Vec<&'static str> = inserted
                    .iter()
                    .copied()
                    .filter(|column| {
                        *column != "id"
                            && !E::immutable().contains(column)
                            && !except.contains(column)
                    })
                    .collect();
                if columns.is_empty() {
                    clause.do_nothing_on([Alias::new("id")]);
                } else {
                    clause.update_columns(columns.into_iter().map(Alias::new));
                }
            }
            ConflictAction::Custom(resolutions) if !resolutions.is_empty() => {
                for (column, resolution) in resolutions {
                    match resolution {
                        Resolution::Excluded => {
                            clause.update_column(Alias::new(*column));
                        }
                        Resolution::Value(value) => {
                            clause.value(Alias::new(*column), value.clone());
                        }
                        Resolution::Add(delta) => {
                            clause.value(
                                Alias::new(*column),
                                Expr::col(table_column(E::TABLE, column)).add(delta.clone()),
                            );
                        }
                        Resolution::Null => {
                            clause.value(Alias::new(*column), SimpleExpr::Keyword(Keyword::Null));
                        }
                    }
                }
            }
            ConflictAction::Ignore | ConflictAction::Custom(_) => {
                clause.do_nothing_on([Alias::new("id")]);
            }
        }
        clause
    }
}

/// Per-column resolutions applied when the insert conflicts.
#[derive(Debug, Default)]
pub struct UpsertSet {
    resolutions: Vec<(&'static str, Resolution)>,
}

impl UpsertSet {
    fn resolve(&mut self, column: &'static str, resolution: Resolution) -> &mut Self {
        self.resolutions.retain(|(col, _)| *col != column);
        self.resolutions.push((column, resolution));
        self
    }

    /// Take `column` from the proposed row.
    pub fn set_excluded(&mut self, column: &'static str) -> &mut Self {
        self.resolve(column, Resolution::Excluded)
    }

    /// Set `column` to `value`.
    pub fn set(&mut self, column: &'static str, value: impl Into<Value>) -> &mut Self {
        self.resolve(column, Resolution::Value(value.into()))
    }

    /// Add `delta` to the stored value of `column`.
    pub fn add(&mut self, column: &'static str, delta: impl Into<Value>) -> &mut Self {
        self.resolve(column, Resolution::Add(delta.into()))
    }

    /// Set `column` to `NULL`.
    pub fn clear(&mut self, column: &'static str) -> &mut Self {
        self.resolve(column, Resolution::Null)
    }
}

/// A create that resolves conflicts on `target` instead of failing.
///
/// ```ignore
/// Project::create()
///     .set("name", "default")
///     .on_conflict(&["name"])
///     .update_new_values()
///     .exec(&client)
///     .await?;
/// ```
#[derive(Debug)]
pub struct Upsert<E: Schema> {
    builders: Vec<Create<E>>,
    conflict: Conflict,
}

impl<E: Schema> Upsert<E> {
    pub(crate) fn new(builders: Vec<Create<E>>, target: &[&'static str]) -> Self {
        Self {
            builders,
            conflict: Conflict {
                target: target.to_vec(),
                action: ConflictAction::Ignore,
            },
        }
    }

    /// Keep the existing row.
    #[must_use]
    pub fn ignore(mut self) -> Self {
        self.conflict.action = ConflictAction::Ignore;
        self
    }

    /// Overwrite the existing row with the proposed values, except the id and
    /// immutable fields.
    #[must_use]
    pub fn update_new_values(self) -> Self {
        self.update_new_values_except(&[])
    }

    /// As [`Self::update_new_values`], also leaving `columns` untouched.
    #[must_use]
    pub fn update_new_values_except(mut self, columns: &[&'static str]) -> Self {
        self.conflict.action = ConflictAction::UpdateNewValues {
            except: columns.to_vec(),
        };
        self
    }

    /// Choose the resolution of each column with `f`.
    #[must_use]
    pub fn update(mut self, f: impl FnOnce(&mut UpsertSet)) -> Self {
        let mut set = UpsertSet::default();
        f(&mut set);
        self.conflict.action = ConflictAction::Custom(set.resolutions);
        self
    }

    /// Run the upsert.
    ///
    /// # Errors
    ///
    /// Returns a validation error from any builder, or the driver's error.
    pub async fn exec(self, client: &Client) -> Result<()> {
        create_all(client, self.builders, Some(self.conflict)).await?;
        Ok(())
    }

    /// Run the upsert and return the id of the inserted or updated row.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unsupported`] on `MySQL`, which cannot report the id
    /// of a row touched by `ON DUPLICATE KEY UPDATE`, and [`Error::NotFound`]
    /// when the conflict was ignored and no row was returned.
    pub async fn id(self, client: &Client) -> Result<E::Id> {
        if client.dialect() == Dialect::MySql {
            return Err(Error::Unsupported(
                "upsert ID retrieval is not supported by MySQL driver, use exec instead"
                    .to_string(),
            ));
        }
        match create_all(client, self.builders, Some(self.conflict)).await? {
            Outcome::Rows(rows) => {
                rows.first().map(first_value).ok_or_else(|| Error::not_found(E::NAME))?
            }
            Outcome::Affected(_) => Err(Error::not_found(E::NAME)),
        }
    }
}
