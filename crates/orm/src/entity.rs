use std::collections::BTreeMap;
use std::fmt::Debug;

use sea_query::Value;
use strata_sql::{DataType, Row};

use crate::error::{Error, Result};
use crate::id::EntityId;

/// Declares an entity: the row struct plus its [`Entity`] implementation.
///
/// The struct always starts with `id` and ends with the `edges` container and
/// the `selected_values` side-map; the declared fields sit in between and map
/// one-to-one onto table columns.
///
/// # Examples
///
/// ```ignore
/// entity! {
///     table = "environments",
///     name = "Environment",
///     id = ObjectId,
///     edges = EnvironmentEdges,
///     #[derive(PartialEq)]
///     pub struct Environment {
///         pub name: String,
///         pub project_id: ObjectId,
///         pub labels: Json<BTreeMap<String, String>>,
///         pub create_time: Option<DateTime<Utc>>,
///     }
/// }
/// ```
#[macro_export]
macro_rules! entity {
    (
        table = $table:literal,
        name = $name:literal,
        id = $id_type:ty,
        edges = $edges:ty,
        $(#[$meta:meta])*
        pub struct $struct_name:ident {
            $(
                $(#[$field_meta:meta])*
                pub $field_name:ident : $field_type:ty
            ),* $(,)?
        }
    ) => {
        #[allow(missing_docs)]
        #[derive(Debug, Clone, Default)]
        $(#[$meta])*
        pub struct $struct_name {
            pub id: $id_type,
            $(
                $(#[$field_meta])*
                pub $field_name : $field_type,
            )*
            pub edges: $edges,
            pub selected_values: $crate::SelectValues,
        }

        impl $crate::Entity for $struct_name {
            type Id = $id_type;

            const TABLE: &'static str = $table;
            const NAME: &'static str = $name;

            fn columns() -> &'static [&'static str] {
                &["id", $( stringify!($field_name) ),*]
            }

            fn id(&self) -> &Self::Id {
                &self.id
            }

            fn from_id(id: Self::Id) -> Self {
                Self {
                    id,
                    ..Self::default()
                }
            }

            fn assign(&mut self, column: &str, value: &$crate::DataType) -> anyhow::Result<bool> {
                match column {
                    "id" => self.id = $crate::codec::decode(value)?,
                    $(
                        stringify!($field_name) => self.$field_name = $crate::codec::decode(value)?,
                    )*
                    _ => return Ok(false),
                }
                Ok(true)
            }

            fn to_values(&self) -> Vec<(&'static str, $crate::__private::Value)> {
                vec![
                    ("id", self.id.clone().into()),
                    $(
                        (stringify!($field_name), self.$field_name.clone().into()),
                    )*
                ]
            }

            fn selected_values(&self) -> &$crate::SelectValues {
                &self.selected_values
            }

            fn selected_values_mut(&mut self) -> &mut $crate::SelectValues {
                &mut self.selected_values
            }
        }
    };
}

/// Values of dynamically selected columns that have no entity field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectValues(BTreeMap<String, DataType>);

impl SelectValues {
    /// Returns the value selected under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&DataType> {
        self.0.get(name)
    }

    /// Stores a dynamically selected value.
    pub fn insert(&mut self, name: impl Into<String>, value: DataType) {
        self.0.insert(name.into(), value);
    }

    /// Returns `true` when nothing was selected dynamically.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Trait for database entities with the metadata needed for query building
/// and row mapping.
///
/// Typically implemented via the `entity!` macro rather than manually.
pub trait Entity: Debug + Default + Clone + Send + Sync + 'static {
    /// Primary-key type.
    type Id: EntityId;

    /// The database table name for this entity.
    const TABLE: &'static str;

    /// Display name used in error messages (e.g. `Environment`).
    const NAME: &'static str;

    /// Table columns, primary key first.
    fn columns() -> &'static [&'static str];

    /// The primary key.
    fn id(&self) -> &Self::Id;

    /// An otherwise empty entity carrying only `id`.
    fn from_id(id: Self::Id) -> Self;

    /// Assign a single column value. Returns `false` when the column is not a
    /// field of this entity.
    ///
    /// # Errors
    ///
    /// Returns an error when the value cannot be decoded into the field type.
    fn assign(&mut self, column: &str, value: &DataType) -> anyhow::Result<bool>;

    /// All column values, primary key first.
    fn to_values(&self) -> Vec<(&'static str, Value)>;

    /// Dynamically selected values.
    fn selected_values(&self) -> &SelectValues;

    /// Mutable access to dynamically selected values.
    fn selected_values_mut(&mut self) -> &mut SelectValues;

    /// Returns a dynamically selected value by name.
    #[must_use]
    fn value(&self, name: &str) -> Option<&DataType> {
        self.selected_values().get(name)
    }

    /// Construct an entity instance from a database row.
    ///
    /// `requested` lists the columns the statement projected, in order. When
    /// `dynamic` is set, columns without a matching field are kept in the
    /// selected-values side-map instead of being rejected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Codec`] when the row does not carry exactly the
    /// requested columns, when a column is unknown, or when a value cannot be
    /// decoded.
    fn from_row(row: &Row, requested: &[&str], dynamic: bool) -> Result<Self> {
        if row.fields.len() != requested.len() {
            return Err(Error::Codec(format!(
                "mismatch number of scan values: {} != {}",
                row.fields.len(),
                requested.len()
            )));
        }

        let mut entity = Self::default();
        for field in &row.fields {
            let known = entity
                .assign(&field.name, &field.value)
                .map_err(|e| Error::Codec(format!("{}.{}: {e}", Self::NAME, field.name)))?;
            if known {
                continue;
            }
            if !dynamic {
                return Err(Error::Codec(format!(
                    "unexpected column {:?} for type {}",
                    field.name,
                    Self::NAME
                )));
            }
            entity.selected_values_mut().insert(field.name.clone(), field.value.clone());
        }

        Ok(entity)
    }
}
