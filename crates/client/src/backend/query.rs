//! Typed row queries for the table backend.
//!
//! These builders describe what a repository wants from a table; each
//! backend decides how to execute them. The Supabase client renders them
//! as PostgREST query parameters, the in-memory backend evaluates them
//! directly over JSON rows.

use serde_json::{Map, Value};

/// A single table row as returned by the backend.
pub type Row = Map<String, Value>;

/// Row filter.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `column = value`
    Eq(String, Value),
    /// `column IN (values...)`
    In(String, Vec<Value>),
}

impl Filter {
    /// Column this filter applies to.
    #[must_use]
    pub fn column(&self) -> &str {
        match self {
            Self::Eq(column, _) | Self::In(column, _) => column,
        }
    }

    /// Render as a PostgREST `(key, value)` query pair.
    #[must_use]
    pub fn to_query_pair(&self) -> (String, String) {
        match self {
            Self::Eq(column, value) => (column.clone(), format!("eq.{}", render_value(value))),
            Self::In(column, values) => {
                let list = values
                    .iter()
                    .map(|v| quote_list_item(&render_value(v)))
                    .collect::<Vec<_>>()
                    .join(",");
                (column.clone(), format!("in.({list})"))
            }
        }
    }

    /// Whether a row satisfies this filter.
    #[must_use]
    pub fn matches(&self, row: &Row) -> bool {
        let Some(actual) = row.get(self.column()) else {
            return false;
        };
        match self {
            Self::Eq(_, expected) => values_equal(actual, expected),
            Self::In(_, expected) => expected.iter().any(|v| values_equal(actual, v)),
        }
    }
}

/// An embedded resource pulled in through a foreign key.
///
/// Renders as `alias:foreign_key(col1,col2)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Embed {
    /// Key under which the embedded object appears in the row.
    pub alias: String,
    /// Table the foreign key points at.
    pub table: String,
    /// Column on the outer row holding the referenced `id`.
    pub foreign_key: String,
    /// Columns to pull from the embedded table.
    pub columns: Vec<String>,
}

impl Embed {
    /// Describe an embedded resource.
    #[must_use]
    pub fn new(alias: &str, table: &str, foreign_key: &str, columns: &[&str]) -> Self {
        Self {
            alias: alias.to_string(),
            table: table.to_string(),
            foreign_key: foreign_key.to_string(),
            columns: columns.iter().map(ToString::to_string).collect(),
        }
    }

    fn render(&self) -> String {
        format!(
            "{}:{}({})",
            self.alias,
            self.foreign_key,
            self.columns.join(",")
        )
    }
}

/// Column projection: plain columns plus embedded resources.
///
/// An empty column list selects every column (`*`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Projection {
    /// Plain columns.
    pub columns: Vec<String>,
    /// Embedded resources.
    pub embeds: Vec<Embed>,
}

impl Projection {
    /// Select every column.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Select the named columns.
    #[must_use]
    pub fn columns(columns: &[&str]) -> Self {
        Self {
            columns: columns.iter().map(ToString::to_string).collect(),
            embeds: Vec::new(),
        }
    }

    /// Add an embedded resource.
    #[must_use]
    pub fn embed(mut self, embed: Embed) -> Self {
        self.embeds.push(embed);
        self
    }

    /// Render as a PostgREST `select` parameter.
    #[must_use]
    pub fn render(&self) -> String {
        let mut parts: Vec<String> = if self.columns.is_empty() {
            vec!["*".to_string()]
        } else {
            self.columns.clone()
        };
        parts.extend(self.embeds.iter().map(Embed::render));
        parts.join(",")
    }
}

/// Sort order on a single column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    /// Column to sort by.
    pub column: String,
    /// Ascending when true, descending otherwise.
    pub ascending: bool,
}

/// A filtered, ordered, optionally limited row query.
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    /// Table to read from.
    pub table: String,
    /// Columns and embeds to return.
    pub projection: Projection,
    /// Conjunction of filters.
    pub filters: Vec<Filter>,
    /// Optional ordering.
    pub order: Option<Order>,
    /// Optional row limit.
    pub limit: Option<usize>,
}

impl Select {
    /// Start a query selecting every column of `table`.
    #[must_use]
    pub fn from(table: &str) -> Self {
        Self {
            table: table.to_string(),
            projection: Projection::all(),
            filters: Vec::new(),
            order: None,
            limit: None,
        }
    }

    /// Replace the projection.
    #[must_use]
    pub fn project(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }

    /// Add an equality filter.
    #[must_use]
    pub fn eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq(column.to_string(), value.into()));
        self
    }

    /// Order by a column.
    #[must_use]
    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        self.order = Some(Order {
            column: column.to_string(),
            ascending,
        });
        self
    }

    /// Limit the number of returned rows.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Insert one or more rows and return them with the given projection.
#[derive(Debug, Clone, PartialEq)]
pub struct Insert {
    /// Target table.
    pub table: String,
    /// Rows to insert.
    pub rows: Vec<Row>,
    /// Shape of the returned rows.
    pub returning: Projection,
}

impl Insert {
    /// Insert a single row.
    #[must_use]
    pub fn one(table: &str, row: Row) -> Self {
        Self {
            table: table.to_string(),
            rows: vec![row],
            returning: Projection::all(),
        }
    }

    /// Set the returned projection.
    #[must_use]
    pub fn returning(mut self, projection: Projection) -> Self {
        self.returning = projection;
        self
    }
}

/// Partial update of matching rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    /// Target table.
    pub table: String,
    /// Columns to overwrite.
    pub patch: Row,
    /// Conjunction of filters selecting the rows.
    pub filters: Vec<Filter>,
}

impl Update {
    /// Update rows of `table` with `patch`.
    #[must_use]
    pub fn table(table: &str, patch: Row) -> Self {
        Self {
            table: table.to_string(),
            patch,
            filters: Vec::new(),
        }
    }

    /// Add an equality filter.
    #[must_use]
    pub fn eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq(column.to_string(), value.into()));
        self
    }
}

/// Delete matching rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    /// Target table.
    pub table: String,
    /// Conjunction of filters selecting the rows.
    pub filters: Vec<Filter>,
}

impl Delete {
    /// Delete from `table`.
    #[must_use]
    pub fn from(table: &str) -> Self {
        Self {
            table: table.to_string(),
            filters: Vec::new(),
        }
    }

    /// Add an equality filter.
    #[must_use]
    pub fn eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq(column.to_string(), value.into()));
        self
    }

    /// Add a membership filter.
    #[must_use]
    pub fn any_of(mut self, column: &str, values: Vec<Value>) -> Self {
        self.filters.push(Filter::In(column.to_string(), values));
        self
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn quote_list_item(item: &str) -> String {
    if item.contains([',', '(', ')', '"']) {
        format!("\"{}\"", item.replace('"', "\\\""))
    } else {
        item.to_string()
    }
}

/// Compare two JSON values, treating numbers by value.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}
