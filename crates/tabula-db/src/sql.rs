//! SQL fragment builder.
//!
//! Everything here is pure string construction: quoting, the condition key
//! syntax, where clauses, simple selects, and the LIMIT / ORDER BY rewriting
//! used by the fetch helpers. Nothing in this module needs a connection.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::value::{is_int_like, raw_text, truthy, Row, Value};

static LIMIT_ONE_SKIP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s*show|limit\s*[0-9]+(,\s*[0-9]+)?").expect("valid regex")
});
static TRAILING_LIMIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\sLIMIT\s+([0-9,]+( [0-9,]+)?)\s*$").expect("valid regex")
});
static TRAILING_ORDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\sORDER BY[\t ]+([^\n]+)\s*$").expect("valid regex")
});
static FROM_KEYWORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\sFROM\s").expect("valid regex"));
static PARENTHESISED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\([^)]*\)").expect("valid regex"));
static TYPE_LIMIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(([0-9,\s]+)\)").expect("valid regex"));

/// Escapes a value as an SQL literal.
///
/// Strings are single-quoted with embedded quotes doubled. Numbers are
/// emitted bare, booleans as `1`/`0`, and arrays/objects as quoted JSON.
pub fn quote(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => String::from(if *b { "1" } else { "0" }),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote_str(s),
        other => quote_str(&other.to_string()),
    }
}

fn quote_str(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Double-quotes an identifier so it cannot be mistaken for a keyword.
///
/// With `separation`, dotted names are quoted per segment:
/// `user.id` becomes `"user"."id"`.
pub fn quote_identity(identity: &str, separation: bool) -> String {
    let escaped = identity.replace('"', "\"\"");
    if separation && escaped.contains('.') {
        format!("\"{}\"", escaped.split('.').collect::<Vec<_>>().join("\".\""))
    } else {
        format!("\"{escaped}\"")
    }
}

/// Where a formatted pair ends up; null comparisons only become `is null`
/// in a where clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatContext {
    /// `WHERE` clause, pairs joined with `AND`.
    Where,
    /// `SET` list of an update, pairs joined with `,`.
    Update,
}

#[derive(Debug, Clone, PartialEq)]
enum Entry {
    Keyed(String, Value),
    Positional(String),
}

/// Ordered key/value pairs using the condition key syntax.
///
/// See the crate docs for the key forms.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conditions {
    entries: Vec<Entry>,
}

impl Conditions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a keyed pair, builder style.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(key, value);
        self
    }

    /// Adds a verbatim line, builder style.
    pub fn raw(mut self, sql: impl Into<String>) -> Self {
        self.entries.push(Entry::Positional(sql.into()));
        self
    }

    /// Adds a keyed pair. An existing pair with the same key is replaced in
    /// place.
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        for entry in &mut self.entries {
            if let Entry::Keyed(existing, slot) = entry {
                if *existing == key {
                    *slot = value;
                    return;
                }
            }
        }
        self.entries.push(Entry::Keyed(key, value));
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Value of a keyed pair, matched on the literal key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find_map(|entry| match entry {
            Entry::Keyed(k, v) if k == key => Some(v),
            _ => None,
        })
    }

    /// Pairs of `other` are added, replacing pairs with the same key.
    pub fn merge(mut self, other: Conditions) -> Self {
        for entry in other.entries {
            match entry {
                Entry::Keyed(k, v) => self.push(k, v),
                positional => self.entries.push(positional),
            }
        }
        self
    }

    /// Keyed pairs as a row, for inserting what was used as a filter.
    pub fn to_row(&self) -> Row {
        self.entries
            .iter()
            .filter_map(|entry| match entry {
                Entry::Keyed(k, v) => Some((k.clone(), v.clone())),
                Entry::Positional(_) => None,
            })
            .collect()
    }
}

impl From<Row> for Conditions {
    fn from(row: Row) -> Self {
        Self {
            entries: row.into_iter().map(|(k, v)| Entry::Keyed(k, v)).collect(),
        }
    }
}

impl From<&Row> for Conditions {
    fn from(row: &Row) -> Self {
        Self::from(row.clone())
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Conditions {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut conditions = Self::new();
        for (k, v) in iter {
            conditions.push(k, v);
        }
        conditions
    }
}

impl<K: Into<String>, V: Into<Value>, const N: usize> From<[(K, V); N]> for Conditions {
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

/// Formats one field/value pair, returning `None` for a skipped optional
/// pair.
pub fn format_field(field: &str, value: &Value, context: FormatContext) -> Option<String> {
    if field.starts_with('"') {
        return Some(raw_text(value));
    }

    let mut field = field;
    if let Some(rest) = field.strip_prefix('?') {
        if !truthy(value) {
            return None;
        }
        field = rest;
    }

    let (field, mut equator) = match field.split_once('?') {
        Some((name, op)) => (name.trim(), op.trim()),
        None => (field, "="),
    };

    let (field, rendered) = if let Some(unescaped) = field.strip_prefix(':') {
        if value.is_null() || value.as_str() == Some("null") {
            equator = null_equator(equator, context);
            (unescaped, "null".to_string())
        } else {
            (unescaped, raw_text(value))
        }
    } else if value.is_null() {
        equator = null_equator(equator, context);
        (field, "null".to_string())
    } else {
        (field, quote(value))
    };

    Some(format!(
        "{} {} {}",
        quote_identity(field, true),
        equator,
        rendered
    ))
}

fn null_equator(equator: &str, context: FormatContext) -> &str {
    if context == FormatContext::Where && equator == "=" {
        "is"
    } else {
        equator
    }
}

/// Formats every pair of `conditions`, dropping skipped optional pairs.
pub fn ktvf(conditions: &Conditions, context: FormatContext) -> Vec<String> {
    conditions
        .entries
        .iter()
        .filter_map(|entry| match entry {
            Entry::Positional(sql) => Some(sql.clone()),
            Entry::Keyed(key, value) => format_field(key, value, context),
        })
        .collect()
}

/// Splits a row into quoted column names and rendered values for inserts.
///
/// `:`-prefixed keys take their value unescaped.
pub fn kvp(row: &Row) -> (Vec<String>, Vec<String>) {
    let mut keys = Vec::with_capacity(row.len());
    let mut values = Vec::with_capacity(row.len());
    for (key, value) in row {
        let (key, rendered) = match key.strip_prefix(':') {
            Some(unescaped) => (unescaped, raw_text(value)),
            None => (key.as_str(), quote(value)),
        };
        keys.push(quote_identity(key, false));
        values.push(rendered);
    }
    (keys, values)
}

/// Column list and `VALUES` tuple of a single-row insert.
pub fn kvf(row: &Row) -> String {
    let (keys, values) = kvp(row);
    format!(" ({})\t\nVALUES ({}) ", keys.join(","), values.join(","))
}

/// A where clause in any of its accepted forms.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Where {
    /// No clause.
    #[default]
    None,
    /// Verbatim SQL, e.g. `bob = 'sue'`.
    Raw(String),
    /// A bare identifier, matched against the `id` column.
    Id(Value),
    /// Key/value pairs joined with `AND`.
    Fields(Conditions),
}

impl Where {
    /// Interprets a string: empty is no clause, a string without any of
    /// ` =<>` is an id, anything else is raw SQL.
    pub fn parse(text: &str) -> Self {
        if text.is_empty() {
            Self::None
        } else if !text.contains([' ', '=', '<', '>']) {
            Self::Id(Value::String(text.to_string()))
        } else {
            Self::Raw(text.to_string())
        }
    }

    /// The condition text without the `WHERE` keyword, or `None` when the
    /// clause is empty.
    pub fn condition(&self) -> Option<String> {
        match self {
            Self::None => None,
            Self::Raw(sql) if sql.is_empty() => None,
            Self::Raw(sql) => Some(sql.clone()),
            Self::Id(value) if !truthy(value) => None,
            Self::Id(value) => {
                let rendered = if is_int_like(value) {
                    raw_text(value)
                } else {
                    quote(value)
                };
                Some(format!("id = {rendered}"))
            }
            Self::Fields(conditions) => {
                let lines = ktvf(conditions, FormatContext::Where);
                if lines.is_empty() {
                    None
                } else {
                    Some(lines.join("\n\tAND "))
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.condition().is_none()
    }

    /// `\nWHERE …`, or an empty string.
    pub fn render(&self) -> String {
        self.condition()
            .map(|condition| format!("\nWHERE {condition}"))
            .unwrap_or_default()
    }
}

impl fmt::Display for Where {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.condition() {
            Some(condition) => f.write_str(&condition),
            None => f.write_str("(none)"),
        }
    }
}

impl From<&str> for Where {
    fn from(text: &str) -> Self {
        Self::parse(text)
    }
}

impl From<String> for Where {
    fn from(text: String) -> Self {
        Self::parse(&text)
    }
}

impl From<i64> for Where {
    fn from(id: i64) -> Self {
        Self::Id(Value::from(id))
    }
}

impl From<i32> for Where {
    fn from(id: i32) -> Self {
        Self::Id(Value::from(id))
    }
}

impl From<u64> for Where {
    fn from(id: u64) -> Self {
        Self::Id(Value::from(id))
    }
}

impl From<Conditions> for Where {
    fn from(conditions: Conditions) -> Self {
        Self::Fields(conditions)
    }
}

impl From<Row> for Where {
    fn from(row: Row) -> Self {
        Self::Fields(row.into())
    }
}

impl From<Value> for Where {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::None,
            Value::String(s) => Self::parse(&s),
            Value::Object(map) => Self::Fields(map.into()),
            other => Self::Id(other),
        }
    }
}

impl<T: Into<Where>> From<Option<T>> for Where {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or_default()
    }
}

/// The `SET` part of an upsert.
#[derive(Debug, Clone, PartialEq)]
pub enum Assignments {
    Fields(Conditions),
    Raw(String),
}

impl Assignments {
    pub fn render(&self) -> String {
        match self {
            Self::Fields(conditions) => ktvf(conditions, FormatContext::Update).join(", "),
            Self::Raw(sql) => sql.clone(),
        }
    }
}

impl From<Conditions> for Assignments {
    fn from(conditions: Conditions) -> Self {
        Self::Fields(conditions)
    }
}

impl From<&str> for Assignments {
    fn from(sql: &str) -> Self {
        Self::Raw(sql.to_string())
    }
}

impl From<String> for Assignments {
    fn from(sql: String) -> Self {
        Self::Raw(sql)
    }
}

/// What a select reads from.
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    Table(String),
    Tables(Vec<String>),
    /// A from statement, e.g. a join; used verbatim.
    Raw(String),
}

impl Source {
    fn render(&self) -> String {
        match self {
            Self::Table(table) => format!("\"{table}\""),
            Self::Tables(tables) => format!("\"{}\"", tables.join("\", \"")),
            Self::Raw(sql) => sql.clone(),
        }
    }
}

/// Selected columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Columns {
    #[default]
    All,
    /// Verbatim column text, e.g. `count(*)` or `id, name`.
    Raw(String),
    /// Column names, each quoted.
    List(Vec<String>),
}

impl Columns {
    fn render(&self) -> String {
        match self {
            Self::All => "*".to_string(),
            Self::Raw(sql) if sql.is_empty() => "*".to_string(),
            Self::Raw(sql) => sql.clone(),
            Self::List(columns) if columns.is_empty() => "*".to_string(),
            Self::List(columns) => columns
                .iter()
                .map(|column| quote_identity(column, true))
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

/// A simple `SELECT` statement.
///
/// ```rust,ignore
/// let sql = Select::from("user")
///     .filter(Conditions::new().with("id?>", 20))
///     .columns("name")
///     .order("name desc")
///     .limit(10)
///     .to_sql();
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    source: Source,
    filter: Where,
    columns: Columns,
    order: Vec<String>,
    limit: Option<String>,
}

impl Select {
    /// Selects from a table, or from a verbatim from statement when the
    /// text contains a space.
    pub fn from(source: impl Into<String>) -> Self {
        let source = source.into();
        let source = if source.contains(' ') {
            Source::Raw(source)
        } else {
            Source::Table(source)
        };
        Self::from_source(source)
    }

    pub fn from_tables<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_source(Source::Tables(tables.into_iter().map(Into::into).collect()))
    }

    pub fn from_source(source: Source) -> Self {
        Self {
            source,
            filter: Where::None,
            columns: Columns::All,
            order: Vec::new(),
            limit: None,
        }
    }

    pub fn filter(mut self, filter: impl Into<Where>) -> Self {
        self.filter = filter.into();
        self
    }

    /// Verbatim column text.
    pub fn columns(mut self, columns: impl Into<String>) -> Self {
        self.columns = Columns::Raw(columns.into());
        self
    }

    /// Column names, quoted on render.
    pub fn column_list<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = Columns::List(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Comma separated `column [direction]` parts.
    pub fn order(self, order: &str) -> Self {
        self.order_by(order.split(','))
    }

    pub fn order_by<I, S>(mut self, parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.order = parts
            .into_iter()
            .map(Into::into)
            .map(|part: String| part.trim().to_string())
            .filter(|part| !part.is_empty())
            .collect();
        self
    }

    pub fn limit(mut self, limit: impl fmt::Display) -> Self {
        self.limit = Some(limit.to_string());
        self
    }

    pub fn to_sql(&self) -> String {
        let mut sql = format!(
            "SELECT {}\nFROM {}{}",
            self.columns.render(),
            self.source.render(),
            self.filter.render()
        );
        if !self.order.is_empty() {
            let orders: Vec<String> = self
                .order
                .iter()
                .map(|part| {
                    let mut pieces = part.split(' ').filter(|p| !p.is_empty());
                    let column = pieces.next().unwrap_or_default();
                    let direction = pieces.next().unwrap_or("ASC");
                    format!("{} {}", quote_identity(column, false), direction)
                })
                .collect();
            sql.push_str("\nORDER BY ");
            sql.push_str(&orders.join(","));
        }
        if let Some(limit) = self.limit.as_deref().filter(|limit| !limit.is_empty()) {
            sql.push_str("\nLIMIT ");
            sql.push_str(limit);
        }
        sql
    }
}

impl fmt::Display for Select {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql())
    }
}

/// The statement accepted by every fetch helper.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    /// SQL text. A single word without spaces is a table name and selects
    /// every row of it.
    Sql(String),
    Select(Select),
    /// SQL with positional `?` parameters.
    Prepared(String, Vec<Value>),
}

impl Query {
    pub fn prepared<I>(sql: impl Into<String>, params: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        Self::Prepared(sql.into(), params.into_iter().map(Into::into).collect())
    }

    /// Final SQL text and bound parameters.
    pub fn into_statement(self) -> (String, Vec<Value>) {
        match self {
            Self::Sql(sql) if !sql.contains(' ') => (
                Select::from(sql).filter(Where::Raw("1=1".into())).to_sql(),
                Vec::new(),
            ),
            Self::Sql(sql) => (sql, Vec::new()),
            Self::Select(select) => (select.to_sql(), Vec::new()),
            Self::Prepared(sql, params) => (sql, params),
        }
    }
}

impl From<&str> for Query {
    fn from(sql: &str) -> Self {
        Self::Sql(sql.to_string())
    }
}

impl From<String> for Query {
    fn from(sql: String) -> Self {
        Self::Sql(sql)
    }
}

impl From<&String> for Query {
    fn from(sql: &String) -> Self {
        Self::Sql(sql.clone())
    }
}

impl From<Select> for Query {
    fn from(select: Select) -> Self {
        Self::Select(select)
    }
}

/// `(table, where)` shorthand for `Select::from(table).filter(where)`.
impl<W: Into<Where>> From<(&str, W)> for Query {
    fn from((table, filter): (&str, W)) -> Self {
        Self::Select(Select::from(table).filter(filter))
    }
}

/// Appends `LIMIT 1` unless the statement is a `show` or already limited.
pub fn apply_limit_one(sql: &str) -> String {
    if LIMIT_ONE_SKIP.is_match(sql) {
        sql.to_string()
    } else {
        format!("{sql}\nLIMIT 1")
    }
}

/// Replaces any trailing `LIMIT` with `LIMIT <limit>`.
pub fn limit_apply(sql: &str, limit: &str) -> String {
    let stripped = TRAILING_LIMIT.replace(sql, "");
    format!("{stripped}\nLIMIT {limit}")
}

/// Builds the counting statement for a select.
///
/// A trailing `LIMIT` and a trailing single-line `ORDER BY` are removed
/// and the select list is replaced by `COUNT(*)`. With `count_limit`, the
/// count stops at that many rows.
pub fn count_sql(sql: &str, count_limit: Option<u64>) -> String {
    let without_limit = TRAILING_LIMIT.replace(sql, "");
    let without_order = TRAILING_ORDER.replace(&without_limit, "");
    let rest = FROM_KEYWORD
        .splitn(&without_order, 2)
        .last()
        .unwrap_or_default()
        .to_string();
    match count_limit {
        Some(limit) if limit > 0 => format!(
            "SELECT COUNT(*)\n FROM (\nSELECT 1 FROM \n{rest}\nLIMIT {limit}) t "
        ),
        _ => format!("SELECT COUNT(*)\nFROM {rest}"),
    }
}

/// Count statement that wraps the whole select, for statements whose
/// placeholders may sit before `FROM`. A trailing numeric `LIMIT` is
/// dropped first; a placeholder in that `LIMIT` is not supported.
pub fn count_subquery_sql(sql: &str, count_limit: Option<u64>) -> String {
    let inner = TRAILING_LIMIT.replace(sql, "");
    match count_limit {
        Some(limit) if limit > 0 => {
            format!("SELECT COUNT(*)\nFROM (\n{inner}\nLIMIT {limit}\n) t")
        }
        _ => format!("SELECT COUNT(*)\nFROM (\n{inner}\n) t"),
    }
}

/// Portable column type derived from a declared column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Int,
    Decimal,
    Float,
    Datetime,
    Date,
    Timestamp,
    Text,
}

/// Maps a declared type such as `VARCHAR(255)` or `bigint` to a
/// [`ColumnType`]. Unknown types yield `None`.
pub fn parse_column_type(declared: &str) -> Option<ColumnType> {
    let base = PARENTHESISED.replace_all(declared, "").trim().to_lowercase();
    if base.contains("int") {
        Some(ColumnType::Int)
    } else if base.contains("decimal") || base.contains("numeric") {
        Some(ColumnType::Decimal)
    } else if base.contains("float") || base.contains("double") || base.contains("real") {
        Some(ColumnType::Float)
    } else {
        match base.as_str() {
            "datetime" => Some(ColumnType::Datetime),
            "date" => Some(ColumnType::Date),
            "timestamp" => Some(ColumnType::Timestamp),
            "varchar" | "char" | "text" | "clob" => Some(ColumnType::Text),
            _ => None,
        }
    }
}

/// First number inside the parentheses of a declared type:
/// `VARCHAR(255)` → 255, `DECIMAL(10,2)` → 10.
pub fn parse_column_limit(declared: &str) -> Option<i64> {
    TYPE_LIMIT
        .captures(declared)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().split(',').next())
        .and_then(|first| first.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn quotes_strings_and_leaves_numbers_bare() {
        assert_eq!(quote(&json!("o'neil")), "'o''neil'");
        assert_eq!(quote(&json!(42)), "42");
        assert_eq!(quote(&json!(null)), "null");
        assert_eq!(quote(&json!(false)), "0");
        assert_eq!(quote(&json!({"a": 1})), "'{\"a\":1}'");
    }

    #[test]
    fn identities_split_on_dots() {
        assert_eq!(quote_identity("user.id", true), "\"user\".\"id\"");
        assert_eq!(quote_identity("user.id", false), "\"user.id\"");
        assert_eq!(quote_identity("we\"ird", true), "\"we\"\"ird\"");
    }

    #[test]
    fn field_formatter_key_forms() {
        let w = FormatContext::Where;
        assert_eq!(
            format_field("bob", &json!("sue"), w).as_deref(),
            Some("\"bob\" = 'sue'")
        );
        assert_eq!(
            format_field("bob?<>", &json!("sue"), w).as_deref(),
            Some("\"bob\" <> 'sue'")
        );
        assert_eq!(
            format_field("\"", &json!("1=1"), w).as_deref(),
            Some("1=1")
        );
        assert_eq!(format_field("?bob", &json!(""), w), None);
        assert_eq!(
            format_field("?bob", &json!("x"), w).as_deref(),
            Some("\"bob\" = 'x'")
        );
        assert_eq!(
            format_field(":created", &json!("now()"), w).as_deref(),
            Some("\"created\" = now()")
        );
        assert_eq!(
            format_field(":deleted", &json!("null"), w).as_deref(),
            Some("\"deleted\" is null")
        );
        assert_eq!(
            format_field("deleted", &Value::Null, w).as_deref(),
            Some("\"deleted\" is null")
        );
        assert_eq!(
            format_field("deleted?<>", &Value::Null, w).as_deref(),
            Some("\"deleted\" <> null")
        );
        assert_eq!(
            format_field("deleted", &Value::Null, FormatContext::Update).as_deref(),
            Some("\"deleted\" = null")
        );
        assert_eq!(
            format_field("user.id?>", &json!(3), w).as_deref(),
            Some("\"user\".\"id\" > 3")
        );
    }

    #[test]
    fn where_forms() {
        assert_eq!(Where::from("").render(), "");
        assert_eq!(Where::from("fj93").render(), "\nWHERE id = 'fj93'");
        assert_eq!(Where::from("12").render(), "\nWHERE id = 12");
        assert_eq!(Where::from(20).render(), "\nWHERE id = 20");
        assert_eq!(Where::from(0).render(), "");
        assert_eq!(
            Where::from("bob = 'sue'").render(),
            "\nWHERE bob = 'sue'"
        );
        let fields = Conditions::new()
            .with("name", "bob")
            .with("?age", 0)
            .raw("1=1");
        assert_eq!(
            Where::from(fields).render(),
            "\nWHERE \"name\" = 'bob'\n\tAND 1=1"
        );
        assert!(Where::from(Conditions::new().with("?a", "")).is_empty());
    }

    #[test]
    fn conditions_push_replaces_and_merge_overrides() {
        let merged = Conditions::new()
            .with("a", 1)
            .with("b", 2)
            .merge(Conditions::new().with("b", 3).with("c", 4));
        assert_eq!(merged.len(), 3);
        assert_eq!(merged.get("b"), Some(&json!(3)));
        let row = merged.to_row();
        assert_eq!(row.keys().collect::<Vec<_>>(), ["a", "b", "c"]);
    }

    #[test]
    fn insert_fragments() {
        let row = crate::row([
            ("name", json!("bob")),
            (":created", json!("CURRENT_TIMESTAMP")),
            ("note", Value::Null),
        ]);
        assert_eq!(
            kvf(&row),
            " (\"name\",\"created\",\"note\")\t\nVALUES ('bob',CURRENT_TIMESTAMP,null) "
        );
    }

    #[test]
    fn select_rendering() {
        let sql = Select::from("user")
            .filter(Conditions::new().with("id?>", 20))
            .column_list(["id", "user.name"])
            .order("name desc, id")
            .limit(5)
            .to_sql();
        assert_eq!(
            sql,
            "SELECT \"id\", \"user\".\"name\"\nFROM \"user\"\nWHERE \"id\" > 20\nORDER BY \"name\" desc,\"id\" ASC\nLIMIT 5"
        );

        let joined = Select::from("user u join role r on r.user_id = u.id").to_sql();
        assert_eq!(
            joined,
            "SELECT *\nFROM user u join role r on r.user_id = u.id"
        );

        let multi = Select::from_tables(["a", "b"]).columns("count(*)").to_sql();
        assert_eq!(multi, "SELECT count(*)\nFROM \"a\", \"b\"");
    }

    #[test]
    fn single_word_query_selects_whole_table() {
        let (sql, params) = Query::from("user").into_statement();
        assert_eq!(sql, "SELECT *\nFROM \"user\"\nWHERE 1=1");
        assert!(params.is_empty());

        let (sql, _) = Query::from(("user", 7)).into_statement();
        assert_eq!(sql, "SELECT *\nFROM \"user\"\nWHERE id = 7");
    }

    #[test]
    fn limit_one_is_added_only_when_missing() {
        assert_eq!(apply_limit_one("select 1"), "select 1\nLIMIT 1");
        assert_eq!(apply_limit_one("select 1 limit 3"), "select 1 limit 3");
        assert_eq!(apply_limit_one("select 1 LIMIT 3, 4"), "select 1 LIMIT 3, 4");
        assert_eq!(apply_limit_one("SHOW tables"), "SHOW tables");
    }

    #[test]
    fn limit_apply_replaces_trailing_limit() {
        assert_eq!(
            limit_apply("select * from t\nLIMIT 5", "10, 5"),
            "select * from t\nLIMIT 10, 5"
        );
        assert_eq!(limit_apply("select * from t", "0, 5"), "select * from t\nLIMIT 0, 5");
    }

    #[test]
    fn count_sql_strips_order_and_limit() {
        let sql = "SELECT id, name\nFROM \"user\"\nWHERE \"id\" > 2\nORDER BY \"name\" ASC\nLIMIT 10";
        assert_eq!(
            count_sql(sql, None),
            "SELECT COUNT(*)\nFROM \"user\"\nWHERE \"id\" > 2"
        );
        assert_eq!(
            count_sql(sql, Some(50)),
            "SELECT COUNT(*)\n FROM (\nSELECT 1 FROM \n\"user\"\nWHERE \"id\" > 2\nLIMIT 50) t "
        );
    }

    #[test]
    fn count_subquery_keeps_select_list_placeholders() {
        let sql = "select name, ? as tag from user where age > ?\nLIMIT 2";
        assert_eq!(
            count_subquery_sql(sql, None),
            "SELECT COUNT(*)\nFROM (\nselect name, ? as tag from user where age > ?\n) t"
        );
        assert_eq!(
            count_subquery_sql(sql, Some(5)),
            "SELECT COUNT(*)\nFROM (\nselect name, ? as tag from user where age > ?\nLIMIT 5\n) t"
        );
    }

    #[test]
    fn column_types() {
        assert_eq!(parse_column_type("BIGINT(20)"), Some(ColumnType::Int));
        assert_eq!(parse_column_type("INTEGER"), Some(ColumnType::Int));
        assert_eq!(parse_column_type("decimal(10,2)"), Some(ColumnType::Decimal));
        assert_eq!(parse_column_type("REAL"), Some(ColumnType::Float));
        assert_eq!(parse_column_type("VARCHAR(255)"), Some(ColumnType::Text));
        assert_eq!(parse_column_type("datetime"), Some(ColumnType::Datetime));
        assert_eq!(parse_column_type("BLOB"), None);
        assert_eq!(parse_column_limit("VARCHAR(255)"), Some(255));
        assert_eq!(parse_column_limit("decimal(10,2)"), Some(10));
        assert_eq!(parse_column_limit("TEXT"), None);
    }
}
