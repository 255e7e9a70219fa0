//! Bulk writes through single JSON-parameterized statements.
//!
//! Instead of binding thousands of parameters or looping per row, each
//! bulk operation serializes its payload to one JSON array, binds it as
//! a single text parameter, and lets `json_each` unpack it inside the
//! engine. One statement, one transaction, no parameter-count limits.
//!
//! Rows are positional arrays matching the column list, so the builders
//! address fields with `json_extract(value, '$[n]')`.

use banter_core::{Result, SqlValue, StorageError};

/// INSERT built over `json_each` of a JSON array of row arrays.
///
/// ```sql
/// INSERT INTO "t" ("a", "b")
/// SELECT json_extract(value, '$[0]'), json_extract(value, '$[1]')
/// FROM json_each(?1)
/// ```
#[must_use]
pub fn insert_sql(table: &str, columns: &[&str]) -> String {
    let column_list = columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    let extracts = (0..columns.len())
        .map(|i| format!("json_extract(value, '$[{i}]')"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {} ({column_list}) SELECT {extracts} FROM json_each(?1)",
        quote_ident(table)
    )
}

/// UPDATE built over `json_each`, keyed by `key_column`.
///
/// Each row array is `[key, col1, col2, ...]`. Rows whose key matches
/// nothing are silently skipped, which is what `WHERE ... IN` gives us.
#[must_use]
pub fn update_sql(table: &str, key_column: &str, columns: &[&str]) -> String {
    let table = quote_ident(table);
    let key = quote_ident(key_column);
    let assignments = columns
        .iter()
        .enumerate()
        .map(|(i, c)| {
            // Offset by one: index 0 holds the key.
            format!(
                "{} = (SELECT json_extract(value, '$[{}]') FROM json_each(?1) \
                 WHERE json_extract(value, '$[0]') = {table}.{key})",
                quote_ident(c),
                i + 1,
            )
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "UPDATE {table} SET {assignments} WHERE {key} IN \
         (SELECT json_extract(value, '$[0]') FROM json_each(?1))"
    )
}

/// DELETE of every row whose key appears in a JSON array of keys.
#[must_use]
pub fn delete_sql(table: &str, key_column: &str) -> String {
    format!(
        "DELETE FROM {} WHERE {} IN (SELECT value FROM json_each(?1))",
        quote_ident(table),
        quote_ident(key_column)
    )
}

/// Serialize rows to the JSON array the builders expect.
///
/// Every row must have exactly `arity` values; a mismatch fails before
/// anything touches the database.
pub fn encode_rows(rows: &[Vec<SqlValue>], arity: usize) -> Result<String> {
    let mut encoded = Vec::with_capacity(rows.len());
    for (index, row) in rows.iter().enumerate() {
        if row.len() != arity {
            return Err(StorageError::operation(format!(
                "bulk row {index} has {} values, expected {arity}",
                row.len()
            )));
        }
        let values = row.iter().map(SqlValue::to_json).collect::<Result<Vec<_>>>()?;
        encoded.push(serde_json::Value::Array(values));
    }
    serde_json::to_string(&serde_json::Value::Array(encoded))
        .map_err(|e| StorageError::operation(format!("encode bulk rows: {e}")))
}

/// Serialize a flat key list to a JSON array.
pub fn encode_keys(keys: &[SqlValue]) -> Result<String> {
    let values = keys.iter().map(SqlValue::to_json).collect::<Result<Vec<_>>>()?;
    serde_json::to_string(&serde_json::Value::Array(values))
        .map_err(|e| StorageError::operation(format!("encode bulk keys: {e}")))
}

/// Quote an identifier with double quotes, doubling embedded quotes.
fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
