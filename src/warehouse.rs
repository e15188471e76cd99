use std::collections::HashMap;
use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::PipelineError;

/// One destination row, keyed by column name.
pub type Row = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Text,
    TextArray,
    Json,
}

impl ColumnType {
    /// Widens two observed types to the narrowest type holding both.
    pub fn widen(self, other: ColumnType) -> ColumnType {
        if self == other { self } else { ColumnType::Json }
    }

    /// Infers a column type from one value. Nulls carry no type information.
    pub fn infer(value: &Value) -> Option<ColumnType> {
        match value {
            Value::Null => None,
            Value::String(_) => Some(ColumnType::Text),
            Value::Array(items) if items.iter().all(Value::is_string) => {
                Some(ColumnType::TextArray)
            }
            _ => Some(ColumnType::Json),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: ColumnType,
    pub nullable: bool,
}

/// Informational foreign-key-style linkage metadata. Recorded with the table
/// schema for downstream query planners; never enforced on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableReference {
    pub referenced_table: String,
    pub columns: Vec<String>,
    pub referenced_columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub primary_key: String,
    pub columns: Vec<ColumnDef>,
    #[serde(default)]
    pub references: Vec<TableReference>,
}

impl TableSchema {
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|column| column.name == name)
    }
}

/// Destination seam. Anything with named tables, primary-key upsert, and
/// additive schema changes can sit behind this; schema diffing itself is the
/// load coordinator's job.
pub trait Warehouse {
    fn schema(&self, table: &str) -> Result<Option<TableSchema>, PipelineError>;
    fn create_table(&self, schema: &TableSchema) -> Result<(), PipelineError>;
    fn update_schema(&self, schema: &TableSchema) -> Result<(), PipelineError>;
    /// Upserts by the table's declared primary key; replaced rows keep their
    /// position, new rows append in batch order. Returns rows written.
    fn merge_rows(&self, table: &str, rows: Vec<Row>) -> Result<usize, PipelineError>;
    fn append_rows(&self, table: &str, rows: Vec<Row>) -> Result<usize, PipelineError>;
    fn truncate(&self, table: &str) -> Result<(), PipelineError>;
    fn row_count(&self, table: &str) -> Result<usize, PipelineError>;
    fn table_names(&self) -> Result<Vec<String>, PipelineError>;
}

/// File-backed warehouse: one directory per table under the dataset root,
/// holding `schema.json` and `rows.json`. Every write lands atomically via a
/// sibling temp file.
#[derive(Debug, Clone)]
pub struct JsonWarehouse {
    root: Utf8PathBuf,
}

impl JsonWarehouse {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn ensure_root(&self) -> Result<(), PipelineError> {
        fs::create_dir_all(self.root.as_std_path())
            .map_err(|err| PipelineError::Filesystem(err.to_string()))
    }

    /// Drops the whole dataset directory.
    pub fn clear(&self) -> Result<(), PipelineError> {
        if self.root.as_std_path().exists() {
            fs::remove_dir_all(self.root.as_std_path())
                .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
        }
        Ok(())
    }

    fn table_dir(&self, table: &str) -> Utf8PathBuf {
        self.root.join(table)
    }

    fn schema_path(&self, table: &str) -> Utf8PathBuf {
        self.table_dir(table).join("schema.json")
    }

    fn rows_path(&self, table: &str) -> Utf8PathBuf {
        self.table_dir(table).join("rows.json")
    }

    fn load_rows(&self, table: &str) -> Result<Vec<Row>, PipelineError> {
        let path = self.rows_path(table);
        if !path.as_std_path().exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
        serde_json::from_str(&content)
            .map_err(|err| PipelineError::Warehouse(format!("rows of {table}: {err}")))
    }

    fn save_rows(&self, table: &str, rows: &[Row]) -> Result<(), PipelineError> {
        let content = serde_json::to_vec_pretty(rows)
            .map_err(|err| PipelineError::Warehouse(err.to_string()))?;
        write_bytes_atomic(&self.rows_path(table), &content)
    }

    fn save_schema(&self, schema: &TableSchema) -> Result<(), PipelineError> {
        let content = serde_json::to_vec_pretty(schema)
            .map_err(|err| PipelineError::Warehouse(err.to_string()))?;
        write_bytes_atomic(&self.schema_path(&schema.name), &content)
    }

    fn require_schema(&self, table: &str) -> Result<TableSchema, PipelineError> {
        self.schema(table)?
            .ok_or_else(|| PipelineError::TableNotFound(table.to_string()))
    }
}

impl Warehouse for JsonWarehouse {
    fn schema(&self, table: &str) -> Result<Option<TableSchema>, PipelineError> {
        let path = self.schema_path(table);
        if !path.as_std_path().exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
        let schema = serde_json::from_str(&content)
            .map_err(|err| PipelineError::Warehouse(format!("schema of {table}: {err}")))?;
        Ok(Some(schema))
    }

    fn create_table(&self, schema: &TableSchema) -> Result<(), PipelineError> {
        self.ensure_root()?;
        self.save_schema(schema)?;
        self.save_rows(&schema.name, &[])
    }

    fn update_schema(&self, schema: &TableSchema) -> Result<(), PipelineError> {
        self.require_schema(&schema.name)?;
        self.save_schema(schema)
    }

    fn merge_rows(&self, table: &str, rows: Vec<Row>) -> Result<usize, PipelineError> {
        let schema = self.require_schema(table)?;
        let mut stored = self.load_rows(table)?;

        let mut index = HashMap::with_capacity(stored.len());
        for (position, row) in stored.iter().enumerate() {
            if let Some(key) = row_key(row, &schema.primary_key) {
                index.insert(key, position);
            }
        }

        let written = rows.len();
        for row in rows {
            let Some(key) = row_key(&row, &schema.primary_key) else {
                return Err(PipelineError::LoadFailed {
                    table: table.to_string(),
                    message: format!("merge row without primary key {}", schema.primary_key),
                });
            };
            match index.get(&key) {
                Some(&position) => stored[position] = row,
                None => {
                    index.insert(key, stored.len());
                    stored.push(row);
                }
            }
        }

        self.save_rows(table, &stored)?;
        Ok(written)
    }

    fn append_rows(&self, table: &str, rows: Vec<Row>) -> Result<usize, PipelineError> {
        self.require_schema(table)?;
        let mut stored = self.load_rows(table)?;
        let written = rows.len();
        stored.extend(rows);
        self.save_rows(table, &stored)?;
        Ok(written)
    }

    fn truncate(&self, table: &str) -> Result<(), PipelineError> {
        self.require_schema(table)?;
        self.save_rows(table, &[])
    }

    fn row_count(&self, table: &str) -> Result<usize, PipelineError> {
        self.require_schema(table)?;
        Ok(self.load_rows(table)?.len())
    }

    fn table_names(&self) -> Result<Vec<String>, PipelineError> {
        if !self.root.as_std_path().exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        let entries = fs::read_dir(self.root.as_std_path())
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|err| PipelineError::Filesystem(err.to_string()))?;
            let path = entry.path();
            if path.is_dir() && path.join("schema.json").exists() {
                if let Some(name) = path.file_name().and_then(|name| name.to_str()) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Primary-key cell rendered as a lookup key.
fn row_key(row: &Row, primary_key: &str) -> Option<String> {
    match row.get(primary_key) {
        None | Some(Value::Null) => None,
        Some(Value::String(value)) => Some(value.clone()),
        Some(other) => Some(other.to_string()),
    }
}

fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), PipelineError> {
    let parent = path
        .parent()
        .ok_or_else(|| PipelineError::Filesystem("invalid destination path".to_string()))?;
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
    let mut temp = tempfile::Builder::new()
        .prefix("efo-ingest")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
    temp.write_all(content)
        .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
    if path.as_std_path().exists() {
        fs::remove_file(path.as_std_path())
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
    }
    temp.persist(path.as_std_path())
        .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
    Ok(())
}
