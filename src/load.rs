use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::domain::{SchemaContract, WriteDisposition};
use crate::error::PipelineError;
use crate::warehouse::{ColumnDef, ColumnType, Row, TableReference, TableSchema, Warehouse};

/// Persistence rules for one destination table.
#[derive(Debug, Clone)]
pub struct TableContract {
    pub table: String,
    pub primary_key: String,
    pub write_disposition: WriteDisposition,
    pub schema_contract: SchemaContract,
    pub references: Vec<TableReference>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub table: String,
    pub loaded: usize,
    pub failed: usize,
}

impl LoadReport {
    pub fn absorb(&mut self, other: &LoadReport) {
        self.loaded += other.loaded;
        self.failed += other.failed;
    }
}

/// Applies a [`TableContract`] batch by batch: infers the observed column
/// set, diffs it against the destination schema, applies the contract's
/// evolution rules, then writes with the configured disposition. Rows that
/// cannot carry the primary key fail individually; the rest of the batch
/// commits.
pub struct LoadCoordinator<'a, W: Warehouse + ?Sized> {
    warehouse: &'a W,
    contract: TableContract,
    replaced: bool,
}

impl<'a, W: Warehouse + ?Sized> LoadCoordinator<'a, W> {
    pub fn new(warehouse: &'a W, contract: TableContract) -> Self {
        Self {
            warehouse,
            contract,
            replaced: false,
        }
    }

    pub fn contract(&self) -> &TableContract {
        &self.contract
    }

    pub fn load<T: Serialize>(&mut self, records: &[T]) -> Result<LoadReport, PipelineError> {
        let mut rows = to_rows(&self.contract.table, records)?;
        let observed = observe_columns(&rows, &self.contract.primary_key);
        let schema = self.sync_schema(&observed)?;

        if self.contract.schema_contract == SchemaContract::Discard {
            for row in &mut rows {
                row.retain(|name, _| schema.column(name).is_some());
            }
        }

        let mut failed = 0;
        if self.contract.write_disposition == WriteDisposition::Merge {
            let before = rows.len();
            rows.retain(|row| has_key(row, &self.contract.primary_key));
            failed = before - rows.len();
        }

        if !self.contract.references.is_empty() {
            // Linkage is informational; a referenced row may land later in
            // the same run.
            debug!(
                table = %self.contract.table,
                "loading batch with unchecked table references"
            );
        }

        let loaded = match self.contract.write_disposition {
            WriteDisposition::Merge => self.warehouse.merge_rows(&self.contract.table, rows)?,
            WriteDisposition::Replace => {
                if !self.replaced {
                    self.warehouse.truncate(&self.contract.table)?;
                    self.replaced = true;
                }
                self.warehouse.append_rows(&self.contract.table, rows)?
            }
            WriteDisposition::Append => self.warehouse.append_rows(&self.contract.table, rows)?,
        };

        Ok(LoadReport {
            table: self.contract.table.clone(),
            loaded,
            failed,
        })
    }

    /// Brings the destination schema up to date with the observed columns.
    fn sync_schema(&self, observed: &[ColumnDef]) -> Result<TableSchema, PipelineError> {
        let table = &self.contract.table;
        match self.warehouse.schema(table)? {
            None => {
                if self.contract.schema_contract == SchemaContract::Freeze {
                    return Err(PipelineError::LoadFailed {
                        table: table.clone(),
                        message: "schema contract is frozen and table does not exist".to_string(),
                    });
                }
                let mut columns = observed.to_vec();
                if !columns.iter().any(|col| col.name == self.contract.primary_key) {
                    columns.insert(
                        0,
                        ColumnDef {
                            name: self.contract.primary_key.clone(),
                            data_type: ColumnType::Text,
                            nullable: false,
                        },
                    );
                }
                let schema = TableSchema {
                    name: table.clone(),
                    primary_key: self.contract.primary_key.clone(),
                    columns,
                    references: self.contract.references.clone(),
                };
                debug!(table = %table, "creating destination table");
                self.warehouse.create_table(&schema)?;
                Ok(schema)
            }
            Some(mut current) => {
                let mut changed = false;
                for column in observed {
                    match current
                        .columns
                        .iter_mut()
                        .find(|existing| existing.name == column.name)
                    {
                        Some(existing) => {
                            let widened = existing.data_type.widen(column.data_type);
                            if widened != existing.data_type {
                                debug!(
                                    table = %table,
                                    column = %column.name,
                                    "widening column type"
                                );
                                existing.data_type = widened;
                                changed = true;
                            }
                        }
                        None => match self.contract.schema_contract {
                            SchemaContract::Evolve => {
                                debug!(table = %table, column = %column.name, "adding column");
                                current.columns.push(column.clone());
                                changed = true;
                            }
                            SchemaContract::Freeze => {
                                return Err(PipelineError::SchemaFrozen {
                                    table: table.clone(),
                                    column: column.name.clone(),
                                });
                            }
                            SchemaContract::Discard => {}
                        },
                    }
                }
                if changed {
                    self.warehouse.update_schema(&current)?;
                }
                Ok(current)
            }
        }
    }
}

fn to_rows<T: Serialize>(table: &str, records: &[T]) -> Result<Vec<Row>, PipelineError> {
    records
        .iter()
        .map(|record| {
            let value = serde_json::to_value(record).map_err(|err| PipelineError::LoadFailed {
                table: table.to_string(),
                message: err.to_string(),
            })?;
            match value {
                Value::Object(map) => Ok(map),
                other => Err(PipelineError::LoadFailed {
                    table: table.to_string(),
                    message: format!("record is not an object: {other}"),
                }),
            }
        })
        .collect()
}

/// Column set observed across a batch, in order of first appearance. Columns
/// seen only as null default to text; the primary key is never nullable.
fn observe_columns(rows: &[Row], primary_key: &str) -> Vec<ColumnDef> {
    let mut columns: Vec<(String, Option<ColumnType>)> = Vec::new();
    for row in rows {
        for (name, value) in row {
            let inferred = ColumnType::infer(value);
            match columns.iter_mut().find(|(existing, _)| existing == name) {
                Some((_, known)) => {
                    if let Some(inferred) = inferred {
                        let merged = match *known {
                            Some(current) => current.widen(inferred),
                            None => inferred,
                        };
                        *known = Some(merged);
                    }
                }
                None => columns.push((name.clone(), inferred)),
            }
        }
    }
    columns
        .into_iter()
        .map(|(name, data_type)| ColumnDef {
            nullable: name != primary_key,
            data_type: data_type.unwrap_or(ColumnType::Text),
            name,
        })
        .collect()
}

fn has_key(row: &Row, primary_key: &str) -> bool {
    matches!(row.get(primary_key), Some(value) if !value.is_null())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use camino::Utf8PathBuf;
    use serde_json::json;

    use crate::domain::{SchemaContract, WriteDisposition};
    use crate::warehouse::JsonWarehouse;

    use super::*;

    fn warehouse(temp: &tempfile::TempDir) -> JsonWarehouse {
        let root = Utf8PathBuf::from_path_buf(temp.path().join("warehouse")).unwrap();
        JsonWarehouse::new(root)
    }

    fn contract(disposition: WriteDisposition, schema: SchemaContract) -> TableContract {
        TableContract {
            table: "terms".to_string(),
            primary_key: "iri".to_string(),
            write_disposition: disposition,
            schema_contract: schema,
            references: Vec::new(),
        }
    }

    #[test]
    fn first_batch_creates_table_with_observed_columns() {
        let temp = tempfile::tempdir().unwrap();
        let warehouse = warehouse(&temp);
        let mut coordinator = LoadCoordinator::new(
            &warehouse,
            contract(WriteDisposition::Merge, SchemaContract::Evolve),
        );

        let report = coordinator
            .load(&[json!({"iri": "a", "label": "x", "synonyms": ["s"]})])
            .unwrap();
        assert_eq!(report.loaded, 1);
        assert_eq!(report.failed, 0);

        let schema = warehouse.schema("terms").unwrap().unwrap();
        assert_eq!(schema.primary_key, "iri");
        assert_eq!(schema.column("iri").unwrap().data_type, ColumnType::Text);
        assert!(!schema.column("iri").unwrap().nullable);
        assert_eq!(
            schema.column("synonyms").unwrap().data_type,
            ColumnType::TextArray
        );
    }

    #[test]
    fn evolve_adds_new_column_on_later_batch() {
        let temp = tempfile::tempdir().unwrap();
        let warehouse = warehouse(&temp);
        let mut coordinator = LoadCoordinator::new(
            &warehouse,
            contract(WriteDisposition::Merge, SchemaContract::Evolve),
        );

        coordinator.load(&[json!({"iri": "a"})]).unwrap();
        coordinator
            .load(&[json!({"iri": "b", "definition": "late column"})])
            .unwrap();

        let schema = warehouse.schema("terms").unwrap().unwrap();
        assert!(schema.column("definition").is_some());
    }

    #[test]
    fn freeze_rejects_new_column() {
        let temp = tempfile::tempdir().unwrap();
        let warehouse = warehouse(&temp);
        let mut coordinator = LoadCoordinator::new(
            &warehouse,
            contract(WriteDisposition::Merge, SchemaContract::Evolve),
        );
        coordinator.load(&[json!({"iri": "a"})]).unwrap();

        let mut frozen = LoadCoordinator::new(
            &warehouse,
            contract(WriteDisposition::Merge, SchemaContract::Freeze),
        );
        let err = frozen
            .load(&[json!({"iri": "b", "surprise": "no"})])
            .unwrap_err();
        assert_matches!(err, PipelineError::SchemaFrozen { .. });
    }

    #[test]
    fn discard_drops_unknown_values() {
        let temp = tempfile::tempdir().unwrap();
        let warehouse = warehouse(&temp);
        let mut coordinator = LoadCoordinator::new(
            &warehouse,
            contract(WriteDisposition::Merge, SchemaContract::Evolve),
        );
        coordinator.load(&[json!({"iri": "a", "label": "x"})]).unwrap();

        let mut discarding = LoadCoordinator::new(
            &warehouse,
            contract(WriteDisposition::Merge, SchemaContract::Discard),
        );
        discarding
            .load(&[json!({"iri": "b", "surprise": "dropped"})])
            .unwrap();

        let schema = warehouse.schema("terms").unwrap().unwrap();
        assert!(schema.column("surprise").is_none());
        assert_eq!(warehouse.row_count("terms").unwrap(), 2);
    }

    #[test]
    fn merge_row_without_primary_key_fails_alone() {
        let temp = tempfile::tempdir().unwrap();
        let warehouse = warehouse(&temp);
        let mut coordinator = LoadCoordinator::new(
            &warehouse,
            contract(WriteDisposition::Merge, SchemaContract::Evolve),
        );

        let report = coordinator
            .load(&[
                json!({"iri": "a", "label": "kept"}),
                json!({"iri": null, "label": "no key"}),
            ])
            .unwrap();
        assert_eq!(report.loaded, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(warehouse.row_count("terms").unwrap(), 1);
    }

    #[test]
    fn replace_truncates_once_per_run() {
        let temp = tempfile::tempdir().unwrap();
        let warehouse = warehouse(&temp);
        let mut merging = LoadCoordinator::new(
            &warehouse,
            contract(WriteDisposition::Merge, SchemaContract::Evolve),
        );
        merging.load(&[json!({"iri": "old"})]).unwrap();

        let mut replacing = LoadCoordinator::new(
            &warehouse,
            contract(WriteDisposition::Replace, SchemaContract::Evolve),
        );
        replacing.load(&[json!({"iri": "a"})]).unwrap();
        replacing.load(&[json!({"iri": "b"})]).unwrap();

        assert_eq!(warehouse.row_count("terms").unwrap(), 2);
    }

    #[test]
    fn double_merge_is_idempotent() {
        let temp = tempfile::tempdir().unwrap();
        let warehouse = warehouse(&temp);
        let mut coordinator = LoadCoordinator::new(
            &warehouse,
            contract(WriteDisposition::Merge, SchemaContract::Evolve),
        );

        let batch = [json!({"iri": "a"}), json!({"iri": "b"})];
        coordinator.load(&batch).unwrap();
        coordinator.load(&batch).unwrap();

        assert_eq!(warehouse.row_count("terms").unwrap(), 2);
    }
}
