use camino::Utf8PathBuf;
use serde_json::{Value, json};

use efo_ingest::warehouse::{
    ColumnDef, ColumnType, JsonWarehouse, Row, TableReference, TableSchema, Warehouse,
};

fn schema_with_reference() -> TableSchema {
    TableSchema {
        name: "terms_parents".to_string(),
        primary_key: "iri".to_string(),
        columns: vec![
            ColumnDef {
                name: "iri".to_string(),
                data_type: ColumnType::Text,
                nullable: false,
            },
            ColumnDef {
                name: "child_iri".to_string(),
                data_type: ColumnType::Text,
                nullable: true,
            },
        ],
        references: vec![TableReference {
            referenced_table: "terms".to_string(),
            columns: vec!["child_iri".to_string()],
            referenced_columns: vec!["iri".to_string()],
        }],
    }
}

fn row(pairs: Value) -> Row {
    let Value::Object(map) = pairs else {
        panic!("row fixture must be an object")
    };
    map
}

fn open(temp: &tempfile::TempDir) -> JsonWarehouse {
    let root = Utf8PathBuf::from_path_buf(temp.path().join("warehouse")).unwrap();
    JsonWarehouse::new(root)
}

#[test]
fn schema_round_trip_keeps_references() {
    let temp = tempfile::tempdir().unwrap();
    let warehouse = open(&temp);
    warehouse.create_table(&schema_with_reference()).unwrap();

    let loaded = warehouse.schema("terms_parents").unwrap().unwrap();
    assert_eq!(loaded, schema_with_reference());
    assert_eq!(loaded.references[0].referenced_table, "terms");
}

#[test]
fn merge_survives_reopen() {
    let temp = tempfile::tempdir().unwrap();
    {
        let warehouse = open(&temp);
        warehouse.create_table(&schema_with_reference()).unwrap();
        warehouse
            .merge_rows(
                "terms_parents",
                vec![row(json!({"iri": "http://x/p", "child_iri": "http://x/c"}))],
            )
            .unwrap();
    }

    let reopened = open(&temp);
    assert_eq!(reopened.row_count("terms_parents").unwrap(), 1);

    reopened
        .merge_rows(
            "terms_parents",
            vec![row(json!({"iri": "http://x/p", "child_iri": "http://x/other"}))],
        )
        .unwrap();
    assert_eq!(reopened.row_count("terms_parents").unwrap(), 1);
}

#[test]
fn append_keeps_duplicate_keys() {
    let temp = tempfile::tempdir().unwrap();
    let warehouse = open(&temp);
    warehouse.create_table(&schema_with_reference()).unwrap();

    let duplicate = row(json!({"iri": "http://x/p", "child_iri": "http://x/c"}));
    warehouse
        .append_rows("terms_parents", vec![duplicate.clone(), duplicate])
        .unwrap();
    assert_eq!(warehouse.row_count("terms_parents").unwrap(), 2);
}

#[test]
fn truncate_empties_but_keeps_schema() {
    let temp = tempfile::tempdir().unwrap();
    let warehouse = open(&temp);
    warehouse.create_table(&schema_with_reference()).unwrap();
    warehouse
        .merge_rows(
            "terms_parents",
            vec![row(json!({"iri": "http://x/p", "child_iri": "http://x/c"}))],
        )
        .unwrap();

    warehouse.truncate("terms_parents").unwrap();
    assert_eq!(warehouse.row_count("terms_parents").unwrap(), 0);
    assert!(warehouse.schema("terms_parents").unwrap().is_some());
}

#[test]
fn clear_drops_the_dataset() {
    let temp = tempfile::tempdir().unwrap();
    let warehouse = open(&temp);
    warehouse.create_table(&schema_with_reference()).unwrap();

    warehouse.clear().unwrap();
    assert!(warehouse.table_names().unwrap().is_empty());
    assert!(warehouse.schema("terms_parents").unwrap().is_none());
}

#[test]
fn update_schema_persists_added_column() {
    let temp = tempfile::tempdir().unwrap();
    let warehouse = open(&temp);
    warehouse.create_table(&schema_with_reference()).unwrap();

    let mut schema = warehouse.schema("terms_parents").unwrap().unwrap();
    schema.columns.push(ColumnDef {
        name: "label".to_string(),
        data_type: ColumnType::Text,
        nullable: true,
    });
    warehouse.update_schema(&schema).unwrap();

    let loaded = warehouse.schema("terms_parents").unwrap().unwrap();
    assert!(loaded.column("label").is_some());
}
