// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

use std::io::Write;
use tabula::{describe_columns, evaluate, load_csv, DataError, DataType, Scalar, Value};
use tempfile::NamedTempFile;

fn write_csv(contents: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn load_infers_column_types() {
    let file = write_csv("id,price,active,label\n1,2.50,true,a\n2,3,false,\n3,,true,c\n");
    let ds = load_csv(file.path()).unwrap();

    assert_eq!(ds.row_count(), 3);
    assert_eq!(ds.column("id").unwrap().data_type(), DataType::Int64);
    assert_eq!(ds.column("price").unwrap().data_type(), DataType::Float64);
    assert_eq!(ds.column("active").unwrap().data_type(), DataType::Boolean);
    assert_eq!(ds.column("label").unwrap().data_type(), DataType::String);
    assert_eq!(ds.column("price").unwrap().null_count(), 1);
    assert!(ds.metadata.source.is_some());

    let described = describe_columns(&ds);
    assert!(described.contains("`price`:float64"));
    assert!(described.contains("`label`:object"));
}

#[test]
fn ragged_rows_are_rejected() {
    let file = write_csv("a,b\n1,2\n3,4,5\n");
    match load_csv(file.path()) {
        Err(DataError::RaggedRow { expected, found, .. }) => {
            assert_eq!(expected, 2);
            assert_eq!(found, 3);
        }
        other => panic!("expected a ragged row error, got {other:?}"),
    }
}

#[test]
fn preview_shows_first_rows_with_blank_nulls() {
    let file = write_csv("city,temp\nFaro,21\nPorto,\nLisbon,19\n");
    let ds = load_csv(file.path()).unwrap();
    let preview = ds.preview(2);
    assert_eq!(preview.columns, vec!["city", "temp"]);
    assert_eq!(preview.rows.len(), 2);
    assert_eq!(preview.rows[1], vec!["Porto".to_string(), String::new()]);
}

#[test]
fn loaded_file_answers_expressions() {
    let file = write_csv("product,units\nlamp,3\ndesk,5\nlamp,4\n");
    let ds = load_csv(file.path()).unwrap();
    let total = evaluate("df[df['product'] == 'lamp']['units'].sum()", &ds).unwrap();
    match total {
        Value::Scalar(value) => assert_eq!(value, Scalar::Int(7)),
        other => panic!("unexpected {}", other.type_name()),
    }
}
