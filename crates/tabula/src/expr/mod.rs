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

//! A restricted, read-only expression dialect over a single dataset bound to
//! `df`. Expressions are normalised, parsed into an AST and walked; nothing
//! outside the AST can be reached, so a hostile expression can at worst
//! produce an error.

mod error;
mod eval;
mod lexer;
mod methods;
mod normalize;
mod parser;
mod value;

pub use error::{EvalError, EvalResult};
pub use eval::{Interpreter, FRAME_NAME, MAX_DERIVED_TEXT_BYTES, MAX_TEXT_BYTES};
pub use normalize::normalize_expression;
pub use parser::{parse, Expr, MAX_EXPRESSION_BYTES, MAX_NESTING_DEPTH};
pub use value::{GroupBy, Selection, Series, Value, MAX_RENDER_ROWS};

use crate::dataset::Dataset;

/// Normalises `source`, then evaluates it with `df` bound to `dataset`.
pub fn evaluate(source: &str, dataset: &Dataset) -> EvalResult<Value> {
    let expression = normalize_expression(source)?;
    let ast = parse(&expression)?;
    Interpreter::new(dataset).eval(&ast)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::CsvReader;
    use crate::scalar::Scalar;

    fn people() -> Dataset {
        CsvReader::new()
            .read_bytes(
                b"name,age,city,score\nann,31,Lisbon,7.5\nbo,7,Porto,9.0\ncy,45,Lisbon,6.0\ndee,22,Faro,\n",
                "people",
            )
            .unwrap()
    }

    fn eval(source: &str) -> Value {
        evaluate(source, &people()).unwrap()
    }

    fn scalar(source: &str) -> Scalar {
        match eval(source) {
            Value::Scalar(scalar) => scalar,
            other => panic!("expected a scalar, got {}", other.type_name()),
        }
    }

    #[test]
    fn row_count_and_shape() {
        assert_eq!(scalar("len(df)"), Scalar::Int(4));
        assert_eq!(eval("df.shape").render(), "(4, 4)");
    }

    #[test]
    fn filter_then_count() {
        assert_eq!(scalar("len(df[df['age'] > 20])"), Scalar::Int(3));
        assert_eq!(
            scalar("df[(df['city'] == 'Lisbon') & (df['age'] > 40)]['name'].iloc[0]"),
            Scalar::Str("cy".into())
        );
    }

    #[test]
    fn aggregates_skip_missing_values() {
        assert_eq!(scalar("df['score'].mean()"), Scalar::Float(7.5));
        assert_eq!(scalar("df['age'].max()"), Scalar::Int(45));
        assert_eq!(scalar("df['score'].count()"), Scalar::Int(3));
    }

    #[test]
    fn groupby_mean_is_labelled_by_key() {
        let text = eval("df.groupby('city')['age'].mean()").render();
        assert!(text.starts_with("city\n"), "{text}");
        assert!(text.contains("Lisbon    38.0"), "{text}");
        assert!(text.ends_with("Name: age, dtype: float64"), "{text}");
    }

    #[test]
    fn value_counts_orders_by_frequency() {
        let text = eval("df['city'].value_counts()").render();
        let first = text.lines().nth(1).unwrap_or_default();
        assert!(first.starts_with("Lisbon"), "{text}");
        assert!(text.ends_with("Name: count, dtype: int64"), "{text}");
    }

    #[test]
    fn label_lookup_via_idxmax() {
        assert_eq!(
            scalar("df.loc[df['age'].idxmax(), 'name']"),
            Scalar::Str("cy".into())
        );
    }

    #[test]
    fn describe_renders_a_table() {
        let text = eval("df.describe()").render();
        assert!(text.contains("mean"));
        assert!(text.contains("age"));
        assert!(!text.contains("city"));
    }

    #[test]
    fn fenced_multi_line_reply_uses_last_line() {
        let reply = "```python\n# rows over 30\ndf[df['age'] > 30]['name'].tolist()\n```";
        assert_eq!(eval(reply).render(), "['ann', 'cy']");
    }

    #[test]
    fn oversized_text_is_an_error_not_a_crash() {
        let ds = people();
        for source in [
            "'ab' * 9223372036854775807",
            "'a' * 10**11",
            "(df['name'] * 4611686018427387904).str.len()",
            "('a' * 60000).replace('', 'bb')",
            "df['name'].str.replace('', 'x' * 60000)",
        ] {
            let err = evaluate(source, &ds).unwrap_err();
            assert_eq!(err.kind(), "unsupported", "{source}");
        }
        assert_eq!(scalar("len('ab' * 3)"), Scalar::Int(6));
    }

    #[test]
    fn error_kinds() {
        let ds = people();
        let kind = |source: &str| evaluate(source, &ds).unwrap_err().kind();
        assert_eq!(kind("df['salary']"), "unknown_column");
        assert_eq!(kind("pd.read_csv('x')"), "unknown_name");
        assert_eq!(kind("df['age'] = 1"), "unsupported");
        assert_eq!(kind("df['age'] +"), "syntax");
        assert_eq!(kind("__import__('os')"), "unknown_name");
        assert_eq!(kind("df['name'].mean()"), "type_mismatch");
        assert_eq!(kind("```\n```"), "empty_expression");
    }

    #[test]
    fn evaluation_does_not_touch_the_dataset() {
        let ds = people();
        evaluate("df.sort_values('age', ascending=False).head(1)", &ds).unwrap();
        assert_eq!(ds.column("age").unwrap().get(0), Scalar::Int(31));
    }
}
