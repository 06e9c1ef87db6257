//! Typed views of a chunk column once its type is resolved.

use chrono::NaiveDateTime;
use polars::prelude::*;

use crate::profiler::InferredType;
use crate::types::ColumnType;
use crate::utils::{
    DtypeCategory, TEMPORAL_PATTERNS, get_dtype_category, normalize_cell, parse_boolean_token,
    parse_numeric_string, parse_temporal,
};

#[derive(Debug, Clone, PartialEq)]
pub enum TypedValues {
    Numeric(Vec<Option<f64>>),
    Boolean(Vec<Option<bool>>),
    Temporal(Vec<Option<NaiveDateTime>>),
    /// Categorical and text columns.
    Text(Vec<Option<String>>),
}

/// One chunk column parsed as its resolved type.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedColumn {
    pub values: TypedValues,
    /// Cells that were empty or a missing marker.
    pub missing: usize,
    /// Non-missing cells that failed to parse; they appear as `None` in `values`.
    pub invalid: usize,
}

impl TypedColumn {
    pub fn len(&self) -> usize {
        match &self.values {
            TypedValues::Numeric(v) => v.len(),
            TypedValues::Boolean(v) => v.len(),
            TypedValues::Temporal(v) => v.len(),
            TypedValues::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_numeric(&self) -> Option<&[Option<f64>]> {
        match &self.values {
            TypedValues::Numeric(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_temporal(&self) -> Option<&[Option<NaiveDateTime>]> {
        match &self.values {
            TypedValues::Temporal(v) => Some(v),
            _ => None,
        }
    }

    /// Group labels per cell, keyed the way the frequency counter keys them,
    /// so `No`, `no` and `NO` in a boolean column share one label.
    pub fn labels(&self) -> Vec<Option<String>> {
        match &self.values {
            TypedValues::Numeric(v) => v.iter().map(|x| x.map(|x| x.to_string())).collect(),
            TypedValues::Boolean(v) => v
                .iter()
                .map(|b| b.map(|b| boolean_label(b).to_string()))
                .collect(),
            TypedValues::Temporal(v) => v.iter().map(|t| t.map(|t| t.to_string())).collect(),
            TypedValues::Text(v) => v.clone(),
        }
    }
}

/// Canonical text of a boolean cell.
pub fn boolean_label(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

/// Parse every cell of `series` as `inferred`.
pub fn extract_typed(series: &Series, inferred: &InferredType) -> PolarsResult<TypedColumn> {
    let dtype = get_dtype_category(series.dtype());
    match inferred.column_type {
        ColumnType::Numeric => extract_numeric(series, dtype),
        ColumnType::Boolean => extract_boolean(series, dtype),
        ColumnType::Temporal => extract_temporal(series, dtype, inferred.temporal_pattern),
        ColumnType::Categorical | ColumnType::Text => extract_text(series),
    }
}

/// Parse a column as numbers regardless of its resolved type.
pub fn extract_numeric_values(series: &Series) -> PolarsResult<Vec<Option<f64>>> {
    let column = extract_numeric(series, get_dtype_category(series.dtype()))?;
    match column.values {
        TypedValues::Numeric(values) => Ok(values),
        _ => Ok(Vec::new()),
    }
}

fn extract_numeric(series: &Series, dtype: DtypeCategory) -> PolarsResult<TypedColumn> {
    let mut missing = 0;
    let mut invalid = 0;
    let values = if dtype == DtypeCategory::Numeric {
        let floats = series.cast(&DataType::Float64)?;
        floats
            .f64()?
            .into_iter()
            .map(|v| {
                let v = v.filter(|x| x.is_finite());
                if v.is_none() {
                    missing += 1;
                }
                v
            })
            .collect()
    } else {
        let rendered = series.cast(&DataType::String)?;
        rendered
            .str()?
            .into_iter()
            .map(|cell| match cell.and_then(normalize_cell) {
                None => {
                    missing += 1;
                    None
                }
                Some(text) => {
                    let parsed = parse_numeric_string(text)
                        .or_else(|| parse_boolean_token(text).map(|b| f64::from(u8::from(b))));
                    if parsed.is_none() {
                        invalid += 1;
                    }
                    parsed
                }
            })
            .collect()
    };
    Ok(TypedColumn {
        values: TypedValues::Numeric(values),
        missing,
        invalid,
    })
}

fn extract_boolean(series: &Series, dtype: DtypeCategory) -> PolarsResult<TypedColumn> {
    let mut missing = 0;
    let mut invalid = 0;
    let values = match dtype {
        DtypeCategory::Boolean => series
            .bool()?
            .into_iter()
            .map(|v| {
                if v.is_none() {
                    missing += 1;
                }
                v
            })
            .collect(),
        DtypeCategory::Numeric => {
            let floats = series.cast(&DataType::Float64)?;
            floats
                .f64()?
                .into_iter()
                .map(|v| match v.filter(|x| x.is_finite()) {
                    None => {
                        missing += 1;
                        None
                    }
                    Some(x) if x == 0.0 => Some(false),
                    Some(x) if x == 1.0 => Some(true),
                    Some(_) => {
                        invalid += 1;
                        None
                    }
                })
                .collect()
        }
        _ => {
            let rendered = series.cast(&DataType::String)?;
            rendered
                .str()?
                .into_iter()
                .map(|cell| match cell.and_then(normalize_cell) {
                    None => {
                        missing += 1;
                        None
                    }
                    Some(text) => {
                        let parsed = parse_boolean_token(text);
                        if parsed.is_none() {
                            invalid += 1;
                        }
                        parsed
                    }
                })
                .collect()
        }
    };
    Ok(TypedColumn {
        values: TypedValues::Boolean(values),
        missing,
        invalid,
    })
}

fn extract_temporal(
    series: &Series,
    dtype: DtypeCategory,
    pattern: Option<usize>,
) -> PolarsResult<TypedColumn> {
    let mut missing = 0;
    let mut invalid = 0;
    let pattern = pattern.and_then(|i| TEMPORAL_PATTERNS.get(i));
    let rendered = series.cast(&DataType::String)?;
    let values = rendered
        .str()?
        .into_iter()
        .map(|cell| match cell.and_then(normalize_cell) {
            None => {
                missing += 1;
                None
            }
            Some(text) => {
                let parsed = match (dtype, pattern) {
                    (DtypeCategory::Temporal, _) | (_, None) => parse_temporal(text),
                    (_, Some(p)) => p.parse(text),
                };
                if parsed.is_none() {
                    invalid += 1;
                }
                parsed
            }
        })
        .collect();
    Ok(TypedColumn {
        values: TypedValues::Temporal(values),
        missing,
        invalid,
    })
}

fn extract_text(series: &Series) -> PolarsResult<TypedColumn> {
    let mut missing = 0;
    let rendered = series.cast(&DataType::String)?;
    let values = rendered
        .str()?
        .into_iter()
        .map(|cell| {
            let v = cell.and_then(normalize_cell).map(str::to_string);
            if v.is_none() {
                missing += 1;
            }
            v
        })
        .collect();
    Ok(TypedColumn {
        values: TypedValues::Text(values),
        missing,
        invalid: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_from_strings_counts_invalid() {
        let series = Series::new("x".into(), &[Some("1,5"), Some("abc"), None, Some("NA")]);
        let column = extract_typed(&series, &InferredType::new(ColumnType::Numeric)).unwrap();
        assert_eq!(column.as_numeric().unwrap(), &[Some(1.5), None, None, None]);
        assert_eq!(column.missing, 2);
        assert_eq!(column.invalid, 1);
    }

    #[test]
    fn test_boolean_from_integers() {
        let series = Series::new("Class".into(), &[0i32, 1, 1]);
        let column = extract_typed(&series, &InferredType::new(ColumnType::Boolean)).unwrap();
        assert_eq!(
            column.values,
            TypedValues::Boolean(vec![Some(false), Some(true), Some(true)])
        );
    }

    #[test]
    fn test_labels_share_keys_across_spellings() {
        let series = Series::new("is_fraud".into(), &[Some("no"), Some("No"), Some("YES"), None]);
        let column = extract_typed(&series, &InferredType::new(ColumnType::Boolean)).unwrap();
        assert_eq!(
            column.labels(),
            vec![Some("false".into()), Some("false".into()), Some("true".into()), None]
        );

        let series = Series::new("Class".into(), &["1", "1.0", "0"]);
        let column = extract_typed(&series, &InferredType::new(ColumnType::Numeric)).unwrap();
        assert_eq!(
            column.labels(),
            vec![Some("1".into()), Some("1".into()), Some("0".into())]
        );
    }

    #[test]
    fn test_temporal_with_pattern() {
        let series = Series::new("d".into(), &["25/12/2024", "bad", "01/01/2025"]);
        let inferred = InferredType {
            column_type: ColumnType::Temporal,
            temporal_pattern: Some(9),
            ambiguous: false,
        };
        let column = extract_typed(&series, &inferred).unwrap();
        let values = column.as_temporal().unwrap();
        assert_eq!(values[0].unwrap().format("%Y-%m-%d").to_string(), "2024-12-25");
        assert!(values[1].is_none());
        assert_eq!(column.invalid, 1);
    }

    #[test]
    fn test_text_trims_and_maps_markers() {
        let series = Series::new("t".into(), &[" a", "null", "b "]);
        let column = extract_typed(&series, &InferredType::new(ColumnType::Text)).unwrap();
        assert_eq!(
            column.values,
            TypedValues::Text(vec![Some("a".into()), None, Some("b".into())])
        );
        assert_eq!(column.missing, 1);
    }
}
