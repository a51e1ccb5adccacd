//! Column access helpers over polars frames

use polars::prelude::*;

/// Column values rendered as text; `None` when the column does not exist
pub fn text_column(frame: &DataFrame, name: &str) -> PolarsResult<Option<Vec<Option<String>>>> {
    let Ok(column) = frame.column(name) else {
        return Ok(None);
    };
    let text = column.cast(&DataType::String)?;
    let values = text
        .str()?
        .into_iter()
        .map(|value| value.map(str::to_string))
        .collect();
    Ok(Some(values))
}

/// Column values parsed as numbers; unparseable cells become `None`
pub fn number_column(frame: &DataFrame, name: &str) -> PolarsResult<Option<Vec<Option<f64>>>> {
    Ok(text_column(frame, name)?.map(|values| {
        values
            .into_iter()
            .map(|value| value.and_then(|v| parse_number(&v)))
            .collect()
    }))
}

/// Lenient numeric parse accepting thousands separators
pub fn parse_number(value: &str) -> Option<f64> {
    let cleaned: String = value.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse().ok()
}

/// Add or replace a text column
pub fn set_text_column(frame: &mut DataFrame, name: &str, values: Vec<Option<String>>) -> PolarsResult<()> {
    frame.with_column(Series::new(name.into(), values))?;
    Ok(())
}

/// Add or replace a numeric column
pub fn set_number_column(frame: &mut DataFrame, name: &str, values: Vec<Option<f64>>) -> PolarsResult<()> {
    frame.with_column(Series::new(name.into(), values))?;
    Ok(())
}

pub fn has_column(frame: &DataFrame, name: &str) -> bool {
    frame.column(name).is_ok()
}

pub fn column_names(frame: &DataFrame) -> Vec<String> {
    frame.get_column_names().iter().map(|name| name.to_string()).collect()
}

/// Columns from `required` that the frame lacks
pub fn missing_columns<'a>(frame: &DataFrame, required: &[&'a str]) -> Vec<&'a str> {
    required
        .iter()
        .copied()
        .filter(|name| !has_column(frame, name))
        .collect()
}

/// Null, blank and the literal "nan" all count as unset
pub fn is_blank(value: Option<&str>) -> bool {
    match value {
        None => true,
        Some(v) => {
            let trimmed = v.trim();
            trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan")
        }
    }
}
