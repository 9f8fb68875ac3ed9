//! Pagination and export over a stored [`crate::entities::ResultRecord`]
//! (§4.7 "Result pagination and sort", "Export"). Pure transformations:
//! no I/O, no persistence.

use querybase_error::RuntimeError;
use serde::Serialize;

use crate::entities::{CellValue, Row};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Serialize)]
pub struct PageMeta {
    pub page: u64,
    pub per_page: u64,
    pub total_pages: u64,
    pub total_rows: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Page {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub meta: PageMeta,
}

/// Stable sort + slice over stored rows (§4.7). `null` sorts before all
/// values in ascending order. Numeric comparison is used when both
/// compared values parse as numbers; otherwise comparison falls back to
/// lexicographic ordering of the rendered string form.
///
/// # Errors
///
/// Returns `invalid_input` for an out-of-range page, `per_page`, or an
/// unknown `sort_col`.
pub fn paginate(
    columns: &[String],
    rows: &[Row],
    page: u64,
    per_page: u64,
    sort_col: Option<&str>,
    sort_dir: SortDirection,
) -> Result<Page, RuntimeError> {
    if page < 1 {
        return Err(RuntimeError::invalid_input("page must be >= 1"));
    }
    if !(10..=1000).contains(&per_page) {
        return Err(RuntimeError::invalid_input("per_page must be in [10, 1000]"));
    }

    let mut ordered: Vec<&Row> = rows.iter().collect();

    if let Some(col) = sort_col {
        let idx = columns
            .iter()
            .position(|c| c == col)
            .ok_or_else(|| RuntimeError::invalid_input(format!("unknown sort column {col}")))?;

        ordered.sort_by(|a, b| {
            let ordering = compare_cells(&a[idx], &b[idx]);
            match sort_dir {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        });
    }

    let total_rows = ordered.len() as u64;
    let total_pages = total_rows.div_ceil(per_page).max(1);
    let start = ((page - 1) * per_page) as usize;
    let end = (start + per_page as usize).min(ordered.len());

    let page_rows = if start >= ordered.len() {
        Vec::new()
    } else {
        ordered[start..end].iter().map(|r| (*r).clone()).collect()
    };

    Ok(Page {
        columns: columns.to_vec(),
        rows: page_rows,
        meta: PageMeta {
            page,
            per_page,
            total_pages,
            total_rows,
            has_next: page < total_pages,
            has_prev: page > 1,
        },
    })
}

fn compare_cells(a: &CellValue, b: &CellValue) -> std::cmp::Ordering {
    if matches!(a, CellValue::Null) || matches!(b, CellValue::Null) {
        return match (matches!(a, CellValue::Null), matches!(b, CellValue::Null)) {
            (true, true) => std::cmp::Ordering::Equal,
            (true, false) => std::cmp::Ordering::Less,
            (false, true) => std::cmp::Ordering::Greater,
            (false, false) => unreachable!(),
        };
    }

    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal),
        _ => a.as_sort_string().cmp(&b.as_sort_string()),
    }
}

/// CSV export (§4.7): RFC 4180, every field quoted, embedded quotes
/// doubled, `null` emitted as an empty unquoted field.
#[must_use]
pub fn export_csv(columns: &[String], rows: &[Row]) -> String {
    let mut out = String::new();
    out.push_str(&columns.iter().map(|c| quote_csv(c)).collect::<Vec<_>>().join(","));
    out.push_str("\r\n");
    for row in rows {
        let line = row
            .iter()
            .map(|cell| {
                if matches!(cell, CellValue::Null) {
                    String::new()
                } else {
                    quote_csv(&cell.as_csv_field())
                }
            })
            .collect::<Vec<_>>()
            .join(",");
        out.push_str(&line);
        out.push_str("\r\n");
    }
    out
}

fn quote_csv(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

#[derive(Serialize)]
struct JsonExport<'a> {
    columns: &'a [String],
    row_count: u64,
    data: Vec<serde_json::Map<String, serde_json::Value>>,
}

/// JSON export (§4.7): `{columns, row_count, data}` pretty-printed, one
/// object per row keyed by column name.
///
/// # Panics
///
/// Never panics under normal use; serialization of the constructed value
/// cannot fail.
#[must_use]
pub fn export_json(columns: &[String], rows: &[Row]) -> String {
    let data = rows
        .iter()
        .map(|row| {
            let mut map = serde_json::Map::new();
            for (idx, col) in columns.iter().enumerate() {
                map.insert(col.clone(), row.get(idx).map_or(serde_json::Value::Null, Into::into));
            }
            map
        })
        .collect();

    let export = JsonExport {
        columns,
        row_count: rows.len() as u64,
        data,
    };
    serde_json::to_string_pretty(&export).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Vec<String>, Vec<Row>) {
        let columns = vec!["id".to_string(), "name".to_string()];
        let rows = vec![
            vec![CellValue::Int64(1), CellValue::String("a".into())],
            vec![CellValue::Int64(2), CellValue::Null],
            vec![CellValue::Int64(3), CellValue::String("c".into())],
        ];
        (columns, rows)
    }

    fn multi_page_sample() -> (Vec<String>, Vec<Row>) {
        let columns = vec!["id".to_string()];
        let rows = (0..25).map(|i| vec![CellValue::Int64(i)]).collect();
        (columns, rows)
    }

    #[test]
    fn pagination_round_trips_all_rows() {
        let (columns, rows) = multi_page_sample();
        let per_page = 10;
        let total_pages = (rows.len() as u64).div_ceil(per_page);
        assert!(total_pages > 1, "fixture must actually span multiple pages");

        let mut collected = Vec::new();
        for page in 1..=total_pages {
            let p = paginate(&columns, &rows, page, per_page, None, SortDirection::Asc).unwrap();
            collected.extend(p.rows);
        }
        assert_eq!(collected, rows);
    }

    #[test]
    fn null_sorts_before_values_ascending() {
        let (columns, rows) = sample();
        let page = paginate(&columns, &rows, 1, 10, Some("name"), SortDirection::Asc).unwrap();
        assert!(matches!(page.rows[0][1], CellValue::Null));
    }

    #[test]
    fn csv_quotes_every_field_and_doubles_embedded_quotes() {
        let columns = vec!["a".to_string()];
        let rows = vec![vec![CellValue::String("he said \"hi\"".into())]];
        let csv = export_csv(&columns, &rows);
        assert!(csv.contains("\"he said \"\"hi\"\"\""));
    }

    #[test]
    fn csv_renders_null_as_empty_unquoted() {
        let columns = vec!["a".to_string()];
        let rows = vec![vec![CellValue::Null]];
        let csv = export_csv(&columns, &rows);
        assert_eq!(csv, "\"a\"\r\n\r\n");
    }
}
