//! Join stage: assemble the tidy table.

use tracing::info;

use crate::domain::{Column, Table};
use crate::error::PipelineError;

/// Tidy output columns, in order.
pub const TIDY_COLUMNS: [&str; 11] = [
    "CO_GRUPO", "TP_SEXO", "NT_GER", "NT_FG", "NT_CE", "NU_IDADE", "estcivil", "cor", "escopai",
    "escomae", "renda",
];

/// Raw columns carried into the tidy table unchanged.
const CARRIED: [&str; 6] = ["CO_GRUPO", "TP_SEXO", "NT_GER", "NT_FG", "NT_CE", "NU_IDADE"];

/// Positionally concatenate the filtered table with the recoded columns.
///
/// Alignment is by row index, which is only sound because recodes preserve
/// row order and count; a length mismatch therefore means a recode broke its
/// contract and the join refuses to truncate or pad.
pub fn join(filtered: &Table, recoded: &[Column]) -> Result<Table, PipelineError> {
    for column in recoded {
        if column.len() != filtered.len() {
            return Err(PipelineError::Schema(format!(
                "recoded column {} has {} rows, filtered table has {}",
                column.name(),
                column.len(),
                filtered.len()
            )));
        }
    }

    let mut tidy = filtered.select(&CARRIED)?;
    for column in recoded {
        tidy.push_column(column.clone())?;
    }
    if tidy.header() != TIDY_COLUMNS {
        return Err(PipelineError::Schema(format!(
            "unexpected tidy column set: {:?}",
            tidy.header()
        )));
    }

    info!(rows = tidy.len(), sample = %preview(&tidy, 5), "tidy table assembled");
    Ok(tidy)
}

/// First `limit` rows as JSON, for the run log.
pub fn preview(table: &Table, limit: usize) -> serde_json::Value {
    let header = table.header();
    let rows: Vec<serde_json::Value> = table
        .rows()
        .take(limit)
        .map(|row| {
            let object: serde_json::Map<String, serde_json::Value> = header
                .iter()
                .zip(&row)
                .map(|(name, value)| {
                    (
                        (*name).to_string(),
                        serde_json::Value::String((*value).to_string()),
                    )
                })
                .collect();
            serde_json::Value::Object(object)
        })
        .collect();
    serde_json::Value::Array(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &str, values: &[&str]) -> Column {
        Column::new(name, values.iter().map(|v| v.to_string()).collect())
    }

    fn filtered_fixture() -> Table {
        Table::from_columns(vec![
            col("CO_GRUPO", &["702", "702"]),
            col("TP_SEXO", &["M", "F"]),
            col("NU_IDADE", &["25", "31"]),
            col("NT_GER", &["55,5", "70,1"]),
            col("NT_FG", &["40,0", "60,0"]),
            col("NT_CE", &["62,0", "75,0"]),
            col("QE_I01", &["B", "A"]),
            col("QE_I02", &["F", "D"]),
            col("QE_I03", &["A", "A"]),
            col("QE_I04", &["C", "B"]),
            col("QE_I05", &["D", "B"]),
            col("QE_I08", &["E", "G"]),
        ])
        .unwrap()
    }

    fn recoded_fixture() -> Vec<Column> {
        vec![
            col("estcivil", &["Casado", "Solteiro"]),
            col("cor", &["", "Parda"]),
            col("escopai", &["2", "1"]),
            col("escomae", &["3", "1"]),
            col("renda", &["4", "6"]),
        ]
    }

    #[test]
    fn joined_has_tidy_columns_in_order() {
        let tidy = join(&filtered_fixture(), &recoded_fixture()).unwrap();
        assert_eq!(tidy.header(), TIDY_COLUMNS);
        assert_eq!(tidy.len(), 2);
    }

    #[test]
    fn join_preserves_row_count_exactly() {
        let filtered = filtered_fixture();
        let tidy = join(&filtered, &recoded_fixture()).unwrap();
        assert_eq!(tidy.len(), filtered.len());
    }

    #[test]
    fn rows_align_by_index() {
        let tidy = join(&filtered_fixture(), &recoded_fixture()).unwrap();
        assert_eq!(
            tidy.row(0),
            vec!["702", "M", "55,5", "40,0", "62,0", "25", "Casado", "", "2", "3", "4"]
        );
        assert_eq!(
            tidy.row(1),
            vec!["702", "F", "70,1", "60,0", "75,0", "31", "Solteiro", "Parda", "1", "1", "6"]
        );
    }

    #[test]
    fn blanked_cor_code_stays_an_empty_cell() {
        let tidy = join(&filtered_fixture(), &recoded_fixture()).unwrap();
        let cor = tidy.column("cor").unwrap();
        assert_eq!(cor.values()[0], "");
    }

    #[test]
    fn length_mismatch_is_rejected_not_truncated() {
        let mut recoded = recoded_fixture();
        recoded[2] = col("escopai", &["2"]);
        let err = join(&filtered_fixture(), &recoded).unwrap_err();
        match err {
            PipelineError::Schema(msg) => assert!(msg.contains("escopai"), "{msg}"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn preview_caps_at_limit() {
        let tidy = join(&filtered_fixture(), &recoded_fixture()).unwrap();
        let sample = preview(&tidy, 1);
        assert_eq!(sample.as_array().unwrap().len(), 1);
        assert_eq!(sample[0]["estcivil"], "Casado");
    }
}
