//! Recode registry: fixed categorical/ordinal lookup tables.
//!
//! Each recode maps one raw survey-response column to a cleaned column of the
//! same length. Codes present in the table are replaced; anything else passes
//! through unchanged, matching the permissive behavior of the upstream data
//! treatment. Recodes never reorder or drop rows; the join stage aligns by
//! row index and depends on it.

use crate::domain::Column;

/// One column's recode: output name, source column, lookup table.
#[derive(Debug, Clone, Copy)]
pub struct Recode {
    output: &'static str,
    source: &'static str,
    table: &'static [(&'static str, &'static str)],
}

impl Recode {
    /// Name of the cleaned column this recode produces.
    pub fn output(&self) -> &'static str {
        self.output
    }

    /// Name of the raw column this recode reads.
    pub fn source(&self) -> &'static str {
        self.source
    }

    /// Produce the cleaned column. Pure; same length as the input.
    pub fn apply(&self, column: &Column) -> Column {
        let values = column
            .values()
            .iter()
            .map(|raw| {
                self.table
                    .iter()
                    .find(|entry| entry.0 == raw.as_str())
                    .map(|entry| entry.1.to_string())
                    .unwrap_or_else(|| raw.clone())
            })
            .collect();
        Column::new(self.output, values)
    }
}

const ESTCIVIL: &[(&str, &str)] = &[
    ("A", "Solteiro"),
    ("B", "Casado"),
    ("C", "Separado"),
    ("D", "Viúvo"),
    ("E", "Outro"),
];

const COR: &[(&str, &str)] = &[
    ("A", "Branca"),
    ("B", "Preta"),
    ("C", "Amarela"),
    ("D", "Parda"),
    ("E", "Indígena"),
    ("F", ""),
    (" ", ""),
];

const ESCOPAI: &[(&str, &str)] = &[
    ("A", "0"),
    ("B", "1"),
    ("C", "2"),
    ("D", "3"),
    ("E", "4"),
    ("F", "5"),
];

const ESCOMAE: &[(&str, &str)] = &[
    ("A", "0"),
    ("B", "1"),
    ("C", "2"),
    ("D", "3"),
    ("E", "4"),
    ("F", "5"),
];

const RENDA: &[(&str, &str)] = &[
    ("A", "0"),
    ("B", "1"),
    ("C", "2"),
    ("D", "3"),
    ("E", "4"),
    ("F", "5"),
    ("G", "6"),
];

/// Marital status.
pub fn estcivil() -> Recode {
    Recode {
        output: "estcivil",
        source: "QE_I01",
        table: ESTCIVIL,
    }
}

/// Self-declared color/race.
pub fn cor() -> Recode {
    Recode {
        output: "cor",
        source: "QE_I02",
        table: COR,
    }
}

/// Father's schooling level.
pub fn escopai() -> Recode {
    Recode {
        output: "escopai",
        source: "QE_I04",
        table: ESCOPAI,
    }
}

/// Mother's schooling level.
pub fn escomae() -> Recode {
    Recode {
        output: "escomae",
        source: "QE_I05",
        table: ESCOMAE,
    }
}

/// Household income bracket.
pub fn renda() -> Recode {
    Recode {
        output: "renda",
        source: "QE_I08",
        table: RENDA,
    }
}

/// Every recode the pipeline applies, in tidy-output column order.
pub fn registry() -> [Recode; 5] {
    [estcivil(), cor(), escopai(), escomae(), renda()]
}
