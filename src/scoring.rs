use std::collections::BTreeMap;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::types::{Bubble, Cell};

/// How a row holding marks in several columns is scored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RowMarkPolicy {
    /// The right-most marked column decides the row.
    #[default]
    LastColumn,
    /// The left-most marked column decides the row.
    FirstColumn,
    /// Every marked column contributes.
    Sum,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectionScores {
    /// Only rows with at least one assigned bubble appear.
    pub row_scores: BTreeMap<u32, u32>,
    /// Always the sum of `row_scores`.
    pub total_score: u32,
    /// Rows that held more than one marked cell.
    pub multi_marked_rows: Vec<u32>,
}

/// The rating a mark in `column` is worth: the left-most column scores
/// highest, the right-most scores 1.
pub fn score_for_column(total_columns: u32, column: u32) -> u32 {
    (total_columns + 1).saturating_sub(column)
}

/// Converts assigned cells into per-row ratings.
pub fn score_cells(
    cells: &BTreeMap<Cell, Bubble>,
    total_columns: u32,
    policy: RowMarkPolicy,
) -> SectionScores {
    let mut columns_by_row: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
    for cell in cells.keys() {
        columns_by_row.entry(cell.row).or_default().push(cell.column);
    }

    let mut scores = SectionScores::default();
    for (row, columns) in columns_by_row {
        if columns.len() > 1 {
            warn!("row {} is marked in columns {:?}", row, columns);
            scores.multi_marked_rows.push(row);
        }

        // columns arrive ascending from the row-major cell order
        let score = match policy {
            RowMarkPolicy::LastColumn => columns
                .last()
                .map_or(0, |&c| score_for_column(total_columns, c)),
            RowMarkPolicy::FirstColumn => columns
                .first()
                .map_or(0, |&c| score_for_column(total_columns, c)),
            RowMarkPolicy::Sum => columns
                .iter()
                .map(|&c| score_for_column(total_columns, c))
                .sum(),
        };
        debug!("row {} scores {}", row, score);
        scores.row_scores.insert(row, score);
    }

    scores.total_score = scores.row_scores.values().sum();
    scores
}
