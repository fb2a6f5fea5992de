use std::collections::BTreeMap;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::types::{BoundaryRange, Bubble, Cell};

/// What to do when more than one bubble lands in the same cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CellConflictPolicy {
    /// Keep the first bubble in detection order.
    FirstWins,
    /// Keep the last bubble in detection order.
    #[default]
    LastWins,
    /// Leave the cell empty.
    Reject,
}

/// Several bubbles that fell into one cell, and the one that was kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CellConflict {
    pub cell: Cell,
    pub bubbles: Vec<Bubble>,
    pub kept: Option<Bubble>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GridAssignment {
    /// At most one bubble per cell.
    pub cells: BTreeMap<Cell, Bubble>,
    /// Bubbles outside every row or column range.
    pub unassigned: Vec<Bubble>,
    pub conflicts: Vec<CellConflict>,
}

/// Returns the 1-based index of the first range containing `p`.
pub fn find_range(ranges: &[BoundaryRange], p: u32) -> Option<u32> {
    ranges
        .iter()
        .position(|range| range.contains(p))
        .map(|i| i as u32 + 1)
}

/// Places every bubble into the cell whose row and column ranges contain its
/// center.
pub fn assign_bubbles(
    rows: &[BoundaryRange],
    columns: &[BoundaryRange],
    bubbles: &[Bubble],
    policy: CellConflictPolicy,
) -> GridAssignment {
    let mut assignment = GridAssignment::default();
    // BTreeMap iterates row-major and each Vec keeps detection order
    let mut by_cell: BTreeMap<Cell, Vec<Bubble>> = BTreeMap::new();

    for bubble in bubbles {
        match (find_range(rows, bubble.y), find_range(columns, bubble.x)) {
            (Some(row), Some(column)) => {
                debug!(
                    "bubble at ({}, {}) is in {}",
                    bubble.x,
                    bubble.y,
                    Cell::new(row, column)
                );
                by_cell.entry(Cell::new(row, column)).or_default().push(*bubble);
            }
            _ => {
                warn!(
                    "bubble at ({}, {}) radius {} is outside the grid",
                    bubble.x, bubble.y, bubble.radius
                );
                assignment.unassigned.push(*bubble);
            }
        }
    }

    for (cell, candidates) in by_cell {
        let kept = match (policy, candidates.as_slice()) {
            (_, [only]) => Some(*only),
            (CellConflictPolicy::FirstWins, [first, ..]) => Some(*first),
            (CellConflictPolicy::LastWins, [.., last]) => Some(*last),
            _ => None,
        };

        if candidates.len() > 1 {
            warn!(
                "{} bubbles in {}; {:?} keeps {:?}",
                candidates.len(),
                cell,
                policy,
                kept
            );
            assignment.conflicts.push(CellConflict {
                cell,
                bubbles: candidates,
                kept,
            });
        }

        if let Some(bubble) = kept {
            assignment.cells.insert(cell, bubble);
        }
    }

    assignment
}
