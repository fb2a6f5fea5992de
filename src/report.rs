use std::collections::BTreeMap;
use std::fmt::Write;

use serde::{Serialize, Serializer};

use crate::grid::{CellConflict, GridAssignment};
use crate::scoring::SectionScores;
use crate::template::SheetTemplate;
use crate::types::{Bubble, Cell, SectionId};

/// Everything learned about one section of a sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionReport {
    pub section_id: SectionId,
    pub total_columns: u32,
    pub total_rows: u32,
    pub row_scores: BTreeMap<u32, u32>,
    pub total_score: u32,
    #[serde(serialize_with = "serialize_cells")]
    pub unique_cells: BTreeMap<Cell, Bubble>,
    pub unassigned_bubbles: Vec<Bubble>,
    pub cell_conflicts: Vec<CellConflict>,
    pub multi_marked_rows: Vec<u32>,
}

impl SectionReport {
    pub fn new(
        section_id: SectionId,
        total_rows: u32,
        total_columns: u32,
        assignment: GridAssignment,
        scores: SectionScores,
    ) -> Self {
        Self {
            section_id,
            total_columns,
            total_rows,
            row_scores: scores.row_scores,
            total_score: scores.total_score,
            unique_cells: assignment.cells,
            unassigned_bubbles: assignment.unassigned,
            cell_conflicts: assignment.conflicts,
            multi_marked_rows: scores.multi_marked_rows,
        }
    }
}

#[derive(Serialize)]
struct MarkedCell {
    row: u32,
    column: u32,
    x: u32,
    y: u32,
    radius: u32,
}

// JSON object keys must be strings, so cells go out as a list.
fn serialize_cells<S: Serializer>(
    cells: &BTreeMap<Cell, Bubble>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(cells.iter().map(|(cell, bubble)| MarkedCell {
        row: cell.row,
        column: cell.column,
        x: bubble.x,
        y: bubble.y,
        radius: bubble.radius,
    }))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SheetReport {
    pub sections: BTreeMap<SectionId, SectionReport>,
}

impl SheetReport {
    pub fn total_score(&self) -> u32 {
        self.sections.values().map(|s| s.total_score).sum()
    }
}

/// Renders the scored rows of every section, in template order.
pub fn render_text(report: &SheetReport, template: &SheetTemplate) -> String {
    let mut out = String::new();
    let titled = template
        .sections
        .iter()
        .filter_map(|t| report.sections.get(&t.id).map(|r| (Some(t), r)));
    let untitled = report
        .sections
        .values()
        .filter(|r| template.section(&r.section_id).is_none())
        .map(|r| (None, r));

    for (i, (section, section_report)) in titled.chain(untitled).enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let title = section.map_or(section_report.section_id.as_str(), |s| s.title.as_str());
        // writing to a String cannot fail
        let _ = writeln!(out, "{}:", title);
        for (row, score) in &section_report.row_scores {
            let question = section
                .and_then(|s| s.question(*row))
                .map_or_else(|| format!("Row {}", row), str::to_string);
            let _ = writeln!(out, "{}. {}: {}", row, question, score);
        }
        let _ = writeln!(out, "Total Score: {}", section_report.total_score);
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::grid::{assign_bubbles, CellConflictPolicy};
    use crate::scoring::{score_cells, RowMarkPolicy};
    use crate::types::LineCoordinates;

    fn commitment_report() -> SectionReport {
        let rows = LineCoordinates::merge(vec![10, 40, 70, 100], 10).ranges();
        let columns = LineCoordinates::merge(vec![10, 50, 90, 130, 170, 210], 10).ranges();
        let bubbles = [
            Bubble { x: 30, y: 25, radius: 6 },
            Bubble { x: 110, y: 85, radius: 7 },
            Bubble { x: 300, y: 25, radius: 6 },
        ];
        let assignment = assign_bubbles(&rows, &columns, &bubbles, CellConflictPolicy::default());
        let scores = score_cells(&assignment.cells, 5, RowMarkPolicy::default());
        SectionReport::new(SectionId::new("section1"), 3, 5, assignment, scores)
    }

    #[test]
    fn builds_section_report() {
        let report = commitment_report();
        assert_eq!(report.row_scores, BTreeMap::from([(1, 5), (3, 3)]));
        assert_eq!(report.total_score, 8);
        assert_eq!(report.unique_cells.len(), 2);
        assert_eq!(report.unassigned_bubbles, vec![Bubble { x: 300, y: 25, radius: 6 }]);
    }

    #[test]
    fn serializes_cells_as_list() {
        let json = serde_json::to_value(commitment_report()).unwrap();
        assert_eq!(json["section_id"], "section1");
        assert_eq!(json["total_score"], 8);
        assert_eq!(json["row_scores"]["3"], 3);
        assert_eq!(
            json["unique_cells"][1],
            serde_json::json!({ "row": 3, "column": 3, "x": 110, "y": 85, "radius": 7 })
        );
        assert_eq!(json["unassigned_bubbles"][0]["x"], 300);
    }

    #[test]
    fn renders_sections_in_template_order() {
        let mut sheet = SheetReport::default();
        let mut other = commitment_report();
        other.section_id = SectionId::new("section2");
        other.row_scores = BTreeMap::from([(2, 4)]);
        other.total_score = 4;
        sheet.sections.insert(other.section_id.clone(), other);
        let commitment = commitment_report();
        sheet.sections.insert(commitment.section_id.clone(), commitment);
        assert_eq!(sheet.total_score(), 12);

        let text = render_text(&sheet, &SheetTemplate::default());
        assert_eq!(
            text,
            "Commitment:\n\
             1. demonstrate sensitivity to students' ability to attend and absorb content information: 5\n\
             3. display consistency in teaching methodology: 3\n\
             Total Score: 8\n\
             \n\
             Knowledge of Subject:\n\
             2. use relevant examples and explanations: 4\n\
             Total Score: 4\n"
        );
    }

    #[test]
    fn renders_unknown_sections_by_id() {
        let mut sheet = SheetReport::default();
        let mut report = commitment_report();
        report.section_id = SectionId::new("extra");
        sheet.sections.insert(report.section_id.clone(), report);

        let text = render_text(&sheet, &SheetTemplate::default());
        assert_eq!(text, "extra:\n1. Row 1: 5\n3. Row 3: 3\nTotal Score: 8\n");
    }
}
