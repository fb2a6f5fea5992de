use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::read_json;
use crate::interpret::InterpretError;
use crate::types::{PixelBounds, SectionId, Size};

/// Layout of a printed evaluation sheet: the canvas scans are resized to and
/// where each rated section sits on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetTemplate {
    pub title: String,
    pub canvas_size: Size<u32>,
    /// Sections in reading order.
    pub sections: Vec<SectionTemplate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionTemplate {
    pub id: SectionId,
    pub title: String,
    pub bounds: PixelBounds,
    /// Question text by 1-based row.
    #[serde(default)]
    pub questions: BTreeMap<u32, String>,
}

impl SectionTemplate {
    pub fn question(&self, row: u32) -> Option<&str> {
        self.questions.get(&row).map(String::as_str)
    }
}

impl SheetTemplate {
    pub fn section(&self, id: &SectionId) -> Option<&SectionTemplate> {
        self.sections.iter().find(|section| &section.id == id)
    }
}

fn section(
    id: &str,
    title: &str,
    bounds: PixelBounds,
    questions: [&str; 5],
) -> SectionTemplate {
    SectionTemplate {
        id: SectionId::new(id),
        title: title.to_string(),
        bounds,
        questions: (1..)
            .zip(questions)
            .map(|(row, text)| (row, text.to_string()))
            .collect(),
    }
}

impl Default for SheetTemplate {
    /// The four-section faculty evaluation sheet, on an 800x1000 canvas.
    fn default() -> Self {
        Self {
            title: "Faculty Performance Evaluation".to_string(),
            canvas_size: Size {
                width: 800,
                height: 1000,
            },
            sections: vec![
                section(
                    "section1",
                    "Commitment",
                    PixelBounds::new(530, 222, 220, 130),
                    [
                        "demonstrate sensitivity to students' ability to attend and absorb content information",
                        "exhibit readiness and enthusiasm for professional development",
                        "display consistency in teaching methodology",
                        "adapt teaching to meet student needs",
                        "engage students with diverse learning styles",
                    ],
                ),
                section(
                    "section2",
                    "Knowledge of Subject",
                    PixelBounds::new(535, 365, 208, 148),
                    [
                        "present subject matter with clarity",
                        "use relevant examples and explanations",
                        "integrate current research into teaching",
                        "demonstrate mastery of core content",
                        "address questions effectively",
                    ],
                ),
                section(
                    "section3",
                    "Teaching for Independent Learning",
                    PixelBounds::new(535, 529, 208, 161),
                    [
                        "encourage independent inquiry",
                        "provide effective feedback",
                        "support collaborative learning",
                        "promote critical thinking",
                        "use technology to enhance learning",
                    ],
                ),
                section(
                    "section4",
                    "Management of Learning",
                    PixelBounds::new(535, 705, 208, 165),
                    [
                        "organize classroom effectively",
                        "manage time efficiently",
                        "set clear learning objectives",
                        "maintain a positive classroom climate",
                        "evaluate student progress fairly",
                    ],
                ),
            ],
        }
    }
}

/// Loads a sheet template from a JSON file.
pub fn load_template(path: &Path) -> Result<SheetTemplate, InterpretError> {
    read_json(path).map_err(|e| InterpretError::TemplateError(path.to_path_buf(), e))
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_sections_fit_canvas() {
        let template = SheetTemplate::default();
        assert_eq!(template.sections.len(), 4);
        for section in &template.sections {
            assert!(section.bounds.fits_within(template.canvas_size), "{}", section.id);
            assert_eq!(section.questions.len(), 5);
        }
        let commitment = template.section(&SectionId::new("section1")).unwrap();
        assert_eq!(commitment.title, "Commitment");
        assert_eq!(commitment.bounds, PixelBounds::new(530, 222, 220, 130));
        assert_eq!(
            commitment.question(3),
            Some("display consistency in teaching methodology")
        );
        assert_eq!(commitment.question(6), None);
    }

    #[test]
    fn loads_template_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "title": "Peer Review",
                "canvasSize": {{ "width": 400, "height": 300 }},
                "sections": [
                    {{
                        "id": "only",
                        "title": "Only Section",
                        "bounds": {{ "left": 10, "top": 20, "width": 220, "height": 130 }},
                        "questions": {{ "1": "First question" }}
                    }}
                ]
            }}"#
        )
        .unwrap();

        let template = load_template(file.path()).unwrap();
        assert_eq!(template.canvas_size.width, 400);
        let section = &template.sections[0];
        assert_eq!(section.id, SectionId::new("only"));
        assert_eq!(section.question(1), Some("First question"));
    }

    #[test]
    fn reports_unreadable_template() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert!(matches!(
            load_template(&missing),
            Err(InterpretError::TemplateError(path, _)) if path == missing
        ));
    }
}
