use serde::{Deserialize, Serialize};

/// Severity of a quality criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Major,
    Minor,
}

/// One named pass/fail check performed by the inspector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityCriterion {
    pub id: String,
    pub name: String,
    pub passed: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    pub severity: Severity,
}

/// A rework step the inspector requires after a failed check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrectionOperation {
    /// Process-step name to re-run.
    pub operation: String,

    pub reason: String,

    /// Lower runs first.
    pub priority: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Inspector's assessment submitted with a quality-control scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityAssessment {
    pub criteria: Vec<QualityCriterion>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overall_notes: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_operations: Vec<CorrectionOperation>,
}

impl QualityAssessment {
    /// True if any criterion failed.
    pub fn has_failures(&self) -> bool {
        self.criteria.iter().any(|c| !c.passed)
    }

    /// Permanent audit note recording the inspection outcome, attached to
    /// the quality task.
    pub fn audit_note(&self, passed: bool, time: &str) -> String {
        let mut note = format!(
            "Quality Inspection {}\nTime: {}\nNotes: {}\n\nCriteria Results:",
            if passed { "Passed" } else { "Failed" },
            time,
            self.overall_notes.as_deref().unwrap_or("N/A"),
        );
        for criterion in &self.criteria {
            let result = if criterion.passed { "Passed" } else { "Failed" };
            note.push_str(&format!("\n- {}: {}", criterion.name, result));
            if let Some(notes) = &criterion.notes {
                note.push_str(&format!(" ({notes})"));
            }
        }
        note
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assessment(passed: bool) -> QualityAssessment {
        QualityAssessment {
            criteria: vec![
                QualityCriterion {
                    id: "weld-seam".into(),
                    name: "Weld seam".into(),
                    passed: true,
                    notes: None,
                    severity: Severity::Major,
                },
                QualityCriterion {
                    id: "gasket-fit".into(),
                    name: "Gasket fit".into(),
                    passed,
                    notes: Some("loose at corner".into()),
                    severity: Severity::Critical,
                },
            ],
            overall_notes: Some("checked on line 1".into()),
            required_operations: vec![],
        }
    }

    #[test]
    fn has_failures() {
        assert!(!assessment(true).has_failures());
        assert!(assessment(false).has_failures());
    }

    #[test]
    fn assessment_json_roundtrip() {
        let qa = assessment(false);
        let json = serde_json::to_string(&qa).unwrap();
        let back: QualityAssessment = serde_json::from_str(&json).unwrap();
        assert_eq!(qa, back);
    }

    #[test]
    fn audit_note_lists_every_criterion() {
        let note = assessment(false).audit_note(false, "2026-02-03T10:00:00+00:00");
        assert!(note.starts_with("Quality Inspection Failed"));
        assert!(note.contains("- Weld seam: Passed"));
        assert!(note.contains("- Gasket fit: Failed (loose at corner)"));
        assert!(note.contains("checked on line 1"));
    }
}
