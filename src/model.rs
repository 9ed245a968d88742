use serde::{Deserialize, Serialize};
use std::fmt;

/// Grading block tag carried by every activity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActivityBlock {
    N1,
    N2,
    ST1,
    ST2,
    Desafio,
    Substitutiva,
    Final,
    Other(String),
}

impl ActivityBlock {
    pub fn as_str(&self) -> &str {
        match self {
            ActivityBlock::N1 => "N1",
            ActivityBlock::N2 => "N2",
            ActivityBlock::ST1 => "ST1",
            ActivityBlock::ST2 => "ST2",
            ActivityBlock::Desafio => "Desafio",
            ActivityBlock::Substitutiva => "Substitutiva",
            ActivityBlock::Final => "Final",
            ActivityBlock::Other(s) => s.as_str(),
        }
    }

    pub fn is_two_block(&self) -> bool {
        matches!(self, ActivityBlock::N1 | ActivityBlock::N2)
    }

    /// Tags that only make sense in a modular (ST/Desafio) rubric.
    pub fn is_modular(&self) -> bool {
        matches!(
            self,
            ActivityBlock::ST1 | ActivityBlock::ST2 | ActivityBlock::Desafio
        )
    }
}

impl From<String> for ActivityBlock {
    fn from(s: String) -> Self {
        match s.trim() {
            "N1" => ActivityBlock::N1,
            "N2" => ActivityBlock::N2,
            "ST1" => ActivityBlock::ST1,
            "ST2" => ActivityBlock::ST2,
            "Desafio" => ActivityBlock::Desafio,
            "Substitutiva" => ActivityBlock::Substitutiva,
            "Final" => ActivityBlock::Final,
            other => ActivityBlock::Other(other.to_string()),
        }
    }
}

impl From<&str> for ActivityBlock {
    fn from(s: &str) -> Self {
        ActivityBlock::from(s.to_string())
    }
}

impl From<ActivityBlock> for String {
    fn from(b: ActivityBlock) -> Self {
        b.as_str().to_string()
    }
}

impl fmt::Display for ActivityBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: String,
    pub name: String,
    pub max_score: f64,
    pub group: ActivityBlock,
    pub order: i64,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeEntry {
    pub id: String,
    pub activity_id: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassroomStudentRecord {
    pub id: String,
    pub student_id: String,
    #[serde(default)]
    pub grades: Vec<GradeEntry>,
    #[serde(default)]
    pub group_id: Option<String>,
}

impl ClassroomStudentRecord {
    pub fn entry(&self, activity_id: &str) -> Option<&GradeEntry> {
        self.grades.iter().find(|g| g.activity_id == activity_id)
    }

    /// Overwrites the score for `activity_id`, creating the entry when absent.
    /// Returns true when the stored value changed.
    pub fn set_score(&mut self, activity_id: &str, score: f64) -> bool {
        if let Some(g) = self.grades.iter_mut().find(|g| g.activity_id == activity_id) {
            if g.score.to_bits() == score.to_bits() {
                return false;
            }
            g.score = score;
            return true;
        }
        self.grades.push(GradeEntry {
            id: uuid::Uuid::new_v4().to_string(),
            activity_id: activity_id.to_string(),
            score,
        });
        true
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassType {
    Integradora,
    Modular,
}

impl ClassType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "Integradora" => Some(ClassType::Integradora),
            "Modular" => Some(ClassType::Modular),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ClassType::Integradora => "Integradora",
            ClassType::Modular => "Modular",
        }
    }

    pub fn default_scheme(self) -> ScoringScheme {
        match self {
            ClassType::Integradora => ScoringScheme::TwoBlockCapped,
            ClassType::Modular => ScoringScheme::OpenSubtotals,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScoringScheme {
    TwoBlockCapped,
    OpenSubtotals,
}

impl ScoringScheme {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "twoBlockCapped" => Some(ScoringScheme::TwoBlockCapped),
            "openSubtotals" => Some(ScoringScheme::OpenSubtotals),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ScoringScheme::TwoBlockCapped => "twoBlockCapped",
            ScoringScheme::OpenSubtotals => "openSubtotals",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Situation {
    #[serde(rename = "Aprovado")]
    Aprovado,
    #[serde(rename = "Prova Final")]
    ProvaFinal,
    #[serde(rename = "Reprovado")]
    Reprovado,
}

impl Situation {
    pub fn as_str(self) -> &'static str {
        match self {
            Situation::Aprovado => "Aprovado",
            Situation::ProvaFinal => "Prova Final",
            Situation::Reprovado => "Reprovado",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classroom {
    pub id: String,
    pub name: String,
    pub class_type: Option<ClassType>,
    pub scoring_scheme: Option<ScoringScheme>,
    pub created_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_tags_parse_known_and_keep_unknown() {
        assert_eq!(ActivityBlock::from("N1"), ActivityBlock::N1);
        assert_eq!(ActivityBlock::from("Desafio"), ActivityBlock::Desafio);
        assert_eq!(
            ActivityBlock::from("Projeto"),
            ActivityBlock::Other("Projeto".to_string())
        );
        let json = serde_json::to_string(&ActivityBlock::Substitutiva).expect("serialize");
        assert_eq!(json, "\"Substitutiva\"");
    }

    #[test]
    fn set_score_creates_then_overwrites() {
        let mut r = ClassroomStudentRecord {
            id: "r1".into(),
            student_id: "s1".into(),
            grades: vec![],
            group_id: None,
        };
        assert!(r.set_score("a1", 4.0));
        assert!(!r.set_score("a1", 4.0));
        assert!(r.set_score("a1", 5.5));
        assert_eq!(r.grades.len(), 1);
        assert_eq!(r.entry("a1").map(|g| g.score), Some(5.5));
    }

    #[test]
    fn situation_serializes_with_display_labels() {
        let json = serde_json::to_string(&Situation::ProvaFinal).expect("serialize");
        assert_eq!(json, "\"Prova Final\"");
    }
}
