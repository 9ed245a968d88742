use crate::model::{Activity, ActivityBlock, GradeEntry, ScoringScheme, Situation};
use serde::Serialize;
use std::collections::HashMap;

/// Ceiling applied to each N1/N2 block sum, independent of the activities' max scores.
pub const BLOCK_CAP: f64 = 10.0;

pub const APPROVED_MIN: f64 = 7.0;
pub const FINAL_EXAM_MIN: f64 = 4.0;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RubricIssue {
    #[error("rubric mixes N1/N2 blocks with modular blocks ({modular})")]
    MixedBlocks { modular: String },
    #[error("duplicate activity id: {0}")]
    DuplicateActivityId(String),
}

impl RubricIssue {
    pub fn code(&self) -> &'static str {
        match self {
            RubricIssue::MixedBlocks { .. } => "mixed_rubric",
            RubricIssue::DuplicateActivityId(_) => "bad_params",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TwoBlockResult {
    pub n1_total: f64,
    pub n2_total: f64,
    pub final_grade: f64,
    pub situation: Situation,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockSubtotal {
    pub block: ActivityBlock,
    pub label: String,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeReport {
    pub scheme: ScoringScheme,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub two_block: Option<TwoBlockResult>,
    pub subtotals: Vec<BlockSubtotal>,
}

impl GradeReport {
    pub fn final_grade(&self) -> Option<f64> {
        self.two_block.map(|t| t.final_grade)
    }

    pub fn situation(&self) -> Option<Situation> {
        self.two_block.map(|t| t.situation)
    }
}

/// Score per activity id. Entries for the same activity keep the last value seen.
fn score_index(grades: &[GradeEntry]) -> HashMap<&str, f64> {
    let mut out = HashMap::with_capacity(grades.len());
    for g in grades {
        out.insert(g.activity_id.as_str(), g.score);
    }
    out
}

fn active_sorted(activities: &[Activity]) -> Vec<&Activity> {
    let mut out: Vec<&Activity> = activities.iter().filter(|a| a.active).collect();
    out.sort_by_key(|a| a.order);
    out
}

fn raw_block_sum(activities: &[Activity], scores: &HashMap<&str, f64>, block: &ActivityBlock) -> f64 {
    activities
        .iter()
        .filter(|a| a.active && a.group == *block)
        .map(|a| scores.get(a.id.as_str()).copied().unwrap_or(0.0))
        .sum()
}

/// `min(10, sum)` over the active activities tagged `block`; missing entries count as 0.
pub fn block_total(activities: &[Activity], grades: &[GradeEntry], block: &ActivityBlock) -> f64 {
    let scores = score_index(grades);
    raw_block_sum(activities, &scores, block).min(BLOCK_CAP)
}

pub fn classify(final_grade: f64) -> Situation {
    if final_grade >= APPROVED_MIN {
        Situation::Aprovado
    } else if final_grade >= FINAL_EXAM_MIN {
        Situation::ProvaFinal
    } else {
        Situation::Reprovado
    }
}

/// Mode A. Activities tagged with anything other than N1/N2 do not contribute.
pub fn two_block_grade(activities: &[Activity], grades: &[GradeEntry]) -> TwoBlockResult {
    let n1_total = block_total(activities, grades, &ActivityBlock::N1);
    let n2_total = block_total(activities, grades, &ActivityBlock::N2);
    let final_grade = (n1_total + n2_total) / 2.0;
    TwoBlockResult {
        n1_total,
        n2_total,
        final_grade,
        situation: classify(final_grade),
    }
}

/// Mode B. One uncapped subtotal per non-N1/N2 tag, in activity order of first appearance.
pub fn open_subtotals(activities: &[Activity], grades: &[GradeEntry]) -> Vec<BlockSubtotal> {
    let scores = score_index(grades);
    let mut out: Vec<BlockSubtotal> = Vec::new();
    for a in active_sorted(activities) {
        if a.group.is_two_block() {
            continue;
        }
        let score = scores.get(a.id.as_str()).copied().unwrap_or(0.0);
        match out.iter_mut().find(|s| s.block == a.group) {
            Some(s) => s.total += score,
            None => out.push(BlockSubtotal {
                block: a.group.clone(),
                label: format!("{} Total", a.group),
                total: score,
            }),
        }
    }
    out
}

/// Scheme used when a classroom declares none: N1/N2 tags present means Mode A.
pub fn infer_scheme(activities: &[Activity]) -> ScoringScheme {
    if activities.iter().any(|a| a.active && a.group.is_two_block()) {
        ScoringScheme::TwoBlockCapped
    } else {
        ScoringScheme::OpenSubtotals
    }
}

pub fn evaluate(
    activities: &[Activity],
    grades: &[GradeEntry],
    scheme: ScoringScheme,
) -> GradeReport {
    let two_block = match scheme {
        ScoringScheme::TwoBlockCapped => Some(two_block_grade(activities, grades)),
        ScoringScheme::OpenSubtotals => None,
    };
    GradeReport {
        scheme,
        two_block,
        subtotals: open_subtotals(activities, grades),
    }
}

pub fn validate_rubric(activities: &[Activity]) -> Result<(), RubricIssue> {
    let mut seen = std::collections::HashSet::new();
    for a in activities {
        if !seen.insert(a.id.as_str()) {
            return Err(RubricIssue::DuplicateActivityId(a.id.clone()));
        }
    }

    let has_two_block = activities.iter().any(|a| a.active && a.group.is_two_block());
    let mut modular: Vec<&str> = activities
        .iter()
        .filter(|a| a.active && a.group.is_modular())
        .map(|a| a.group.as_str())
        .collect();
    modular.sort_unstable();
    modular.dedup();
    if has_two_block && !modular.is_empty() {
        return Err(RubricIssue::MixedBlocks {
            modular: modular.join(", "),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn activity(id: &str, block: &str, max: f64, order: i64) -> Activity {
        Activity {
            id: id.to_string(),
            name: id.to_string(),
            max_score: max,
            group: ActivityBlock::from(block),
            order,
            active: true,
        }
    }

    fn entry(activity_id: &str, score: f64) -> GradeEntry {
        GradeEntry {
            id: format!("g-{}", activity_id),
            activity_id: activity_id.to_string(),
            score,
        }
    }

    #[test]
    fn block_sum_is_capped_at_ten() {
        let acts = vec![
            activity("a", "N1", 6.0, 0),
            activity("b", "N1", 6.0, 1),
            activity("c", "N1", 6.0, 2),
        ];
        let grades = vec![entry("a", 6.0), entry("b", 6.0), entry("c", 6.0)];
        assert_eq!(block_total(&acts, &grades, &ActivityBlock::N1), 10.0);
    }

    #[test]
    fn cap_is_literal_not_sum_of_max_scores() {
        // Block max scores add up to 4, the ceiling still sits at 10.
        let acts = vec![activity("a", "N2", 2.0, 0), activity("b", "N2", 2.0, 1)];
        let grades = vec![entry("a", 5.0), entry("b", 3.5)];
        assert_eq!(block_total(&acts, &grades, &ActivityBlock::N2), 8.5);
    }

    #[test]
    fn missing_entry_counts_as_zero() {
        let acts = vec![activity("a", "N1", 2.0, 0), activity("b", "N1", 6.0, 1)];
        let grades = vec![entry("b", 5.0)];
        assert_eq!(block_total(&acts, &grades, &ActivityBlock::N1), 5.0);
    }

    #[test]
    fn final_grade_is_mean_of_block_totals() {
        let acts = vec![activity("a", "N1", 10.0, 0), activity("b", "N2", 10.0, 1)];
        let grades = vec![entry("a", 8.0), entry("b", 6.0)];
        let r = two_block_grade(&acts, &grades);
        assert_eq!(r.n1_total, 8.0);
        assert_eq!(r.n2_total, 6.0);
        assert_eq!(r.final_grade, 7.0);
        assert_eq!(r.situation, Situation::Aprovado);
    }

    #[test]
    fn classification_boundaries() {
        assert_eq!(classify(7.0), Situation::Aprovado);
        assert_eq!(classify(6.999), Situation::ProvaFinal);
        assert_eq!(classify(4.0), Situation::ProvaFinal);
        assert_eq!(classify(3.999), Situation::Reprovado);
        assert_eq!(classify(0.0), Situation::Reprovado);
        assert_eq!(classify(10.0), Situation::Aprovado);
    }

    #[test]
    fn non_two_block_tags_are_ignored_in_mode_a() {
        let acts = vec![
            activity("a", "N1", 10.0, 0),
            activity("b", "ST1", 10.0, 1),
            activity("c", "N2", 10.0, 2),
        ];
        let grades = vec![entry("a", 4.0), entry("b", 10.0), entry("c", 4.0)];
        let r = two_block_grade(&acts, &grades);
        assert_eq!(r.final_grade, 4.0);
    }

    #[test]
    fn inactive_activity_is_excluded_and_restored_on_reactivation() {
        let mut acts = vec![activity("a", "N1", 6.0, 0), activity("b", "N1", 6.0, 1)];
        let grades = vec![entry("a", 3.0), entry("b", 4.0)];
        assert_eq!(block_total(&acts, &grades, &ActivityBlock::N1), 7.0);

        acts[1].active = false;
        assert_eq!(block_total(&acts, &grades, &ActivityBlock::N1), 3.0);
        assert_eq!(grades[1].score, 4.0);

        acts[1].active = true;
        assert_eq!(block_total(&acts, &grades, &ActivityBlock::N1), 7.0);
    }

    #[test]
    fn entries_for_unknown_activities_are_ignored() {
        let acts = vec![activity("a", "N1", 10.0, 0)];
        let grades = vec![entry("a", 2.0), entry("gone", 9.0)];
        assert_eq!(block_total(&acts, &grades, &ActivityBlock::N1), 2.0);
    }

    #[test]
    fn open_subtotals_are_uncapped_and_ordered() {
        let acts = vec![
            activity("st2", "ST2", 10.0, 2),
            activity("st1", "ST1", 10.0, 0),
            activity("d", "Desafio", 10.0, 1),
            activity("st1b", "ST1", 10.0, 3),
        ];
        let grades = vec![
            entry("st1", 9.0),
            entry("st1b", 8.0),
            entry("d", 7.5),
            entry("st2", 6.0),
        ];
        let subs = open_subtotals(&acts, &grades);
        let labels: Vec<&str> = subs.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, vec!["ST1 Total", "Desafio Total", "ST2 Total"]);
        assert_eq!(subs[0].total, 17.0);
        assert_eq!(subs[1].total, 7.5);
    }

    #[test]
    fn evaluate_follows_declared_scheme() {
        let acts = vec![activity("a", "ST1", 10.0, 0)];
        let grades = vec![entry("a", 9.0)];
        let open = evaluate(&acts, &grades, ScoringScheme::OpenSubtotals);
        assert!(open.final_grade().is_none());
        assert!(open.situation().is_none());
        assert_eq!(open.subtotals.len(), 1);

        let capped = evaluate(&acts, &grades, ScoringScheme::TwoBlockCapped);
        assert_eq!(capped.final_grade(), Some(0.0));
        assert_eq!(capped.situation(), Some(Situation::Reprovado));
    }

    #[test]
    fn scheme_inference_and_mixed_rubric_validation() {
        let integradora = vec![activity("a", "N1", 2.0, 0), activity("b", "N2", 6.0, 1)];
        assert_eq!(infer_scheme(&integradora), ScoringScheme::TwoBlockCapped);
        assert!(validate_rubric(&integradora).is_ok());

        let mut mixed = integradora.clone();
        mixed.push(activity("c", "Desafio", 10.0, 2));
        let issue = validate_rubric(&mixed).expect_err("mixed rubric");
        assert_eq!(issue.code(), "mixed_rubric");

        mixed[2].active = false;
        assert!(validate_rubric(&mixed).is_ok());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let acts = vec![activity("a", "N1", 2.0, 0), activity("a", "N2", 6.0, 1)];
        assert_eq!(
            validate_rubric(&acts),
            Err(RubricIssue::DuplicateActivityId("a".to_string()))
        );
    }
}
