use crate::calc;
use crate::model::{Activity, ClassroomStudentRecord, Situation};
use crate::store::StudentDirectory;
use serde::Serialize;

pub const HISTOGRAM_BINS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentAnalytics {
    pub student_id: String,
    pub name: String,
    pub final_grade: f64,
    pub situation: Situation,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryStats {
    pub count: usize,
    pub average: f64,
    pub highest: f64,
    pub lowest: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistogramBin {
    pub label: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassAnalytics {
    pub students: Vec<StudentAnalytics>,
    pub summary: SummaryStats,
    pub histogram: Vec<HistogramBin>,
    pub situations: SituationCounts,
    pub excluded_records: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SituationCounts {
    pub aprovado: usize,
    pub prova_final: usize,
    pub reprovado: usize,
}

pub fn summarize(grades: &[f64]) -> SummaryStats {
    if grades.is_empty() {
        return SummaryStats {
            count: 0,
            average: 0.0,
            highest: 0.0,
            lowest: 0.0,
        };
    }
    let sum: f64 = grades.iter().sum();
    SummaryStats {
        count: grades.len(),
        average: sum / grades.len() as f64,
        highest: grades.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        lowest: grades.iter().copied().fold(f64::INFINITY, f64::min),
    }
}

pub fn histogram_bin(final_grade: f64) -> usize {
    if final_grade.is_nan() || final_grade < 0.0 {
        return 0;
    }
    (final_grade.floor() as usize).min(HISTOGRAM_BINS - 1)
}

pub fn histogram(grades: &[f64]) -> Vec<HistogramBin> {
    let mut counts = [0usize; HISTOGRAM_BINS];
    for g in grades {
        counts[histogram_bin(*g)] += 1;
    }
    counts
        .iter()
        .enumerate()
        .map(|(i, c)| HistogramBin {
            label: format!("{}-{}", i, i + 1),
            count: *c,
        })
        .collect()
}

/// Mode A over every enrolled record; records without a resolvable student are skipped.
pub fn class_analytics<D: StudentDirectory + ?Sized>(
    directory: &D,
    activities: &[Activity],
    records: &[ClassroomStudentRecord],
) -> anyhow::Result<ClassAnalytics> {
    let mut students = Vec::with_capacity(records.len());
    let mut excluded_records = 0;
    for r in records {
        let Some(student) = directory.resolve(&r.student_id)? else {
            excluded_records += 1;
            continue;
        };
        let result = calc::two_block_grade(activities, &r.grades);
        students.push(StudentAnalytics {
            student_id: student.id,
            name: student.name,
            final_grade: result.final_grade,
            situation: result.situation,
        });
    }

    let finals: Vec<f64> = students.iter().map(|s| s.final_grade).collect();
    let mut situations = SituationCounts::default();
    for s in &students {
        match s.situation {
            Situation::Aprovado => situations.aprovado += 1,
            Situation::ProvaFinal => situations.prova_final += 1,
            Situation::Reprovado => situations.reprovado += 1,
        }
    }

    Ok(ClassAnalytics {
        summary: summarize(&finals),
        histogram: histogram(&finals),
        students,
        situations,
        excluded_records,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ActivityBlock, GradeEntry, Student};
    use std::collections::HashMap;

    struct MapDirectory(HashMap<String, Student>);

    impl StudentDirectory for MapDirectory {
        fn resolve(&self, student_id: &str) -> anyhow::Result<Option<Student>> {
            Ok(self.0.get(student_id).cloned())
        }
    }

    fn directory(ids: &[&str]) -> MapDirectory {
        MapDirectory(
            ids.iter()
                .map(|id| {
                    (
                        id.to_string(),
                        Student {
                            id: id.to_string(),
                            name: format!("Student {}", id),
                            email: format!("{}@example.com", id),
                            registration_id: None,
                        },
                    )
                })
                .collect(),
        )
    }

    fn rubric() -> Vec<Activity> {
        vec![
            Activity {
                id: "n1".into(),
                name: "Entrega N1".into(),
                max_score: 10.0,
                group: ActivityBlock::N1,
                order: 0,
                active: true,
            },
            Activity {
                id: "n2".into(),
                name: "Entrega N2".into(),
                max_score: 10.0,
                group: ActivityBlock::N2,
                order: 1,
                active: true,
            },
        ]
    }

    fn record(student_id: &str, n1: f64, n2: f64) -> ClassroomStudentRecord {
        ClassroomStudentRecord {
            id: format!("rec-{}", student_id),
            student_id: student_id.to_string(),
            grades: vec![
                GradeEntry {
                    id: format!("{}-n1", student_id),
                    activity_id: "n1".into(),
                    score: n1,
                },
                GradeEntry {
                    id: format!("{}-n2", student_id),
                    activity_id: "n2".into(),
                    score: n2,
                },
            ],
            group_id: None,
        }
    }

    #[test]
    fn empty_set_defaults_to_zero() {
        let s = summarize(&[]);
        assert_eq!(s.count, 0);
        assert_eq!((s.average, s.highest, s.lowest), (0.0, 0.0, 0.0));
        let h = histogram(&[]);
        assert_eq!(h.len(), 10);
        assert_eq!(h[0].label, "0-1");
        assert_eq!(h[9].label, "9-10");
        assert!(h.iter().all(|b| b.count == 0));
    }

    #[test]
    fn bins_clamp_top_and_bottom() {
        assert_eq!(histogram_bin(10.0), 9);
        assert_eq!(histogram_bin(12.5), 9);
        assert_eq!(histogram_bin(9.99), 9);
        assert_eq!(histogram_bin(6.5), 6);
        assert_eq!(histogram_bin(0.0), 0);
        assert_eq!(histogram_bin(-1.0), 0);
    }

    #[test]
    fn histogram_total_matches_resolved_students() {
        let grades = vec![0.0, 3.5, 4.0, 6.99, 7.0, 9.5, 10.0, 10.0];
        let total: usize = histogram(&grades).iter().map(|b| b.count).sum();
        assert_eq!(total, grades.len());

        let all_tens = vec![10.0; 5];
        let h = histogram(&all_tens);
        assert_eq!(h[9].count, 5);
        assert_eq!(h.iter().map(|b| b.count).sum::<usize>(), 5);
    }

    #[test]
    fn rollup_skips_unresolved_students() {
        let dir = directory(&["a", "b"]);
        let records = vec![record("a", 10.0, 8.0), record("b", 4.0, 2.0), record("ghost", 10.0, 10.0)];
        let out = class_analytics(&dir, &rubric(), &records).expect("analytics");

        assert_eq!(out.students.len(), 2);
        assert_eq!(out.excluded_records, 1);
        assert_eq!(out.students[0].final_grade, 9.0);
        assert_eq!(out.students[0].situation, Situation::Aprovado);
        assert_eq!(out.students[1].final_grade, 3.0);
        assert_eq!(out.students[1].situation, Situation::Reprovado);
        assert_eq!(out.summary.average, 6.0);
        assert_eq!(out.summary.highest, 9.0);
        assert_eq!(out.summary.lowest, 3.0);
        assert_eq!(out.histogram.iter().map(|b| b.count).sum::<usize>(), 2);
        assert_eq!(out.situations.aprovado, 1);
        assert_eq!(out.situations.reprovado, 1);
    }
}
