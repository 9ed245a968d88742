use crate::model::{Activity, ActivityBlock, ClassType};
use uuid::Uuid;

const INTEGRADORA: &[(&str, f64, ActivityBlock)] = &[
    ("Análise+Benchmark", 2.0, ActivityBlock::N1),
    ("Solução Preliminar", 2.0, ActivityBlock::N1),
    ("Entrega N1", 6.0, ActivityBlock::N1),
    ("Checks", 1.0, ActivityBlock::N2),
    ("Caderno Técnico", 3.0, ActivityBlock::N2),
    ("Entrega N2", 6.0, ActivityBlock::N2),
];

const MODULAR: &[(&str, f64, ActivityBlock)] = &[
    ("ST1", 10.0, ActivityBlock::ST1),
    ("Desafio 4.0 ou Case", 10.0, ActivityBlock::Desafio),
    ("ST2", 10.0, ActivityBlock::ST2),
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PresetError {
    #[error("preset already applied: classroom has {existing} activities")]
    AlreadyApplied { existing: usize },
}

impl PresetError {
    pub fn code(&self) -> &'static str {
        match self {
            PresetError::AlreadyApplied { .. } => "preset_already_applied",
        }
    }
}

/// Fresh activity list for `class_type`. Ids are new on every call.
pub fn apply_preset(class_type: ClassType) -> Vec<Activity> {
    let template = match class_type {
        ClassType::Integradora => INTEGRADORA,
        ClassType::Modular => MODULAR,
    };
    template
        .iter()
        .enumerate()
        .map(|(i, (name, max_score, block))| Activity {
            id: Uuid::new_v4().to_string(),
            name: (*name).to_string(),
            max_score: *max_score,
            group: block.clone(),
            order: i as i64,
            active: true,
        })
        .collect()
}

/// Activities to install automatically: only when none exist and the class type is known.
pub fn auto_preset(existing: &[Activity], class_type: Option<ClassType>) -> Option<Vec<Activity>> {
    if !existing.is_empty() {
        return None;
    }
    class_type.map(apply_preset)
}

/// Explicit (re)application. Replacing a non-empty rubric requires `confirmed`.
pub fn plan_preset(
    existing: &[Activity],
    class_type: ClassType,
    confirmed: bool,
) -> Result<Vec<Activity>, PresetError> {
    if !existing.is_empty() && !confirmed {
        return Err(PresetError::AlreadyApplied {
            existing: existing.len(),
        });
    }
    Ok(apply_preset(class_type))
}

/// Flips `active` on one activity. Returns false when the id is unknown.
pub fn toggle_activity(activities: &mut [Activity], activity_id: &str, active: bool) -> bool {
    match activities.iter_mut().find(|a| a.id == activity_id) {
        Some(a) => {
            a.active = active;
            true
        }
        None => false,
    }
}
