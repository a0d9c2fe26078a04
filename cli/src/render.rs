//! Plain-text rendering of engine state.

use std::fmt::Write;

use bodycode_engine::{AnalysisDocument, CompatibilityResult, MEDICAL_DISCLAIMER, ReminderPlan};

/// Sections, tip and supplement list; the raw reply when nothing was recognized.
pub fn analysis(raw: &str, document: &AnalysisDocument) -> String {
    let mut out = String::new();
    if !document.is_recognized() {
        out.push_str(raw.trim());
        out.push_str("\n\n");
        out.push_str(MEDICAL_DISCLAIMER);
        out.push('\n');
        return out;
    }

    for section in document.sections() {
        let _ = writeln!(out, "{}\n{}\n", section.category.heading(), section.body);
    }
    if let Some(tip) = document.tip() {
        let _ = writeln!(out, "[오늘의 장-뇌 축 팁] {tip}\n");
    }

    let supplements = document.supplements();
    if !supplements.is_empty() {
        let _ = writeln!(out, "추천 영양제: {}\n", supplements.join(", "));
    }
    out.push_str(MEDICAL_DISCLAIMER);
    out.push('\n');
    out
}

pub fn reminders(plan: &ReminderPlan) -> String {
    if plan.is_empty() {
        return "추천된 영양제가 없습니다.\n".to_string();
    }
    let mut out = String::new();
    for (name, times) in plan.entries() {
        let labels: Vec<&str> = times.iter().map(|time| time.label()).collect();
        let when = if labels.is_empty() {
            "-".to_string()
        } else {
            labels.join(", ")
        };
        let _ = writeln!(out, "  {name}: {when}");
    }
    if plan.is_saved() {
        out.push_str("(저장됨)\n");
    }
    out
}

pub fn compatibility(result: &CompatibilityResult) -> String {
    format!(
        "성분 궁합 점수: {}점 ({})\n\n궁합 분석\n{}\n",
        result.score(),
        result.grade().label(),
        result.explanation()
    )
}
