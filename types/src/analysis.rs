//! Section parser for analysis replies.
//!
//! The model is instructed to answer with `###` headings drawn from a fixed set of
//! categories, but in practice headings arrive reordered, decorated with different
//! emoji, repeated, or missing entirely. Parsing is therefore tolerant and total:
//! any text produces a document, and a document with no recognized headings is
//! reported as unparsed so callers can fall back to the raw text.
//!
//! The parser is re-run on every snapshot of a growing stream, so a half-received
//! heading line simply classifies as unknown until the rest of it arrives.

use serde::{Deserialize, Serialize};

/// Fixed set of analysis categories the system instruction asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnalysisCategory {
    Overview,
    Nutrients,
    Interactions,
    Products,
    Lifestyle,
    /// Routed into [`AnalysisDocument::tip`] rather than the section list.
    DailyTip,
    MedicalCaution,
}

impl AnalysisCategory {
    /// Categories in the order the system instruction lists them.
    pub const ALL: [Self; 7] = [
        Self::Overview,
        Self::Nutrients,
        Self::Interactions,
        Self::Products,
        Self::Lifestyle,
        Self::DailyTip,
        Self::MedicalCaution,
    ];

    #[must_use]
    pub fn title(self) -> &'static str {
        match self {
            Self::Overview => "종합 분석",
            Self::Nutrients => "추천 영양 성분",
            Self::Interactions => "성분 조절 및 약물 상호작용 주의사항",
            Self::Products => "추천 제품",
            Self::Lifestyle => "생활습관 개선 및 권고사항",
            Self::DailyTip => "오늘의 장-뇌 축 팁",
            Self::MedicalCaution => "의학적 주의사항",
        }
    }

    #[must_use]
    pub fn icon(self) -> &'static str {
        match self {
            Self::Overview => "🔬",
            Self::Nutrients => "💊",
            Self::Interactions => "⚖️",
            Self::Products => "🛒",
            Self::Lifestyle => "🌿",
            Self::DailyTip => "🌱",
            Self::MedicalCaution => "⚠️",
        }
    }

    /// Canonical heading line, e.g. `### 🔬 종합 분석`.
    #[must_use]
    pub fn heading(self) -> String {
        format!("### {} {}", self.icon(), self.title())
    }

    /// Classify heading text (without the `#` marker) by title containment.
    #[must_use]
    pub fn classify(heading: &str) -> Option<Self> {
        let title = strip_icon(heading);
        Self::ALL
            .into_iter()
            .find(|category| title.contains(category.title()))
    }
}

impl std::fmt::Display for AnalysisCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.title())
    }
}

/// A recognized section and its raw markdown body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub category: AnalysisCategory,
    pub body: String,
}

/// Structured view of an analysis reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisDocument {
    sections: Vec<Section>,
    tip: Option<String>,
}

#[derive(Clone, Copy)]
enum Slot {
    /// Before the first heading, or under an unknown heading.
    Discard,
    Category(AnalysisCategory),
}

impl AnalysisDocument {
    /// Parse markdown into sections. Never fails.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut doc = Self::default();
        let mut slot = Slot::Discard;
        let mut lines: Vec<&str> = Vec::new();

        for line in text.lines() {
            if let Some(heading) = heading_text(line) {
                doc.flush(slot, &lines);
                lines.clear();
                slot = AnalysisCategory::classify(heading).map_or(Slot::Discard, Slot::Category);
            } else {
                lines.push(line);
            }
        }
        doc.flush(slot, &lines);
        doc
    }

    fn flush(&mut self, slot: Slot, lines: &[&str]) {
        let Slot::Category(category) = slot else {
            return;
        };
        let body = lines.join("\n");
        let body = body.trim();

        if category == AnalysisCategory::DailyTip {
            match &mut self.tip {
                Some(existing) => append_body(existing, body),
                None => self.tip = Some(body.to_string()),
            }
            return;
        }

        match self.sections.iter_mut().find(|s| s.category == category) {
            Some(existing) => append_body(&mut existing.body, body),
            None => self.sections.push(Section {
                category,
                body: body.to_string(),
            }),
        }
    }

    /// Recognized sections in first-appearance order (tip excluded).
    #[must_use]
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    #[must_use]
    pub fn tip(&self) -> Option<&str> {
        self.tip.as_deref()
    }

    /// Body for a category, including the tip slot.
    #[must_use]
    pub fn get(&self, category: AnalysisCategory) -> Option<&str> {
        if category == AnalysisCategory::DailyTip {
            return self.tip();
        }
        self.sections
            .iter()
            .find(|s| s.category == category)
            .map(|s| s.body.as_str())
    }

    /// False when no heading was recognized; show the raw text instead.
    #[must_use]
    pub fn is_recognized(&self) -> bool {
        !self.sections.is_empty() || self.tip.is_some()
    }

    /// Item names from the recommended-nutrients section.
    #[must_use]
    pub fn supplements(&self) -> Vec<String> {
        self.get(AnalysisCategory::Nutrients)
            .map(extract_supplements)
            .unwrap_or_default()
    }

    /// Reserialize with canonical headings. The tip is written last.
    #[must_use]
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        let tip = self
            .tip
            .as_deref()
            .map(|body| (AnalysisCategory::DailyTip, body));
        let entries = self
            .sections
            .iter()
            .map(|s| (s.category, s.body.as_str()))
            .chain(tip);

        for (category, body) in entries {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&category.heading());
            out.push('\n');
            if !body.is_empty() {
                out.push_str(body);
                out.push('\n');
            }
        }
        out
    }
}

fn append_body(existing: &mut String, body: &str) {
    if body.is_empty() {
        return;
    }
    if !existing.is_empty() {
        existing.push_str("\n\n");
    }
    existing.push_str(body);
}

/// Text after an ATX heading marker (1-6 `#` then whitespace or end of line).
fn heading_text(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    let hashes = trimmed.bytes().take_while(|&b| b == b'#').count();
    if !(1..=6).contains(&hashes) {
        return None;
    }
    let rest = &trimmed[hashes..];
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return None;
    }
    Some(rest.trim())
}

/// Drop a leading icon token (one with no alphanumeric characters).
fn strip_icon(heading: &str) -> &str {
    let heading = heading.trim();
    match heading.split_once(char::is_whitespace) {
        Some((first, rest)) if !first.chars().any(char::is_alphanumeric) => rest.trim_start(),
        _ => heading,
    }
}

/// Lead bold names of bullet lines shaped like `- **name:** description`.
#[must_use]
pub fn extract_supplements(body: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for line in body.lines() {
        let Some(name) = bullet_name(line) else {
            continue;
        };
        if !names.iter().any(|existing| existing == name) {
            names.push(name.to_string());
        }
    }
    names
}

fn bullet_name(line: &str) -> Option<&str> {
    let line = line.trim_start();
    let rest = line
        .strip_prefix('-')
        .or_else(|| line.strip_prefix('*'))
        .or_else(|| line.strip_prefix('+'))?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let rest = rest.trim_start().strip_prefix("**")?;
    let end = rest.find(":**")?;
    let name = rest[..end].trim();
    (!name.is_empty()).then_some(name)
}

#[cfg(test)]
mod tests {
    use super::{AnalysisCategory, AnalysisDocument, extract_supplements};

    const SAMPLE: &str = "\
안녕하세요, 분석 결과입니다.

### 🔬 종합 분석
체지방률이 다소 높습니다.

### 💊 추천 영양 성분
- **오메가3:** 중성지방 관리
- **유산균:** 장 건강
일반 문장은 무시됩니다.

### ⚖️ 성분 조절 및 약물 상호작용 주의사항
- 와파린 복용 시 오메가3 주의

### 🌱 오늘의 장-뇌 축 팁
발효 식품을 드세요.

### ⚠️ 의학적 주의사항
본 분석은 참고용입니다.
";

    #[test]
    fn two_headings_yield_two_sections_and_one_supplement() {
        let doc = AnalysisDocument::parse(
            "### 🔬 종합 분석\nA\n### 💊 추천 영양 성분\n- **오메가3:** 설명",
        );
        assert!(doc.is_recognized());
        assert_eq!(doc.sections().len(), 2);
        assert_eq!(doc.get(AnalysisCategory::Overview), Some("A"));
        assert_eq!(doc.supplements(), vec!["오메가3".to_string()]);
    }

    #[test]
    fn text_without_headings_is_unparsed() {
        let doc = AnalysisDocument::parse("그냥 일반 답변입니다.\n- **오메가3:** 설명");
        assert!(!doc.is_recognized());
        assert!(doc.sections().is_empty());
        assert!(doc.tip().is_none());
        assert!(doc.supplements().is_empty());
    }

    #[test]
    fn empty_text_is_unparsed() {
        assert!(!AnalysisDocument::parse("").is_recognized());
    }

    #[test]
    fn preamble_and_unknown_sections_are_discarded() {
        let doc = AnalysisDocument::parse("인사말\n### 📋 기타 메모\n버려짐\n### 🛒 추천 제품\n제품 A");
        assert_eq!(doc.sections().len(), 1);
        assert_eq!(doc.get(AnalysisCategory::Products), Some("제품 A"));
        assert!(!doc.sections()[0].body.contains("버려짐"));
    }

    #[test]
    fn tip_goes_to_its_own_slot() {
        let doc = AnalysisDocument::parse(SAMPLE);
        assert_eq!(doc.tip(), Some("발효 식품을 드세요."));
        assert!(
            doc.sections()
                .iter()
                .all(|s| s.category != AnalysisCategory::DailyTip)
        );
        let order: Vec<_> = doc.sections().iter().map(|s| s.category).collect();
        assert_eq!(
            order,
            vec![
                AnalysisCategory::Overview,
                AnalysisCategory::Nutrients,
                AnalysisCategory::Interactions,
                AnalysisCategory::MedicalCaution,
            ]
        );
    }

    #[test]
    fn tip_alone_counts_as_recognized() {
        let doc = AnalysisDocument::parse("## 오늘의 장-뇌 축 팁\n물을 충분히");
        assert!(doc.is_recognized());
        assert!(doc.sections().is_empty());
    }

    #[test]
    fn headings_tolerate_level_icon_and_order() {
        let doc = AnalysisDocument::parse(
            "  ## 🥗 생활습관 개선 및 권고사항\n걷기\n# 종합 분석 요약\n양호\n#### 🧪🧪 추천 영양 성분\n",
        );
        assert_eq!(doc.get(AnalysisCategory::Lifestyle), Some("걷기"));
        assert_eq!(doc.get(AnalysisCategory::Overview), Some("양호"));
        assert_eq!(doc.get(AnalysisCategory::Nutrients), Some(""));
        assert_eq!(doc.sections()[0].category, AnalysisCategory::Lifestyle);
    }

    #[test]
    fn hash_without_space_is_body_text() {
        let doc = AnalysisDocument::parse("### 🔬 종합 분석\n#해시태그\n####### 일곱 개");
        assert_eq!(
            doc.get(AnalysisCategory::Overview),
            Some("#해시태그\n####### 일곱 개")
        );
    }

    #[test]
    fn repeated_category_is_appended() {
        let doc = AnalysisDocument::parse("### 🔬 종합 분석\n첫째\n### 🛒 추천 제품\nX\n### 🔬 종합 분석\n둘째");
        assert_eq!(doc.get(AnalysisCategory::Overview), Some("첫째\n\n둘째"));
        assert_eq!(doc.sections().len(), 2);
        assert_eq!(doc.sections()[0].category, AnalysisCategory::Overview);
    }

    #[test]
    fn partial_heading_while_streaming_is_not_recognized_yet() {
        let partial = "### 🔬 종합 분석\n좋습니다\n### 💊 추천 영";
        let doc = AnalysisDocument::parse(partial);
        assert_eq!(doc.sections().len(), 1);
        assert_eq!(doc.get(AnalysisCategory::Overview), Some("좋습니다"));

        let complete = format!("{partial}양 성분\n- **유산균:** 장 건강");
        let doc = AnalysisDocument::parse(&complete);
        assert_eq!(doc.sections().len(), 2);
        assert_eq!(doc.supplements(), vec!["유산균".to_string()]);
    }

    #[test]
    fn reserialization_is_idempotent() {
        for text in [
            SAMPLE,
            "no headings at all",
            "### 🔬 종합 분석\n",
            "### 🔬 종합 분석\nA\n### 🔬 종합 분석\nB\n### ⚠️ 의학적 주의사항\n\n\n주의",
            "## 🌱 오늘의 장-뇌 축 팁\n팁\n### 🛒 추천 제품\n- a\n  - b",
        ] {
            let doc = AnalysisDocument::parse(text);
            let reparsed = AnalysisDocument::parse(&doc.to_markdown());
            assert_eq!(reparsed, doc, "round trip changed {text:?}");
        }
    }

    #[test]
    fn canonical_markdown_uses_icons() {
        let doc = AnalysisDocument::parse("# 추천 제품\n제품");
        assert_eq!(doc.to_markdown(), "### 🛒 추천 제품\n제품\n");
    }

    #[test]
    fn supplement_bullets_accept_all_markers_and_dedupe() {
        let body = "- **오메가3:** a\n* **비타민D:** b\n+ **마그네슘 :** c\n- **오메가3:** again\n- **:** blank\n-**붙음:** x\n- **콜론없음** y\n  - **들여쓰기:** z";
        assert_eq!(
            extract_supplements(body),
            vec!["오메가3", "비타민D", "마그네슘", "들여쓰기"]
        );
    }

    #[test]
    fn classify_ignores_icon_and_requires_title() {
        assert_eq!(
            AnalysisCategory::classify("💊 추천 영양 성분"),
            Some(AnalysisCategory::Nutrients)
        );
        assert_eq!(
            AnalysisCategory::classify("1. 의학적 주의사항"),
            Some(AnalysisCategory::MedicalCaution)
        );
        assert_eq!(AnalysisCategory::classify("💊 영양"), None);
        assert_eq!(AnalysisCategory::classify(""), None);
    }
}
