//! Prompt text sent to the model.
//!
//! The section headings in the system instruction come from
//! [`AnalysisCategory::ALL`] so the parser and the prompt cannot drift apart.

use std::fmt::Write;
use std::str::FromStr;

use bodycode_types::AnalysisCategory;

/// Text recorded as the user's turn for the initial analysis.
pub const INITIAL_USER_TEXT: &str = "제 건강 데이터입니다. 분석해주세요.";

pub const VALIDATION_PROMPT: &str = "이 이미지가 인바디 결과지, 건강검진 결과표, 또는 유사한 의료 데이터 문서인지 판단해주세요. \"YES\" 또는 \"NO\"로만 대답해주세요.";

const NOT_PROVIDED: &str = "정보 없음";
const NO_SUPPLEMENTS: &str = "없음";

const PERSONA: &str = "\
[페르소나 및 지침]
당신은 '바디코드'의 수석 연구원이며 '장-뇌 축(Gut-Brain Axis)' 이론의 권위자이자 임상 약물 상호작용 전문가입니다. \
사용자의 건강 데이터를 분석해 안전하고 효과적인 개인 맞춤형 건강 솔루션을 제공하는 것이 핵심 임무입니다. \
모든 답변은 과학적 근거에 기반한 전문적인 내용이어야 하며, 사용자가 쉽게 이해하고 실천할 수 있도록 **핵심 키워드 중심**으로 구조화해 전달합니다.";

const STEPS: &str = "\
[분석 및 추천 로직]
1. **[1단계: 이미지 중심 종합 진단]** 업로드된 건강 데이터 이미지(인바디, 건강검진 결과 등)를 최우선으로 분석합니다. 체성분, 혈액 수치 등 이미지에서 확인되는 지표를 근거로 현재 건강 상태를 '장-뇌 축' 관점에서 진단합니다.
2. **[2단계: 분석의 한계 명시 및 상호작용 유도]** 결과 첫머리에 \"제공해주신 이미지를 바탕으로 분석한 결과입니다. 더 정확한 맞춤 추천을 위해, 후속 채팅으로 복용 중인 약물이나 생활 습관을 알려주시면 좋습니다.\"와 같이 이미지 분석의 한계를 밝히고 추가 정보 제공을 유도합니다.
3. **[3단계: 기본 조합 설계]** **프로바이오틱스, 오메가3, 종합비타민**을 기본 축으로 고려합니다.
4. **[4단계: 일반적 주의사항 안내]** 복용 약물 정보가 아직 없으므로 약물 상호작용과 성분 중복은 일반적인 관점에서 안내합니다. (예: \"고지혈증 약을 복용 중이시라면 코엔자임 Q10 보충을 고려해볼 수 있습니다.\") 후속 질문으로 약물 정보가 주어지면 그에 맞춰 구체적으로 분석합니다.
5. **[5단계: 분석 결과 제시]** 아래 항목을 포함한 마크다운 답변을 작성합니다. 각 항목은 ### 헤더와 이모지로 시작해야 하며, 추천 영양 성분은 `- **성분명:** 설명` 형식의 목록으로 작성합니다.";

const FOLLOW_UP_STEP: &str = "\
6. **[6단계: 후속 질문 응대]** 사용자가 이어서 질문하면(예: \"고혈압 약을 먹고 있어요\") 이전 대화 내용을 기억해 답변을 더욱 개인화합니다. 프리미엄 1:1 상담이 유료 서비스임을 인지하고 관련 질문에 답할 수 있어야 합니다. 모든 답변은 **표준 마크다운 형식**으로 제공합니다.";

/// System instruction for the analysis chat session.
#[must_use]
pub fn system_instruction() -> String {
    let mut out = String::new();
    out.push_str(PERSONA);
    out.push_str("\n\n");
    out.push_str(STEPS);
    out.push('\n');
    for category in AnalysisCategory::ALL {
        let _ = writeln!(out, "   - {}", category.heading());
    }
    out.push_str(FOLLOW_UP_STEP);
    out.push('\n');
    out
}

macro_rules! labeled_choice {
    (
        $(#[$meta:meta])*
        $name:ident { $($variant:ident => $label:literal | $alias:literal),+ $(,)? }
        default $default:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $(
                #[doc = $label]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &[Self] = &[$(Self::$variant),+];

            #[must_use]
            pub const fn label(self) -> &'static str {
                match self {
                    $(Self::$variant => $label,)+
                }
            }
        }

        impl FromStr for $name {
            type Err = String;

            /// Accepts the Korean label or its English alias, case-insensitively.
            fn from_str(raw: &str) -> Result<Self, Self::Err> {
                let raw = raw.trim();
                $(
                    if raw == $label || raw.eq_ignore_ascii_case($alias) {
                        return Ok(Self::$variant);
                    }
                )+
                let choices: Vec<String> = Self::ALL
                    .iter()
                    .map(|choice| choice.label().to_string())
                    .collect();
                Err(format!("unknown value '{raw}' (expected one of: {})", choices.join(", ")))
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.label())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::$default
            }
        }
    };
}

labeled_choice! {
    /// Self-reported stress.
    StressLevel { Low => "낮음" | "low", Normal => "보통" | "normal", High => "높음" | "high" }
    default Normal
}

labeled_choice! {
    SleepQuality { Good => "좋음" | "good", Normal => "보통" | "normal", Poor => "나쁨" | "poor" }
    default Normal
}

labeled_choice! {
    BowelRegularity { Regular => "규칙적" | "regular", Irregular => "불규칙적" | "irregular" }
    default Regular
}

/// Self-reported context sent along with the initial analysis.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdditionalInfo {
    pub stress: StressLevel,
    pub sleep: SleepQuality,
    pub bowel: BowelRegularity,
    /// Free text: medications, conditions, goals.
    pub notes: String,
}

fn or_not_provided(value: &str) -> &str {
    let value = value.trim();
    if value.is_empty() { NOT_PROVIDED } else { value }
}

/// Request text that accompanies the health data image.
#[must_use]
pub fn analysis_request(info: &AdditionalInfo) -> String {
    let mut out = String::from(
        "[분석 요청]\n아래 추가 정보를 바탕으로 업로드된 건강 데이터(인바디 또는 건강검진 결과) 이미지를 종합적으로 분석해주세요.\n",
    );
    let _ = writeln!(out, "- 스트레스 지수: {}", info.stress.label());
    let _ = writeln!(out, "- 수면의 질: {}", info.sleep.label());
    let _ = writeln!(out, "- 배변 활동 상태: {}", info.bowel.label());
    let _ = write!(out, "- 기타 건강 정보: {}", or_not_provided(&info.notes));
    out
}

/// Request text that accompanies the supplement image.
#[must_use]
pub fn compatibility_prompt(current_supplements: &str) -> String {
    let current = current_supplements.trim();
    let current = if current.is_empty() {
        NO_SUPPLEMENTS
    } else {
        current
    };
    format!(
        "[분석 요청]
1. 이미지 속 영양제 제품의 핵심 성분 1~3가지를 분석해줘.
2. 현재 복용 중인 영양제 목록은 다음과 같아: \"{current}\"
3. 위 두 정보를 바탕으로, 새로 추가할 영양제와의 '성분 궁합 점수'를 0점에서 100점 사이로 매겨줘.
4. 점수에 대한 구체적인 이유를 '궁합 분석'이라는 이름으로 설명해줘. (예: 시너지 효과, 흡수 방해, 성분 중복 등)
5. 반드시 아래의 JSON 형식으로만 답변해줘. 다른 설명은 절대 추가하지 마.

{{
  \"score\": <점수 (숫자)>,
  \"explanation\": \"<궁합 분석 결과 (한글 문자열)>\"
}}
"
    )
}
