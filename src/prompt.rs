use crate::profile::{IntakeField, IntakeForm};

const NOT_PROVIDED: &str = "미입력";

const PREAMBLE: &str = "당신은 따뜻하고 공감적인 심리 상담사입니다. \
아래 내담자 정보를 참고하여 내담자의 감정을 존중하며 상담을 진행하세요.";

const RESPONSE_FORMAT: &str = "반드시 다음 JSON 형식으로만 응답하세요: \
{\"감정\": \"내담자의 현재 감정\", \"상담사_응답\": \"내담자에게 건넬 답변\", \
\"요약\": \"지금까지의 상담 요약\", \"세션_종료\": false}. \
내담자가 상담을 마치고 싶어 하면 \"세션_종료\"를 true로 설정하세요.";

/// Folds the intake form into the counselor system prompt.
pub fn system_prompt(form: &IntakeForm) -> String {
    let mut prompt = String::from(PREAMBLE);
    prompt.push_str("\n\n[내담자 정보]\n");
    for field in IntakeField::ALL {
        let value = form.value(field).unwrap_or(NOT_PROVIDED);
        prompt.push_str(&format!("- {}: {}\n", field.label(), value));
    }
    prompt.push('\n');
    prompt.push_str(RESPONSE_FORMAT);
    prompt
}
