use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntakeField {
    Name,
    Gender,
    Age,
    CurrentState,
    CounselingGoal,
    PriorExperience,
}

impl IntakeField {
    pub const ALL: [IntakeField; 6] = [
        IntakeField::Name,
        IntakeField::Gender,
        IntakeField::Age,
        IntakeField::CurrentState,
        IntakeField::CounselingGoal,
        IntakeField::PriorExperience,
    ];

    /// Key the backend uses for this field.
    pub fn wire_key(self) -> &'static str {
        match self {
            IntakeField::Name => "이름",
            IntakeField::Gender => "성별",
            IntakeField::Age => "나이",
            IntakeField::CurrentState => "상태",
            IntakeField::CounselingGoal => "상담받고싶은내용",
            IntakeField::PriorExperience => "이전상담경험",
        }
    }

    pub fn label(self) -> &'static str {
        labels(self).0
    }

    pub fn question(self) -> &'static str {
        labels(self).1
    }
}

impl fmt::Display for IntakeField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Display label and scripted question per field.
fn labels(field: IntakeField) -> (&'static str, &'static str) {
    match field {
        IntakeField::Name => ("이름", "이름을 입력해주세요."),
        IntakeField::Gender => ("성별", "성별을 입력해주세요."),
        IntakeField::Age => ("나이", "나이를 입력해주세요."),
        IntakeField::CurrentState => ("현재 상태", "요즘 마음 상태는 어떠신가요?"),
        IntakeField::CounselingGoal => ("상담받고 싶은 내용", "어떤 내용으로 상담받고 싶으신가요?"),
        IntakeField::PriorExperience => ("이전 상담 경험", "이전에 상담을 받아보신 경험이 있나요?"),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub email: Option<String>,
    pub name: Option<String>,
    pub gender: Option<String>,
    pub age: Option<u8>,
    pub current_state: Option<String>,
}

impl UserProfile {
    pub fn guest() -> Self {
        Self::default()
    }

    /// Whether the profile alone fills every profile-backed field.
    pub fn is_complete(&self) -> bool {
        present(&self.name)
            && present(&self.gender)
            && self.age.is_some()
            && present(&self.current_state)
    }
}

fn present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntakeForm {
    pub name: Option<String>,
    pub gender: Option<String>,
    /// Raw answer as the user typed it.
    pub age: Option<String>,
    pub current_state: Option<String>,
    pub counseling_goal: Option<String>,
    pub prior_experience: Option<String>,
}

impl IntakeForm {
    pub fn from_profile(profile: &UserProfile) -> Self {
        let clean = |v: &Option<String>| v.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(String::from);
        Self {
            name: clean(&profile.name),
            gender: clean(&profile.gender),
            age: profile.age.map(|a| a.to_string()),
            current_state: clean(&profile.current_state),
            counseling_goal: None,
            prior_experience: None,
        }
    }

    pub fn is_filled(&self, field: IntakeField) -> bool {
        self.value(field).is_some()
    }

    pub fn value(&self, field: IntakeField) -> Option<&str> {
        let slot = match field {
            IntakeField::Name => &self.name,
            IntakeField::Gender => &self.gender,
            IntakeField::Age => &self.age,
            IntakeField::CurrentState => &self.current_state,
            IntakeField::CounselingGoal => &self.counseling_goal,
            IntakeField::PriorExperience => &self.prior_experience,
        };
        slot.as_deref()
    }

    /// Records the trimmed answer. Callers reject blank input before this.
    pub fn record(&mut self, field: IntakeField, answer: &str) {
        let answer = Some(answer.trim().to_string());
        match field {
            IntakeField::Name => self.name = answer,
            IntakeField::Gender => self.gender = answer,
            IntakeField::Age => self.age = answer,
            IntakeField::CurrentState => self.current_state = answer,
            IntakeField::CounselingGoal => self.counseling_goal = answer,
            IntakeField::PriorExperience => self.prior_experience = answer,
        }
    }

    /// Age as a number when the answer reads as one, e.g. "24" or "24세".
    pub fn numeric_age(&self) -> Option<u8> {
        self.age
            .as_deref()?
            .trim()
            .trim_end_matches('살')
            .trim_end_matches('세')
            .trim()
            .parse()
            .ok()
    }

    /// Snapshot keyed by wire keys; unset fields are `null`. A numeric age
    /// goes out as a number, anything else as the raw text.
    pub fn to_wire(&self) -> Map<String, Value> {
        let mut map = Map::new();
        for field in IntakeField::ALL {
            let value = match (field, self.numeric_age()) {
                (IntakeField::Age, Some(age)) => Value::from(age),
                _ => self.value(field).map(Value::from).unwrap_or(Value::Null),
            };
            map.insert(field.wire_key().to_string(), value);
        }
        map
    }
}
