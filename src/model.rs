use serde::{Deserialize, Serialize};

/// The fixed set of question types the platform administers. Each maps to
/// exactly one scoring family; new types slot into an existing family or add
/// one, without touching unrelated scoring code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QuestionType {
    SingleSelect,
    SingleSelectImage,
    Dropdown,
    MultiSelect,
    MultiSelectImage,
    SingleLineText,
    EmailAddress,
    CommentBox,
    ContactInfo,
    DragDropOrdering,
    StarRating,
    SmileRating,
    Calendar,
    DateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreFamily {
    /// One submitted value checked against one answer key.
    Single,
    /// Set membership with partial credit.
    Multi,
    /// Position-by-position comparison with per-position credit.
    Ordering,
    /// Per-sub-field comparison with per-field credit.
    Rating,
    /// Never auto-scored; a grader assigns the score later.
    Manual,
}

impl QuestionType {
    pub fn family(self) -> ScoreFamily {
        match self {
            QuestionType::SingleSelect
            | QuestionType::SingleSelectImage
            | QuestionType::Dropdown
            | QuestionType::SmileRating
            | QuestionType::Calendar => ScoreFamily::Single,
            QuestionType::MultiSelect | QuestionType::MultiSelectImage => ScoreFamily::Multi,
            QuestionType::DragDropOrdering => ScoreFamily::Ordering,
            QuestionType::StarRating => ScoreFamily::Rating,
            QuestionType::SingleLineText
            | QuestionType::EmailAddress
            | QuestionType::CommentBox
            | QuestionType::ContactInfo
            | QuestionType::DateTime => ScoreFamily::Manual,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QuestionType::SingleSelect => "singleSelect",
            QuestionType::SingleSelectImage => "singleSelectImage",
            QuestionType::Dropdown => "dropdown",
            QuestionType::MultiSelect => "multiSelect",
            QuestionType::MultiSelectImage => "multiSelectImage",
            QuestionType::SingleLineText => "singleLineText",
            QuestionType::EmailAddress => "emailAddress",
            QuestionType::CommentBox => "commentBox",
            QuestionType::ContactInfo => "contactInfo",
            QuestionType::DragDropOrdering => "dragDropOrdering",
            QuestionType::StarRating => "starRating",
            QuestionType::SmileRating => "smileRating",
            QuestionType::Calendar => "calendar",
            QuestionType::DateTime => "dateTime",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "singleSelect" => Some(QuestionType::SingleSelect),
            "singleSelectImage" => Some(QuestionType::SingleSelectImage),
            "dropdown" => Some(QuestionType::Dropdown),
            "multiSelect" => Some(QuestionType::MultiSelect),
            "multiSelectImage" => Some(QuestionType::MultiSelectImage),
            "singleLineText" => Some(QuestionType::SingleLineText),
            "emailAddress" => Some(QuestionType::EmailAddress),
            "commentBox" => Some(QuestionType::CommentBox),
            "contactInfo" => Some(QuestionType::ContactInfo),
            "dragDropOrdering" => Some(QuestionType::DragDropOrdering),
            "starRating" => Some(QuestionType::StarRating),
            "smileRating" => Some(QuestionType::SmileRating),
            "calendar" => Some(QuestionType::Calendar),
            "dateTime" => Some(QuestionType::DateTime),
            _ => None,
        }
    }
}

/// One rated sub-field of a star-rating question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingField {
    pub label: String,
    #[serde(default)]
    pub submitted: Option<String>,
    #[serde(default)]
    pub correct: Option<String>,
}

/// One free-text sub-field (name/phone/address lines of a contact block, a
/// comment box body, and so on).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextField {
    pub label: String,
    #[serde(default)]
    pub submitted: Option<String>,
}

/// The per-question answer "meta", one explicit shape per scoring family.
/// Normalized at the ingestion boundary so scoring never sees a shape that
/// mismatches its question type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum AnswerPayload {
    Single {
        #[serde(default)]
        submitted: Option<String>,
        #[serde(default)]
        answer_key: Option<String>,
    },
    Multi {
        #[serde(default)]
        submitted: Vec<String>,
        #[serde(default)]
        answer_key: Vec<String>,
    },
    Ordering {
        #[serde(default)]
        submitted: Vec<String>,
        #[serde(default)]
        answer_key: Vec<String>,
    },
    Rating {
        #[serde(default)]
        fields: Vec<RatingField>,
    },
    Text {
        #[serde(default)]
        fields: Vec<TextField>,
    },
}

impl AnswerPayload {
    /// The family a payload shape belongs to.
    pub fn family(&self) -> ScoreFamily {
        match self {
            AnswerPayload::Single { .. } => ScoreFamily::Single,
            AnswerPayload::Multi { .. } => ScoreFamily::Multi,
            AnswerPayload::Ordering { .. } => ScoreFamily::Ordering,
            AnswerPayload::Rating { .. } => ScoreFamily::Rating,
            AnswerPayload::Text { .. } => ScoreFamily::Manual,
        }
    }

    /// The empty payload for a family; it always scores 0.
    pub fn empty(family: ScoreFamily) -> Self {
        match family {
            ScoreFamily::Single => AnswerPayload::Single {
                submitted: None,
                answer_key: None,
            },
            ScoreFamily::Multi => AnswerPayload::Multi {
                submitted: Vec::new(),
                answer_key: Vec::new(),
            },
            ScoreFamily::Ordering => AnswerPayload::Ordering {
                submitted: Vec::new(),
                answer_key: Vec::new(),
            },
            ScoreFamily::Rating => AnswerPayload::Rating { fields: Vec::new() },
            ScoreFamily::Manual => AnswerPayload::Text { fields: Vec::new() },
        }
    }
}

/// A question snapshot frozen onto an attempt at submission time, together
/// with the submitted answer and the awarded score. Question-bank edits after
/// submission never reach these rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptQuestion {
    pub id: String,
    pub code: String,
    pub text: String,
    #[serde(rename = "type")]
    pub qtype: QuestionType,
    pub sort_order: i64,
    pub marks: f64,
    pub payload: AnswerPayload,
    pub score: Option<f64>,
    pub is_external: bool,
}

/// One respondent's one submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attempt {
    pub id: String,
    pub owner_id: String,
    pub respondent_email: String,
    pub external_name: Option<String>,
    pub attempt_number: i64,
    pub time_taken_seconds: i64,
    pub started_at: Option<String>,
    pub ended_at: Option<String>,
    pub is_redo: bool,
    pub total_marks: Option<f64>,
    pub questions: Vec<AttemptQuestion>,
}

/// The derived, queryable projection of an attempt. `seq` is the results
/// table rowid and serves as the creation-order proxy for Latest/Earliest
/// reduction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRecord {
    pub id: String,
    pub seq: i64,
    pub owner_id: String,
    pub attempt_id: String,
    pub respondent_email: String,
    pub score: f64,
    pub total_marks: f64,
    pub percentage: i64,
    pub grade_band: Option<String>,
    pub time_taken_seconds: i64,
}

/// Scored question snapshot carried on a result. `correct` is only recorded
/// for gradable auto-scored questions; structural (0-mark) and manual rows
/// stay out of correctness ratios.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultQuestion {
    pub code: String,
    pub text: String,
    #[serde(rename = "type")]
    pub qtype: QuestionType,
    pub sort_order: i64,
    pub marks: f64,
    pub score: f64,
    pub correct: Option<bool>,
    pub is_external: bool,
}

/// A named percentage range used to classify a result. Ordered list owned by
/// the assessment/survey definition; resolution is first-match over stored
/// order, so overlapping or gapped source data is acceptable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CriteriaBand {
    pub from_pct: f64,
    pub to_pct: f64,
    pub title: String,
}

/// How to collapse multiple attempts by the same respondent into one result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReducePolicy {
    Highest,
    Lowest,
    Latest,
    Earliest,
}

impl ReducePolicy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "highest" => Some(ReducePolicy::Highest),
            "lowest" => Some(ReducePolicy::Lowest),
            "latest" => Some(ReducePolicy::Latest),
            "earliest" => Some(ReducePolicy::Earliest),
            _ => None,
        }
    }
}
