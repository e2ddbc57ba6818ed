use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::bson_datetime_as_chrono;

/// Question model stored in MongoDB "questions" collection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub question_text: String,
    pub question_type: QuestionType,
    #[serde(default)]
    pub options: Vec<QuestionOption>,
    /// For non-choice questions (true/false, short answer, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct_answer: Option<String>,
    /// For MCQ questions; holds the correct option text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct_option: Option<String>,
    pub event: ObjectId,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default = "default_points")]
    pub points: f64,
    /// Per-question time limit in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_limit: Option<u32>,
    #[serde(default)]
    pub hints: Vec<Hint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "bson_datetime_as_chrono")]
    pub updated_at: DateTime<Utc>,
}

fn default_points() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionOption {
    pub text: String,
    #[serde(default)]
    pub is_correct: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hint {
    pub text: String,
    #[serde(default)]
    pub points_deduction: f64,
}

/// Question types. Stored documents with a type this build does not know
/// deserialize to `Unknown` and grade as incorrect rather than being skipped.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum QuestionType {
    #[serde(rename = "mcq")]
    Mcq,
    #[serde(rename = "multiselect")]
    Multiselect,
    #[serde(rename = "true/false")]
    TrueFalse,
    #[serde(rename = "short answer")]
    ShortAnswer,
    #[serde(rename = "long answer")]
    LongAnswer,
    #[serde(rename = "fill-in-blanks")]
    FillInBlanks,
    #[serde(rename = "code")]
    Code,
    #[serde(other)]
    Unknown,
}

impl QuestionType {
    /// Subjective types are left pending until a reviewer grades them.
    pub fn requires_manual_review(&self) -> bool {
        matches!(
            self,
            QuestionType::ShortAnswer
                | QuestionType::LongAnswer
                | QuestionType::FillInBlanks
                | QuestionType::Code
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

/// One submitted answer, discriminated by question type. The evaluation
/// dispatch switches on this tag instead of probing optional fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum AnswerPayload {
    Mcq {
        #[serde(rename = "chosenOption")]
        chosen_option: String,
    },
    Multiselect {
        #[serde(rename = "chosenOptions")]
        chosen_options: Vec<String>,
    },
    TrueFalse {
        #[serde(rename = "answerText")]
        answer_text: String,
    },
    Text {
        #[serde(rename = "answerText")]
        answer_text: String,
    },
    Code {
        #[serde(rename = "codeAnswer")]
        code_answer: String,
        #[serde(rename = "codeLanguage", skip_serializing_if = "Option::is_none")]
        code_language: Option<String>,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedAnswer {
    pub question_id: String,
    pub answer: AnswerPayload,
    /// Seconds spent on this question
    pub time_spent: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitExamRequest {
    pub answers: Vec<SubmittedAnswer>,
    /// Total seconds spent on the attempt
    pub time_spent: Option<u32>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateQuestionRequest {
    #[validate(length(min = 1, message = "Question text is required"))]
    pub question_text: String,
    pub question_type: QuestionType,
    #[serde(default)]
    pub options: Vec<QuestionOption>,
    pub correct_answer: Option<String>,
    pub correct_option: Option<String>,
    pub difficulty: Option<Difficulty>,
    pub points: Option<f64>,
    pub time_limit: Option<u32>,
    #[serde(default)]
    pub hints: Vec<Hint>,
    pub explanation: Option<String>,
}

/// Question as exposed to exam takers: correctness markers stripped.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionPublic {
    pub id: String,
    pub question_text: String,
    pub question_type: QuestionType,
    pub options: Vec<String>,
    pub points: f64,
    pub difficulty: Difficulty,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_limit: Option<u32>,
}

impl From<Question> for QuestionPublic {
    fn from(question: Question) -> Self {
        QuestionPublic {
            id: question.id.map(|id| id.to_hex()).unwrap_or_default(),
            question_text: question.question_text,
            question_type: question.question_type,
            options: question.options.into_iter().map(|o| o.text).collect(),
            points: question.points,
            difficulty: question.difficulty,
            time_limit: question.time_limit,
        }
    }
}
