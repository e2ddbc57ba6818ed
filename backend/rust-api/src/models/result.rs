use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use super::{bson_datetime_as_chrono, bson_datetime_as_chrono_option};
use crate::models::question::AnswerPayload;

/// Result of one graded exam attempt, stored in the "results" collection.
/// A unique compound index on (event, user, attemptNumber) makes the attempt
/// counter race-safe: a concurrent duplicate insert fails with E11000.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamResult {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub event: ObjectId,
    pub user: ObjectId,
    pub attempt_number: u32,
    pub answers: Vec<ResultAnswer>,
    pub score: f64,
    /// Maximum possible score across all questions in the exam
    pub total_score: f64,
    pub percentage_score: f64,
    pub passed: bool,
    /// Seconds the user took to complete the attempt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    #[serde(default)]
    pub certificate: Certificate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    #[serde(with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "bson_datetime_as_chrono")]
    pub updated_at: DateTime<Utc>,
}

impl ExamResult {
    pub fn grade(&self) -> &'static str {
        letter_grade(self.percentage_score)
    }
}

pub fn letter_grade(percentage: f64) -> &'static str {
    if percentage >= 90.0 {
        "A+"
    } else if percentage >= 80.0 {
        "A"
    } else if percentage >= 70.0 {
        "B"
    } else if percentage >= 60.0 {
        "C"
    } else if percentage >= 50.0 {
        "D"
    } else {
        "F"
    }
}

/// One graded answer embedded in a result. `is_correct`/`points_awarded` stay
/// None for subjective answers until a reviewer resolves them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultAnswer {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub question: ObjectId,
    pub answer_given: AnswerPayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_correct: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points_awarded: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_spent: Option<u32>,
}

impl ResultAnswer {
    pub fn is_pending(&self) -> bool {
        self.points_awarded.is_none()
    }
}

/// Standalone evaluated-answer record in the "user_answers" collection,
/// linked back to the result it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAnswer {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub user: ObjectId,
    pub question: ObjectId,
    pub event: ObjectId,
    pub result: ObjectId,
    pub answer_given: AnswerPayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_correct: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points_awarded: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_spent: Option<u32>,
    #[serde(default)]
    pub is_reviewed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_comments: Option<String>,
    #[serde(with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "bson_datetime_as_chrono")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    #[serde(default)]
    pub issued: bool,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "bson_datetime_as_chrono_option"
    )]
    pub issued_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateAnswerRequest {
    pub points_awarded: f64,
    pub is_correct: bool,
    pub feedback: Option<String>,
}

/// Result as returned to the submitting user.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultView {
    pub id: String,
    pub event: String,
    pub attempt_number: u32,
    pub score: f64,
    pub total_score: f64,
    pub percentage_score: f64,
    pub passed: bool,
    pub grade: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

impl From<&ExamResult> for ResultView {
    fn from(result: &ExamResult) -> Self {
        ResultView {
            id: result.id.map(|id| id.to_hex()).unwrap_or_default(),
            event: result.event.to_hex(),
            attempt_number: result.attempt_number,
            score: result.score,
            total_score: result.total_score,
            percentage_score: result.percentage_score,
            passed: result.passed,
            grade: result.grade(),
            duration: result.duration,
            feedback: result.feedback.clone(),
            submitted_at: result.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub user: LeaderboardUser,
    pub score: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    pub grade: &'static str,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardUser {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Serialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExamStatistics {
    pub total_participants: u64,
    pub passed_count: u64,
    pub pass_rate: i64,
    pub highest_score: i64,
    pub lowest_score: i64,
    pub average_score: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamStatisticsEntry {
    pub exam_id: String,
    pub title: String,
    pub status: crate::models::event::EventStatus,
    pub statistics: ExamStatistics,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPerformance {
    pub overall: PerformanceOverall,
    pub trend: Vec<MonthlyPerformance>,
    pub results: Vec<ResultView>,
}

#[derive(Debug, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceOverall {
    pub total_exams: u64,
    pub passed_exams: u64,
    pub pass_rate: i64,
    pub average_score: i64,
    pub best_score: i64,
    pub worst_score: i64,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyPerformance {
    pub month: String,
    pub exam_count: u64,
    pub average_score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grade_bands() {
        assert_eq!(letter_grade(100.0), "A+");
        assert_eq!(letter_grade(90.0), "A+");
        assert_eq!(letter_grade(89.9), "A");
        assert_eq!(letter_grade(75.0), "B");
        assert_eq!(letter_grade(60.0), "C");
        assert_eq!(letter_grade(50.0), "D");
        assert_eq!(letter_grade(49.9), "F");
        assert_eq!(letter_grade(0.0), "F");
    }

    #[test]
    fn pending_answers_have_no_awarded_points() {
        let graded = ResultAnswer {
            id: ObjectId::new(),
            question: ObjectId::new(),
            answer_given: AnswerPayload::Mcq {
                chosen_option: "A".to_string(),
            },
            is_correct: Some(true),
            points_awarded: Some(10.0),
            feedback: None,
            time_spent: None,
        };
        let pending = ResultAnswer {
            id: ObjectId::new(),
            question: ObjectId::new(),
            answer_given: AnswerPayload::Text {
                answer_text: "essay".to_string(),
            },
            is_correct: None,
            points_awarded: None,
            feedback: None,
            time_spent: None,
        };

        assert!(!graded.is_pending());
        assert!(pending.is_pending());
    }
}
