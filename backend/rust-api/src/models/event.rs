use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{bson_datetime_as_chrono, bson_datetime_as_chrono_option};

/// Event model stored in MongoDB "events" collection.
/// An exam is an event with `is_exam == true` and `exam_details` populated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub title: String,
    pub description: String,
    #[serde(with = "bson_datetime_as_chrono")]
    pub date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<EventCategory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skill_level: Option<SkillLevel>,
    #[serde(default)]
    pub is_exam: bool,
    #[serde(default)]
    pub exam_details: ExamDetails,
    #[serde(default)]
    pub questions: Vec<ObjectId>,
    #[serde(default)]
    pub participants: Vec<Participant>,
    #[serde(default)]
    pub status: EventStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organizer: Option<ObjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<u32>,
    #[serde(default = "default_true")]
    pub is_registration_required: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "bson_datetime_as_chrono")]
    pub updated_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

impl Event {
    pub fn has_capacity(&self) -> bool {
        match self.capacity {
            Some(capacity) => (self.participants.len() as u32) < capacity,
            None => true,
        }
    }

    pub fn is_registration_open(&self, now: DateTime<Utc>) -> bool {
        match self.exam_details.registration_deadline {
            Some(deadline) => now < deadline,
            None => now < self.date,
        }
    }

    /// Submission is only accepted while the exam is published or ongoing.
    pub fn accepts_submissions(&self) -> bool {
        matches!(self.status, EventStatus::Published | EventStatus::Ongoing)
    }

    pub fn participant(&self, user_id: &ObjectId) -> Option<&Participant> {
        self.participants.iter().find(|p| &p.user == user_id)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EventCategory {
    Workshop,
    Competition,
    Seminar,
    Hackathon,
    Exam,
    Quiz,
    Other,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SkillLevel {
    Beginner,
    Intermediate,
    Advanced,
    All,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    #[default]
    Draft,
    Published,
    Upcoming,
    Ongoing,
    Completed,
    Cancelled,
}

/// Exam-specific configuration embedded in the event document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamDetails {
    /// Duration in minutes
    #[serde(default = "ExamDetails::default_duration")]
    pub duration: u32,
    #[serde(default = "ExamDetails::default_passing_score")]
    pub passing_score: f64,
    #[serde(default = "ExamDetails::default_allowed_attempts")]
    pub allowed_attempts: u32,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "bson_datetime_as_chrono_option"
    )]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "bson_datetime_as_chrono_option"
    )]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "bson_datetime_as_chrono_option"
    )]
    pub registration_deadline: Option<DateTime<Utc>>,
    #[serde(default = "default_show_results")]
    pub show_results_immediately: bool,
    #[serde(default)]
    pub enable_leaderboard: bool,
    #[serde(default)]
    pub randomize_questions: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    /// Fraction of full points above which a partially-credited multiselect
    /// answer still counts as correct.
    #[serde(default = "ExamDetails::default_partial_credit_threshold")]
    pub partial_credit_correct_threshold: f64,
}

fn default_show_results() -> bool {
    true
}

impl ExamDetails {
    fn default_duration() -> u32 {
        60
    }

    fn default_passing_score() -> f64 {
        40.0
    }

    fn default_allowed_attempts() -> u32 {
        1
    }

    fn default_partial_credit_threshold() -> f64 {
        0.5
    }
}

impl Default for ExamDetails {
    fn default() -> Self {
        ExamDetails {
            duration: Self::default_duration(),
            passing_score: Self::default_passing_score(),
            allowed_attempts: Self::default_allowed_attempts(),
            start_time: None,
            end_time: None,
            registration_deadline: None,
            show_results_immediately: true,
            enable_leaderboard: false,
            randomize_questions: false,
            instructions: None,
            partial_credit_correct_threshold: Self::default_partial_credit_threshold(),
        }
    }
}

/// One registration entry within the event roster.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub user: ObjectId,
    #[serde(with = "bson_datetime_as_chrono")]
    pub registered_at: DateTime<Utc>,
    #[serde(default)]
    pub attended: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
    #[serde(default)]
    pub status: ParticipantStatus,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "bson_datetime_as_chrono_option"
    )]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantStatus {
    #[default]
    Registered,
    Completed,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateEventRequest {
    #[validate(length(min = 1, max = 200, message = "Title is required"))]
    pub title: String,
    #[validate(length(min = 1, message = "Description is required"))]
    pub description: String,
    pub date: DateTime<Utc>,
    pub location: Option<String>,
    pub category: Option<EventCategory>,
    pub skill_level: Option<SkillLevel>,
    #[serde(default)]
    pub is_exam: bool,
    pub exam_details: Option<ExamDetails>,
    pub capacity: Option<u32>,
    pub is_registration_required: Option<bool>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEventRequest {
    #[validate(length(min = 1, max = 200, message = "Title must not be empty"))]
    pub title: Option<String>,
    pub description: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub category: Option<EventCategory>,
    pub skill_level: Option<SkillLevel>,
    pub status: Option<EventStatus>,
    pub exam_details: Option<ExamDetails>,
    pub capacity: Option<u32>,
    pub is_registration_required: Option<bool>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListEventsQuery {
    pub status: Option<EventStatus>,
    pub category: Option<EventCategory>,
    pub is_exam: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct EventFeedbackRequest {
    pub feedback: Option<String>,
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rating: Option<u8>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRequest {
    pub user_id: String,
    #[serde(default = "default_true")]
    pub attended: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn event() -> Event {
        let now = Utc::now();
        Event {
            id: Some(ObjectId::new()),
            title: "Rust 101".to_string(),
            description: "Intro workshop".to_string(),
            date: now + Duration::days(7),
            location: None,
            category: Some(EventCategory::Workshop),
            skill_level: None,
            is_exam: false,
            exam_details: ExamDetails::default(),
            questions: vec![],
            participants: vec![],
            status: EventStatus::Published,
            organizer: None,
            capacity: Some(1),
            is_registration_required: true,
            tags: vec![],
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn capacity_bounds_roster() {
        let mut event = event();
        assert!(event.has_capacity());

        event.participants.push(Participant {
            user: ObjectId::new(),
            registered_at: Utc::now(),
            attended: false,
            feedback: None,
            rating: None,
            status: ParticipantStatus::Registered,
            completed_at: None,
        });
        assert!(!event.has_capacity());

        event.capacity = None;
        assert!(event.has_capacity());
    }

    #[test]
    fn registration_window_falls_back_to_event_date() {
        let event = event();
        assert!(event.is_registration_open(Utc::now()));
        assert!(!event.is_registration_open(event.date + Duration::hours(1)));
    }

    #[test]
    fn submissions_only_while_open() {
        let mut event = event();
        assert!(event.accepts_submissions());
        event.status = EventStatus::Ongoing;
        assert!(event.accepts_submissions());
        event.status = EventStatus::Completed;
        assert!(!event.accepts_submissions());
        event.status = EventStatus::Draft;
        assert!(!event.accepts_submissions());
    }
}
