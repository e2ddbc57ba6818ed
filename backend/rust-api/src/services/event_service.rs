use chrono::Utc;
use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, to_bson, Document};
use mongodb::Database;

use crate::error::ApiError;
use crate::models::event::{
    AttendanceRequest, CreateEventRequest, Event, EventFeedbackRequest, EventStatus,
    ListEventsQuery, Participant, ParticipantStatus, UpdateEventRequest,
};
use crate::models::question::{CreateQuestionRequest, Question};
use crate::utils::time::chrono_to_bson;

pub struct EventService {
    mongo: Database,
}

impl EventService {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }

    fn events(&self) -> mongodb::Collection<Event> {
        self.mongo.collection::<Event>("events")
    }

    fn questions(&self) -> mongodb::Collection<Question> {
        self.mongo.collection::<Question>("questions")
    }

    pub fn parse_id(raw: &str) -> Result<ObjectId, ApiError> {
        ObjectId::parse_str(raw).map_err(|_| ApiError::Validation("Invalid id".to_string()))
    }

    pub async fn create_event(
        &self,
        organizer: ObjectId,
        req: CreateEventRequest,
    ) -> Result<Event, ApiError> {
        if req.is_exam && req.exam_details.is_none() {
            return Err(ApiError::Validation(
                "Exam events require exam details".to_string(),
            ));
        }

        let now = Utc::now();
        let event = Event {
            id: None,
            title: req.title,
            description: req.description,
            date: req.date,
            location: req.location,
            category: req.category,
            skill_level: req.skill_level,
            is_exam: req.is_exam,
            exam_details: req.exam_details.unwrap_or_default(),
            questions: vec![],
            participants: vec![],
            status: EventStatus::Draft,
            organizer: Some(organizer),
            capacity: req.capacity,
            is_registration_required: req.is_registration_required.unwrap_or(true),
            tags: req.tags,
            created_at: now,
            updated_at: now,
        };

        let insert = self.events().insert_one(&event).await?;
        let event_id = insert
            .inserted_id
            .as_object_id()
            .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("Missing inserted event id")))?;

        tracing::info!(event_id = %event_id.to_hex(), "Event created");

        let mut created = event;
        created.id = Some(event_id);
        Ok(created)
    }

    pub async fn list_events(&self, query: ListEventsQuery) -> Result<Vec<Event>, ApiError> {
        let mut filter = Document::new();
        if let Some(status) = query.status {
            filter.insert("status", to_bson(&status).map_err(anyhow::Error::from)?);
        } else {
            // Drafts stay hidden from the public listing
            filter.insert("status", doc! { "$ne": "draft" });
        }
        if let Some(category) = query.category {
            filter.insert("category", to_bson(&category).map_err(anyhow::Error::from)?);
        }
        if let Some(is_exam) = query.is_exam {
            filter.insert("isExam", is_exam);
        }

        let cursor = self.events().find(filter).sort(doc! { "date": 1 }).await?;
        Ok(cursor.try_collect().await?)
    }

    pub async fn get_event(&self, event_id: &ObjectId) -> Result<Event, ApiError> {
        self.events()
            .find_one(doc! { "_id": event_id })
            .await?
            .ok_or_else(|| ApiError::NotFound("Event not found".to_string()))
    }

    pub async fn update_event(
        &self,
        event_id: &ObjectId,
        req: UpdateEventRequest,
    ) -> Result<Event, ApiError> {
        let mut set_doc = Document::new();
        if let Some(title) = req.title {
            set_doc.insert("title", title);
        }
        if let Some(description) = req.description {
            set_doc.insert("description", description);
        }
        if let Some(date) = req.date {
            set_doc.insert("date", chrono_to_bson(date));
        }
        if let Some(location) = req.location {
            set_doc.insert("location", location);
        }
        if let Some(category) = req.category {
            set_doc.insert("category", to_bson(&category).map_err(anyhow::Error::from)?);
        }
        if let Some(skill_level) = req.skill_level {
            set_doc.insert(
                "skillLevel",
                to_bson(&skill_level).map_err(anyhow::Error::from)?,
            );
        }
        if let Some(status) = req.status {
            set_doc.insert("status", to_bson(&status).map_err(anyhow::Error::from)?);
        }
        if let Some(exam_details) = req.exam_details {
            set_doc.insert(
                "examDetails",
                to_bson(&exam_details).map_err(anyhow::Error::from)?,
            );
        }
        if let Some(capacity) = req.capacity {
            set_doc.insert("capacity", capacity as i64);
        }
        if let Some(required) = req.is_registration_required {
            set_doc.insert("isRegistrationRequired", required);
        }
        if let Some(tags) = req.tags {
            set_doc.insert("tags", tags);
        }
        if set_doc.is_empty() {
            return Err(ApiError::Validation("No fields to update".to_string()));
        }
        set_doc.insert("updatedAt", mongodb::bson::DateTime::now());

        let updated = self
            .events()
            .find_one_and_update(doc! { "_id": event_id }, doc! { "$set": set_doc })
            .return_document(mongodb::options::ReturnDocument::After)
            .await?
            .ok_or_else(|| ApiError::NotFound("Event not found".to_string()))?;

        Ok(updated)
    }

    /// Deleting an event also removes its question bank.
    pub async fn delete_event(&self, event_id: &ObjectId) -> Result<(), ApiError> {
        let deleted = self.events().delete_one(doc! { "_id": event_id }).await?;
        if deleted.deleted_count == 0 {
            return Err(ApiError::NotFound("Event not found".to_string()));
        }

        self.questions()
            .delete_many(doc! { "event": event_id })
            .await?;

        tracing::info!(event_id = %event_id.to_hex(), "Event deleted");
        Ok(())
    }

    /// Register the caller for an event. Capacity, the registration window,
    /// and double registration are all checked against the current roster.
    pub async fn register(&self, event_id: &ObjectId, user_id: ObjectId) -> Result<Event, ApiError> {
        let event = self.get_event(event_id).await?;

        if event.status == EventStatus::Cancelled || event.status == EventStatus::Completed {
            return Err(ApiError::Validation(
                "Registration is closed for this event".to_string(),
            ));
        }
        if !event.is_registration_open(Utc::now()) {
            return Err(ApiError::Validation(
                "Registration deadline has passed".to_string(),
            ));
        }
        if event.participant(&user_id).is_some() {
            return Err(ApiError::Conflict(
                "Already registered for this event".to_string(),
            ));
        }
        if !event.has_capacity() {
            return Err(ApiError::Conflict("Event is at full capacity".to_string()));
        }

        let participant = Participant {
            user: user_id,
            registered_at: Utc::now(),
            attended: false,
            feedback: None,
            rating: None,
            status: ParticipantStatus::Registered,
            completed_at: None,
        };

        // Guard the capacity again inside the filter so two concurrent
        // registrations cannot both slip past the read above.
        let mut filter = doc! {
            "_id": event_id,
            "participants.user": { "$ne": user_id },
        };
        if let Some(capacity) = event.capacity {
            filter.insert(
                format!("participants.{}", capacity.saturating_sub(1)),
                doc! { "$exists": false },
            );
        }

        let updated = self
            .events()
            .find_one_and_update(
                filter,
                doc! { "$push": {
                    "participants": to_bson(&participant).map_err(anyhow::Error::from)?
                } },
            )
            .return_document(mongodb::options::ReturnDocument::After)
            .await?
            .ok_or_else(|| ApiError::Conflict("Event is at full capacity".to_string()))?;

        tracing::info!(
            event_id = %event_id.to_hex(),
            user_id = %user_id.to_hex(),
            "User registered for event"
        );

        Ok(updated)
    }

    pub async fn mark_attendance(
        &self,
        event_id: &ObjectId,
        req: AttendanceRequest,
    ) -> Result<(), ApiError> {
        let user_id = Self::parse_id(&req.user_id)?;

        let updated = self
            .events()
            .update_one(
                doc! { "_id": event_id, "participants.user": user_id },
                doc! { "$set": { "participants.$.attended": req.attended } },
            )
            .await?;

        if updated.matched_count == 0 {
            return Err(ApiError::NotFound(
                "Participant not found for this event".to_string(),
            ));
        }
        Ok(())
    }

    /// Participants leave feedback on events they registered for.
    pub async fn submit_feedback(
        &self,
        event_id: &ObjectId,
        user_id: &ObjectId,
        req: EventFeedbackRequest,
    ) -> Result<(), ApiError> {
        if req.feedback.is_none() && req.rating.is_none() {
            return Err(ApiError::Validation(
                "Feedback or rating is required".to_string(),
            ));
        }

        let mut set_doc = Document::new();
        if let Some(feedback) = req.feedback {
            set_doc.insert("participants.$.feedback", feedback);
        }
        if let Some(rating) = req.rating {
            set_doc.insert("participants.$.rating", rating as i32);
        }

        let updated = self
            .events()
            .update_one(
                doc! { "_id": event_id, "participants.user": user_id },
                doc! { "$set": set_doc },
            )
            .await?;

        if updated.matched_count == 0 {
            return Err(ApiError::Forbidden(
                "Only registered participants can leave feedback".to_string(),
            ));
        }
        Ok(())
    }

    /// Add a question to an exam's bank and link it on the event document.
    pub async fn add_question(
        &self,
        event_id: &ObjectId,
        req: CreateQuestionRequest,
    ) -> Result<Question, ApiError> {
        let event = self.get_event(event_id).await?;
        if !event.is_exam {
            return Err(ApiError::Validation(
                "Questions can only be added to exams".to_string(),
            ));
        }

        Self::validate_answer_key(&req)?;

        let now = Utc::now();
        let question = Question {
            id: None,
            question_text: req.question_text,
            question_type: req.question_type,
            options: req.options,
            correct_answer: req.correct_answer,
            correct_option: req.correct_option,
            event: *event_id,
            difficulty: req.difficulty.unwrap_or_default(),
            points: req.points.unwrap_or(1.0),
            time_limit: req.time_limit,
            hints: req.hints,
            explanation: req.explanation,
            created_at: now,
            updated_at: now,
        };

        let insert = self.questions().insert_one(&question).await?;
        let question_id = insert
            .inserted_id
            .as_object_id()
            .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("Missing inserted question id")))?;

        self.events()
            .update_one(
                doc! { "_id": event_id },
                doc! { "$push": { "questions": question_id } },
            )
            .await?;

        let mut created = question;
        created.id = Some(question_id);
        Ok(created)
    }

    fn validate_answer_key(req: &CreateQuestionRequest) -> Result<(), ApiError> {
        use crate::models::question::QuestionType;
        match req.question_type {
            QuestionType::Mcq => {
                let marked = req.options.iter().filter(|o| o.is_correct).count();
                if req.correct_option.is_none() && marked != 1 {
                    return Err(ApiError::Validation(
                        "MCQ questions need exactly one correct option".to_string(),
                    ));
                }
            }
            QuestionType::Multiselect => {
                if !req.options.iter().any(|o| o.is_correct) {
                    return Err(ApiError::Validation(
                        "Multiselect questions need at least one correct option".to_string(),
                    ));
                }
            }
            QuestionType::TrueFalse => {
                if req.correct_answer.is_none() {
                    return Err(ApiError::Validation(
                        "True/false questions need a correct answer".to_string(),
                    ));
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Full question documents, answer key included. Admin only.
    pub async fn list_questions(&self, event_id: &ObjectId) -> Result<Vec<Question>, ApiError> {
        self.get_event(event_id).await?;
        let cursor = self
            .questions()
            .find(doc! { "event": event_id })
            .sort(doc! { "createdAt": 1 })
            .await?;
        Ok(cursor.try_collect().await?)
    }

    pub async fn delete_question(
        &self,
        event_id: &ObjectId,
        question_id: &ObjectId,
    ) -> Result<(), ApiError> {
        let deleted = self
            .questions()
            .delete_one(doc! { "_id": question_id, "event": event_id })
            .await?;
        if deleted.deleted_count == 0 {
            return Err(ApiError::NotFound("Question not found".to_string()));
        }

        self.events()
            .update_one(
                doc! { "_id": event_id },
                doc! { "$pull": { "questions": question_id } },
            )
            .await?;
        Ok(())
    }
}
