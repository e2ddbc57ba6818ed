use chrono::Utc;
use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, to_bson};
use mongodb::{Client as MongoClient, Database};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};

use crate::error::ApiError;
use crate::models::account::CurrentAccount;
use crate::models::event::{Event, ParticipantStatus};
use crate::models::question::{
    AnswerPayload, Question, QuestionPublic, QuestionType, SubmitExamRequest,
};
use crate::models::result::{
    Certificate, EvaluateAnswerRequest, ExamResult, ResultAnswer, UserAnswer,
};

/// Outcome of grading one answer. Subjective answers stay pending with both
/// verdict fields unset.
#[derive(Debug, Clone, PartialEq)]
pub struct GradedAnswer {
    pub is_correct: Option<bool>,
    pub points_awarded: Option<f64>,
    pub feedback: Option<String>,
}

impl GradedAnswer {
    fn incorrect(feedback: &str) -> Self {
        GradedAnswer {
            is_correct: Some(false),
            points_awarded: Some(0.0),
            feedback: Some(feedback.to_string()),
        }
    }

    fn pending() -> Self {
        GradedAnswer {
            is_correct: None,
            points_awarded: None,
            feedback: None,
        }
    }
}

/// Grade a single answer against its question. `threshold` is the fraction of
/// full points a partially-credited multiselect answer must reach to count as
/// correct.
pub fn grade_answer(question: &Question, answer: &AnswerPayload, threshold: f64) -> GradedAnswer {
    match (question.question_type, answer) {
        (QuestionType::Mcq, AnswerPayload::Mcq { chosen_option }) => {
            let correct = question
                .correct_option
                .clone()
                .or_else(|| {
                    question
                        .options
                        .iter()
                        .find(|o| o.is_correct)
                        .map(|o| o.text.clone())
                });
            match correct {
                Some(correct) if correct.trim() == chosen_option.trim() => GradedAnswer {
                    is_correct: Some(true),
                    points_awarded: Some(question.points),
                    feedback: None,
                },
                Some(_) => GradedAnswer::incorrect("Incorrect option selected"),
                None => GradedAnswer::incorrect("Question has no answer key"),
            }
        }
        (QuestionType::Multiselect, AnswerPayload::Multiselect { chosen_options }) => {
            grade_multiselect(question, chosen_options, threshold)
        }
        (QuestionType::TrueFalse, AnswerPayload::TrueFalse { answer_text }) => {
            match &question.correct_answer {
                Some(correct)
                    if correct.trim().eq_ignore_ascii_case(answer_text.trim()) =>
                {
                    GradedAnswer {
                        is_correct: Some(true),
                        points_awarded: Some(question.points),
                        feedback: None,
                    }
                }
                Some(_) => GradedAnswer::incorrect("Incorrect answer"),
                None => GradedAnswer::incorrect("Question has no answer key"),
            }
        }
        (qt, AnswerPayload::Text { .. }) if qt.requires_manual_review() => GradedAnswer::pending(),
        (QuestionType::Code, AnswerPayload::Code { .. }) => GradedAnswer::pending(),
        (QuestionType::Unknown, _) => GradedAnswer::incorrect("Unsupported question type"),
        _ => GradedAnswer::incorrect("Answer format does not match question type"),
    }
}

/// Partial credit: each correct selection earns a proportional share of the
/// points, each wrong selection forfeits one option's worth. Never negative.
fn grade_multiselect(question: &Question, chosen: &[String], threshold: f64) -> GradedAnswer {
    let correct: Vec<&str> = question
        .options
        .iter()
        .filter(|o| o.is_correct)
        .map(|o| o.text.as_str())
        .collect();
    if correct.is_empty() {
        return GradedAnswer::incorrect("Question has no answer key");
    }
    let option_count = question.options.len();

    // Set semantics: repeating the same pick must not stack credit
    let chosen: HashSet<&str> = chosen.iter().map(|c| c.trim()).collect();
    let correct_chosen = chosen.iter().filter(|c| correct.contains(c)).count() as f64;
    let incorrect_chosen = chosen.len() as f64 - correct_chosen;

    let earned = question.points * correct_chosen / correct.len() as f64;
    let penalty = question.points * incorrect_chosen / option_count as f64;
    let awarded = (earned - penalty).max(0.0);

    GradedAnswer {
        is_correct: Some(awarded >= threshold * question.points),
        points_awarded: Some(awarded),
        feedback: None,
    }
}

/// Aggregate score over a set of graded answers. `total` covers every
/// question in the exam, answered or not, so skipping questions costs points.
pub fn aggregate_score(
    answers: &[ResultAnswer],
    total_points: f64,
    passing_score: f64,
) -> (f64, f64, bool) {
    let score: f64 = answers
        .iter()
        .filter(|a| !a.is_pending())
        .filter_map(|a| a.points_awarded)
        .sum();
    let raw = if total_points > 0.0 {
        score / total_points * 100.0
    } else {
        0.0
    };
    // Pass/fail compares the exact ratio; rounding is for display only
    let passed = raw >= passing_score;
    let percentage = (raw * 100.0).round() / 100.0;
    (score, percentage, passed)
}

pub fn build_feedback(percentage: f64, passed: bool, remaining_attempts: u32) -> String {
    if passed {
        if percentage >= 90.0 {
            "Outstanding performance! You have mastered this material.".to_string()
        } else if percentage >= 75.0 {
            "Great job! You passed with a strong score.".to_string()
        } else {
            "Well done! You passed the exam.".to_string()
        }
    } else if remaining_attempts > 0 {
        format!(
            "You did not pass this time. You have {} attempt(s) remaining.",
            remaining_attempts
        )
    } else {
        "You did not pass and have no attempts remaining.".to_string()
    }
}

/// Gate one submission attempt and return its attempt number. A roster entry
/// is required even when the exam has open registration enabled.
pub fn check_submission_allowed(
    event: &Event,
    user_id: &ObjectId,
    prior_attempts: u32,
) -> Result<u32, ApiError> {
    if !event.accepts_submissions() {
        return Err(ApiError::Validation(
            "This exam is not accepting submissions".to_string(),
        ));
    }
    if event.participant(user_id).is_none() {
        return Err(ApiError::Forbidden(
            "You must register for this exam before submitting".to_string(),
        ));
    }
    if prior_attempts >= event.exam_details.allowed_attempts {
        return Err(ApiError::Forbidden(
            "Maximum number of attempts reached".to_string(),
        ));
    }
    Ok(prior_attempts + 1)
}

/// A graded submission plus whether the exam allows showing the result to
/// the taker right away.
pub struct SubmissionOutcome {
    pub result: ExamResult,
    pub show_results_immediately: bool,
}

pub struct EvaluationService {
    client: MongoClient,
    mongo: Database,
}

impl EvaluationService {
    pub fn new(client: MongoClient, mongo: Database) -> Self {
        Self { client, mongo }
    }

    fn events(&self) -> mongodb::Collection<Event> {
        self.mongo.collection::<Event>("events")
    }

    fn questions(&self) -> mongodb::Collection<Question> {
        self.mongo.collection::<Question>("questions")
    }

    fn results(&self) -> mongodb::Collection<ExamResult> {
        self.mongo.collection::<ExamResult>("results")
    }

    fn user_answers(&self) -> mongodb::Collection<UserAnswer> {
        self.mongo.collection::<UserAnswer>("user_answers")
    }

    async fn load_exam(&self, exam_id: &ObjectId) -> Result<Event, ApiError> {
        let event = self
            .events()
            .find_one(doc! { "_id": exam_id })
            .await?
            .ok_or_else(|| ApiError::NotFound("Exam not found".to_string()))?;
        if !event.is_exam {
            return Err(ApiError::Validation("Event is not an exam".to_string()));
        }
        Ok(event)
    }

    /// Exam as presented to a taker: metadata plus questions with the answer
    /// key stripped.
    pub async fn get_exam_for_taker(
        &self,
        exam_id: &ObjectId,
    ) -> Result<(Event, Vec<QuestionPublic>), ApiError> {
        let event = self.load_exam(exam_id).await?;
        let cursor = self
            .questions()
            .find(doc! { "event": exam_id })
            .sort(doc! { "createdAt": 1 })
            .await?;
        let questions: Vec<Question> = cursor.try_collect().await?;
        let public = questions.into_iter().map(QuestionPublic::from).collect();
        Ok((event, public))
    }

    /// Grade and persist one exam attempt. The result insert, the per-answer
    /// records, and the roster update commit atomically; the unique
    /// (event, user, attemptNumber) index turns a concurrent duplicate attempt
    /// into a clean attempt-limit error instead of an extra attempt.
    pub async fn submit_exam(
        &self,
        exam_id: &ObjectId,
        user_id: ObjectId,
        req: SubmitExamRequest,
    ) -> Result<SubmissionOutcome, ApiError> {
        let event = self.load_exam(exam_id).await?;

        let prior_attempts = self
            .results()
            .count_documents(doc! { "event": exam_id, "user": user_id })
            .await? as u32;
        let attempt_number = check_submission_allowed(&event, &user_id, prior_attempts)?;
        let allowed = event.exam_details.allowed_attempts;

        let cursor = self.questions().find(doc! { "event": exam_id }).await?;
        let questions: Vec<Question> = cursor.try_collect().await?;
        if questions.is_empty() {
            return Err(ApiError::Validation(
                "This exam has no questions".to_string(),
            ));
        }
        let by_id: HashMap<ObjectId, &Question> = questions
            .iter()
            .filter_map(|q| q.id.map(|id| (id, q)))
            .collect();
        let total_points: f64 = questions.iter().map(|q| q.points).sum();

        let threshold = event.exam_details.partial_credit_correct_threshold;
        let mut answers = Vec::with_capacity(req.answers.len());
        for submitted in &req.answers {
            let question_id = ObjectId::parse_str(&submitted.question_id)
                .map_err(|_| ApiError::Validation("Invalid question id".to_string()))?;
            let question = by_id.get(&question_id).ok_or_else(|| {
                ApiError::Validation("Answer references a question not in this exam".to_string())
            })?;

            let graded = grade_answer(question, &submitted.answer, threshold);
            answers.push(ResultAnswer {
                id: ObjectId::new(),
                question: question_id,
                answer_given: submitted.answer.clone(),
                is_correct: graded.is_correct,
                points_awarded: graded.points_awarded,
                feedback: graded.feedback,
                time_spent: submitted.time_spent,
            });
        }

        let (score, percentage, passed) =
            aggregate_score(&answers, total_points, event.exam_details.passing_score);
        let remaining = allowed.saturating_sub(attempt_number);
        let feedback = build_feedback(percentage, passed, remaining);

        let now = Utc::now();
        let result = ExamResult {
            id: None,
            event: *exam_id,
            user: user_id,
            attempt_number,
            answers,
            score,
            total_score: total_points,
            percentage_score: percentage,
            passed,
            duration: req.time_spent,
            certificate: Certificate::default(),
            feedback: Some(feedback),
            created_at: now,
            updated_at: now,
        };

        let mut session = self
            .client
            .start_session()
            .await
            .map_err(anyhow::Error::from)?;
        session
            .start_transaction()
            .await
            .map_err(anyhow::Error::from)?;

        let insert = self
            .results()
            .insert_one(&result)
            .session(&mut session)
            .await
            .map_err(|e| {
                if crate::error::is_duplicate_key(&e) {
                    ApiError::Forbidden("Maximum number of attempts reached".to_string())
                } else {
                    e.into()
                }
            })?;
        let result_id = insert
            .inserted_id
            .as_object_id()
            .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("Missing inserted result id")))?;

        let answer_records: Vec<UserAnswer> = result
            .answers
            .iter()
            .map(|a| UserAnswer {
                id: None,
                user: user_id,
                question: a.question,
                event: *exam_id,
                result: result_id,
                answer_given: a.answer_given.clone(),
                is_correct: a.is_correct,
                points_awarded: a.points_awarded,
                time_spent: a.time_spent,
                is_reviewed: false,
                review_comments: None,
                created_at: now,
                updated_at: now,
            })
            .collect();
        if !answer_records.is_empty() {
            self.user_answers()
                .insert_many(&answer_records)
                .session(&mut session)
                .await?;
        }

        self.events()
            .update_one(
                doc! { "_id": exam_id, "participants.user": user_id },
                doc! { "$set": {
                    "participants.$.status": to_bson(&ParticipantStatus::Completed)
                        .map_err(anyhow::Error::from)?,
                    "participants.$.completedAt": mongodb::bson::DateTime::now(),
                } },
            )
            .session(&mut session)
            .await?;

        session
            .commit_transaction()
            .await
            .map_err(anyhow::Error::from)?;

        tracing::info!(
            exam_id = %exam_id.to_hex(),
            user_id = %user_id.to_hex(),
            attempt = attempt_number,
            score,
            passed,
            "Exam submitted and graded"
        );

        let mut stored = result;
        stored.id = Some(result_id);
        Ok(SubmissionOutcome {
            result: stored,
            show_results_immediately: event.exam_details.show_results_immediately,
        })
    }

    /// Manual grading of a pending (or previously graded) answer. The result
    /// aggregates are recomputed from the full answer set afterwards.
    pub async fn evaluate_answer(
        &self,
        exam_id: &ObjectId,
        result_id: &ObjectId,
        answer_id: &ObjectId,
        req: EvaluateAnswerRequest,
    ) -> Result<ExamResult, ApiError> {
        let event = self.load_exam(exam_id).await?;

        let mut result = self
            .results()
            .find_one(doc! { "_id": result_id, "event": exam_id })
            .await?
            .ok_or_else(|| ApiError::NotFound("Result not found".to_string()))?;

        let answer = result
            .answers
            .iter_mut()
            .find(|a| &a.id == answer_id)
            .ok_or_else(|| ApiError::NotFound("Answer not found in this result".to_string()))?;

        if req.points_awarded < 0.0 {
            return Err(ApiError::Validation(
                "Points awarded must not be negative".to_string(),
            ));
        }

        answer.is_correct = Some(req.is_correct);
        answer.points_awarded = Some(req.points_awarded);
        answer.feedback = req.feedback.clone();
        let question_id = answer.question;

        let (score, percentage, passed) = aggregate_score(
            &result.answers,
            result.total_score,
            event.exam_details.passing_score,
        );
        result.score = score;
        result.percentage_score = percentage;
        result.passed = passed;
        result.updated_at = Utc::now();

        self.results()
            .update_one(
                doc! { "_id": result_id },
                doc! { "$set": {
                    "answers": to_bson(&result.answers).map_err(anyhow::Error::from)?,
                    "score": score,
                    "percentageScore": percentage,
                    "passed": passed,
                    "updatedAt": mongodb::bson::DateTime::now(),
                } },
            )
            .await?;

        self.user_answers()
            .update_one(
                doc! { "result": result_id, "question": question_id },
                doc! { "$set": {
                    "isCorrect": req.is_correct,
                    "pointsAwarded": req.points_awarded,
                    "isReviewed": true,
                    "reviewComments": req.feedback.as_deref().unwrap_or_default(),
                    "updatedAt": mongodb::bson::DateTime::now(),
                } },
            )
            .await?;

        tracing::info!(
            result_id = %result_id.to_hex(),
            answer_id = %answer_id.to_hex(),
            "Answer manually evaluated"
        );

        Ok(result)
    }

    /// Issue a certificate for a passed result. Idempotent: a second call
    /// returns the stored certificate unchanged.
    pub async fn issue_certificate(
        &self,
        exam_id: &ObjectId,
        result_id: &ObjectId,
        caller: &CurrentAccount,
    ) -> Result<Certificate, ApiError> {
        let result = self
            .results()
            .find_one(doc! { "_id": result_id, "event": exam_id })
            .await?
            .ok_or_else(|| ApiError::NotFound("Result not found".to_string()))?;

        if result.user != caller.id && !caller.is_admin() {
            return Err(ApiError::Forbidden(
                "You can only request certificates for your own results".to_string(),
            ));
        }
        let (certificate, newly_issued) =
            certificate_decision(&result, exam_id, result_id, Utc::now())?;
        if !newly_issued {
            return Ok(certificate);
        }

        self.results()
            .update_one(
                doc! { "_id": result_id },
                doc! { "$set": {
                    "certificate": to_bson(&certificate).map_err(anyhow::Error::from)?,
                    "updatedAt": mongodb::bson::DateTime::now(),
                } },
            )
            .await?;

        tracing::info!(
            result_id = %result_id.to_hex(),
            certificate_id = certificate.certificate_id.as_deref().unwrap_or_default(),
            "Certificate issued"
        );

        Ok(certificate)
    }
}

/// Decide what certificate a result gets. Returns the certificate plus
/// whether it is newly issued and still needs persisting; an already issued
/// certificate comes back unchanged.
pub fn certificate_decision(
    result: &ExamResult,
    exam_id: &ObjectId,
    result_id: &ObjectId,
    issued_at: chrono::DateTime<Utc>,
) -> Result<(Certificate, bool), ApiError> {
    if !result.passed {
        return Err(ApiError::Validation(
            "Certificates are only issued for passed exams".to_string(),
        ));
    }
    if result.certificate.issued {
        return Ok((result.certificate.clone(), false));
    }
    let certificate = Certificate {
        issued: true,
        issued_at: Some(issued_at),
        certificate_id: Some(certificate_id(&result.event, &result.user, issued_at)),
        certificate_url: Some(format!(
            "/api/v1/exams/{}/results/{}/certificate",
            exam_id.to_hex(),
            result_id.to_hex()
        )),
    };
    Ok((certificate, true))
}

/// CERT-<event suffix>-<user suffix>-<digest prefix>, unique per issuance.
fn certificate_id(
    event: &ObjectId,
    user: &ObjectId,
    issued_at: chrono::DateTime<Utc>,
) -> String {
    let event_hex = event.to_hex();
    let user_hex = user.to_hex();
    let digest = Sha256::digest(format!(
        "{}:{}:{}",
        event_hex,
        user_hex,
        issued_at.timestamp_millis()
    ));
    format!(
        "CERT-{}-{}-{}",
        &event_hex[event_hex.len() - 6..].to_uppercase(),
        &user_hex[user_hex.len() - 6..].to_uppercase(),
        &hex::encode(digest)[..8].to_uppercase()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::event::{EventStatus, ExamDetails, Participant};
    use crate::models::question::{Difficulty, QuestionOption};

    fn question(question_type: QuestionType, points: f64) -> Question {
        Question {
            id: Some(ObjectId::new()),
            question_text: "q".to_string(),
            question_type,
            options: vec![],
            correct_answer: None,
            correct_option: None,
            event: ObjectId::new(),
            difficulty: Difficulty::Medium,
            points,
            time_limit: None,
            hints: vec![],
            explanation: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn option(text: &str, is_correct: bool) -> QuestionOption {
        QuestionOption {
            text: text.to_string(),
            is_correct,
        }
    }

    #[test]
    fn mcq_full_or_nothing() {
        let mut q = question(QuestionType::Mcq, 5.0);
        q.correct_option = Some("B".to_string());

        let right = grade_answer(
            &q,
            &AnswerPayload::Mcq {
                chosen_option: "B".to_string(),
            },
            0.5,
        );
        assert_eq!(right.is_correct, Some(true));
        assert_eq!(right.points_awarded, Some(5.0));

        let wrong = grade_answer(
            &q,
            &AnswerPayload::Mcq {
                chosen_option: "A".to_string(),
            },
            0.5,
        );
        assert_eq!(wrong.is_correct, Some(false));
        assert_eq!(wrong.points_awarded, Some(0.0));
    }

    #[test]
    fn mcq_falls_back_to_marked_option() {
        let mut q = question(QuestionType::Mcq, 2.0);
        q.options = vec![option("A", false), option("B", true)];

        let graded = grade_answer(
            &q,
            &AnswerPayload::Mcq {
                chosen_option: "B".to_string(),
            },
            0.5,
        );
        assert_eq!(graded.points_awarded, Some(2.0));
    }

    #[test]
    fn multiselect_partial_credit() {
        let mut q = question(QuestionType::Multiselect, 10.0);
        q.options = vec![
            option("A", true),
            option("B", true),
            option("C", false),
            option("D", false),
        ];

        // One of two correct picks, no wrong picks: half credit, and exactly
        // at the 0.5 threshold so it still counts as correct.
        let graded = grade_answer(
            &q,
            &AnswerPayload::Multiselect {
                chosen_options: vec!["A".to_string()],
            },
            0.5,
        );
        assert_eq!(graded.points_awarded, Some(5.0));
        assert_eq!(graded.is_correct, Some(true));

        // One right and one wrong: 5.0 earned minus 2.5 penalty.
        let graded = grade_answer(
            &q,
            &AnswerPayload::Multiselect {
                chosen_options: vec!["A".to_string(), "C".to_string()],
            },
            0.5,
        );
        assert_eq!(graded.points_awarded, Some(2.5));
        assert_eq!(graded.is_correct, Some(false));

        // All wrong picks never go negative.
        let graded = grade_answer(
            &q,
            &AnswerPayload::Multiselect {
                chosen_options: vec!["C".to_string(), "D".to_string()],
            },
            0.5,
        );
        assert_eq!(graded.points_awarded, Some(0.0));
        assert_eq!(graded.is_correct, Some(false));
    }

    #[test]
    fn multiselect_ignores_duplicate_picks() {
        let mut q = question(QuestionType::Multiselect, 10.0);
        q.options = vec![
            option("A", true),
            option("B", true),
            option("C", false),
            option("D", false),
        ];

        // Submitting the same correct pick twice is worth one pick, not two.
        let graded = grade_answer(
            &q,
            &AnswerPayload::Multiselect {
                chosen_options: vec!["A".to_string(), "A".to_string()],
            },
            0.5,
        );
        assert_eq!(graded.points_awarded, Some(5.0));

        // Duplicated wrong picks likewise incur one penalty.
        let graded = grade_answer(
            &q,
            &AnswerPayload::Multiselect {
                chosen_options: vec!["A".to_string(), "C".to_string(), "C".to_string()],
            },
            0.5,
        );
        assert_eq!(graded.points_awarded, Some(2.5));
    }

    #[test]
    fn true_false_ignores_case_and_whitespace() {
        let mut q = question(QuestionType::TrueFalse, 1.0);
        q.correct_answer = Some("True".to_string());

        let graded = grade_answer(
            &q,
            &AnswerPayload::TrueFalse {
                answer_text: " true ".to_string(),
            },
            0.5,
        );
        assert_eq!(graded.is_correct, Some(true));
    }

    #[test]
    fn subjective_answers_stay_pending() {
        let q = question(QuestionType::ShortAnswer, 10.0);
        let graded = grade_answer(
            &q,
            &AnswerPayload::Text {
                answer_text: "an essay".to_string(),
            },
            0.5,
        );
        assert_eq!(graded.is_correct, None);
        assert_eq!(graded.points_awarded, None);

        let q = question(QuestionType::Code, 10.0);
        let graded = grade_answer(
            &q,
            &AnswerPayload::Code {
                code_answer: "fn main() {}".to_string(),
                code_language: Some("rust".to_string()),
            },
            0.5,
        );
        assert_eq!(graded.points_awarded, None);
    }

    #[test]
    fn mismatched_payload_grades_incorrect() {
        let mut q = question(QuestionType::Mcq, 5.0);
        q.correct_option = Some("A".to_string());

        let graded = grade_answer(
            &q,
            &AnswerPayload::Text {
                answer_text: "A".to_string(),
            },
            0.5,
        );
        assert_eq!(graded.is_correct, Some(false));
        assert_eq!(graded.points_awarded, Some(0.0));
    }

    #[test]
    fn unknown_type_grades_incorrect() {
        let q = question(QuestionType::Unknown, 5.0);
        let graded = grade_answer(
            &q,
            &AnswerPayload::Text {
                answer_text: "anything".to_string(),
            },
            0.5,
        );
        assert_eq!(graded.is_correct, Some(false));
        assert_eq!(graded.points_awarded, Some(0.0));
    }

    #[test]
    fn aggregate_counts_pending_as_zero_but_keeps_total() {
        let answers = vec![
            ResultAnswer {
                id: ObjectId::new(),
                question: ObjectId::new(),
                answer_given: AnswerPayload::Mcq {
                    chosen_option: "A".to_string(),
                },
                is_correct: Some(true),
                points_awarded: Some(10.0),
                feedback: None,
                time_spent: None,
            },
            ResultAnswer {
                id: ObjectId::new(),
                question: ObjectId::new(),
                answer_given: AnswerPayload::Text {
                    answer_text: "pending".to_string(),
                },
                is_correct: None,
                points_awarded: None,
                feedback: None,
                time_spent: None,
            },
        ];

        let (score, percentage, passed) = aggregate_score(&answers, 30.0, 40.0);
        assert_eq!(score, 10.0);
        assert_eq!(percentage, 33.33);
        assert!(!passed);
    }

    #[test]
    fn empty_exam_scores_zero_percent() {
        let (score, percentage, passed) = aggregate_score(&[], 0.0, 40.0);
        assert_eq!(score, 0.0);
        assert_eq!(percentage, 0.0);
        assert!(!passed);
    }

    #[test]
    fn feedback_bands() {
        assert!(build_feedback(95.0, true, 0).contains("Outstanding"));
        assert!(build_feedback(80.0, true, 0).contains("Great job"));
        assert!(build_feedback(55.0, true, 0).contains("Well done"));
        assert!(build_feedback(30.0, false, 2).contains("2 attempt(s) remaining"));
        assert!(build_feedback(30.0, false, 0).contains("no attempts remaining"));
    }

    #[test]
    fn pass_mark_compares_the_exact_ratio() {
        // 99.99 of 250 is 39.996%: displays as 40.0 but must not pass a
        // 40% threshold.
        let answers = vec![ResultAnswer {
            id: ObjectId::new(),
            question: ObjectId::new(),
            answer_given: AnswerPayload::Mcq {
                chosen_option: "A".to_string(),
            },
            is_correct: Some(true),
            points_awarded: Some(99.99),
            feedback: None,
            time_spent: None,
        }];

        let (score, percentage, passed) = aggregate_score(&answers, 250.0, 40.0);
        assert_eq!(score, 99.99);
        assert_eq!(percentage, 40.0);
        assert!(!passed);
    }

    fn exam_event(registered: &[ObjectId]) -> Event {
        let now = Utc::now();
        Event {
            id: Some(ObjectId::new()),
            title: "Final exam".to_string(),
            description: "End of term".to_string(),
            date: now,
            location: None,
            category: None,
            skill_level: None,
            is_exam: true,
            exam_details: ExamDetails::default(),
            questions: vec![],
            participants: registered
                .iter()
                .map(|user| Participant {
                    user: *user,
                    registered_at: now,
                    attended: false,
                    feedback: None,
                    rating: None,
                    status: ParticipantStatus::Registered,
                    completed_at: None,
                })
                .collect(),
            status: EventStatus::Ongoing,
            organizer: None,
            capacity: None,
            is_registration_required: true,
            tags: vec![],
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn submission_requires_roster_entry_regardless_of_registration_mode() {
        let user = ObjectId::new();
        let mut event = exam_event(&[]);
        event.is_registration_required = false;

        // Open registration does not waive the roster check
        let err = check_submission_allowed(&event, &user, 0).unwrap_err();
        match err {
            ApiError::Forbidden(msg) => assert!(msg.contains("register")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn submission_attempt_limit_and_status_gates() {
        let user = ObjectId::new();
        let mut event = exam_event(&[user]);
        event.exam_details.allowed_attempts = 2;

        assert_eq!(check_submission_allowed(&event, &user, 0).unwrap(), 1);
        assert_eq!(check_submission_allowed(&event, &user, 1).unwrap(), 2);
        assert!(matches!(
            check_submission_allowed(&event, &user, 2),
            Err(ApiError::Forbidden(_))
        ));

        event.status = EventStatus::Completed;
        assert!(matches!(
            check_submission_allowed(&event, &user, 0),
            Err(ApiError::Validation(_))
        ));
    }

    fn passed_result() -> ExamResult {
        let now = Utc::now();
        ExamResult {
            id: Some(ObjectId::new()),
            event: ObjectId::new(),
            user: ObjectId::new(),
            attempt_number: 1,
            answers: vec![],
            score: 18.0,
            total_score: 20.0,
            percentage_score: 90.0,
            passed: true,
            duration: None,
            certificate: Certificate::default(),
            feedback: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn certificate_issued_once_and_returned_unchanged_after() {
        let mut result = passed_result();
        let exam_id = result.event;
        let result_id = result.id.unwrap();

        let (certificate, newly_issued) =
            certificate_decision(&result, &exam_id, &result_id, Utc::now()).unwrap();
        assert!(newly_issued);
        assert!(certificate.issued);
        assert!(certificate.certificate_id.is_some());

        // Second request sees the stored certificate and must not mint a new id
        result.certificate = certificate.clone();
        let (again, newly_issued) =
            certificate_decision(&result, &exam_id, &result_id, Utc::now()).unwrap();
        assert!(!newly_issued);
        assert_eq!(again.certificate_id, certificate.certificate_id);
        assert_eq!(again.issued_at, certificate.issued_at);
    }

    #[test]
    fn certificate_refused_for_failed_result() {
        let mut result = passed_result();
        result.passed = false;

        let err =
            certificate_decision(&result, &result.event, &result.id.unwrap(), Utc::now())
                .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn certificate_id_shape() {
        let event = ObjectId::new();
        let user = ObjectId::new();
        let id = certificate_id(&event, &user, Utc::now());

        assert!(id.starts_with("CERT-"));
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[1].len(), 6);
        assert_eq!(parts[2].len(), 6);
        assert_eq!(parts[3].len(), 8);
    }
}
