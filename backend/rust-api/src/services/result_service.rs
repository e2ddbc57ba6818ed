use chrono::Datelike;
use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId};
use mongodb::Database;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::error::ApiError;
use crate::models::account::{CurrentAccount, User};
use crate::models::event::Event;
use crate::models::result::{
    letter_grade, ExamResult, ExamStatistics, ExamStatisticsEntry, LeaderboardEntry,
    LeaderboardUser, MonthlyPerformance, PerformanceOverall, ResultView, UserPerformance,
};

pub const LEADERBOARD_SIZE: usize = 20;

/// Best attempt per user, ordered by percentage descending with duration as
/// the tiebreaker, capped at the leaderboard size.
pub fn rank_results(results: &[ExamResult]) -> Vec<&ExamResult> {
    let mut best: HashMap<ObjectId, &ExamResult> = HashMap::new();
    for result in results {
        best.entry(result.user)
            .and_modify(|current| {
                if ranks_higher(result, current) {
                    *current = result;
                }
            })
            .or_insert(result);
    }

    let mut ranked: Vec<&ExamResult> = best.into_values().collect();
    ranked.sort_by(|a, b| {
        b.percentage_score
            .partial_cmp(&a.percentage_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                a.duration
                    .unwrap_or(u32::MAX)
                    .cmp(&b.duration.unwrap_or(u32::MAX))
            })
    });
    ranked.truncate(LEADERBOARD_SIZE);
    ranked
}

fn ranks_higher(candidate: &ExamResult, current: &ExamResult) -> bool {
    if candidate.percentage_score != current.percentage_score {
        return candidate.percentage_score > current.percentage_score;
    }
    candidate.duration.unwrap_or(u32::MAX) < current.duration.unwrap_or(u32::MAX)
}

pub fn compute_statistics(results: &[ExamResult]) -> ExamStatistics {
    if results.is_empty() {
        return ExamStatistics::default();
    }

    let participants: HashSet<ObjectId> = results.iter().map(|r| r.user).collect();
    let passed: HashSet<ObjectId> = results
        .iter()
        .filter(|r| r.passed)
        .map(|r| r.user)
        .collect();

    let mut highest = f64::MIN;
    let mut lowest = f64::MAX;
    let mut sum = 0.0;
    for result in results {
        highest = highest.max(result.percentage_score);
        lowest = lowest.min(result.percentage_score);
        sum += result.percentage_score;
    }

    ExamStatistics {
        total_participants: participants.len() as u64,
        passed_count: passed.len() as u64,
        pass_rate: (passed.len() as f64 / participants.len() as f64 * 100.0).round() as i64,
        highest_score: highest.round() as i64,
        lowest_score: lowest.round() as i64,
        average_score: (sum / results.len() as f64).round() as i64,
    }
}

/// Month buckets keyed "YYYY-M" without zero padding, averaging the
/// percentage score of all attempts in that month.
pub fn monthly_trend(results: &[ExamResult]) -> Vec<MonthlyPerformance> {
    let mut buckets: BTreeMap<(i32, u32), (f64, u64)> = BTreeMap::new();
    for result in results {
        let key = (result.created_at.year(), result.created_at.month());
        let entry = buckets.entry(key).or_insert((0.0, 0));
        entry.0 += result.percentage_score;
        entry.1 += 1;
    }

    buckets
        .into_iter()
        .map(|((year, month), (sum, count))| MonthlyPerformance {
            month: format!("{}-{}", year, month),
            exam_count: count,
            average_score: ((sum / count as f64) * 100.0).round() / 100.0,
        })
        .collect()
}

pub fn overall_performance(results: &[ExamResult]) -> PerformanceOverall {
    if results.is_empty() {
        return PerformanceOverall::default();
    }

    let passed = results.iter().filter(|r| r.passed).count() as u64;
    let total = results.len() as u64;
    let mut best = f64::MIN;
    let mut worst = f64::MAX;
    let mut sum = 0.0;
    for result in results {
        best = best.max(result.percentage_score);
        worst = worst.min(result.percentage_score);
        sum += result.percentage_score;
    }

    PerformanceOverall {
        total_exams: total,
        passed_exams: passed,
        pass_rate: (passed as f64 / total as f64 * 100.0).round() as i64,
        average_score: (sum / total as f64).round() as i64,
        best_score: best.round() as i64,
        worst_score: worst.round() as i64,
    }
}

pub struct ResultService {
    mongo: Database,
}

impl ResultService {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }

    fn results(&self) -> mongodb::Collection<ExamResult> {
        self.mongo.collection::<ExamResult>("results")
    }

    fn events(&self) -> mongodb::Collection<Event> {
        self.mongo.collection::<Event>("events")
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

    pub async fn leaderboard(
        &self,
        exam_id: &ObjectId,
    ) -> Result<Vec<LeaderboardEntry>, ApiError> {
        let event = self.load_exam(exam_id).await?;
        if !event.exam_details.enable_leaderboard {
            return Err(ApiError::Forbidden(
                "Leaderboard is not enabled for this exam".to_string(),
            ));
        }

        let cursor = self.results().find(doc! { "event": exam_id }).await?;
        let results: Vec<ExamResult> = cursor.try_collect().await?;
        let ranked = rank_results(&results);

        let user_ids: Vec<ObjectId> = ranked.iter().map(|r| r.user).collect();
        let users = self.mongo.collection::<User>("users");
        let cursor = users.find(doc! { "_id": { "$in": user_ids } }).await?;
        let names: HashMap<ObjectId, String> = cursor
            .try_collect::<Vec<User>>()
            .await?
            .into_iter()
            .filter_map(|u| u.id.map(|id| (id, u.name)))
            .collect();

        Ok(ranked
            .into_iter()
            .enumerate()
            .map(|(index, result)| LeaderboardEntry {
                rank: index + 1,
                user: LeaderboardUser {
                    id: result.user.to_hex(),
                    name: names
                        .get(&result.user)
                        .cloned()
                        .unwrap_or_else(|| "Unknown".to_string()),
                },
                score: result.percentage_score.round() as i64,
                duration: result.duration,
                grade: letter_grade(result.percentage_score),
                submitted_at: result.created_at,
            })
            .collect())
    }

    pub async fn exam_statistics(&self, exam_id: &ObjectId) -> Result<ExamStatistics, ApiError> {
        self.load_exam(exam_id).await?;
        let cursor = self.results().find(doc! { "event": exam_id }).await?;
        let results: Vec<ExamResult> = cursor.try_collect().await?;
        Ok(compute_statistics(&results))
    }

    /// One statistics block per exam, drafts included. Admin only.
    pub async fn all_exam_statistics(&self) -> Result<Vec<ExamStatisticsEntry>, ApiError> {
        let cursor = self
            .events()
            .find(doc! { "isExam": true })
            .sort(doc! { "date": -1 })
            .await?;
        let exams: Vec<Event> = cursor.try_collect().await?;

        let mut entries = Vec::with_capacity(exams.len());
        for exam in exams {
            let Some(exam_id) = exam.id else { continue };
            let cursor = self.results().find(doc! { "event": exam_id }).await?;
            let results: Vec<ExamResult> = cursor.try_collect().await?;
            entries.push(ExamStatisticsEntry {
                exam_id: exam_id.to_hex(),
                title: exam.title,
                status: exam.status,
                statistics: compute_statistics(&results),
            });
        }
        Ok(entries)
    }

    /// Overall numbers, monthly trend, and the attempt list for one user.
    /// Users may only view their own performance.
    pub async fn user_performance(
        &self,
        user_id: &ObjectId,
        caller: &CurrentAccount,
    ) -> Result<UserPerformance, ApiError> {
        if &caller.id != user_id && !caller.is_admin() {
            return Err(ApiError::Forbidden(
                "You can only view your own performance".to_string(),
            ));
        }

        let cursor = self
            .results()
            .find(doc! { "user": user_id })
            .sort(doc! { "createdAt": 1 })
            .await?;
        let results: Vec<ExamResult> = cursor.try_collect().await?;

        Ok(UserPerformance {
            overall: overall_performance(&results),
            trend: monthly_trend(&results),
            results: results.iter().map(ResultView::from).collect(),
        })
    }

    /// Full result with per-answer detail. Owners see it once the exam allows
    /// immediate results; admins always do.
    pub async fn get_result(
        &self,
        result_id: &ObjectId,
        caller: &CurrentAccount,
    ) -> Result<ExamResult, ApiError> {
        let result = self
            .results()
            .find_one(doc! { "_id": result_id })
            .await?
            .ok_or_else(|| ApiError::NotFound("Result not found".to_string()))?;

        if result.user != caller.id && !caller.is_admin() {
            return Err(ApiError::Forbidden(
                "You can only view your own results".to_string(),
            ));
        }

        if !caller.is_admin() {
            let event = self.load_exam(&result.event).await?;
            let available = event.exam_details.show_results_immediately
                || event.status == crate::models::event::EventStatus::Completed;
            if !available {
                return Err(ApiError::Forbidden(
                    "Results for this exam are not available yet".to_string(),
                ));
            }
        }

        Ok(result)
    }

    /// Results for one exam: admins get every attempt, users their own.
    pub async fn exam_results(
        &self,
        exam_id: &ObjectId,
        caller: &CurrentAccount,
    ) -> Result<Vec<ResultView>, ApiError> {
        self.load_exam(exam_id).await?;

        let filter = if caller.is_admin() {
            doc! { "event": exam_id }
        } else {
            doc! { "event": exam_id, "user": caller.id }
        };

        let cursor = self
            .results()
            .find(filter)
            .sort(doc! { "createdAt": -1 })
            .await?;
        let results: Vec<ExamResult> = cursor.try_collect().await?;
        Ok(results.iter().map(ResultView::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::result::Certificate;
    use chrono::{TimeZone, Utc};

    fn result(
        user: ObjectId,
        percentage: f64,
        duration: Option<u32>,
        passed: bool,
    ) -> ExamResult {
        ExamResult {
            id: Some(ObjectId::new()),
            event: ObjectId::new(),
            user,
            attempt_number: 1,
            answers: vec![],
            score: percentage,
            total_score: 100.0,
            percentage_score: percentage,
            passed,
            duration,
            certificate: Certificate::default(),
            feedback: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn ranking_orders_by_percentage_then_duration() {
        let (a, b, c) = (ObjectId::new(), ObjectId::new(), ObjectId::new());
        let results = vec![
            result(a, 80.0, Some(600), true),
            result(b, 90.0, Some(900), true),
            result(c, 80.0, Some(300), true),
        ];

        let ranked = rank_results(&results);
        assert_eq!(ranked[0].user, b);
        assert_eq!(ranked[1].user, c); // faster of the two 80s
        assert_eq!(ranked[2].user, a);
    }

    #[test]
    fn ranking_keeps_best_attempt_per_user() {
        let user = ObjectId::new();
        let results = vec![
            result(user, 50.0, Some(600), false),
            result(user, 85.0, Some(700), true),
        ];

        let ranked = rank_results(&results);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].percentage_score, 85.0);
    }

    #[test]
    fn ranking_caps_at_leaderboard_size() {
        let results: Vec<ExamResult> = (0..30)
            .map(|i| result(ObjectId::new(), i as f64, None, false))
            .collect();
        assert_eq!(rank_results(&results).len(), LEADERBOARD_SIZE);
    }

    #[test]
    fn statistics_over_attempts() {
        let (a, b) = (ObjectId::new(), ObjectId::new());
        let results = vec![
            result(a, 90.0, None, true),
            result(b, 30.0, None, false),
            result(b, 60.0, None, true),
        ];

        let stats = compute_statistics(&results);
        assert_eq!(stats.total_participants, 2);
        assert_eq!(stats.passed_count, 2);
        assert_eq!(stats.pass_rate, 100);
        assert_eq!(stats.highest_score, 90);
        assert_eq!(stats.lowest_score, 30);
        assert_eq!(stats.average_score, 60);
    }

    #[test]
    fn statistics_empty_is_all_zero() {
        assert_eq!(compute_statistics(&[]), ExamStatistics::default());
    }

    #[test]
    fn trend_buckets_by_month_without_padding() {
        let user = ObjectId::new();
        let mut january = result(user, 80.0, None, true);
        january.created_at = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        let mut january_again = result(user, 60.0, None, true);
        january_again.created_at = Utc.with_ymd_and_hms(2026, 1, 20, 10, 0, 0).unwrap();
        let mut march = result(user, 90.0, None, true);
        march.created_at = Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap();

        let trend = monthly_trend(&[january, january_again, march]);
        assert_eq!(
            trend,
            vec![
                MonthlyPerformance {
                    month: "2026-1".to_string(),
                    exam_count: 2,
                    average_score: 70.0,
                },
                MonthlyPerformance {
                    month: "2026-3".to_string(),
                    exam_count: 1,
                    average_score: 90.0,
                },
            ]
        );
    }

    #[test]
    fn overall_performance_summary() {
        let user = ObjectId::new();
        let results = vec![
            result(user, 40.0, None, true),
            result(user, 90.0, None, true),
            result(user, 20.0, None, false),
        ];

        let overall = overall_performance(&results);
        assert_eq!(overall.total_exams, 3);
        assert_eq!(overall.passed_exams, 2);
        assert_eq!(overall.pass_rate, 67);
        assert_eq!(overall.average_score, 50);
        assert_eq!(overall.best_score, 90);
        assert_eq!(overall.worst_score, 20);
    }
}
