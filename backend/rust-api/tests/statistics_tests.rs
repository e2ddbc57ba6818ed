use chrono::{TimeZone, Utc};
use mongodb::bson::oid::ObjectId;

use codingclub_api::models::result::{Certificate, ExamResult};
use codingclub_api::services::result_service::{
    compute_statistics, monthly_trend, overall_performance, rank_results, LEADERBOARD_SIZE,
};

fn attempt(user: ObjectId, percentage: f64, duration: Option<u32>) -> ExamResult {
    ExamResult {
        id: Some(ObjectId::new()),
        event: ObjectId::new(),
        user,
        attempt_number: 1,
        answers: vec![],
        score: percentage,
        total_score: 100.0,
        percentage_score: percentage,
        passed: percentage >= 40.0,
        duration,
        certificate: Certificate::default(),
        feedback: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

#[test]
fn leaderboard_is_best_attempt_per_user_ordered_and_capped() {
    let slow_retaker = ObjectId::new();
    let fast = ObjectId::new();

    let mut results = vec![
        attempt(slow_retaker, 60.0, Some(900)),
        attempt(slow_retaker, 95.0, Some(1800)), // best attempt counts
        attempt(fast, 95.0, Some(600)),          // same score, faster
    ];
    for _ in 0..25 {
        results.push(attempt(ObjectId::new(), 10.0, None));
    }

    let ranked = rank_results(&results);
    assert_eq!(ranked.len(), LEADERBOARD_SIZE);
    assert_eq!(ranked[0].user, fast);
    assert_eq!(ranked[1].user, slow_retaker);
    assert_eq!(ranked[1].percentage_score, 95.0);
}

#[test]
fn statistics_count_users_not_attempts() {
    let retaker = ObjectId::new();
    let results = vec![
        attempt(retaker, 20.0, None),
        attempt(retaker, 70.0, None),
        attempt(ObjectId::new(), 50.0, None),
    ];

    let stats = compute_statistics(&results);
    assert_eq!(stats.total_participants, 2);
    assert_eq!(stats.passed_count, 2);
    assert_eq!(stats.pass_rate, 100);
    assert_eq!(stats.highest_score, 70);
    assert_eq!(stats.lowest_score, 20);
    // (20 + 70 + 50) / 3
    assert_eq!(stats.average_score, 47);
}

#[test]
fn performance_trend_spans_months_in_order() {
    let user = ObjectId::new();

    let mut december = attempt(user, 55.0, None);
    december.created_at = Utc.with_ymd_and_hms(2025, 12, 10, 9, 0, 0).unwrap();
    let mut february = attempt(user, 65.0, None);
    february.created_at = Utc.with_ymd_and_hms(2026, 2, 5, 9, 0, 0).unwrap();
    let mut february_again = attempt(user, 75.0, None);
    february_again.created_at = Utc.with_ymd_and_hms(2026, 2, 25, 9, 0, 0).unwrap();

    let results = vec![february, december, february_again];
    let trend = monthly_trend(&results);

    assert_eq!(trend.len(), 2);
    assert_eq!(trend[0].month, "2025-12");
    assert_eq!(trend[0].exam_count, 1);
    assert_eq!(trend[1].month, "2026-2");
    assert_eq!(trend[1].exam_count, 2);
    assert_eq!(trend[1].average_score, 70.0);

    let overall = overall_performance(&results);
    assert_eq!(overall.total_exams, 3);
    assert_eq!(overall.passed_exams, 3);
    assert_eq!(overall.best_score, 75);
    assert_eq!(overall.worst_score, 55);
    assert_eq!(overall.average_score, 65);
}
