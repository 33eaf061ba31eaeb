use chrono::{DateTime, Utc};
use termdrill_common::grading::{ScoreComponent, ScoreLine};
use termdrill_common::{Score, ScoringPolicy};

/// Whole seconds between start and finish, never negative
pub fn elapsed_seconds(started_at: DateTime<Utc>, finished_at: DateTime<Utc>) -> i64 {
    (finished_at - started_at).num_seconds().max(0)
}

/// Combine penalties and optional-check bonus into a score.
///
/// `total = max(0, base - time - hints - resets + bonus)`. The breakdown
/// always lists time, hint, reset and bonus in that order, zero terms included.
pub fn compute_score(policy: &ScoringPolicy, elapsed_seconds: i64, bonus_points: i64) -> Score {
    let over_grace = (elapsed_seconds - policy.grace_seconds).max(0);
    let time_penalty = over_grace.saturating_mul(policy.per_second_penalty);
    let hint_penalty = i64::from(policy.hints_used).saturating_mul(policy.hint_penalty);
    let reset_penalty = i64::from(policy.resets).saturating_mul(policy.reset_penalty);

    let total_points = policy
        .base_points
        .saturating_sub(time_penalty)
        .saturating_sub(hint_penalty)
        .saturating_sub(reset_penalty)
        .saturating_add(bonus_points)
        .max(0);

    let breakdown = vec![
        ScoreLine {
            component: ScoreComponent::Time,
            label: format!("{}s over {}s grace", over_grace, policy.grace_seconds),
            points: -time_penalty,
        },
        ScoreLine {
            component: ScoreComponent::Hint,
            label: format!("{} hints used", policy.hints_used),
            points: -hint_penalty,
        },
        ScoreLine {
            component: ScoreComponent::Reset,
            label: format!("{} resets", policy.resets),
            points: -reset_penalty,
        },
        ScoreLine {
            component: ScoreComponent::Bonus,
            label: "optional checks passed".to_string(),
            points: bonus_points,
        },
    ];

    Score {
        base_points: policy.base_points,
        time_penalty,
        hint_penalty,
        reset_penalty,
        optional_bonus_points: bonus_points,
        total_points,
        elapsed_seconds,
        breakdown,
    }
}
