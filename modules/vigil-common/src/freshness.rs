use chrono::{DateTime, Utc};

/// Max acceptable age for intraday market and news data.
pub const MARKET_MAX_AGE_HOURS: f64 = 24.0;
pub const NEWS_MAX_AGE_HOURS: f64 = 24.0;

/// Macro series publish weekly at best.
pub const MACRO_MAX_AGE_HOURS: f64 = 168.0;

/// Linear recency score: 1.0 at age zero, 0.0 at or beyond `max_age_hours`.
///
/// Timestamps in the future score 1.0 (clock skew between providers is
/// common enough that a negative age must not produce a score above 1).
pub fn freshness_score(
    timestamp: DateTime<Utc>,
    max_age_hours: f64,
    reference: DateTime<Utc>,
) -> f64 {
    let age_hours = (reference - timestamp).num_seconds() as f64 / 3600.0;

    if age_hours <= 0.0 {
        return 1.0;
    }
    if age_hours >= max_age_hours {
        return 0.0;
    }
    (1.0 - age_hours / max_age_hours).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn fresh_data_scores_one() {
        let now = Utc::now();
        assert_eq!(freshness_score(now, 24.0, now), 1.0);
    }

    #[test]
    fn expired_data_scores_zero() {
        let now = Utc::now();
        let old = now - Duration::hours(24);
        assert_eq!(freshness_score(old, 24.0, now), 0.0);
    }

    #[test]
    fn midpoint_is_exactly_half() {
        let now = Utc::now();
        let mid = now - Duration::hours(12);
        let score = freshness_score(mid, 24.0, now);
        assert!((score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn beyond_max_age_stays_zero() {
        let now = Utc::now();
        let ancient = now - Duration::hours(500);
        assert_eq!(freshness_score(ancient, 24.0, now), 0.0);
    }

    #[test]
    fn future_timestamp_caps_at_one() {
        let now = Utc::now();
        let future = now + Duration::hours(2);
        assert_eq!(freshness_score(future, 24.0, now), 1.0);
    }

    #[test]
    fn macro_window_is_a_week() {
        let now = Utc::now();
        let half_week = now - Duration::hours(84);
        let score = freshness_score(half_week, MACRO_MAX_AGE_HOURS, now);
        assert!((score - 0.5).abs() < 1e-9);
    }
}
