//! Salience and Spaced Repetition
//!
//! Pure scoring functions behind forgetting and review scheduling.
//!
//! Salience combines four signals:
//! 1. An exponential retention curve stretched by review count
//! 2. An access-frequency boost, capped
//! 3. A weighted importance term
//! 4. A week-scale recency factor
//!
//! `retention` is monotonically non-increasing in hours-since-access for a
//! fixed access count, which keeps forgetting well ordered in time.

/// Forgetting curve rate: −ln(1 − 0.56), i.e. 56% loss at one unreviewed hour.
pub const DECAY_LAMBDA: f64 = 0.820980552; // -ln(0.44)

/// Cap on the access-frequency boost.
pub const ACCESS_BOOST_CAP: f64 = 0.3;

/// Per-access boost increment.
pub const ACCESS_BOOST_STEP: f64 = 0.05;

/// Weight of the importance term.
pub const IMPORTANCE_WEIGHT: f64 = 0.4;

/// Weight of the retention term.
pub const RETENTION_WEIGHT: f64 = 0.3;

/// Weight and time scale (hours) of the recency term.
pub const TIME_FACTOR_WEIGHT: f64 = 0.3;
const TIME_FACTOR_SCALE_HOURS: f64 = 168.0;

/// Default salience threshold below which a record is forgettable.
pub const DEFAULT_FORGET_THRESHOLD: f64 = 0.1;

/// Review intervals in hours, indexed by review count.
const REVIEW_INTERVALS_HOURS: [f64; 6] = [1.0, 24.0, 72.0, 168.0, 336.0, 720.0];

/// Review count derived from raw access count (every second access counts
/// as a review).
pub fn review_count(access_count: u32) -> u32 {
    access_count / 2
}

/// Retention after `hours` without access, stretched by prior reviews.
pub fn retention(hours: f64, review_count: u32) -> f64 {
    let hours = hours.max(0.0);
    let stretch = 1.0 + 0.5 * review_count as f64;
    (-DECAY_LAMBDA * hours / stretch).exp()
}

/// Composite salience in [0, 1].
pub fn salience(importance: f64, hours_since_access: f64, access_count: u32) -> f64 {
    let reviews = review_count(access_count);
    let retention = retention(hours_since_access, reviews);
    let access_boost = (ACCESS_BOOST_STEP * access_count as f64).min(ACCESS_BOOST_CAP);
    let importance_w = IMPORTANCE_WEIGHT * importance.clamp(0.0, 1.0);
    let time_factor =
        TIME_FACTOR_WEIGHT * (-hours_since_access.max(0.0) / TIME_FACTOR_SCALE_HOURS).exp();

    (RETENTION_WEIGHT * retention + access_boost + importance_w + time_factor).min(1.0)
}

/// Whether a record with the given salience should be forgotten.
pub fn should_forget(salience: f64, threshold: f64) -> bool {
    salience < threshold
}

/// Hours until the next review for a given review count.
///
/// The first six reviews follow a fixed ladder; beyond that the interval
/// grows by 10% of the 30-day base per extra review.
pub fn next_review_interval_hours(review_count: u32) -> f64 {
    match REVIEW_INTERVALS_HOURS.get(review_count as usize) {
        Some(&hours) => hours,
        None => 720.0 * (1.0 + 0.1 * (review_count as f64 - 6.0)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retention_fresh_is_one() {
        assert!((retention(0.0, 0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_retention_one_hour_unreviewed() {
        // exp(-lambda) = 0.44 by construction.
        assert!((retention(1.0, 0) - 0.44).abs() < 1e-6);
    }

    #[test]
    fn test_retention_monotone_in_hours() {
        for reviews in [0u32, 1, 3, 10] {
            let mut prev = f64::INFINITY;
            for h in 0..200 {
                let r = retention(h as f64 * 0.5, reviews);
                assert!(
                    r <= prev + 1e-12,
                    "retention increased at h={h} reviews={reviews}"
                );
                prev = r;
            }
        }
    }

    #[test]
    fn test_reviews_stretch_retention() {
        // More reviews means slower forgetting at the same elapsed time.
        assert!(retention(24.0, 4) > retention(24.0, 0));
    }

    #[test]
    fn test_salience_bounded() {
        let s = salience(1.0, 0.0, 1000);
        assert!(s <= 1.0);
        let s = salience(0.0, 1e6, 0);
        assert!(s >= 0.0);
    }

    #[test]
    fn test_access_boost_caps() {
        // Beyond 6 accesses the boost stops growing; only retention stretch
        // (via review count) and recency still matter.
        let a = salience(0.5, 0.0, 6);
        let b = salience(0.5, 0.0, 60);
        assert!((a - b).abs() < 1e-12);
    }

    #[test]
    fn test_stale_unimportant_record_is_forgettable() {
        let s = salience(0.05, 24.0 * 30.0, 0);
        assert!(should_forget(s, DEFAULT_FORGET_THRESHOLD));
    }

    #[test]
    fn test_fresh_important_record_is_kept() {
        let s = salience(0.9, 0.5, 4);
        assert!(!should_forget(s, DEFAULT_FORGET_THRESHOLD));
    }

    #[test]
    fn test_review_ladder() {
        assert_eq!(next_review_interval_hours(0), 1.0);
        assert_eq!(next_review_interval_hours(1), 24.0);
        assert_eq!(next_review_interval_hours(2), 72.0);
        assert_eq!(next_review_interval_hours(3), 168.0);
        assert_eq!(next_review_interval_hours(4), 336.0);
        assert_eq!(next_review_interval_hours(5), 720.0);
        // Past the ladder: 720 · (1 + 0.1·(count − 6))
        assert!((next_review_interval_hours(6) - 720.0).abs() < 1e-9);
        assert!((next_review_interval_hours(8) - 720.0 * 1.2).abs() < 1e-9);
    }

    #[test]
    fn test_review_count_halves_accesses() {
        assert_eq!(review_count(0), 0);
        assert_eq!(review_count(1), 0);
        assert_eq!(review_count(2), 1);
        assert_eq!(review_count(7), 3);
    }
}
