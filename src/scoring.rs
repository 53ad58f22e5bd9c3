use chrono::{Datelike, Utc};

const RECENT_WINDOW_YEARS: i32 = 5;
const RECENCY_POINTS_PER_YEAR: f64 = 15.0;
const FREQUENCY_POINTS_PER_REPEAT: f64 = 10.0;
const FREQUENCY_CAP: f64 = 40.0;
const GLOBAL_WEIGHT_POINTS: f64 = 30.0;
const SPREAD_POINTS_PER_YEAR: f64 = 5.0;
const SPREAD_CAP: f64 = 20.0;

/// Importance score for a question, blending how often it repeats, how
/// recently it appeared, and its manually assigned topic weight.
///
/// Callers are expected to clamp `global_importance` to `[0, 100]` at the
/// input boundary; this function applies no clamping of its own.
pub fn importance_score(repeat_count: i64, years_appeared: &str, global_importance: i64) -> f64 {
    importance_score_at(
        repeat_count,
        years_appeared,
        global_importance,
        Utc::now().year(),
    )
}

fn importance_score_at(
    repeat_count: i64,
    years_appeared: &str,
    global_importance: i64,
    current_year: i32,
) -> f64 {
    let years: Vec<i32> = years_appeared
        .split(',')
        .filter_map(|token| token.trim().parse::<i32>().ok())
        .filter(|year| *year > 1900 && *year <= current_year)
        .collect();

    let recent = years
        .iter()
        .filter(|year| **year >= current_year - RECENT_WINDOW_YEARS)
        .count();
    let recency_score = recent as f64 * RECENCY_POINTS_PER_YEAR;

    let frequency_score = (repeat_count as f64 * FREQUENCY_POINTS_PER_REPEAT).min(FREQUENCY_CAP);

    let global_score = (global_importance as f64 / 100.0) * GLOBAL_WEIGHT_POINTS;

    let mut distinct = years.clone();
    distinct.sort_unstable();
    distinct.dedup();
    let spread_score = (distinct.len() as f64 * SPREAD_POINTS_PER_YEAR).min(SPREAD_CAP);

    let total = (recency_score + frequency_score + global_score + spread_score).min(100.0);
    (total * 100.0).round() / 100.0
}

/// Most recent year a question appeared, taken from the raw comma-separated
/// list. Unlike the scoring parse, no range filter is applied here: any token
/// that parses as an integer counts.
pub fn last_appeared_year(years_appeared: &str) -> Option<i64> {
    years_appeared
        .split(',')
        .filter_map(|token| token.trim().parse::<i64>().ok())
        .max()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worked_example_clamps_to_hundred() {
        // recency 45 + frequency 30 + global 24 + spread 15 = 114 -> 100
        let score = importance_score_at(3, "2019,2021,2023", 80, 2024);
        assert_eq!(score, 100.0);
    }

    #[test]
    fn minimal_question_scores_twenty_five() {
        // recency 0 + frequency 10 + global 15 + spread 0
        let score = importance_score_at(1, "", 50, 2024);
        assert_eq!(score, 25.0);
    }

    #[test]
    fn unparseable_tokens_are_dropped() {
        let with_noise = importance_score_at(2, "abc,2020,banana", 40, 2024);
        let clean = importance_score_at(2, "2020", 40, 2024);
        assert_eq!(with_noise, clean);
    }

    #[test]
    fn out_of_range_years_are_dropped() {
        let score = importance_score_at(1, "1850,2099", 0, 2024);
        assert_eq!(score, importance_score_at(1, "", 0, 2024));
    }

    #[test]
    fn frequency_saturates_at_four_repeats() {
        let at_four = importance_score_at(4, "", 0, 2024);
        let at_ten = importance_score_at(10, "", 0, 2024);
        assert_eq!(at_four, 40.0);
        assert_eq!(at_four, at_ten);
    }

    #[test]
    fn monotone_in_repeat_count_until_saturation() {
        let mut previous = importance_score_at(1, "2020", 30, 2024);
        for repeat in 2..=6 {
            let next = importance_score_at(repeat, "2020", 30, 2024);
            assert!(next >= previous);
            previous = next;
        }
    }

    #[test]
    fn monotone_in_global_importance() {
        let mut previous = importance_score_at(1, "", 0, 2024);
        for weight in [10, 25, 50, 75, 100] {
            let next = importance_score_at(1, "", weight, 2024);
            assert!(next > previous);
            previous = next;
        }
    }

    #[test]
    fn score_stays_in_bounds() {
        for repeat in [1, 3, 7, 50] {
            for weight in [0, 50, 100] {
                let score =
                    importance_score_at(repeat, "2018,2019,2020,2021,2022,2023", weight, 2024);
                assert!((0.0..=100.0).contains(&score));
            }
        }
    }

    #[test]
    fn duplicate_years_do_not_inflate_spread() {
        // three recent appearances but a single distinct year
        let score = importance_score_at(1, "2023,2023,2023", 0, 2024);
        assert_eq!(score, 45.0 + 10.0 + 5.0);
    }

    #[test]
    fn last_appeared_ignores_range_filter() {
        assert_eq!(last_appeared_year("2019,2023,2021"), Some(2023));
        assert_eq!(last_appeared_year("2099,2020"), Some(2099));
        assert_eq!(last_appeared_year("abc,"), None);
        assert_eq!(last_appeared_year(""), None);
    }
}
