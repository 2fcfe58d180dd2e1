//! Pure health-metric derivations: age, basal metabolic rate and the daily
//! calorie target shown on the dashboard. No I/O; incomplete input yields
//! `None`, never an error.

use serde::{Deserialize, Serialize};
use time::Date;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "gender", rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "activity_level", rename_all = "lowercase")]
pub enum ActivityLevel {
    Sedentary,
    Light,
    Moderate,
    Active,
}

impl ActivityLevel {
    /// Multiplier applied to BMR to estimate maintenance calories.
    pub fn factor(self) -> f64 {
        match self {
            ActivityLevel::Sedentary => 1.2,
            ActivityLevel::Light => 1.375,
            ActivityLevel::Moderate => 1.55,
            ActivityLevel::Active => 1.725,
        }
    }
}

pub const DEFAULT_DEFICIT_KCAL: i32 = 500;
pub const MIN_SUGGESTED_KCAL: i32 = 1200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CalorieTarget {
    pub maintenance: i32,
    pub suggested: i32,
    pub deficit: i32,
}

/// Whole years elapsed from `birthdate` to `today`.
pub fn age_years(birthdate: Option<Date>, today: Date) -> Option<i32> {
    let b = birthdate?;
    let mut years = today.year() - b.year();
    if (today.month() as u8, today.day()) < (b.month() as u8, b.day()) {
        years -= 1;
    }
    Some(years)
}

/// Mifflin-St Jeor estimate, rounded to the nearest kcal.
///
/// Men: 10*weight + 6.25*height - 5*age + 5
/// Women: 10*weight + 6.25*height - 5*age - 161
pub fn mifflin_st_jeor_bmr(
    weight_kg: Option<f64>,
    height_cm: Option<f64>,
    age: Option<i32>,
    gender: Option<Gender>,
) -> Option<i32> {
    let (weight, height, age, gender) = (weight_kg?, height_cm?, age?, gender?);
    if weight <= 0.0 || height <= 0.0 || age <= 0 {
        return None;
    }
    let base = 10.0 * weight + 6.25 * height - 5.0 * f64::from(age);
    let bmr = match gender {
        Gender::Male => base + 5.0,
        Gender::Female => base - 161.0,
    };
    Some(bmr.round() as i32)
}

/// Daily calorie target: maintenance from the activity factor, then a fixed
/// deficit, floored so the suggestion never drops below 1200 kcal. Unset
/// activity falls back to sedentary.
pub fn suggest_daily_calories(bmr: i32, activity: Option<ActivityLevel>) -> CalorieTarget {
    let factor = activity.unwrap_or(ActivityLevel::Sedentary).factor();
    let maintenance = (f64::from(bmr) * factor).round() as i32;
    CalorieTarget {
        maintenance,
        suggested: (maintenance - DEFAULT_DEFICIT_KCAL).max(MIN_SUGGESTED_KCAL),
        deficit: DEFAULT_DEFICIT_KCAL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn age_counts_whole_years_only() {
        let birthdate = Some(date!(1990 - 06 - 15));
        assert_eq!(age_years(birthdate, date!(2020 - 06 - 14)), Some(29));
        assert_eq!(age_years(birthdate, date!(2020 - 06 - 15)), Some(30));
        assert_eq!(age_years(birthdate, date!(2020 - 12 - 01)), Some(30));
    }

    #[test]
    fn age_unknown_without_birthdate() {
        assert_eq!(age_years(None, date!(2020 - 01 - 01)), None);
    }

    #[test]
    fn bmr_matches_mifflin_st_jeor() {
        // base = 10*82 + 6.25*175 - 5*30 = 1763.75
        assert_eq!(
            mifflin_st_jeor_bmr(Some(82.0), Some(175.0), Some(30), Some(Gender::Male)),
            Some(1769)
        );
        assert_eq!(
            mifflin_st_jeor_bmr(Some(82.0), Some(175.0), Some(30), Some(Gender::Female)),
            Some(1603)
        );
    }

    #[test]
    fn bmr_unknown_when_any_input_missing() {
        assert_eq!(
            mifflin_st_jeor_bmr(None, Some(175.0), Some(30), Some(Gender::Male)),
            None
        );
        assert_eq!(
            mifflin_st_jeor_bmr(Some(82.0), None, Some(30), Some(Gender::Male)),
            None
        );
        assert_eq!(
            mifflin_st_jeor_bmr(Some(82.0), Some(175.0), None, Some(Gender::Male)),
            None
        );
        assert_eq!(
            mifflin_st_jeor_bmr(Some(82.0), Some(175.0), Some(30), None),
            None
        );
    }

    #[test]
    fn bmr_unknown_for_non_positive_inputs() {
        assert_eq!(
            mifflin_st_jeor_bmr(Some(0.0), Some(175.0), Some(30), Some(Gender::Male)),
            None
        );
        assert_eq!(
            mifflin_st_jeor_bmr(Some(82.0), Some(-1.0), Some(30), Some(Gender::Female)),
            None
        );
        assert_eq!(
            mifflin_st_jeor_bmr(Some(82.0), Some(175.0), Some(0), Some(Gender::Male)),
            None
        );
    }

    #[test]
    fn calorie_target_applies_activity_factor_and_deficit() {
        let t = suggest_daily_calories(1600, Some(ActivityLevel::Sedentary));
        assert_eq!(t.maintenance, 1920);
        assert_eq!(t.suggested, 1420);
        assert_eq!(t.deficit, 500);

        let t = suggest_daily_calories(1600, Some(ActivityLevel::Active));
        assert_eq!(t.maintenance, 2760);
        assert_eq!(t.suggested, 2260);
    }

    #[test]
    fn unset_activity_defaults_to_sedentary() {
        assert_eq!(
            suggest_daily_calories(1600, None),
            suggest_daily_calories(1600, Some(ActivityLevel::Sedentary))
        );
    }

    #[test]
    fn suggested_intake_never_below_floor() {
        let t = suggest_daily_calories(800, Some(ActivityLevel::Sedentary));
        assert_eq!(t.maintenance, 960);
        assert_eq!(t.suggested, MIN_SUGGESTED_KCAL);
    }
}
