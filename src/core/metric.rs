//! Energy expenditure estimation from MET coefficients.

/// Body mass used when none is configured.
pub const DEFAULT_BODY_MASS_KG: f64 = 70.0;

/// MET used for activity types not in the table.
pub const DEFAULT_MET: f64 = 5.0;

/// Metabolic equivalent for an activity type.
///
/// Lookup is case-insensitive. Unknown types fall back to [`DEFAULT_MET`].
pub fn met_for(activity_type: &str) -> f64 {
    match activity_type.trim().to_lowercase().as_str() {
        "basketball" => 8.0,
        "tennis" => 7.3,
        "soccer" | "football" => 10.0,
        "volleyball" => 4.0,
        "badminton" => 5.5,
        "pickleball" => 4.1,
        "squash" => 7.3,
        "running" => 9.8,
        "cycling" => 7.5,
        "swimming" => 6.0,
        "boxing" => 7.8,
        "climbing" => 8.0,
        "hiit" => 8.0,
        "gym" | "weightlifting" | "strength" => 5.0,
        "dance" => 5.0,
        "pilates" => 3.0,
        "yoga" => 2.5,
        "walking" => 3.5,
        _ => DEFAULT_MET,
    }
}

/// Estimate energy expenditure in whole units (kcal).
///
/// `energy = MET * body_mass_kg * hours`, rounded to the nearest unit.
/// Negative inputs are clamped to zero.
pub fn estimate(activity_type: &str, duration_minutes: f64, body_mass_kg: f64) -> u32 {
    let hours = duration_minutes.max(0.0) / 60.0;
    let energy = met_for(activity_type) * body_mass_kg.max(0.0) * hours;
    energy.round() as u32
}
