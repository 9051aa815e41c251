//! Display strings for the session snapshot.

/// Shown when no pace is available yet.
pub const NO_PACE: &str = "00:00";

/// `H:MM:SS` from one hour up, `M:SS` below.
pub fn format_elapsed(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

/// Kilometers with two decimals.
pub fn format_distance_km(meters: f64) -> String {
    let km = if meters.is_finite() { meters.max(0.0) / 1000.0 } else { 0.0 };
    format!("{:.2}", km)
}

/// Minutes per kilometer as `M:SS`, or the `00:00` sentinel.
pub fn format_pace(pace_min_per_km: Option<f64>) -> String {
    match pace_min_per_km.filter(|p| p.is_finite() && *p > 0.0) {
        Some(pace) => {
            let total_seconds = (pace * 60.0).round() as u64;
            format!("{}:{:02}", total_seconds / 60, total_seconds % 60)
        }
        None => NO_PACE.to_string(),
    }
}
