use chrono::NaiveDateTime;

/// Date-time format sent to the server for pickup/drop and booking windows
pub const DATETIME_WIRE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Format a rupee amount with two decimals, or "N/A" when unknown
pub fn format_price(amount: Option<f64>) -> String {
    match amount {
        Some(a) if a.is_finite() => format!("₹{:.2}", a),
        _ => "N/A".to_string(),
    }
}

/// Truncate a string to a maximum length, adding ellipsis if needed
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}

/// Format a server date string to a more readable format
pub fn format_date(date: &str) -> String {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(date) {
        dt.format("%b %d, %Y").to_string()
    } else if let Ok(dt) = NaiveDateTime::parse_from_str(date, DATETIME_WIRE_FORMAT) {
        dt.format("%b %d, %Y").to_string()
    } else if date.len() >= 10 {
        // Fall back to the YYYY-MM-DD prefix
        date.chars().take(10).collect()
    } else {
        date.to_string()
    }
}

/// Format a rental window boundary for display
pub fn format_window(dt: &NaiveDateTime) -> String {
    dt.format("%b %d, %Y %H:%M").to_string()
}
