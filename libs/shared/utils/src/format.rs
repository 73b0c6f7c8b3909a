use chrono::NaiveDate;

/// Renders `YYYY-MM-DD` as `DD Mon, YYYY`, e.g. `2024-03-05` -> `05 Mar, 2024`.
/// Anything that is not a real calendar date yields an empty string.
pub fn format_date_display(date: &str) -> String {
    match NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d") {
        Ok(parsed) => format_naive_date(parsed),
        Err(_) => String::new(),
    }
}

pub fn format_naive_date(date: NaiveDate) -> String {
    date.format("%d %b, %Y").to_string()
}
