use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};

use clinic_cell::models::Doctor;
use notification_cell::models::{EmailAttachment, EmailRequest};
use shared_utils::format::format_naive_date;

use crate::models::{DailyQueue, Token};

/// Builds the end-of-day summary email for a doctor's queue, with the full
/// token list attached as CSV.
pub fn build_queue_report(queue: &DailyQueue, doctor: &Doctor, to: &str) -> EmailRequest {
    let date = format_naive_date(queue.date);
    let csv = render_csv(queue);

    EmailRequest {
        to: to.to_string(),
        subject: format!("Queue summary for {} - {}", doctor.display_name(), date),
        html: render_html(queue, doctor, &date),
        attachment: Some(EmailAttachment {
            filename: format!("queue-{}.csv", queue.date),
            content: STANDARD.encode(csv.as_bytes()),
            content_type: "text/csv".to_string(),
        }),
    }
}

fn render_html(queue: &DailyQueue, doctor: &Doctor, date: &str) -> String {
    let stats = queue.stats();
    let average = stats
        .average_service_minutes
        .map(|m| format!("{:.1} min", m))
        .unwrap_or_else(|| "-".to_string());

    let rows: String = [
        ("Total tokens", stats.total.to_string()),
        ("Completed", stats.completed.to_string()),
        ("No-show", stats.no_show.to_string()),
        ("Cancelled", stats.cancelled.to_string()),
        ("Still waiting", (stats.waiting + stats.skipped).to_string()),
        ("Average consultation", average),
    ]
    .iter()
    .map(|(label, value)| format!("<tr><td>{}</td><td>{}</td></tr>", label, value))
    .collect();

    format!(
        "<h2>{}</h2><p>Queue for {} ({})</p><table>{}</table><p>The full token list is attached.</p>",
        escape_html(&doctor.display_name()),
        date,
        queue.status.as_str(),
        rows
    )
}

fn render_csv(queue: &DailyQueue) -> String {
    let mut tokens: Vec<&Token> = queue.tokens.iter().collect();
    tokens.sort_by_key(|t| t.token_number);

    let mut out = String::from("token,patient,phone,status,emergency,queued_at,called_at,finished_at\n");
    for token in tokens {
        out.push_str(&format!(
            "{},{},{},{},{},{},{},{}\n",
            token.token_number,
            csv_field(&token.patient.name),
            csv_field(&token.patient.phone),
            token.status.as_str(),
            token.is_emergency,
            token.queued_at.to_rfc3339(),
            timestamp(token.called_at),
            timestamp(token.finished_at),
        ));
    }
    out
}

fn timestamp(value: Option<DateTime<Utc>>) -> String {
    value.map(|t| t.to_rfc3339()).unwrap_or_default()
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
