//! Plain-text bodies for delivery rows. The transport sends them verbatim.

use crate::models::meeting::MeetingRow;
use crate::models::notification::{MatchReason, NotificationType};

/// SMS gateways split long texts; keep messages within three segments.
pub const MAX_MESSAGE_CHARS: usize = 480;

/// A matched subject with every reason it matched for.
#[derive(Debug, Clone)]
pub struct RenderedSubject<'a> {
    pub name: &'a str,
    pub reasons: Vec<MatchReason>,
}

fn headline(meeting: &MeetingRow, kind: NotificationType) -> String {
    let when = meeting.date_time.format("%d/%m/%Y %H:%M");
    match kind {
        NotificationType::BeforeMeeting => {
            format!("Upcoming council meeting: {} ({when})", meeting.name)
        }
        NotificationType::AfterMeeting => {
            format!("Council meeting summary: {} ({when})", meeting.name)
        }
    }
}

fn reason_label(reason: MatchReason) -> &'static str {
    match reason {
        MatchReason::Topic => "matches your interests",
        MatchReason::Proximity => "near an area you follow",
        MatchReason::GeneralInterest => "of general interest",
    }
}

pub fn render_email_body(
    meeting: &MeetingRow,
    kind: NotificationType,
    recipient_name: Option<&str>,
    subjects: &[RenderedSubject<'_>],
) -> String {
    let mut body = String::new();
    match recipient_name {
        Some(name) if !name.trim().is_empty() => body.push_str(&format!("Hello {},\n\n", name.trim())),
        _ => body.push_str("Hello,\n\n"),
    }
    body.push_str(&headline(meeting, kind));
    body.push_str("\n\nSubjects selected for you:\n");
    for subject in subjects {
        let reasons = subject
            .reasons
            .iter()
            .map(|r| reason_label(*r))
            .collect::<Vec<_>>()
            .join(", ");
        body.push_str(&format!("- {} ({reasons})\n", subject.name));
    }
    body
}

pub fn render_message_body(
    meeting: &MeetingRow,
    kind: NotificationType,
    subjects: &[RenderedSubject<'_>],
) -> String {
    let names = subjects
        .iter()
        .map(|s| s.name)
        .collect::<Vec<_>>()
        .join("; ");
    let full = format!("{}: {names}", headline(meeting, kind));
    truncate_chars(&full, MAX_MESSAGE_CHARS)
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}
