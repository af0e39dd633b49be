use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, Timelike};
use serde::Deserialize;

use crate::errors::BookingError;
use crate::models::{
    Clarification, ConversationContext, DayPeriod, IntentKind, ParsedIntent, RequestedTime,
    RosterEntry, Technician,
};
use crate::services::ai::CompletionProvider;

const SYSTEM_PROMPT: &str = r#"You are the intent extraction engine of a technician booking assistant.
Read the user's latest message in the context of the previous conversation and classify it.

Actions:
- "create": the user wants to book, schedule or request a technician
- "cancel": the user wants to cancel, remove or delete a booking
- "query": the user wants booking details, a list of bookings, or which technicians are free
- "unknown": anything else

Time rules:
- Use the current time below to resolve "today", "tomorrow", weekdays and "in X hours".
- If the user names an exact time, put it in "booking_time" as YYYY-MM-DDTHH:MM:SS.
- If the user only names a day or part of a day ("tomorrow afternoon", "friday"), leave
  "booking_time" null and fill "date" (YYYY-MM-DD) and "period" (morning, afternoon, evening or any).
- Never invent a time the user did not ask for.

Booking ids:
- Put an explicitly mentioned booking number in "booking_id".
- For "cancel that one" style follow-ups, use the booking id mentioned in the previous conversation.

Return ONLY a JSON object, no markdown and no explanation, with exactly these keys:
{"action": "create|cancel|query|unknown", "technician_type": "plumber or null", "booking_time": "YYYY-MM-DDTHH:MM:SS or null", "date": "YYYY-MM-DD or null", "period": "morning|afternoon|evening|any or null", "booking_id": 123, "justification": "one short sentence"}
"#;

/// Turn a chat message into a validated intent.
///
/// The completion call is bounded by `timeout` and holds no store lock.
pub async fn interpret(
    llm: &dyn CompletionProvider,
    utterance: &str,
    context: &ConversationContext,
    roster: &[RosterEntry],
    now: NaiveDateTime,
    timeout: Duration,
) -> Result<ParsedIntent, BookingError> {
    let prompt = build_prompt(utterance, context, roster, now);

    let response = match tokio::time::timeout(timeout, llm.complete(&prompt)).await {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "completion request failed");
            return Err(BookingError::InterpreterUnavailable(e.to_string()));
        }
        Err(_) => {
            tracing::warn!(timeout_ms = timeout.as_millis() as u64, "completion request timed out");
            return Err(BookingError::InterpreterUnavailable(format!(
                "no reply within {}ms",
                timeout.as_millis()
            )));
        }
    };

    match parse_completion(&response) {
        Some(raw) => normalize(raw, context, roster, now),
        None => {
            tracing::warn!("failed to parse completion as intent JSON, treating as unknown");
            Ok(ParsedIntent::unknown())
        }
    }
}

pub fn build_prompt(
    utterance: &str,
    context: &ConversationContext,
    roster: &[RosterEntry],
    now: NaiveDateTime,
) -> String {
    format!(
        "{SYSTEM_PROMPT}\nCurrent time: {} ({})\n\nTECHNICIANS:\n{}\n\nPrevious conversation:\n{}\n\nUser message: {utterance}\n",
        now.format("%Y-%m-%dT%H:%M:%S"),
        now.format("%A"),
        roster_summary(roster),
        context.transcript(),
    )
}

fn roster_summary(roster: &[RosterEntry]) -> String {
    if roster.is_empty() {
        return "(no technicians available)".to_string();
    }

    let mut by_type: BTreeMap<String, Vec<&RosterEntry>> = BTreeMap::new();
    for entry in roster {
        by_type
            .entry(entry.technician.technician_type.to_uppercase())
            .or_default()
            .push(entry);
    }

    let mut lines = vec![];
    for (technician_type, entries) in by_type {
        lines.push(format!("{technician_type}:"));
        for entry in entries {
            let open = if entry.open_slots_today.is_empty() {
                "no open slots today".to_string()
            } else {
                let slots: Vec<String> = entry.open_slots_today.iter().take(3).map(|s| s.label()).collect();
                format!("open today {}", slots.join(", "))
            };
            lines.push(format!(
                "- {} (working hours {}; {open})",
                entry.technician.name,
                entry.technician.working_hours_label(),
            ));
        }
    }
    lines.join("\n")
}

#[derive(Debug, Default, Deserialize)]
struct RawIntent {
    #[serde(alias = "intent")]
    action: Option<String>,
    technician_type: Option<String>,
    #[serde(alias = "requested_time")]
    booking_time: Option<String>,
    date: Option<String>,
    period: Option<String>,
    booking_id: Option<serde_json::Value>,
    #[serde(alias = "reason")]
    justification: Option<String>,
}

fn parse_completion(response: &str) -> Option<RawIntent> {
    // Reasoning models prepend their chain of thought.
    let response = match response.rfind("</think>") {
        Some(idx) => &response[idx + "</think>".len()..],
        None => response,
    };

    if let Ok(raw) = serde_json::from_str::<RawIntent>(response) {
        return Some(raw);
    }

    // Strip markdown code fences
    let trimmed = response.trim();
    let cleaned = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let cleaned = cleaned.strip_suffix("```").unwrap_or(cleaned).trim();

    if let Ok(raw) = serde_json::from_str::<RawIntent>(cleaned) {
        return Some(raw);
    }

    let start = cleaned.find('{')?;
    let end = cleaned.rfind('}')?;
    if start >= end {
        return None;
    }
    serde_json::from_str::<RawIntent>(&cleaned[start..=end]).ok()
}

fn normalize(
    raw: RawIntent,
    context: &ConversationContext,
    roster: &[RosterEntry],
    now: NaiveDateTime,
) -> Result<ParsedIntent, BookingError> {
    let kind = raw
        .action
        .as_deref()
        .map(IntentKind::parse)
        .unwrap_or(IntentKind::Unknown);

    if kind == IntentKind::Unknown {
        return Ok(ParsedIntent {
            justification: raw.justification,
            ..ParsedIntent::unknown()
        });
    }

    let technician_type = present(raw.technician_type.as_deref()).map(str::to_lowercase);
    let booking_id = raw.booking_id.as_ref().and_then(booking_id_from_value);
    let requested_time = requested_time(
        present(raw.booking_time.as_deref()),
        present(raw.date.as_deref()),
        present(raw.period.as_deref()),
        now,
    );

    if matches!(kind, IntentKind::Create | IntentKind::Query) {
        if let Some(requested) = &requested_time {
            ensure_not_past(requested, now)?;
        }
    }

    let mut intent = ParsedIntent {
        kind,
        technician_type,
        requested_time,
        booking_id,
        candidates: Vec::new(),
        clarification: None,
        justification: raw.justification,
    };

    if kind != IntentKind::Cancel {
        if let Some(requested_type) = &intent.technician_type {
            intent.candidates = rank_candidates(roster, requested_type);
            if intent.candidates.is_empty() && kind == IntentKind::Query {
                return Err(BookingError::TechnicianNotFound(requested_type.clone()));
            }
        }
    }

    let intent = match kind {
        IntentKind::Create if intent.candidates.is_empty() => {
            intent.needs(Clarification::TechnicianType)
        }
        IntentKind::Create if intent.requested_time.is_none() => intent.needs(Clarification::Time),
        IntentKind::Cancel
            if intent.booking_id.is_none() && context.most_recent_booking_id().is_none() =>
        {
            intent.needs(Clarification::BookingId)
        }
        _ => intent,
    };

    Ok(intent)
}

/// Active technicians of the requested type, least-recently-booked first.
/// Never-booked technicians come first; ties go to the lower id.
pub fn rank_candidates(roster: &[RosterEntry], requested_type: &str) -> Vec<Technician> {
    let mut matching: Vec<&RosterEntry> = roster
        .iter()
        .filter(|e| e.technician.is_active && e.technician.matches_type(requested_type))
        .collect();
    matching.sort_by_key(|e| (e.last_booking_id, e.technician.id));
    matching.into_iter().map(|e| e.technician.clone()).collect()
}

fn present(value: Option<&str>) -> Option<&str> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("null") && !v.eq_ignore_ascii_case("none"))
}

fn booking_id_from_value(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().trim_start_matches('#').parse().ok(),
        _ => None,
    }
}

/// Unreadable time text yields `None` so the caller asks for a time instead of failing.
fn requested_time(
    booking_time: Option<&str>,
    date: Option<&str>,
    period: Option<&str>,
    now: NaiveDateTime,
) -> Option<RequestedTime> {
    let period = period.map(|p| {
        DayPeriod::parse(p).unwrap_or_else(|| {
            tracing::warn!(period = p, "unrecognised part of day, using the whole day");
            DayPeriod::Any
        })
    });

    if let Some(text) = booking_time {
        if let Some(exact) = parse_datetime(text) {
            return Some(RequestedTime::Exact(exact));
        }
        if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
            return Some(RequestedTime::Window {
                date,
                period: period.unwrap_or(DayPeriod::Any),
            });
        }
        tracing::warn!(booking_time = text, "could not read booking time");
    }

    let date = match date {
        Some(d) => match NaiveDate::parse_from_str(d, "%Y-%m-%d") {
            Ok(date) => Some(date),
            Err(_) => {
                tracing::warn!(date = d, "could not read date");
                return None;
            }
        },
        None => None,
    };

    match (date, period) {
        (None, None) => None,
        (date, period) => Some(RequestedTime::Window {
            date: date.unwrap_or(now.date()),
            period: period.unwrap_or(DayPeriod::Any),
        }),
    }
}

/// Accepts ISO-8601 with `T` or space, with or without seconds, and RFC 3339
/// offsets (converted to server-local time). Seconds are dropped.
fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    const FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
    ];

    let parsed = FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(text, f).ok())
        .or_else(|| {
            DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|dt| dt.with_timezone(&Local).naive_local())
        })?;

    parsed.with_second(0).and_then(|t| t.with_nanosecond(0))
}

fn ensure_not_past(requested: &RequestedTime, now: NaiveDateTime) -> Result<(), BookingError> {
    match requested {
        RequestedTime::Exact(t) if *t < now => Err(BookingError::InvalidTime(format!(
            "{} is in the past",
            t.format("%B %d, %Y at %I:%M %p")
        ))),
        RequestedTime::Window { date, period } if period.bounds(*date).1 <= now => {
            Err(BookingError::InvalidTime(format!(
                "{} {} has already passed",
                date.format("%B %d, %Y"),
                period.label()
            )
            .trim_end()
            .to_string()))
        }
        _ => Ok(()),
    }
}
