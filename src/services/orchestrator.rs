use chrono::{Local, NaiveDate, NaiveDateTime};
use serde::Serialize;
use tracing::Instrument;

use crate::errors::BookingError;
use crate::models::{
    Booking, BookingDetails, Clarification, ConversationContext, DayPeriod, IntentKind,
    ParsedIntent, RequestedTime, Slot, Technician,
};
use crate::services::ai::intent::interpret;
use crate::services::availability;
use crate::state::AppState;

const UNKNOWN_REPLY: &str = "I can help you book a technician, cancel a booking, or check bookings and availability. What would you like to do?";
const GENERIC_FAILURE: &str = "Something went wrong on our side. Please try again.";

#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub message: String,
    pub booking_created: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking: Option<BookingDetails>,
}

/// Where a request is in its single pass through the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Received,
    Interpreted,
    ResolvingSlot,
    Validating,
    Committed,
    Rejected,
    Responded,
}

fn enter(stage: Stage) {
    tracing::debug!(stage = ?stage, "request stage");
}

enum Outcome {
    Created(BookingDetails),
    Cancelled(BookingDetails),
    Found(BookingDetails),
    Upcoming(Vec<BookingDetails>),
    Openings {
        date: NaiveDate,
        period: DayPeriod,
        openings: Vec<(Technician, Vec<Slot>)>,
    },
    Clarify {
        needed: Clarification,
        requested_type: Option<String>,
        known_types: Vec<String>,
    },
}

/// Handle one chat message against the current time.
pub async fn process_message(state: &AppState, text: &str, context: ConversationContext) -> ChatReply {
    process_message_at(state, text, &context, Local::now().naive_local()).await
}

/// Handle one chat message as if it arrived at `now`. Always produces a reply.
pub async fn process_message_at(
    state: &AppState,
    text: &str,
    context: &ConversationContext,
    now: NaiveDateTime,
) -> ChatReply {
    let span = tracing::info_span!("process_message", request_id = %uuid::Uuid::new_v4());

    async move {
        enter(Stage::Received);
        let reply = match handle(state, text, context, now).await {
            Ok(outcome) => {
                if matches!(outcome, Outcome::Created(_) | Outcome::Cancelled(_)) {
                    enter(Stage::Committed);
                }
                render(outcome)
            }
            Err(e) => {
                enter(Stage::Rejected);
                render_error(&e)
            }
        };
        enter(Stage::Responded);
        reply
    }
    .instrument(span)
    .await
}

async fn handle(
    state: &AppState,
    text: &str,
    context: &ConversationContext,
    now: NaiveDateTime,
) -> Result<Outcome, BookingError> {
    // Snapshot is taken before the completion call so no lock is held while it runs.
    let roster = state.store.roster(now.date())?;

    let intent = interpret(
        state.llm.as_ref(),
        text,
        context,
        &roster,
        now,
        state.config.completion_timeout,
    )
    .await?;
    enter(Stage::Interpreted);

    tracing::info!(
        kind = ?intent.kind,
        technician_type = intent.technician_type.as_deref(),
        booking_id = intent.booking_id,
        candidates = intent.candidates.len(),
        "interpreted message"
    );

    match intent.kind {
        IntentKind::Create => create(state, &intent, now),
        IntentKind::Cancel => cancel(state, &intent, context),
        IntentKind::Query => query(state, &intent, now),
        IntentKind::Unknown => {
            let Some(needed) = intent.clarification else {
                return Err(BookingError::UnknownIntent);
            };
            let mut known_types: Vec<String> = roster
                .iter()
                .map(|e| e.technician.technician_type.to_lowercase())
                .collect();
            known_types.sort();
            known_types.dedup();
            Ok(Outcome::Clarify {
                needed,
                requested_type: intent.technician_type,
                known_types,
            })
        }
    }
}

fn create(state: &AppState, intent: &ParsedIntent, now: NaiveDateTime) -> Result<Outcome, BookingError> {
    let Some(requested) = intent.requested_time else {
        return Ok(Outcome::Clarify {
            needed: Clarification::Time,
            requested_type: None,
            known_types: vec![],
        });
    };
    let technician_type = intent.technician_type.clone().unwrap_or_default();
    let description = format!("Scheduled {technician_type} appointment");

    let mut rejection: Option<BookingError> = None;
    for technician in &intent.candidates {
        let start = match requested {
            RequestedTime::Exact(t) => t,
            RequestedTime::Window { date, period } => {
                enter(Stage::ResolvingSlot);
                let slots = state.store.available_slots(technician.id, date)?;
                match availability::first_start_in(&slots, date, period, now) {
                    Some(start) => start,
                    None => continue,
                }
            }
        };

        enter(Stage::Validating);
        match state.store.create_booking(technician.id, start, Some(&description)) {
            Ok(details) => return Ok(Outcome::Created(details)),
            Err(e @ (BookingError::SchedulingConflict { .. } | BookingError::TimeOutsideWorkingHours { .. })) => {
                tracing::info!(technician_id = technician.id, error = %e, "candidate rejected");
                let prefer = matches!(e, BookingError::SchedulingConflict { .. })
                    && !matches!(rejection, Some(BookingError::SchedulingConflict { .. }));
                if rejection.is_none() || prefer {
                    rejection = Some(e);
                }
            }
            Err(e) => return Err(e),
        }
    }

    Err(match (rejection, requested) {
        (Some(e), _) => e,
        (None, RequestedTime::Window { date, period }) => BookingError::NoAvailableSlot {
            technician_type,
            date,
            period,
        },
        (None, RequestedTime::Exact(_)) => BookingError::TechnicianNotFound(technician_type),
    })
}

fn cancel(
    state: &AppState,
    intent: &ParsedIntent,
    context: &ConversationContext,
) -> Result<Outcome, BookingError> {
    let Some(id) = intent.booking_id.or_else(|| context.most_recent_booking_id()) else {
        return Ok(Outcome::Clarify {
            needed: Clarification::BookingId,
            requested_type: None,
            known_types: vec![],
        });
    };

    enter(Stage::Validating);
    Ok(Outcome::Cancelled(state.store.cancel_booking(id)?))
}

fn query(state: &AppState, intent: &ParsedIntent, now: NaiveDateTime) -> Result<Outcome, BookingError> {
    if let Some(id) = intent.booking_id {
        return Ok(Outcome::Found(state.store.get_booking(id)?));
    }

    if intent.technician_type.is_none() && intent.requested_time.is_none() {
        return Ok(Outcome::Upcoming(state.store.list_bookings()?));
    }

    let (date, period, from, to) = match intent.requested_time {
        Some(RequestedTime::Exact(t)) => (t.date(), DayPeriod::Any, t, t + Booking::duration()),
        Some(RequestedTime::Window { date, period }) => {
            let (from, to) = period.bounds(date);
            (date, period, from, to)
        }
        None => {
            let (from, to) = DayPeriod::Any.bounds(now.date());
            (now.date(), DayPeriod::Any, from, to)
        }
    };

    let technicians = if intent.technician_type.is_some() {
        intent.candidates.clone()
    } else {
        state.store.list_technicians(true)?
    };

    let mut openings = vec![];
    for technician in technicians {
        let slots = state.store.available_slots(technician.id, date)?;
        let within = availability::slots_within(&slots, from.max(now), to);
        openings.push((technician, within));
    }

    Ok(Outcome::Openings {
        date,
        period,
        openings,
    })
}

fn fmt_time(t: &NaiveDateTime) -> String {
    t.format("%I:%M %p on %B %d, %Y").to_string()
}

fn render(outcome: Outcome) -> ChatReply {
    let reply = |message: String| ChatReply {
        message,
        booking_created: false,
        booking: None,
    };

    match outcome {
        Outcome::Created(details) => ChatReply {
            message: format!(
                "Great! I've scheduled a {} ({}) for you at {}. Your booking ID is {}.",
                details.technician.technician_type.to_lowercase(),
                details.technician.name,
                fmt_time(&details.booking.booking_time),
                details.booking.id,
            ),
            booking_created: true,
            booking: Some(details),
        },
        Outcome::Cancelled(details) => ChatReply {
            message: format!(
                "I've cancelled booking {} for you. Is there anything else you need help with?",
                details.booking.id
            ),
            booking_created: false,
            booking: Some(details),
        },
        Outcome::Found(details) => ChatReply {
            message: format!(
                "Here are the details for booking {}:\n- Time: {}\n- Technician: {} ({})\n- Status: {}\n- Working Hours: {}",
                details.booking.id,
                fmt_time(&details.booking.booking_time),
                details.technician.name,
                details.technician.technician_type,
                details.booking.status.as_str(),
                details.technician.working_hours_label(),
            ),
            booking_created: false,
            booking: Some(details),
        },
        Outcome::Upcoming(bookings) if bookings.is_empty() => {
            reply("There are no active bookings right now.".to_string())
        }
        Outcome::Upcoming(bookings) => {
            let lines: Vec<String> = bookings
                .iter()
                .map(|d| {
                    format!(
                        "- #{}: {} with {} ({})",
                        d.booking.id,
                        fmt_time(&d.booking.booking_time),
                        d.technician.name,
                        d.technician.technician_type,
                    )
                })
                .collect();
            reply(format!("Here are the current bookings:\n{}", lines.join("\n")))
        }
        Outcome::Openings { date, period, openings } => {
            let when = format!("{} {}", date.format("%B %d, %Y"), period.label());
            let when = when.trim_end();
            if openings.is_empty() {
                return reply(format!("I couldn't find any active technicians for {when}."));
            }
            let lines: Vec<String> = openings
                .iter()
                .map(|(t, slots)| {
                    if slots.is_empty() {
                        format!("- {} ({}): no openings", t.name, t.technician_type)
                    } else {
                        let labels: Vec<String> = slots.iter().map(|s| s.label()).collect();
                        format!("- {} ({}): {}", t.name, t.technician_type, labels.join(", "))
                    }
                })
                .collect();
            reply(format!("Here's who is free on {when}:\n{}", lines.join("\n")))
        }
        Outcome::Clarify {
            needed,
            requested_type,
            known_types,
        } => reply(clarification_message(needed, requested_type.as_deref(), &known_types)),
    }
}

fn clarification_message(needed: Clarification, requested_type: Option<&str>, known_types: &[String]) -> String {
    match needed {
        Clarification::TechnicianType => {
            let ask = match requested_type {
                Some(t) => format!("I couldn't find an available {t} technician."),
                None => "I need to know what type of technician you need.".to_string(),
            };
            if known_types.is_empty() {
                format!("{ask} Could you tell me which type you need?")
            } else {
                format!("{ask} We currently have: {}.", known_types.join(", "))
            }
        }
        Clarification::Time => "When would you like the technician to come? You can give a date and time, or something like \"tomorrow afternoon\".".to_string(),
        Clarification::BookingId => {
            "Which booking do you mean? Please give me the booking ID.".to_string()
        }
    }
}

fn render_error(error: &BookingError) -> ChatReply {
    let message = match error {
        BookingError::TechnicianNotFound(what) => format!(
            "I'm sorry, but I couldn't find an available technician matching \"{what}\". Could you check the type and try again?"
        ),
        BookingError::UnavailableTechnician { name } => {
            format!("{name} isn't taking bookings right now. Would you like someone else?")
        }
        BookingError::BookingNotFound(id) => format!(
            "I couldn't find an active booking {id}. It may not exist or may already be cancelled. Could you please verify the booking ID?"
        ),
        BookingError::TimeOutsideWorkingHours { name, hours, time } => format!(
            "{} is outside {name}'s working hours ({hours}). Would you like to try a different time?",
            fmt_time(time)
        ),
        BookingError::SchedulingConflict { name, time } => format!(
            "I apologize, but {name} is already booked around {}. Would you like to try a different time?",
            fmt_time(time)
        ),
        BookingError::NoAvailableSlot {
            technician_type,
            date,
            period,
        } => {
            let when = format!("{} {}", date.format("%B %d, %Y"), period.label());
            format!(
                "There are no open {technician_type} appointments on {}. Would you like to try another day?",
                when.trim_end()
            )
        }
        BookingError::InvalidTime(detail) => {
            format!("That time doesn't work: {detail}. Please choose a time in the future.")
        }
        BookingError::InterpreterUnavailable(reason) => {
            tracing::warn!(reason = %reason, "interpreter unavailable");
            "I'm having trouble understanding requests right now. Please try again in a moment.".to_string()
        }
        BookingError::UnknownIntent => UNKNOWN_REPLY.to_string(),
        BookingError::Storage(_) | BookingError::Internal(_) => {
            tracing::error!(error = %error, "request failed");
            GENERIC_FAILURE.to_string()
        }
    };

    if !error.is_infrastructure() {
        tracing::info!(error = %error, "request rejected");
    }

    ChatReply {
        message,
        booking_created: false,
        booking: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infrastructure_errors_are_generic() {
        let reply = render_error(&BookingError::Internal(anyhow::anyhow!("disk on fire")));
        assert_eq!(reply.message, GENERIC_FAILURE);
        assert!(!reply.booking_created);
    }

    #[test]
    fn test_domain_errors_are_specific() {
        let reply = render_error(&BookingError::BookingNotFound(999));
        assert!(reply.message.contains("999"));

        let time = NaiveDateTime::parse_from_str("2025-10-15 10:30", "%Y-%m-%d %H:%M").unwrap();
        let reply = render_error(&BookingError::SchedulingConflict {
            name: "Nicolas Woollett".to_string(),
            time,
        });
        assert!(reply.message.contains("already booked"));
        assert!(reply.message.contains("10:30 AM on October 15, 2025"));
    }

    #[test]
    fn test_clarification_lists_known_types() {
        let known = ["electrician".to_string(), "plumber".to_string()];
        let msg = clarification_message(Clarification::TechnicianType, None, &known);
        assert!(msg.ends_with("electrician, plumber."));

        let msg = clarification_message(Clarification::TechnicianType, Some("carpenter"), &known);
        assert!(msg.starts_with("I couldn't find an available carpenter technician."));
    }
}
