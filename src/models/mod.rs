pub mod booking;
pub mod conversation;
pub mod intent;
pub mod slot;
pub mod technician;

pub use booking::{Booking, BookingDetails, BookingStatus, BOOKING_DURATION_MINUTES};
pub use conversation::{ConversationContext, Role, Turn, MAX_CONTEXT_TURNS};
pub use intent::{Clarification, DayPeriod, IntentKind, ParsedIntent, RequestedTime};
pub use slot::Slot;
pub use technician::{RosterEntry, Technician};
