//! Business services: the reminder engine, manual lifecycle actions, and
//! outbound notifications.

pub mod lifecycle;
pub mod notify;
pub mod reminders;

pub use lifecycle::{LifecycleService, ManualOutcome};
pub use notify::{EmailNotifier, Notifier, NotifyError};
pub use reminders::{CycleOutcome, ReminderEngine};
