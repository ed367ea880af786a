//! Domain services used by the webhook, admin pages, and schedules.
//!
//! ARCHITECTURE
//! ============
//! Service modules own business logic and persistence so route handlers can
//! stay focused on HTTP translation and session plumbing. Anything that talks
//! to the LLM or LINE takes the trait object from `AppState`, never a
//! concrete client.

pub mod admin_auth;
pub mod assistant;
pub mod classifier;
pub mod messages;
pub mod reports;
pub mod scheduler;
pub mod settings;
pub mod tasks;
pub mod users;

// `YYYY-MM-DD` serde for due dates.
time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");
