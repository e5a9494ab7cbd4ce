// Notification fan-out and its admin surface.
// builder: matches → notification/subject/delivery rows.
// admin + deletion: meeting-grouped reporting and bulk removal.

pub mod admin;
pub mod builder;
pub mod deletion;
pub mod deliveries;
pub mod handlers;
pub mod render;
