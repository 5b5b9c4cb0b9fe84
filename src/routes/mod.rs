// Route module decomposition — each domain area in its own file.

mod auto_reply;
#[path = "events_ws.rs"]
mod events_ws_route;
mod labels;
mod notifications;
mod system;

pub use auto_reply::{list_auto_replies, reply_feedback, suggest_auto_reply};
pub use events_ws_route::{events_status, events_ws};
pub use labels::{create_intent_label, list_intent_labels};
pub use notifications::{list_staff_notifications, resolve_staff_notification};
pub use system::{auto_send_stats, health, not_found, run_pipeline, stats};
