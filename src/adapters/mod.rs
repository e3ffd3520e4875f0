//! View adapters.
//!
//! Pure transforms over store snapshots. Nothing here does I/O or holds
//! state; the session feeds call them on every read.

pub mod analytics;
pub mod notifications;
pub mod ticker;

pub use analytics::{region_analytics, rep_analytics, top_procedures_for_goals, RegionAnalytics};
pub use notifications::{summarize_notifications, NotificationSummary};
pub use ticker::{to_ticker_items, TickerItem, TickerPriority, TickerType};
