//! Paginated rich-text editing core.
//!
//! Leaves first: `document` (tree + markers), `sanitizer`, `cursor`,
//! `history`, `metrics` and `pagination`; then `surface`, which composes them,
//! and `session`, which runs one surface per tokio task.

pub mod cursor;
pub mod document;
pub mod handlers;
pub mod history;
pub mod metrics;
pub mod pagination;
pub mod sanitizer;
pub mod scheduler;
pub mod session;
pub mod surface;
