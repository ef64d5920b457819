//! Domain Model
//!
//! Two shapes per entity:
//!
//! - `*Row`: the origin's persistence shape, owned by the repositories.
//! - `*Record`: the flattened projection served to API handlers and stored
//!   in the cache tiers. Records never carry persistence-only columns
//!   (timestamps, password hashes).

mod forum;
mod tag;
mod thread;
mod user;

pub use forum::{ForumCounter, ForumRecord, ForumRow, ForumTreeNode};
pub use tag::{slugify, TagCounter, TagRecord, TagRow};
pub use thread::{ThreadCounter, ThreadListItem, ThreadRecord, ThreadRow};
pub use user::{UserRecord, UserRow};

/// Current Unix timestamp in seconds
pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}
