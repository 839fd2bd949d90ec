//! Live feed primitives for rxmon.
//!
//! Two building blocks live here, both free of any knowledge about what
//! flows through them:
//!
//! - [`ReplayFeed`] / [`Feed`] / [`FeedCursor`]: an append-only multicast
//!   channel with a join-in-progress buffer. Every reader starts from the
//!   first item ever published and then follows live items, each at its own
//!   pace. Nothing is dropped for slow readers.
//! - [`gate`] and [`sequence_gate`]: stream combinators that hold a stream
//!   back while a boolean control is closed and release it, in order, when
//!   the control opens.
//!
//! # Usage
//!
//! ```rust,ignore
//! use rxmon_feed::ReplayFeed;
//!
//! let feed = ReplayFeed::new();
//! feed.publish(1);
//! let mut reader = feed.feed().subscribe();
//! feed.publish(2);
//! assert_eq!(reader.try_recv(), Some(1));
//! assert_eq!(reader.recv().await, Some(2));
//! ```

mod feed;
mod gate;

pub use feed::{Feed, FeedCursor, ReplayFeed};
pub use gate::{dedup_consecutive, gate, sequence_gate};
