//! Domain models.
//!
//! Reference datasets (universities, scholarships, careers) flow through
//! the engines as opaque JSON snapshots and never get types here; only
//! the data the crate itself mutates is modeled:
//!
//! - `Poll`, `PollOption`: community polls with local tallies
//! - `UserIdentity`: the id attached to remote submissions

pub mod poll;
pub mod user;

pub use poll::{Poll, PollOption};
pub use user::UserIdentity;
