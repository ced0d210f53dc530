//! hand.frame.v1 detector record schema
//!
//! The wire format the landmark detector writes (one JSON record per frame)
//! and the adapter that turns records into [`crate::types::HandFrame`]s.

mod adapter;
mod raw_frame;

pub use adapter::*;
pub use raw_frame::*;
