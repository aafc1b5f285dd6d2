//! Server-Sent-Events streaming of the combined feed.

pub mod fan_in;
pub mod frame;
pub mod handler;

pub use fan_in::{FanIn, ForwarderExit, MergedStream};
pub use frame::SseFrame;
pub use handler::{parse_types, SseRoute};
