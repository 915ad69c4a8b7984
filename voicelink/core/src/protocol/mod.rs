//! Stream Protocol
//!
//! - [`handler`]: inbound message classification and stream boundaries
//! - [`decode`]: ordered off-thread chunk decoding

pub mod decode;
pub mod handler;

pub use decode::{DecodePipeline, DecodedChunk};
pub use handler::{Dispatch, HandlerStats, StreamHandler};
