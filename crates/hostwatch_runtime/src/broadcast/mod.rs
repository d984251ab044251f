// Live fan-out of accepted measurements to connected viewers

pub mod hub;
pub mod socket;

pub use hub::{BroadcastHub, BroadcastSummary, SinkError, ViewerId, ViewerSink};
pub use socket::WebSocketSink;
