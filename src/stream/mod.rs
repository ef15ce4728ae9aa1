// src/stream/mod.rs - Streaming pipeline: transport, frame parsing, reply assembly

pub mod assembler;
pub mod frame;
pub mod transport;

pub use assembler::{ResponseAssembler, StreamState, TurnOutcome};
pub use frame::{FrameParser, StreamEvent};
pub use transport::{ChatTransport, HttpTransport, StreamHandle, StreamRequest, TransportEvent};
