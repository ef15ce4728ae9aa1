// src/core/mod.rs - Chat orchestration: request building and the turn state machine

pub mod orchestrator;
pub mod persist;
pub mod request;

pub use orchestrator::{ChatOrchestrator, HostEvent, SurfaceInput, TurnState};
pub use persist::{PersistJob, Persister};
pub use request::{build_request, resolve_target, ResolvedTarget};
