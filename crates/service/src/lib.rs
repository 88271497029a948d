//! Session state, the process-wide session registry, and the conversation
//! engine that admits and dispatches every inbound message.
//!
//! This crate owns everything a `SessionManager` would own, plus the
//! per-message admission pipeline. The wire types themselves (frame,
//! message, crypto) live in [`codec`]; this crate is where they gain
//! process state.

pub mod engine;
pub mod handler;
pub mod handlers;
pub mod image_store;
pub mod registry;
pub mod relay;
pub mod repository;
pub mod session;

pub use engine::{dispatch, AdmissionError, EngineError, IoOutcome};
pub use handler::{HandlerContext, RequiredStatus};
pub use handlers::build_handler_table;
pub use image_store::ImageStore;
pub use registry::SessionRegistry;
pub use relay::Relay;
pub use repository::{HostingRecord, Repository, RepositoryError};
pub use session::{ConversationStatus, PendingRequest, Session, SessionId};
