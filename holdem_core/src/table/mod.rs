//! Table session layer: per-table actors, the session registry, chat,
//! and the message/event protocol.

pub mod chat;
pub mod config;
pub mod manager;
pub mod messages;
pub mod session;

pub use config::TableConfig;
pub use manager::TableRegistry;
pub use messages::{ServerEvent, SessionError, SessionMessage};
pub use session::{SessionHandle, TableSession};
