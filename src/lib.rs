pub mod api;
pub mod catalog;
pub mod config;
pub mod crew;
pub mod error;
pub mod events;
pub mod llm;
pub mod service;
pub mod session;
pub mod sink;
pub mod tools;

pub use config::Config;
pub use crew::{AgentDefinition, CrewEngine, TaskDefinition};
pub use error::{CrewError, Result};
pub use events::{CrewEvent, EventKind};
pub use service::CrewService;
pub use session::{Session, SessionStatus, SessionStore};
pub use sink::EventSink;
