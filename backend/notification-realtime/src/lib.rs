pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod session;
pub mod websocket;

pub use config::Config;
pub use error::{AppError, Result};
pub use events::{EventBus, SystemEvent};
pub use services::*;
pub use session::{NotificationSession, SessionDeps, SessionIdentity};
pub use websocket::{ChannelOrchestrator, MessageRouter};
