/// Real-time push channels
///
/// - `transport`: opening a channel and reading its text frames
/// - `orchestrator`: per-channel connect/reconnect/disconnect lifecycle
/// - `messages`: frame shapes and classification
/// - `router`: dispatch of classified frames to the store, toasts and events
pub mod messages;
pub mod orchestrator;
pub mod router;
pub mod transport;

pub use messages::{classify, ClassifiedFrame, FrameError};
pub use orchestrator::{ChannelOrchestrator, FrameHandler};
pub use router::{MessageRouter, RouteOutcome};
pub use transport::{ChannelTransport, FrameStream, WebSocketTransport};
