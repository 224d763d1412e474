/// WebSocket side of live push delivery.
///
/// - `registry`: user -> current connection, one entry per user
/// - `dispatcher`: local delivery through the registry
/// - `protocol`: handshake / heartbeat / close state machine
/// - `session`: actix actor that binds a socket to the protocol handler
pub mod connection;
pub mod dispatcher;
pub mod message_types;
pub mod protocol;
pub mod registry;
pub mod session;

pub use connection::{Connection, ConnectionId, Outbound, UserId};
pub use dispatcher::LocalDispatcher;
pub use message_types::{InboundMessage, OutboundMessage};
pub use protocol::{parse_user_id, CloseReason, ConnectionState, FrameOutcome, ProtocolHandler};
pub use registry::ConnectionRegistry;
pub use session::WsSession;
