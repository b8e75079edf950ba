mod dispatch;
mod handler;
mod message;

pub use dispatch::dispatch_inbound;
pub use handler::{ws_handler, WsQuery};
pub use message::{ClientMessage, InboundError, OutboundMessage, ServerEvent, ServerMessage};
