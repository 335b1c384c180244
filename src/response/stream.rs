//! The two client transports: Server Sent Events and WebSocket.
pub use sse::Sse;
pub use ws::Ws;

mod sse;
mod ws;
