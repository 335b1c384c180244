//! Everything between Redis and the client: the broker connection and its listener
//! registry, per-client sessions with their visibility checks, and the two transports.
pub mod filter;
pub mod metrics;
pub mod redis;
pub mod session;
pub mod stream;

pub use metrics::{ConnectedClients, Metrics};
pub use redis::{Manager, RedisCmd, RedisConn, RedisConnErr, SharedManager};
pub use session::{Delivery, Session};
pub use stream::{Sse, Ws};
