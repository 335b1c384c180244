//! A real-time fanout server for Mastodon-compatible streaming clients.
//!
//! Clients connect with either Server Sent Events or a WebSocket using the API described [in
//! Mastodon's public API documentation](https://docs.joinmastodon.org/methods/streaming/).
//!
//! # Notes on data flow
//! * **Client Request → Warp**:
//! Warp filters for valid requests and parses request data.  The access token is resolved into
//! an `Identity` with Postgres, and the requested stream into a `Timeline`: the set of Redis
//! channels that carry it.  Requests that fail either step are rejected before anything is
//! subscribed.
//!
//! * **Warp → Session**:
//! Every connection gets a `Session`, which registers one listener per timeline with the
//! (single, shared) `Manager`.  A WebSocket session can attach and detach timelines for as long
//! as the connection is open; an SSE session has exactly one.
//!
//! * **Manager → Redis**:
//! The `Manager` subscribes to a Redis channel when its first listener arrives, refreshes the
//! channel's heartbeat key while any listener remains, and unsubscribes when the last one leaves.
//!
//! * **Redis → Session**:
//! The `RedisConn` parses each published message into an `Event` exactly once and hands it to
//! the `Manager`, which fans it out to that channel's listeners.  Each session then decides, per
//! viewer, whether to deliver it (blocks, mutes, languages) and annotates updates with the
//! viewer's keyword filter matches before writing them to the client.
pub mod config;
pub mod err;
pub mod event;
pub mod request;
pub mod response;
pub mod worker;
