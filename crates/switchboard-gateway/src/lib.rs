//! switchboard-gateway — HTTP front end for the switchboard router
//!
//! Serves the routing query, direct symbolic evaluation, agent registration,
//! and audit inspection over an Axum HTTP server.

pub mod auth;
pub mod protocol;
pub mod server;

pub use protocol::{EvaluateRequest, IntentEcho, RegisterReply, RouteReply};
pub use server::{GatewayServer, GatewayState};
