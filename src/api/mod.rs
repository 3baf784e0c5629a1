//! HTTP surface of the gateway.
//!
//! Routes are nested under `/api/ai` (inference proxy) and `/api/chatbot`
//! (conversation store) and protected by a middleware stack:
//! CORS → Throttle → Auth → Access log → Handler.
//!
//! The router is composable: `gateway_router()` returns a `Router` that can
//! be mounted on any axum server instance.

pub mod endpoints;
pub mod error;
pub mod middleware;
pub mod router;
pub mod server;
pub mod types;

pub use router::{build_router, cors_layer, gateway_router};
pub use server::{start_gateway_server, GatewayServer, GatewaySession, ServerError};
pub use types::ApiContext;
