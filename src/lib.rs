//! Health/readiness aggregation and graceful shutdown coordination
//!
//! Sits in front of long-running network components (tunnel listener,
//! metrics endpoint) and answers three questions:
//! - `/healthz` - is this instance healthy?
//! - `/readyz` - should traffic be routed to it?
//! - on SIGTERM - drain and stop every component within one shared deadline

pub mod config;
pub mod health;
pub mod logging;
pub mod server;
