//! Textcloud Server - HTTP surfaces of the storage service, the analysis
//! service and the gateway.

pub mod handlers;
pub mod server;

pub use server::{
    analysis_router, gateway_router, serve, start_analysis_server, start_gateway_server,
    start_storage_server, storage_router, GatewayState,
};
