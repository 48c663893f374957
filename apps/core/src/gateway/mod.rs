pub mod relay;
pub mod routes;
pub mod socket;

use crate::actors::supervisor::SupervisorHandle;
use crate::config::Config;
use crate::media::speech::SpeechClient;
use socket::SocketRegistry;
use std::sync::Arc;

/// Shared state for every gateway handler.
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    pub registry: SocketRegistry,
    pub supervisor: SupervisorHandle,
    pub speech: SpeechClient,
}

pub use routes::build_router;
