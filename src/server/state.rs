use axum::extract::FromRef;

use crate::synthesis::Synthesizer;
use std::sync::Arc;
use std::time::Instant;

use super::ServerConfig;

pub type GuardedSynthesizer = Arc<dyn Synthesizer>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub synthesizer: GuardedSynthesizer,
}

impl ServerState {
    pub fn new(config: ServerConfig, synthesizer: GuardedSynthesizer) -> Self {
        Self {
            config,
            start_time: Instant::now(),
            synthesizer,
        }
    }
}

impl FromRef<ServerState> for GuardedSynthesizer {
    fn from_ref(input: &ServerState) -> Self {
        input.synthesizer.clone()
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}
