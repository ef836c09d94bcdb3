use std::sync::Arc;

pub mod handlers;
pub mod router;
pub mod types;

pub use handlers::*;
pub use router::create_router;
pub use types::*;

use crate::config::GateConfig;
use crate::gate::AdmissionGate;
use crate::reporting::UsageReporter;

pub struct ApiState {
    pub gate: Arc<AdmissionGate>,
    pub reporter: Arc<UsageReporter>,
    pub config: Arc<GateConfig>,
}

impl ApiState {
    pub fn new(gate: Arc<AdmissionGate>, reporter: Arc<UsageReporter>, config: GateConfig) -> Self {
        Self {
            gate,
            reporter,
            config: Arc::new(config),
        }
    }
}
