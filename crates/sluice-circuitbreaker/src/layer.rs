use crate::circuit::Circuit;
use crate::{BreakerConfig, CircuitBreaker};
use std::sync::{Arc, Mutex};
use tower::Layer;

/// A [`Layer`] that guards an item operation with a circuit breaker.
///
/// All services produced by one layer share the same breaker state, so a
/// worker pool layering its per-worker clones observes a single circuit.
#[derive(Clone)]
pub struct BreakerLayer {
    config: Arc<BreakerConfig>,
    circuit: Arc<Mutex<Circuit>>,
}

impl BreakerLayer {
    /// Creates a new `BreakerLayer` with the given configuration.
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config: Arc::new(config),
            circuit: Arc::new(Mutex::new(Circuit::new())),
        }
    }
}

impl<S> Layer<S> for BreakerLayer {
    type Service = CircuitBreaker<S>;

    fn layer(&self, service: S) -> Self::Service {
        CircuitBreaker::new(
            service,
            Arc::clone(&self.config),
            Arc::clone(&self.circuit),
        )
    }
}
