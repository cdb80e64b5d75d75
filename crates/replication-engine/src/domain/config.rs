//! Engine policy configuration.

/// Runtime policy for the replication loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineConfig {
    /// Stop the loop after this many execution failures in a row.
    ///
    /// `None` acknowledges the error and keeps going, so a local failure never
    /// halts the consensus integration for later commits. Setting a bound
    /// trades that liveness for not drifting away from the agreed history.
    pub max_consecutive_execution_failures: Option<u32>,
}

impl EngineConfig {
    /// Whether `consecutive` failures in a row should stop the loop.
    pub fn should_escalate(&self, consecutive: u32) -> bool {
        match self.max_consecutive_execution_failures {
            Some(limit) => consecutive >= limit.max(1),
            None => false,
        }
    }
}
