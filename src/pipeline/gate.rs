use std::sync::Arc;
use serde::{Deserialize, Serialize};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// RAII permit for one concurrency lane. Dropping it releases the slot, so a
/// permit held across `?` or a panic still returns to the gate.
pub struct LanePermit {
    _permit: OwnedSemaphorePermit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaneStats {
    pub active: usize,
    pub max: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateStats {
    pub extraction: LaneStats,
    pub analysis: LaneStats,
}

/// Two independent counting admission gates bounding how many extraction and
/// analysis stages run simultaneously across all in-flight tasks.
pub struct ConcurrencyGate {
    extraction: Arc<Semaphore>,
    extraction_max: usize,
    analysis: Arc<Semaphore>,
    analysis_max: usize,
}

impl ConcurrencyGate {
    pub fn new(extraction_max: usize, analysis_max: usize) -> Self {
        Self {
            extraction: Arc::new(Semaphore::new(extraction_max)),
            extraction_max,
            analysis: Arc::new(Semaphore::new(analysis_max)),
            analysis_max,
        }
    }

    /// Waits until an extraction slot is free. Only ever fails if the gate is
    /// torn down while waiting, which does not happen in normal operation.
    pub async fn acquire_extraction(&self) -> anyhow::Result<LanePermit> {
        let permit = self.extraction.clone().acquire_owned().await?;
        Ok(LanePermit { _permit: permit })
    }

    pub async fn acquire_analysis(&self) -> anyhow::Result<LanePermit> {
        let permit = self.analysis.clone().acquire_owned().await?;
        Ok(LanePermit { _permit: permit })
    }

    pub fn stats(&self) -> GateStats {
        GateStats {
            extraction: LaneStats {
                active: self.extraction_max - self.extraction.available_permits(),
                max: self.extraction_max,
            },
            analysis: LaneStats {
                active: self.analysis_max - self.analysis.available_permits(),
                max: self.analysis_max,
            },
        }
    }
}
