use serde::{Deserialize, Serialize};

use crate::smoothing::DisplayMode;

/// Which position source is authoritative
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceStatus {
    InternalSensor,
    ExternalTelemetry,
}

impl SourceStatus {
    pub fn display_mode(&self) -> DisplayMode {
        match self {
            SourceStatus::InternalSensor => DisplayMode::Smoothed,
            SourceStatus::ExternalTelemetry => DisplayMode::Immediate,
        }
    }
}

/// Decides which report stream reaches the normalizer.
///
/// Exactly one source is live at a time; reports from the other one are
/// dropped. The caller performs the anchor/visual resets on every
/// transition this reports.
#[derive(Debug, Clone)]
pub struct SourceArbiter {
    active: SourceStatus,
}

impl SourceArbiter {
    pub fn new() -> Self {
        Self {
            active: SourceStatus::InternalSensor,
        }
    }

    pub fn active(&self) -> SourceStatus {
        self.active
    }

    pub fn admits(&self, source: SourceStatus) -> bool {
        self.active == source
    }

    /// Make `source` authoritative. Returns false when it already was.
    pub fn switch_to(&mut self, source: SourceStatus) -> bool {
        if self.active == source {
            return false;
        }
        log::info!("Position source: {:?} -> {:?}", self.active, source);
        self.active = source;
        true
    }
}

impl Default for SourceArbiter {
    fn default() -> Self {
        Self::new()
    }
}
