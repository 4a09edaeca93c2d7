pub mod domain;

use serde::{Deserialize, Serialize};

pub use domain::{ChargeStatus, Coordinates, PowerStatus, Rotations, TelemetryRecord};

/// Pushed to live subscribers every time a device reports in.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LiveUpdate {
    pub key: String,
    pub record: TelemetryRecord,
}
