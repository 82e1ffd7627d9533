//! Configuration schema types for Beacon.
//!
//! All structs use `serde(default)` so partial configs work correctly.

mod remote;
mod session;
mod system;

pub use remote::*;
pub use session::*;
pub use system::*;

use serde::{Deserialize, Serialize};

/// Current config schema version.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Root configuration for Beacon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct BeaconConfig {
    pub remote: RemoteConfig,
    pub session: SessionConfig,
    pub dispatch: DispatchConfig,
    pub gateway: GatewayConfig,
    pub data: DataConfig,
    pub logging: LoggingConfig,
}
