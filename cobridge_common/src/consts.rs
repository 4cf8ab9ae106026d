//! Service-wide constants for the cobridge workspace.
//!
//! Single source of truth for names, defaults and sizing policies.

/// API name under which the verbs are exposed.
pub const API_NAME: &str = "demexco";

/// Name of the CANopen register exchange service the backend stands for.
pub const XCHG_SERVICE_NAME: &str = "canopen";

/// Verb of the register exchange service issuing a batch read.
pub const XCHG_GET_VERB: &str = "get";

/// Default capacity of a subscription's broadcast channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 16;

/// Default backend driver.
pub const DEFAULT_BACKEND: &str = "simulation";

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/cobridge/cobridge.toml";

/// Rendering: initial bytes reserved per value.
pub const RENDER_BYTES_PER_VALUE: usize = 8;

/// Rendering: minimum free space kept before formatting a value.
///
/// Larger than the longest decimal token (`-9223372036854775808`) plus
/// separator, so growth never happens mid-token.
pub const RENDER_HEADROOM: usize = 50;
