//! Tunables fixed by the sync protocols. These are not meant to be
//! user-configurable — they are part of the wire contract with the public
//! gateway and the courier.

/// Fallback public gateway used by `registerIfUnregistered` when no address
/// has ever been persisted.
pub const DEFAULT_PUBLIC_GATEWAY: &str = "frankfurt.relaycorp.cloud";

/// TCP port the courier's CogRPC server listens on behind the default
/// network gateway.
pub const COURIER_PORT: u16 = 21473;

/// Fixed pause between the collect and deliver phases of a courier sync.
pub const DELAY_BETWEEN_COLLECTION_AND_DELIVERY_SECONDS: u64 = 5;

/// Slack applied to both ends of a CCA's validity window to tolerate clock
/// drift between this gateway and the public gateway.
pub const CLOCK_DRIFT_TOLERANCE_MINUTES: i64 = 90;

/// TTL applied to cargoes and CCAs produced by this gateway.
pub const OUTBOUND_CARGO_TTL_DAYS: i64 = 14;

/// Total budget for probing courier connectivity before giving up.
pub const COURIER_CHECK_TIMEOUT_MS: u64 = 3_000;

/// Delay between successive courier connectivity probes.
pub const COURIER_CHECK_RETRY_MS: u64 = 500;

/// Well-known config keys understood by every [`crate::store::ConfigStore`]
/// implementation.
pub mod config_keys {
    pub const PUBLIC_GATEWAY_ADDRESS: &str = "public_gateway_address";
    pub const NODE_KEY_SERIAL_NUMBER: &str = "node_key_serial_number";
    pub const CCA_ISSUER_KEY_SERIAL_NUMBER: &str = "cca_issuer_key_serial_number";
}
