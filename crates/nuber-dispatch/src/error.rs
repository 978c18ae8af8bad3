//! Error types of the dispatch system

use thiserror::Error;

/// Why a booking was not accepted
///
/// A rejection is final: the booking was never queued and will not run.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Rejected {
    #[error("dispatch is shutting down")]
    DispatcherShuttingDown,
    #[error("region {0} is shutting down")]
    RegionShuttingDown(String),
    #[error("no region named {0}")]
    UnknownRegion(String),
}

/// A wait was cut short by a cancellation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[error("interrupted")]
pub struct Interrupted;

/// The dispatcher could not be started
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("region {0} must allow at least one simultaneous booking")]
    ZeroCapacity(String),
    #[error("at least one region must be configured")]
    NoRegions,
    #[error("the driver pool must hold at least one driver")]
    ZeroDriverCapacity,
    #[error("could not start the submission lane of region {region}")]
    Spawn {
        region: String,
        #[source]
        source: std::io::Error,
    },
}
