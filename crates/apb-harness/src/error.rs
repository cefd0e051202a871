//! Harness error taxonomy.

use apb_model::{ConfigError, ControllerError, TraceFormatError};
use thiserror::Error;

use crate::Pin;

/// Failures raised while driving or replaying a bus.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HarnessError {
    /// Bus shape or request construction failed.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The controller rejected a cycle or ran out of stall budget.
    #[error(transparent)]
    Controller(#[from] ControllerError),
    /// The recorded trace could not be rendered.
    #[error(transparent)]
    Trace(#[from] TraceFormatError),
    /// A transfer did not finish within the driver's cycle budget.
    #[error(
        "transfer to responder {responder} at address {address:#x} did not finish within {budget} cycles"
    )]
    CycleBudgetExhausted {
        /// Cycles allowed per transfer.
        budget: u32,
        /// Address of the abandoned transfer.
        address: u32,
        /// Responder of the abandoned transfer.
        responder: u8,
    },
    /// A stimulus targeted a pin the harness side may not drive.
    #[error("pin {0} is not driven by the bus controller")]
    NotDrivable(Pin),
}
