//! Drive harness and behavioral responders for the `apb-model` bus controller.
//!
//! Two ways of exercising the controller live here:
//!
//! - [`DriveHarness`] turns the controller's per-cycle outputs into stimulus
//!   for a [`HardwareTester`], mirroring how a hardware testbench is driven;
//!   [`RecordingTester`] executes that stimulus against a [`Responder`] model.
//! - [`Session`] co-simulates the controller with a responder directly and
//!   records every cycle.

/// Harness error taxonomy.
pub mod error;
pub use error::HarnessError;

/// Responder trait and register-file models.
pub mod responder;
pub use responder::{Register, RegisterFile, Responder, ResponderSet, Response, WaitStates};

/// Tester contract and the recording implementation.
pub mod tester;
pub use tester::{HardwareTester, Mismatch, Pin, RecordingTester, RunReport};

/// Stimulus sequences for single transfers.
pub mod harness;
pub use harness::{DriveHarness, HALF_CYCLES_PER_CYCLE};

/// Live controller/responder co-simulation.
pub mod session;
pub use session::{Session, SessionConfig, DEFAULT_CYCLE_BUDGET};
