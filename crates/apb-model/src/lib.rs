//! Cycle-accurate behavioral model of a memory-mapped peripheral bus.
//!
//! The model is advanced one clock cycle per call: a driver fills in a
//! [`TransferRequest`], calls [`BusController::advance`] with the shared
//! [`SignalBundle`], lets a responder react to the bundle, and samples it into
//! a [`WaveForm`] for golden comparison.

/// Configuration, protocol, and trace-format errors.
pub mod error;
pub use error::{ConfigError, ControllerError, ProtocolStall, TraceFormatError};

/// Bus shapes, the wire-field catalogue, and the shared descriptor cache.
pub mod shape;
pub use shape::{
    descriptor, BusDescriptor, BusShape, Driver, FieldKind, FieldSpec, SignalField,
    MAX_ADDRESS_WIDTH, MAX_DATA_WIDTH, MAX_RESPONDERS,
};

/// Typed field values and the per-bus signal bundle.
pub mod signal;
pub use signal::{SignalBundle, SignalValue};

/// Logical transfer requests.
pub mod request;
pub use request::{make_transfer, Command, TransferRequest};

/// The suspendable bus controller state machine.
pub mod controller;
pub use controller::{BusController, Completion, ControllerConfig, Phase, StepOutcome};

/// Waveform capture and WaveDrom rendering.
pub mod waveform;
pub use waveform::{Probe, WaveForm, CLOCK_NAME};

#[cfg(test)]
use proptest as _;
