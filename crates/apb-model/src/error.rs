//! Error taxonomy for bus construction, protocol stalls, and trace rendering.

use thiserror::Error;

use crate::{BusShape, FieldKind, SignalField};

/// Rejected bus, request, or field configuration.
///
/// Raised when a bundle, request, or controller is constructed (or a field is
/// addressed through the enum-keyed accessors), never in the middle of a
/// transfer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
pub enum ConfigError {
    /// Address bus width outside `1..=32`.
    #[error("address width {0} is outside 1..=32")]
    InvalidAddressWidth(u8),
    /// Data bus width outside `1..=32`.
    #[error("data width {0} is outside 1..=32")]
    InvalidDataWidth(u8),
    /// Responder count outside `1..=256`.
    #[error("responder count {0} is outside 1..=256")]
    InvalidResponderCount(u16),
    /// Request targets a responder the bus does not have.
    #[error("responder id {id} is not below responder count {count}")]
    ResponderOutOfRange {
        /// Offending responder id.
        id: u8,
        /// Responder count of the bus.
        count: u16,
    },
    /// Command wire value is not one of read/write/idle.
    #[error("unrecognized command value {0}")]
    UnknownCommand(u8),
    /// Field name or select index does not exist on this bus.
    #[error("field {0} does not exist on this bus")]
    UnknownField(String),
    /// Value kind does not match the addressed field.
    #[error("field {field} expects a {expected}")]
    KindMismatch {
        /// Addressed field.
        field: SignalField,
        /// Kind the field is declared with.
        expected: FieldKind,
    },
    /// Bundle or request was built for a different bus shape.
    #[error("{actual} does not match the controller's {expected}")]
    ShapeMismatch {
        /// Shape the controller was built for.
        expected: BusShape,
        /// Shape of the offending bundle or request.
        actual: BusShape,
    },
}

/// A responder held `PREADY` low for longer than the configured stall budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[error("responder {responder} held PREADY low for {waited} cycles at address {address:#x}")]
pub struct ProtocolStall {
    /// Responder whose select line was active.
    pub responder: u8,
    /// Address of the abandoned transfer.
    pub address: u32,
    /// Wait cycles observed before the budget tripped.
    pub waited: u32,
}

/// Failure returned by [`crate::BusController::advance`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
pub enum ControllerError {
    /// Bundle or request does not belong to this controller's bus.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Stall budget exhausted while waiting in the access phase.
    #[error(transparent)]
    Stall(#[from] ProtocolStall),
}

/// Waveform could not be rendered without misrepresenting a sample.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
pub enum TraceFormatError {
    /// Probe returned no boolean or fixed-width value for a tracked field.
    #[error("field {field} has no boolean or fixed-width value at cycle {cycle}")]
    MissingValue {
        /// Tracked field.
        field: SignalField,
        /// Zero-based cycle index of the gap.
        cycle: usize,
    },
    /// Multi-bit sample does not fit in its declared width.
    #[error("field {field} value {value:#x} does not fit in {width} bits")]
    ValueOutOfRange {
        /// Tracked field.
        field: SignalField,
        /// Sampled value.
        value: u64,
        /// Declared width.
        width: u8,
    },
    /// Sample kind differs from the kind of the field's earlier samples.
    #[error("field {field} changed value kind at cycle {cycle}")]
    KindChanged {
        /// Tracked field.
        field: SignalField,
        /// Zero-based cycle index of the change.
        cycle: usize,
    },
    /// JSON encoding failed.
    #[error("waveform encoding failed: {0}")]
    Encoding(String),
}
