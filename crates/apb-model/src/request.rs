//! Transfer requests consumed by the bus controller one at a time.

use serde::{Deserialize, Serialize};

use crate::{BusShape, ConfigError, SignalBundle};

/// Logical operation requested of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum Command {
    /// Read `PRDATA` from the addressed responder.
    Read = 0,
    /// Write `PWDATA` to the addressed responder.
    Write = 1,
    /// No transfer; the controller leaves the bus untouched.
    #[default]
    Idle = 2,
}

impl Command {
    /// Stable wire value.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Decodes a wire value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownCommand`] for values other than 0, 1, 2.
    pub const fn from_u8(value: u8) -> Result<Self, ConfigError> {
        match value {
            0 => Ok(Self::Read),
            1 => Ok(Self::Write),
            2 => Ok(Self::Idle),
            other => Err(ConfigError::UnknownCommand(other)),
        }
    }

    /// `true` for read and write.
    #[must_use]
    pub const fn is_transfer(self) -> bool {
        matches!(self, Self::Read | Self::Write)
    }
}

impl TryFrom<u8> for Command {
    type Error = ConfigError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_u8(value)
    }
}

/// One logical bus operation.
///
/// Address and data are masked to the bus widths at construction and the
/// responder id is checked against the responder count, so the controller
/// never sees a request it cannot place on the bus. Only the command changes
/// over the request's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransferRequest {
    shape: BusShape,
    command: Command,
    address: u32,
    data: u32,
    responder_id: u8,
}

impl TransferRequest {
    /// Builds a request for a bus of `shape`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when `shape` is out of range or `responder_id`
    /// does not name one of its responders.
    pub fn new(
        shape: BusShape,
        command: Command,
        address: u32,
        data: u32,
        responder_id: u8,
    ) -> Result<Self, ConfigError> {
        let shape = shape.validate()?;
        if !shape.has_responder(responder_id) {
            return Err(ConfigError::ResponderOutOfRange {
                id: responder_id,
                count: shape.responder_count,
            });
        }
        Ok(Self {
            shape,
            command,
            address: address & shape.address_mask(),
            data: data & shape.data_mask(),
            responder_id,
        })
    }

    /// Shape the request was validated against.
    #[must_use]
    pub const fn shape(&self) -> BusShape {
        self.shape
    }

    /// Current command.
    #[must_use]
    pub const fn command(&self) -> Command {
        self.command
    }

    /// Replaces the command; this is how a driver hands the request to the controller.
    pub fn set_command(&mut self, command: Command) {
        self.command = command;
    }

    /// Target address.
    #[must_use]
    pub const fn address(&self) -> u32 {
        self.address
    }

    /// Write payload. Ignored for reads.
    #[must_use]
    pub const fn data(&self) -> u32 {
        self.data
    }

    /// Target responder.
    #[must_use]
    pub const fn responder_id(&self) -> u8 {
        self.responder_id
    }

    /// Width of the responder-id field for this bus.
    #[must_use]
    pub const fn responder_id_width(&self) -> u8 {
        self.shape.responder_id_width()
    }
}

/// Builds a zeroed bundle and an idle request for one operation.
///
/// # Errors
///
/// Returns [`ConfigError`] for out-of-range widths, responder counts, or
/// responder ids.
pub fn make_transfer(
    address: u32,
    data: u32,
    address_width: u8,
    data_width: u8,
    responder_count: u16,
    responder_id: u8,
) -> Result<(SignalBundle, TransferRequest), ConfigError> {
    let shape = BusShape::new(address_width, data_width, responder_count)?;
    let request = TransferRequest::new(shape, Command::Idle, address, data, responder_id)?;
    let bundle = SignalBundle::for_shape(shape)?;
    Ok((bundle, request))
}
