//! Wire-level signal bundle shared by the controller, responders, and recorder.

use std::sync::Arc;

use crate::shape::width_mask;
use crate::{descriptor, BusDescriptor, BusShape, ConfigError, Driver, FieldKind, SignalField};

/// Value carried by one wire in one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalValue {
    /// Single-bit level.
    Bit(bool),
    /// Fixed-width unsigned vector.
    Bits {
        /// Raw value, expected to fit in `width` bits.
        value: u64,
        /// Declared width in bits.
        width: u8,
    },
}

impl SignalValue {
    /// Kind of this value.
    #[must_use]
    pub const fn kind(self) -> FieldKind {
        match self {
            Self::Bit(_) => FieldKind::Bit,
            Self::Bits { width, .. } => FieldKind::Bits(width),
        }
    }

    /// Numeric view: levels read as 0/1.
    #[must_use]
    #[allow(clippy::cast_lossless)]
    pub const fn as_u64(self) -> u64 {
        match self {
            Self::Bit(level) => level as u64,
            Self::Bits { value, .. } => value,
        }
    }

    #[allow(clippy::cast_lossless)]
    const fn word(value: u32, width: u8) -> Self {
        Self::Bits {
            value: value as u64,
            width,
        }
    }
}

/// Controller- and responder-driven wires of one bus.
///
/// Multi-bit setters mask their argument to the configured width, so the
/// bundle never holds a value its wire could not carry. Select lines are
/// indexed by responder id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalBundle {
    descriptor: Arc<BusDescriptor>,
    address: u32,
    write_enable: bool,
    select: Vec<bool>,
    enable: bool,
    write_data: u32,
    read_data: u32,
    ready: bool,
    strobe: u8,
    protection: bool,
    error: bool,
}

impl SignalBundle {
    /// Canonical all-zero bundle for a bus.
    #[must_use]
    pub fn zeroed(descriptor: Arc<BusDescriptor>) -> Self {
        let select = vec![false; usize::from(descriptor.shape().responder_count)];
        Self {
            descriptor,
            address: 0,
            write_enable: false,
            select,
            enable: false,
            write_data: 0,
            read_data: 0,
            ready: false,
            strobe: 0,
            protection: false,
            error: false,
        }
    }

    /// Canonical all-zero bundle for `shape`, using the shared descriptor cache.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when `shape` is out of range.
    pub fn for_shape(shape: BusShape) -> Result<Self, ConfigError> {
        descriptor(shape).map(Self::zeroed)
    }

    /// Descriptor this bundle was built from.
    #[must_use]
    pub fn descriptor(&self) -> &Arc<BusDescriptor> {
        &self.descriptor
    }

    /// Shape of the bus.
    #[must_use]
    pub fn shape(&self) -> BusShape {
        self.descriptor.shape()
    }

    /// `PADDR`.
    #[must_use]
    pub const fn address(&self) -> u32 {
        self.address
    }

    /// Drives `PADDR`, masked to the address width.
    pub fn set_address(&mut self, address: u32) {
        self.address = address & self.shape().address_mask();
    }

    /// `PWRITE`.
    #[must_use]
    pub const fn write_enable(&self) -> bool {
        self.write_enable
    }

    /// Drives `PWRITE`.
    pub fn set_write_enable(&mut self, level: bool) {
        self.write_enable = level;
    }

    /// `PSELn` for responder `id`; `false` for ids the bus does not have.
    #[must_use]
    pub fn select(&self, id: u8) -> bool {
        self.select.get(usize::from(id)).copied().unwrap_or(false)
    }

    /// Drives `PSELn` for responder `id`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownField`] when the bus has no responder `id`.
    pub fn set_select(&mut self, id: u8, level: bool) -> Result<(), ConfigError> {
        let line = self
            .select
            .get_mut(usize::from(id))
            .ok_or_else(|| ConfigError::UnknownField(SignalField::Select(id).to_string()))?;
        *line = level;
        Ok(())
    }

    /// Ids of every asserted select line, ascending.
    pub fn asserted_selects(&self) -> impl Iterator<Item = u8> + '_ {
        (0..=u8::MAX)
            .zip(&self.select)
            .filter_map(|(id, level)| level.then_some(id))
    }

    /// `PENABLE`.
    #[must_use]
    pub const fn enable(&self) -> bool {
        self.enable
    }

    /// Drives `PENABLE`.
    pub fn set_enable(&mut self, level: bool) {
        self.enable = level;
    }

    /// `PWDATA`.
    #[must_use]
    pub const fn write_data(&self) -> u32 {
        self.write_data
    }

    /// Drives `PWDATA`, masked to the data width.
    pub fn set_write_data(&mut self, data: u32) {
        self.write_data = data & self.shape().data_mask();
    }

    /// `PRDATA`.
    #[must_use]
    pub const fn read_data(&self) -> u32 {
        self.read_data
    }

    /// Drives `PRDATA`, masked to the data width.
    pub fn set_read_data(&mut self, data: u32) {
        self.read_data = data & self.shape().data_mask();
    }

    /// `PREADY`.
    #[must_use]
    pub const fn ready(&self) -> bool {
        self.ready
    }

    /// Drives `PREADY`.
    pub fn set_ready(&mut self, level: bool) {
        self.ready = level;
    }

    /// `PSTRB`. Carried on the bus but never consulted by the controller.
    #[must_use]
    pub const fn strobe(&self) -> u8 {
        self.strobe
    }

    /// Drives `PSTRB`, masked to the strobe width.
    #[allow(clippy::cast_possible_truncation)]
    pub fn set_strobe(&mut self, lanes: u8) {
        self.strobe = lanes & width_mask(self.shape().strobe_width()) as u8;
    }

    /// `PPROT`.
    #[must_use]
    pub const fn protection(&self) -> bool {
        self.protection
    }

    /// Drives `PPROT`.
    pub fn set_protection(&mut self, level: bool) {
        self.protection = level;
    }

    /// `SLVERR`.
    #[must_use]
    pub const fn error(&self) -> bool {
        self.error
    }

    /// Drives `SLVERR`.
    pub fn set_error(&mut self, level: bool) {
        self.error = level;
    }

    /// Current value of `field`, or `None` for a select line the bus does not have.
    #[must_use]
    pub fn value(&self, field: SignalField) -> Option<SignalValue> {
        let shape = self.shape();
        let value = match field {
            SignalField::Address => SignalValue::word(self.address, shape.address_width),
            SignalField::WriteEnable => SignalValue::Bit(self.write_enable),
            SignalField::Select(id) => SignalValue::Bit(*self.select.get(usize::from(id))?),
            SignalField::Enable => SignalValue::Bit(self.enable),
            SignalField::WriteData => SignalValue::word(self.write_data, shape.data_width),
            SignalField::ReadData => SignalValue::word(self.read_data, shape.data_width),
            SignalField::Ready => SignalValue::Bit(self.ready),
            SignalField::Strobe => {
                SignalValue::word(u32::from(self.strobe), shape.strobe_width())
            }
            SignalField::Protection => SignalValue::Bit(self.protection),
            SignalField::Error => SignalValue::Bit(self.error),
        };
        Some(value)
    }

    /// Sets `field` from a generic value.
    ///
    /// Multi-bit values are masked to the field's width; the value's own
    /// `width` is not consulted.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::KindMismatch`] when a level is given for a vector
    /// field or vice versa, and [`ConfigError::UnknownField`] for a select line
    /// the bus does not have.
    #[allow(clippy::cast_possible_truncation)]
    pub fn set_value(&mut self, field: SignalField, value: SignalValue) -> Result<(), ConfigError> {
        let expected = self
            .descriptor
            .kind(field)
            .ok_or_else(|| ConfigError::UnknownField(field.to_string()))?;
        match (field, value) {
            (SignalField::Address, SignalValue::Bits { value, .. }) => {
                self.set_address(value as u32);
            }
            (SignalField::WriteData, SignalValue::Bits { value, .. }) => {
                self.set_write_data(value as u32);
            }
            (SignalField::ReadData, SignalValue::Bits { value, .. }) => {
                self.set_read_data(value as u32);
            }
            (SignalField::Strobe, SignalValue::Bits { value, .. }) => {
                self.set_strobe(value as u8);
            }
            (SignalField::WriteEnable, SignalValue::Bit(level)) => self.write_enable = level,
            (SignalField::Select(id), SignalValue::Bit(level)) => self.set_select(id, level)?,
            (SignalField::Enable, SignalValue::Bit(level)) => self.enable = level,
            (SignalField::Ready, SignalValue::Bit(level)) => self.ready = level,
            (SignalField::Protection, SignalValue::Bit(level)) => self.protection = level,
            (SignalField::Error, SignalValue::Bit(level)) => self.error = level,
            _ => return Err(ConfigError::KindMismatch { field, expected }),
        }
        Ok(())
    }

    /// Current values of every wire owned by `driver`, in declaration order.
    pub fn driven_by(
        &self,
        driver: Driver,
    ) -> impl Iterator<Item = (SignalField, SignalValue)> + '_ {
        self.descriptor
            .driven_by(driver)
            .filter_map(|spec| Some((spec.field, self.value(spec.field)?)))
    }

    pub(crate) fn drive_select(&mut self, id: u8, level: bool) {
        if let Some(line) = self.select.get_mut(usize::from(id)) {
            *line = level;
        }
    }
}
