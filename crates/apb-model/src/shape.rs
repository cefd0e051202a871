//! Bus shape parameters, the wire-field catalogue, and the descriptor cache.
//!
//! A [`BusShape`] fixes the address width, data width, and responder count of
//! one bus. Everything width-dependent (strobe width, responder-id width, the
//! ordered list of wire fields) is derived from it once and shared through a
//! [`BusDescriptor`].

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Widest supported address bus.
pub const MAX_ADDRESS_WIDTH: u8 = 32;
/// Widest supported data bus.
pub const MAX_DATA_WIDTH: u8 = 32;
/// Largest responder count; responder ids are 8-bit.
pub const MAX_RESPONDERS: u16 = 256;

/// Width parameters of one bus instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BusShape {
    /// Width of `PADDR` in bits.
    pub address_width: u8,
    /// Width of `PWDATA`/`PRDATA` in bits.
    pub data_width: u8,
    /// Number of responders, one select line each.
    pub responder_count: u16,
}

impl BusShape {
    /// Builds a validated shape.
    ///
    /// # Errors
    ///
    /// Returns the [`ConfigError`] naming the first out-of-range parameter.
    pub const fn new(
        address_width: u8,
        data_width: u8,
        responder_count: u16,
    ) -> Result<Self, ConfigError> {
        Self {
            address_width,
            data_width,
            responder_count,
        }
        .validate()
    }

    /// Re-checks a shape that may have been built field by field or deserialized.
    ///
    /// # Errors
    ///
    /// Returns the [`ConfigError`] naming the first out-of-range parameter.
    pub const fn validate(self) -> Result<Self, ConfigError> {
        if self.address_width == 0 || self.address_width > MAX_ADDRESS_WIDTH {
            return Err(ConfigError::InvalidAddressWidth(self.address_width));
        }
        if self.data_width == 0 || self.data_width > MAX_DATA_WIDTH {
            return Err(ConfigError::InvalidDataWidth(self.data_width));
        }
        if self.responder_count == 0 || self.responder_count > MAX_RESPONDERS {
            return Err(ConfigError::InvalidResponderCount(self.responder_count));
        }
        Ok(self)
    }

    /// One strobe bit per byte lane: `ceil(data_width / 8)`.
    #[must_use]
    pub const fn strobe_width(self) -> u8 {
        self.data_width.div_ceil(8)
    }

    /// Bits needed to encode a responder id, never less than one.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn responder_id_width(self) -> u8 {
        if self.responder_count <= 1 {
            return 1;
        }
        (u16::BITS - (self.responder_count - 1).leading_zeros()) as u8
    }

    /// Mask selecting the low `address_width` bits.
    #[must_use]
    pub const fn address_mask(self) -> u32 {
        width_mask(self.address_width)
    }

    /// Mask selecting the low `data_width` bits.
    #[must_use]
    pub const fn data_mask(self) -> u32 {
        width_mask(self.data_width)
    }

    /// Returns `true` when `id` names one of this bus's responders.
    #[must_use]
    pub fn has_responder(self, id: u8) -> bool {
        u16::from(id) < self.responder_count
    }
}

impl fmt::Display for BusShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-bit address / {}-bit data bus with {} responder(s)",
            self.address_width, self.data_width, self.responder_count
        )
    }
}

pub(crate) const fn width_mask(width: u8) -> u32 {
    if width >= 32 {
        u32::MAX
    } else {
        (1u32 << width) - 1
    }
}

/// Enum key for every wire of the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SignalField {
    /// `PADDR`.
    Address,
    /// `PWRITE`.
    WriteEnable,
    /// `PSELn`, one per responder.
    Select(u8),
    /// `PENABLE`, the access-phase strobe.
    Enable,
    /// `PWDATA`.
    WriteData,
    /// `PRDATA`.
    ReadData,
    /// `PREADY`.
    Ready,
    /// `PSTRB`, one bit per byte lane.
    Strobe,
    /// `PPROT`.
    Protection,
    /// `SLVERR`.
    Error,
}

impl SignalField {
    /// Side of the bus that drives this wire.
    #[must_use]
    pub const fn driver(self) -> Driver {
        match self {
            Self::ReadData | Self::Ready | Self::Error => Driver::Responder,
            Self::Address
            | Self::WriteEnable
            | Self::Select(_)
            | Self::Enable
            | Self::WriteData
            | Self::Strobe
            | Self::Protection => Driver::Controller,
        }
    }

    /// Wire name used in waveforms and by hardware collaborators.
    #[must_use]
    pub fn name(self) -> Cow<'static, str> {
        match self {
            Self::Address => Cow::Borrowed("PADDR"),
            Self::WriteEnable => Cow::Borrowed("PWRITE"),
            Self::Select(id) => Cow::Owned(format!("PSEL{id}")),
            Self::Enable => Cow::Borrowed("PENABLE"),
            Self::WriteData => Cow::Borrowed("PWDATA"),
            Self::ReadData => Cow::Borrowed("PRDATA"),
            Self::Ready => Cow::Borrowed("PREADY"),
            Self::Strobe => Cow::Borrowed("PSTRB"),
            Self::Protection => Cow::Borrowed("PPROT"),
            Self::Error => Cow::Borrowed("SLVERR"),
        }
    }
}

impl fmt::Display for SignalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Bus side that owns a wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Driver {
    /// Driven by the bus controller.
    Controller,
    /// Driven by the selected responder.
    Responder,
}

/// Value kind of a wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// Single-bit level.
    Bit,
    /// Fixed-width unsigned vector.
    Bits(u8),
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bit => f.write_str("1-bit level"),
            Self::Bits(width) => write!(f, "{width}-bit vector"),
        }
    }
}

/// One entry of the ordered field catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldSpec {
    /// Field key.
    pub field: SignalField,
    /// Declared kind.
    pub kind: FieldKind,
}

/// Shape plus the derived, ordered field catalogue of one bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusDescriptor {
    shape: BusShape,
    fields: Vec<FieldSpec>,
    by_name: HashMap<String, SignalField>,
}

impl BusDescriptor {
    /// Builds a descriptor without going through the process-wide cache.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when `shape` is out of range.
    pub fn build(shape: BusShape) -> Result<Self, ConfigError> {
        let shape = shape.validate()?;

        let mut fields = vec![
            FieldSpec {
                field: SignalField::Address,
                kind: FieldKind::Bits(shape.address_width),
            },
            FieldSpec {
                field: SignalField::WriteEnable,
                kind: FieldKind::Bit,
            },
        ];
        // Ids are bounded by MAX_RESPONDERS, so every index fits in a u8.
        fields.extend((0..=u8::MAX).take(usize::from(shape.responder_count)).map(|id| {
            FieldSpec {
                field: SignalField::Select(id),
                kind: FieldKind::Bit,
            }
        }));
        fields.extend([
            FieldSpec {
                field: SignalField::Enable,
                kind: FieldKind::Bit,
            },
            FieldSpec {
                field: SignalField::WriteData,
                kind: FieldKind::Bits(shape.data_width),
            },
            FieldSpec {
                field: SignalField::ReadData,
                kind: FieldKind::Bits(shape.data_width),
            },
            FieldSpec {
                field: SignalField::Ready,
                kind: FieldKind::Bit,
            },
            FieldSpec {
                field: SignalField::Strobe,
                kind: FieldKind::Bits(shape.strobe_width()),
            },
            FieldSpec {
                field: SignalField::Protection,
                kind: FieldKind::Bit,
            },
            FieldSpec {
                field: SignalField::Error,
                kind: FieldKind::Bit,
            },
        ]);

        let by_name = fields
            .iter()
            .map(|spec| (spec.field.name().into_owned(), spec.field))
            .collect();

        Ok(Self {
            shape,
            fields,
            by_name,
        })
    }

    /// Shape this descriptor was derived from.
    #[must_use]
    pub const fn shape(&self) -> BusShape {
        self.shape
    }

    /// Fields in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Fields owned by one side of the bus, in declaration order.
    pub fn driven_by(&self, driver: Driver) -> impl Iterator<Item = FieldSpec> + '_ {
        self.fields
            .iter()
            .copied()
            .filter(move |spec| spec.field.driver() == driver)
    }

    /// Declared kind of `field`, or `None` if the bus has no such wire.
    #[must_use]
    pub fn kind(&self, field: SignalField) -> Option<FieldKind> {
        match field {
            SignalField::Select(id) if !self.shape.has_responder(id) => None,
            SignalField::Select(_)
            | SignalField::WriteEnable
            | SignalField::Enable
            | SignalField::Ready
            | SignalField::Protection
            | SignalField::Error => Some(FieldKind::Bit),
            SignalField::Address => Some(FieldKind::Bits(self.shape.address_width)),
            SignalField::WriteData | SignalField::ReadData => {
                Some(FieldKind::Bits(self.shape.data_width))
            }
            SignalField::Strobe => Some(FieldKind::Bits(self.shape.strobe_width())),
        }
    }

    /// Resolves a wire name such as `"PSEL1"` to its field key.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownField`] for names the bus does not have.
    pub fn field(&self, name: &str) -> Result<SignalField, ConfigError> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| ConfigError::UnknownField(name.to_string()))
    }
}

type DescriptorCache = Mutex<HashMap<BusShape, Arc<BusDescriptor>>>;

static DESCRIPTORS: OnceLock<DescriptorCache> = OnceLock::new();

/// Returns the shared descriptor for `shape`, building it on first use.
///
/// Descriptors are memoized for the lifetime of the process; identical shapes
/// always yield the same [`Arc`].
///
/// # Errors
///
/// Returns [`ConfigError`] when `shape` is out of range. Invalid shapes are
/// never cached.
pub fn descriptor(shape: BusShape) -> Result<Arc<BusDescriptor>, ConfigError> {
    let cache = DESCRIPTORS.get_or_init(DescriptorCache::default);
    let mut entries = cache.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(existing) = entries.get(&shape) {
        return Ok(Arc::clone(existing));
    }
    let built = Arc::new(BusDescriptor::build(shape)?);
    entries.insert(shape, Arc::clone(&built));
    Ok(built)
}
