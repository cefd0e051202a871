//! Behavioral responder models.
//!
//! A [`Responder`] is the software stand-in for the peripheral side of the
//! bus. Each cycle the driver asks it for its combinational outputs with
//! [`Responder::respond`], then clocks it once with [`Responder::clock`] so
//! registered state updates on the rising edge.

use std::fmt;

use apb_model::{SignalBundle, SignalValue};
use log::trace;

/// Responder-driven outputs for one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Response {
    /// `PREADY`.
    pub ready: bool,
    /// `PRDATA`.
    pub read_data: u32,
    /// `SLVERR`.
    pub error: bool,
}

impl Response {
    /// Writes the response onto the responder-owned wires of `bus`.
    pub fn apply(self, bus: &mut SignalBundle) {
        bus.set_ready(self.ready);
        bus.set_read_data(self.read_data);
        bus.set_error(self.error);
    }
}

/// Peripheral side of the bus.
pub trait Responder {
    /// Combinational outputs for the controller-driven wires currently on `bus`.
    fn respond(&self, bus: &SignalBundle) -> Response;

    /// Rising clock edge with the wires currently on `bus`.
    fn clock(&mut self, bus: &SignalBundle);

    /// Reads internal state by name, for expectations on non-bus pins.
    fn peek(&self, name: &str) -> Option<SignalValue>;
}

impl<R: Responder + ?Sized> Responder for Box<R> {
    fn respond(&self, bus: &SignalBundle) -> Response {
        (**self).respond(bus)
    }

    fn clock(&mut self, bus: &SignalBundle) {
        (**self).clock(bus);
    }

    fn peek(&self, name: &str) -> Option<SignalValue> {
        (**self).peek(name)
    }
}

/// `true` while `bus` is in the access phase of any transfer.
fn in_access(bus: &SignalBundle) -> bool {
    bus.enable() && bus.asserted_selects().next().is_some()
}

/// One named register of a [`RegisterFile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Register {
    name: String,
    init: u32,
    value: u32,
}

impl Register {
    /// Register starting at zero.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_init(name, 0)
    }

    /// Register starting at `init`.
    #[must_use]
    pub fn with_init(name: impl Into<String>, init: u32) -> Self {
        Self {
            name: name.into(),
            init,
            value: init,
        }
    }

    /// Register name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current value.
    #[must_use]
    pub const fn value(&self) -> u32 {
        self.value
    }

    /// Reset value.
    #[must_use]
    pub const fn init(&self) -> u32 {
        self.init
    }
}

/// Word-addressed register bank behind one select line.
///
/// Register `i` lives at address `i`. A register is written on the clock edge
/// when `PENABLE`, `PWRITE`, and this file's select are high and `PADDR`
/// matches. `PREADY` is high for a write hit or any read access; `PRDATA`
/// follows `PADDR` combinationally (zero past the last register). `SLVERR` is
/// never raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterFile {
    responder_id: u8,
    data_width: u8,
    registers: Vec<Register>,
}

impl RegisterFile {
    /// Register file answering on select line `responder_id` of a `data_width`-bit bus.
    #[must_use]
    pub fn new(
        responder_id: u8,
        data_width: u8,
        registers: impl IntoIterator<Item = Register>,
    ) -> Self {
        Self {
            responder_id,
            data_width,
            registers: registers.into_iter().collect(),
        }
    }

    /// Select line this file answers on.
    #[must_use]
    pub const fn responder_id(&self) -> u8 {
        self.responder_id
    }

    /// Registers in address order.
    #[must_use]
    pub fn registers(&self) -> &[Register] {
        &self.registers
    }

    /// Value of the register named `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<u32> {
        self.registers
            .iter()
            .find(|register| register.name == name)
            .map(Register::value)
    }

    /// Restores every register to its reset value.
    pub fn reset(&mut self) {
        for register in &mut self.registers {
            register.value = register.init;
        }
    }

    fn selected(&self, bus: &SignalBundle) -> bool {
        bus.enable() && bus.select(self.responder_id)
    }

    fn index(&self, bus: &SignalBundle) -> Option<usize> {
        usize::try_from(bus.address())
            .ok()
            .filter(|index| *index < self.registers.len())
    }

    fn write_hit(&self, bus: &SignalBundle) -> Option<usize> {
        if self.selected(bus) && bus.write_enable() {
            self.index(bus)
        } else {
            None
        }
    }
}

impl Responder for RegisterFile {
    fn respond(&self, bus: &SignalBundle) -> Response {
        let is_read = self.selected(bus) && !bus.write_enable();
        Response {
            ready: self.write_hit(bus).is_some() || is_read,
            read_data: self
                .index(bus)
                .map_or(0, |index| self.registers[index].value),
            error: false,
        }
    }

    fn clock(&mut self, bus: &SignalBundle) {
        if let Some(index) = self.write_hit(bus) {
            let register = &mut self.registers[index];
            register.value = bus.write_data();
            trace!(
                "responder {} wrote {} = {:#x}",
                self.responder_id,
                register.name,
                register.value
            );
        }
    }

    fn peek(&self, name: &str) -> Option<SignalValue> {
        self.get(name).map(|value| SignalValue::Bits {
            value: u64::from(value),
            width: self.data_width,
        })
    }
}

/// Several responders sharing one bus, one per select line.
///
/// Member `i` answers on select line `i`. The member whose select is asserted
/// drives the shared outputs; with no select asserted the first member does.
/// Every member sees every clock edge. Internal state is addressed as
/// `label.name`.
#[derive(Default)]
pub struct ResponderSet {
    members: Vec<(String, Box<dyn Responder>)>,
}

impl ResponderSet {
    /// Empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the responder for the next select line.
    #[must_use]
    pub fn with(mut self, label: impl Into<String>, responder: impl Responder + 'static) -> Self {
        self.push(label, responder);
        self
    }

    /// Adds the responder for the next select line.
    pub fn push(&mut self, label: impl Into<String>, responder: impl Responder + 'static) {
        self.members.push((label.into(), Box::new(responder)));
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// `true` when the set has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    fn driver(&self, bus: &SignalBundle) -> Option<&dyn Responder> {
        let index = bus
            .asserted_selects()
            .map(usize::from)
            .find(|index| *index < self.members.len())
            .unwrap_or(0);
        self.members.get(index).map(|(_, member)| &**member)
    }
}

impl fmt::Debug for ResponderSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.members.iter().map(|(label, _)| label))
            .finish()
    }
}

impl Responder for ResponderSet {
    fn respond(&self, bus: &SignalBundle) -> Response {
        self.driver(bus)
            .map_or_else(Response::default, |member| member.respond(bus))
    }

    fn clock(&mut self, bus: &SignalBundle) {
        for (_, member) in &mut self.members {
            member.clock(bus);
        }
    }

    fn peek(&self, name: &str) -> Option<SignalValue> {
        let (label, inner) = name.split_once('.')?;
        self.members
            .iter()
            .find(|(candidate, _)| candidate == label)
            .and_then(|(_, member)| member.peek(inner))
    }
}

/// Holds `PREADY` low for a fixed number of access cycles per transfer.
///
/// The wrapped responder is not clocked while it is being held off, so a
/// write lands on the edge where `PREADY` is finally presented high.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitStates<R> {
    inner: R,
    waits: u32,
    waited: u32,
}

impl<R: Responder> WaitStates<R> {
    /// Wraps `inner`, inserting `waits` wait cycles into every transfer.
    #[must_use]
    pub const fn new(inner: R, waits: u32) -> Self {
        Self {
            inner,
            waits,
            waited: 0,
        }
    }

    /// Wrapped responder.
    #[must_use]
    pub const fn inner(&self) -> &R {
        &self.inner
    }

    /// Wait cycles inserted per transfer.
    #[must_use]
    pub const fn waits(&self) -> u32 {
        self.waits
    }

    const fn holding(&self) -> bool {
        self.waited < self.waits
    }
}

impl<R: Responder> Responder for WaitStates<R> {
    fn respond(&self, bus: &SignalBundle) -> Response {
        let mut response = self.inner.respond(bus);
        if in_access(bus) && self.holding() {
            response.ready = false;
        }
        response
    }

    fn clock(&mut self, bus: &SignalBundle) {
        if !in_access(bus) {
            self.waited = 0;
            self.inner.clock(bus);
        } else if self.holding() {
            self.waited += 1;
        } else {
            self.waited = 0;
            self.inner.clock(bus);
        }
    }

    fn peek(&self, name: &str) -> Option<SignalValue> {
        self.inner.peek(name)
    }
}
