//! Stimulus sequences that replay the controller's outputs onto a tester.
//!
//! The harness owns a [`BusController`] and its model bundle. Every
//! [`DriveHarness::step`] advances the controller one cycle, pokes all
//! controller-driven wires onto the tester, and clocks the tester one full
//! period. The model's own `PREADY` is raised by the harness so the controller
//! completes without waiting; the device's real `PREADY` and `PRDATA` are
//! checked through tester expectations.

use std::sync::Arc;

use apb_model::{
    BusController, BusShape, Command, ControllerConfig, Driver, SignalBundle, SignalField,
    SignalValue, StepOutcome, TransferRequest,
};
use log::debug;

use crate::{HardwareTester, HarnessError, Pin};

/// Half periods per bus cycle.
pub const HALF_CYCLES_PER_CYCLE: u32 = 2;

/// Drives a tester through complete write and read transfers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriveHarness {
    controller: BusController,
    bundle: SignalBundle,
}

impl DriveHarness {
    /// Harness for a bus of `shape` with the baseline controller.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Config`] when `shape` is out of range.
    pub fn new(shape: BusShape) -> Result<Self, HarnessError> {
        Self::with_config(shape, ControllerConfig::default())
    }

    /// Harness with an explicit controller configuration.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Config`] when `shape` is out of range.
    pub fn with_config(shape: BusShape, config: ControllerConfig) -> Result<Self, HarnessError> {
        Ok(Self {
            controller: BusController::with_config(shape, config)?,
            bundle: SignalBundle::for_shape(shape)?,
        })
    }

    /// Controller state.
    #[must_use]
    pub const fn controller(&self) -> &BusController {
        &self.controller
    }

    /// Model-side bundle as of the last step.
    #[must_use]
    pub const fn bundle(&self) -> &SignalBundle {
        &self.bundle
    }

    /// Zeroes the model bundle and builds an idle request for one transfer.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Config`] when `responder_id` is not on the bus.
    pub fn request(
        &mut self,
        address: u32,
        data: u32,
        responder_id: u8,
    ) -> Result<TransferRequest, HarnessError> {
        let request = TransferRequest::new(
            self.controller.shape(),
            Command::Idle,
            address,
            data,
            responder_id,
        )?;
        self.bundle = SignalBundle::zeroed(Arc::clone(self.bundle.descriptor()));
        Ok(request)
    }

    /// Advances the controller one cycle and replays its outputs for one clock period.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Controller`] when the controller rejects the cycle.
    pub fn step<T: HardwareTester + ?Sized>(
        &mut self,
        request: &TransferRequest,
        tester: &mut T,
    ) -> Result<StepOutcome, HarnessError> {
        let outcome = self.controller.advance(&mut self.bundle, request)?;
        for (field, value) in self.bundle.driven_by(Driver::Controller) {
            tester.poke(Pin::Bus(field), value);
        }
        tester.step(HALF_CYCLES_PER_CYCLE);
        Ok(outcome)
    }

    /// Idle cycle, then a zero-wait write of `data` to `address`.
    ///
    /// Expects the device to raise `PREADY` in the access cycle and drop it
    /// once the transfer is released.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError`] when the request cannot be built or the
    /// controller rejects a cycle.
    pub fn write<T: HardwareTester + ?Sized>(
        &mut self,
        tester: &mut T,
        address: u32,
        data: u32,
        responder_id: u8,
    ) -> Result<(), HarnessError> {
        let mut request = self.request(address, data, responder_id)?;
        debug!("write {data:#x} to {address:#x} on responder {responder_id}");

        self.step(&request, tester)?;

        request.set_command(Command::Write);
        self.step(&request, tester)?;

        request.set_command(Command::Idle);
        self.bundle.set_ready(true);
        self.step(&request, tester)?;
        tester.expect(Pin::Bus(SignalField::Ready), SignalValue::Bit(true));

        self.step(&request, tester)?;
        tester.expect(Pin::Bus(SignalField::Ready), SignalValue::Bit(false));
        tester.step(HALF_CYCLES_PER_CYCLE);
        Ok(())
    }

    /// Zero-wait read from `address`, expecting the device to return `data`.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError`] when the request cannot be built or the
    /// controller rejects a cycle.
    pub fn read<T: HardwareTester + ?Sized>(
        &mut self,
        tester: &mut T,
        address: u32,
        data: u32,
        responder_id: u8,
    ) -> Result<(), HarnessError> {
        let mut request = self.request(address, data, responder_id)?;
        debug!("read {address:#x} on responder {responder_id}, expecting {data:#x}");

        request.set_command(Command::Read);
        self.step(&request, tester)?;

        request.set_command(Command::Idle);
        self.bundle.set_ready(true);
        self.step(&request, tester)?;
        tester.expect(Pin::Bus(SignalField::Ready), SignalValue::Bit(true));
        tester.expect(
            Pin::Bus(SignalField::ReadData),
            SignalValue::Bits {
                value: u64::from(request.data()),
                width: self.controller.shape().data_width,
            },
        );

        self.step(&request, tester)?;
        tester.expect(Pin::Bus(SignalField::Ready), SignalValue::Bit(false));
        tester.step(HALF_CYCLES_PER_CYCLE);
        Ok(())
    }
}
