//! Live co-simulation of the controller against a responder model.

use apb_model::{
    BusController, BusShape, Command, Completion, ControllerConfig, SignalBundle, StepOutcome,
    TransferRequest, WaveForm,
};
use log::{debug, warn};

use crate::{HarnessError, Responder};

/// Cycles a single transfer may take before the session gives up on it.
pub const DEFAULT_CYCLE_BUDGET: u32 = 1024;

/// Session tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionConfig {
    /// Controller configuration.
    pub controller: ControllerConfig,
    /// Cycles allowed per transfer, counted from the setup cycle.
    pub cycle_budget: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            controller: ControllerConfig::default(),
            cycle_budget: DEFAULT_CYCLE_BUDGET,
        }
    }
}

/// Controller, responder, and recorder stepped together one cycle at a time.
///
/// Each cycle the controller advances first, the responder then presents its
/// combinational outputs, the bundle is sampled, and finally the responder
/// sees the rising clock edge.
#[derive(Debug)]
pub struct Session<R> {
    config: SessionConfig,
    controller: BusController,
    bundle: SignalBundle,
    responder: R,
    waveform: WaveForm,
}

impl<R: Responder> Session<R> {
    /// Session with default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Config`] when `shape` is out of range.
    pub fn new(shape: BusShape, responder: R) -> Result<Self, HarnessError> {
        Self::with_config(shape, SessionConfig::default(), responder)
    }

    /// Session with an explicit configuration.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Config`] when `shape` is out of range.
    pub fn with_config(
        shape: BusShape,
        config: SessionConfig,
        responder: R,
    ) -> Result<Self, HarnessError> {
        let controller = BusController::with_config(shape, config.controller)?;
        let bundle = SignalBundle::for_shape(shape)?;
        let waveform = WaveForm::for_bus(bundle.descriptor());
        Ok(Self {
            config,
            controller,
            bundle,
            responder,
            waveform,
        })
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> SessionConfig {
        self.config
    }

    /// Bus as of the last cycle.
    #[must_use]
    pub const fn bundle(&self) -> &SignalBundle {
        &self.bundle
    }

    /// Responder model.
    #[must_use]
    pub const fn responder(&self) -> &R {
        &self.responder
    }

    /// Mutable responder model, e.g. to preload state.
    pub fn responder_mut(&mut self) -> &mut R {
        &mut self.responder
    }

    /// Every cycle recorded so far.
    #[must_use]
    pub const fn waveform(&self) -> &WaveForm {
        &self.waveform
    }

    /// Cycles simulated so far.
    #[must_use]
    pub const fn cycles(&self) -> usize {
        self.waveform.cycles()
    }

    /// Renders the recorded trace as WaveDrom JSON.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Trace`] when the trace cannot be rendered.
    pub fn render(&self) -> Result<String, HarnessError> {
        Ok(self.waveform.render()?)
    }

    /// Simulates one cycle with `request` presented to the controller.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Controller`] on a shape mismatch or when the
    /// controller's stall budget runs out.
    pub fn cycle(&mut self, request: &TransferRequest) -> Result<StepOutcome, HarnessError> {
        let outcome = self.controller.advance(&mut self.bundle, request)?;
        self.responder.respond(&self.bundle).apply(&mut self.bundle);
        self.waveform.sample(&self.bundle);
        self.responder.clock(&self.bundle);
        Ok(outcome)
    }

    /// Runs `cycles` idle cycles.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Session::cycle`].
    pub fn idle(&mut self, cycles: usize) -> Result<(), HarnessError> {
        let request = TransferRequest::new(self.controller.shape(), Command::Idle, 0, 0, 0)?;
        for _ in 0..cycles {
            self.cycle(&request)?;
        }
        Ok(())
    }

    /// Writes `data` to `address` on `responder_id` and waits for completion.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::CycleBudgetExhausted`] when the responder never
    /// finishes the transfer, and the errors of [`Session::cycle`].
    pub fn write(
        &mut self,
        address: u32,
        data: u32,
        responder_id: u8,
    ) -> Result<Completion, HarnessError> {
        self.transfer(Command::Write, address, data, responder_id)
    }

    /// Reads `address` on `responder_id` and waits for completion.
    ///
    /// The returned completion carries the read data.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Session::write`].
    pub fn read(&mut self, address: u32, responder_id: u8) -> Result<Completion, HarnessError> {
        self.transfer(Command::Read, address, 0, responder_id)
    }

    fn transfer(
        &mut self,
        command: Command,
        address: u32,
        data: u32,
        responder_id: u8,
    ) -> Result<Completion, HarnessError> {
        let mut request =
            TransferRequest::new(self.controller.shape(), command, address, data, responder_id)?;

        for _ in 0..self.config.cycle_budget {
            match self.cycle(&request)? {
                StepOutcome::Setup => request.set_command(Command::Idle),
                StepOutcome::Completed(completion) => {
                    debug!("session cycle {}: {completion:?}", self.cycles());
                    return Ok(completion);
                }
                StepOutcome::Idle | StepOutcome::Access { .. } => {}
            }
        }

        self.controller.reset();
        self.bundle.set_enable(false);
        self.bundle.set_select(request.responder_id(), false)?;
        let budget = self.config.cycle_budget;
        warn!("giving up on {command:?} at {:#x} after {budget} cycles", request.address());
        Err(HarnessError::CycleBudgetExhausted {
            budget,
            address: request.address(),
            responder: request.responder_id(),
        })
    }
}
