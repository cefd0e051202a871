//! Bus controller state machine.
//!
//! The controller turns one [`TransferRequest`] into the two-phase handshake:
//!
//! 1. `IDLE → SETUP`: address, write data (writes only), `PWRITE`, and exactly
//!    one select line are driven.
//! 2. `SETUP → ACCESS`: `PENABLE` rises one cycle later, unconditionally.
//! 3. `ACCESS → ACCESS`: repeated while the responder holds `PREADY` low.
//! 4. `ACCESS → IDLE`: once `PREADY` is seen high, `PENABLE` and the select
//!    line fall and the transfer completes.
//!
//! Each [`BusController::advance`] call is one clock cycle. The controller
//! keeps only its phase and the active transfer between calls; the bundle and
//! request are borrowed for the duration of the call.

use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};

use crate::{
    BusShape, Command, ConfigError, ControllerError, ProtocolStall, SignalBundle, TransferRequest,
};

/// Controller tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Maximum wait cycles tolerated in `ACCESS` before the transfer is
    /// abandoned with [`ProtocolStall`]. `None` waits forever.
    pub stall_budget: Option<u32>,
}

/// Externally visible controller phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Phase {
    /// No transfer in flight.
    #[default]
    Idle,
    /// Address and select driven; `PENABLE` low.
    Setup,
    /// `PENABLE` high; waiting for `PREADY`.
    Access,
}

/// What one [`BusController::advance`] call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepOutcome {
    /// Idle request; the bundle was not touched.
    Idle,
    /// A transfer entered its setup phase.
    Setup,
    /// The access phase is in progress.
    Access {
        /// Wait cycles seen so far in this transfer.
        waited: u32,
    },
    /// `PREADY` was observed and the transfer finished this cycle.
    Completed(Completion),
}

/// Summary of a finished transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Completion {
    /// Command that was carried out.
    pub command: Command,
    /// Address driven during the transfer.
    pub address: u32,
    /// Responder that was selected.
    pub responder: u8,
    /// `PRDATA` at the completing edge, for reads.
    pub read_data: Option<u32>,
    /// `SLVERR` at the completing edge. Reported only; never retried.
    pub slave_error: bool,
    /// Access cycles in which `PREADY` was low.
    pub wait_cycles: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ActiveTransfer {
    command: Command,
    address: u32,
    responder: u8,
    waited: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
enum State {
    #[default]
    Idle,
    Setup(ActiveTransfer),
    Access(ActiveTransfer),
}

/// Cycle-stepped bus controller for one bus shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusController {
    shape: BusShape,
    config: ControllerConfig,
    state: State,
}

impl BusController {
    /// Controller with the baseline (unbounded wait) configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when `shape` is out of range.
    pub fn new(shape: BusShape) -> Result<Self, ConfigError> {
        Self::with_config(shape, ControllerConfig::default())
    }

    /// Controller with an explicit configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when `shape` is out of range.
    pub fn with_config(shape: BusShape, config: ControllerConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            shape: shape.validate()?,
            config,
            state: State::Idle,
        })
    }

    /// Shape this controller drives.
    #[must_use]
    pub const fn shape(&self) -> BusShape {
        self.shape
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> ControllerConfig {
        self.config
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        match self.state {
            State::Idle => Phase::Idle,
            State::Setup(_) => Phase::Setup,
            State::Access(_) => Phase::Access,
        }
    }

    /// Responder of the in-flight transfer, if any.
    #[must_use]
    pub const fn active_responder(&self) -> Option<u8> {
        match self.state {
            State::Idle => None,
            State::Setup(active) | State::Access(active) => Some(active.responder),
        }
    }

    /// Forgets any in-flight transfer. The bundle is left as it is.
    pub fn reset(&mut self) {
        self.state = State::Idle;
    }

    /// Advances the handshake by one clock cycle.
    ///
    /// Controller-owned wires of `bundle` are updated in place; responder-owned
    /// wires (`PREADY`, `PRDATA`, `SLVERR`) are only read. When a transfer
    /// completes and `request` still carries a read or write, the next setup
    /// phase starts in the same cycle.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::Config`] when `bundle` or `request` belongs
    /// to a different bus shape (nothing is driven in that case), and
    /// [`ControllerError::Stall`] when the stall budget runs out; the select
    /// and enable lines are released and the controller is back in `IDLE`.
    pub fn advance(
        &mut self,
        bundle: &mut SignalBundle,
        request: &TransferRequest,
    ) -> Result<StepOutcome, ControllerError> {
        self.check_shape(bundle.shape())?;
        self.check_shape(request.shape())?;

        match self.state {
            State::Idle => Ok(self.begin(bundle, request)),
            State::Setup(active) => {
                bundle.set_enable(true);
                self.state = State::Access(active);
                trace!("SETUP -> ACCESS responder={}", active.responder);
                Ok(StepOutcome::Access {
                    waited: active.waited,
                })
            }
            State::Access(mut active) => {
                if !bundle.ready() {
                    active.waited = active.waited.saturating_add(1);
                    if let Some(budget) = self.config.stall_budget {
                        if active.waited > budget {
                            return Err(self.abandon(bundle, active).into());
                        }
                    }
                    self.state = State::Access(active);
                    return Ok(StepOutcome::Access {
                        waited: active.waited,
                    });
                }

                let completion = self.complete(bundle, active);
                if request.command().is_transfer() {
                    self.begin(bundle, request);
                }
                Ok(StepOutcome::Completed(completion))
            }
        }
    }

    fn check_shape(&self, actual: BusShape) -> Result<(), ConfigError> {
        if actual == self.shape {
            Ok(())
        } else {
            Err(ConfigError::ShapeMismatch {
                expected: self.shape,
                actual,
            })
        }
    }

    fn begin(&mut self, bundle: &mut SignalBundle, request: &TransferRequest) -> StepOutcome {
        let command = request.command();
        if !command.is_transfer() {
            return StepOutcome::Idle;
        }

        bundle.set_address(request.address());
        if command == Command::Write {
            bundle.set_write_data(request.data());
        }
        bundle.drive_select(request.responder_id(), true);
        bundle.set_write_enable(command == Command::Write);

        self.state = State::Setup(ActiveTransfer {
            command,
            address: bundle.address(),
            responder: request.responder_id(),
            waited: 0,
        });
        trace!(
            "IDLE -> SETUP {command:?} address={:#x} responder={}",
            bundle.address(),
            request.responder_id()
        );
        StepOutcome::Setup
    }

    fn complete(&mut self, bundle: &mut SignalBundle, active: ActiveTransfer) -> Completion {
        let completion = Completion {
            command: active.command,
            address: active.address,
            responder: active.responder,
            read_data: (active.command == Command::Read).then(|| bundle.read_data()),
            slave_error: bundle.error(),
            wait_cycles: active.waited,
        };
        self.release(bundle, active);
        debug!(
            "{:?} complete address={:#x} responder={} waits={} slave_error={}",
            completion.command,
            completion.address,
            completion.responder,
            completion.wait_cycles,
            completion.slave_error
        );
        completion
    }

    fn abandon(&mut self, bundle: &mut SignalBundle, active: ActiveTransfer) -> ProtocolStall {
        self.release(bundle, active);
        let stall = ProtocolStall {
            responder: active.responder,
            address: active.address,
            waited: active.waited,
        };
        warn!("{stall}; transfer abandoned");
        stall
    }

    fn release(&mut self, bundle: &mut SignalBundle, active: ActiveTransfer) {
        bundle.set_enable(false);
        bundle.drive_select(active.responder, false);
        self.state = State::Idle;
        trace!("ACCESS -> IDLE responder={}", active.responder);
    }
}

#[cfg(test)]
mod tests {
    use super::{BusController, Completion, ControllerConfig, Phase, StepOutcome};
    use crate::{
        make_transfer, BusShape, Command, ConfigError, ControllerError, ProtocolStall,
        SignalBundle, TransferRequest,
    };

    fn write_setup() -> (BusController, SignalBundle, TransferRequest) {
        let (bundle, request) = make_transfer(13, 45, 16, 32, 1, 0).expect("valid transfer");
        let controller = BusController::new(request.shape()).expect("valid controller");
        (controller, bundle, request)
    }

    #[test]
    fn idle_request_leaves_bundle_untouched() {
        let (mut controller, mut bundle, request) = write_setup();
        bundle.set_address(0x55);
        bundle.set_write_data(0x66);
        let before = bundle.clone();

        for _ in 0..3 {
            let outcome = controller.advance(&mut bundle, &request).expect("idle step");
            assert_eq!(outcome, StepOutcome::Idle);
        }
        assert_eq!(bundle, before);
        assert_eq!(controller.phase(), Phase::Idle);
    }

    #[test]
    fn write_walks_setup_access_idle() {
        let (mut controller, mut bundle, mut request) = write_setup();

        request.set_command(Command::Write);
        assert_eq!(
            controller.advance(&mut bundle, &request),
            Ok(StepOutcome::Setup)
        );
        assert!(bundle.select(0));
        assert!(bundle.write_enable());
        assert!(!bundle.enable());
        assert_eq!(bundle.address(), 13);
        assert_eq!(bundle.write_data(), 45);

        request.set_command(Command::Idle);
        bundle.set_ready(true);
        assert_eq!(
            controller.advance(&mut bundle, &request),
            Ok(StepOutcome::Access { waited: 0 })
        );
        assert!(bundle.enable());
        assert_eq!(controller.phase(), Phase::Access);

        let outcome = controller.advance(&mut bundle, &request).expect("completes");
        assert_eq!(
            outcome,
            StepOutcome::Completed(Completion {
                command: Command::Write,
                address: 13,
                responder: 0,
                read_data: None,
                slave_error: false,
                wait_cycles: 0,
            })
        );
        assert!(!bundle.enable());
        assert!(!bundle.select(0));
        assert_eq!(controller.phase(), Phase::Idle);
        assert_eq!(controller.active_responder(), None);
    }

    fn write_with_strobe(lanes: u8) -> (Vec<StepOutcome>, Vec<u8>) {
        let (mut controller, mut bundle, mut request) = write_setup();
        bundle.set_strobe(lanes);
        let mut outcomes = Vec::new();
        let mut strobes = Vec::new();

        request.set_command(Command::Write);
        for _ in 0..3 {
            outcomes.push(controller.advance(&mut bundle, &request).expect("step"));
            strobes.push(bundle.strobe());
            request.set_command(Command::Idle);
            bundle.set_ready(true);
        }
        (outcomes, strobes)
    }

    #[test]
    fn strobe_is_carried_but_never_driven() {
        let (full, _) = write_with_strobe(0);
        let (partial, strobes) = write_with_strobe(0b0001);
        assert_eq!(partial, full);
        assert!(matches!(
            partial.as_slice(),
            [
                StepOutcome::Setup,
                StepOutcome::Access { waited: 0 },
                StepOutcome::Completed(Completion { wait_cycles: 0, .. }),
            ]
        ));
        assert_eq!(strobes, [0b0001; 3]);
    }

    #[test]
    fn read_does_not_drive_write_data() {
        let (mut bundle, mut request) = make_transfer(13, 99, 16, 32, 1, 0).expect("valid");
        let mut controller = BusController::new(request.shape()).expect("valid controller");
        request.set_command(Command::Read);
        controller.advance(&mut bundle, &request).expect("setup");
        assert_eq!(bundle.write_data(), 0);
        assert!(!bundle.write_enable());

        request.set_command(Command::Idle);
        controller.advance(&mut bundle, &request).expect("access");
        bundle.set_ready(true);
        bundle.set_read_data(0xBEEF);
        bundle.set_error(true);
        let outcome = controller.advance(&mut bundle, &request).expect("completes");
        let StepOutcome::Completed(done) = outcome else {
            panic!("expected completion, got {outcome:?}");
        };
        assert_eq!(done.read_data, Some(0xBEEF));
        assert!(done.slave_error);
    }

    #[test]
    fn wait_states_hold_enable_and_select() {
        let (mut controller, mut bundle, mut request) = write_setup();
        request.set_command(Command::Write);
        controller.advance(&mut bundle, &request).expect("setup");
        request.set_command(Command::Idle);
        controller.advance(&mut bundle, &request).expect("access");

        for expected in 1..=5 {
            assert_eq!(
                controller.advance(&mut bundle, &request),
                Ok(StepOutcome::Access { waited: expected })
            );
            assert!(bundle.enable());
            assert!(bundle.select(0));
        }

        bundle.set_ready(true);
        let outcome = controller.advance(&mut bundle, &request).expect("completes");
        assert!(matches!(
            outcome,
            StepOutcome::Completed(Completion { wait_cycles: 5, .. })
        ));
    }

    #[test]
    fn stall_budget_abandons_transfer_and_releases_bus() {
        let (mut bundle, mut request) = make_transfer(0x20, 1, 8, 8, 2, 1).expect("valid");
        let config = ControllerConfig {
            stall_budget: Some(2),
        };
        let mut controller =
            BusController::with_config(request.shape(), config).expect("valid controller");

        request.set_command(Command::Write);
        controller.advance(&mut bundle, &request).expect("setup");
        request.set_command(Command::Idle);
        controller.advance(&mut bundle, &request).expect("access");
        controller.advance(&mut bundle, &request).expect("first wait");
        controller.advance(&mut bundle, &request).expect("second wait");

        assert_eq!(
            controller.advance(&mut bundle, &request),
            Err(ControllerError::Stall(ProtocolStall {
                responder: 1,
                address: 0x20,
                waited: 3,
            }))
        );
        assert_eq!(controller.phase(), Phase::Idle);
        assert!(!bundle.enable());
        assert!(!bundle.select(1));
    }

    #[test]
    fn back_to_back_request_starts_setup_on_completion_cycle() {
        let (mut controller, mut bundle, mut request) = write_setup();
        request.set_command(Command::Write);
        controller.advance(&mut bundle, &request).expect("setup");
        controller.advance(&mut bundle, &request).expect("access");
        bundle.set_ready(true);

        let outcome = controller.advance(&mut bundle, &request).expect("completes");
        assert!(matches!(outcome, StepOutcome::Completed(_)));
        assert_eq!(controller.phase(), Phase::Setup);
        assert!(bundle.select(0));
        assert!(!bundle.enable());
    }

    #[test]
    fn foreign_bundle_is_rejected_before_driving() {
        let (mut controller, _, mut request) = write_setup();
        let other = BusShape::new(8, 32, 1).expect("valid shape");
        let mut foreign = SignalBundle::for_shape(other).expect("valid bundle");
        request.set_command(Command::Write);

        assert_eq!(
            controller.advance(&mut foreign, &request),
            Err(ControllerError::Config(ConfigError::ShapeMismatch {
                expected: controller.shape(),
                actual: other,
            }))
        );
        assert_eq!(foreign.asserted_selects().count(), 0);
        assert_eq!(controller.phase(), Phase::Idle);
    }

    #[test]
    fn reset_forgets_in_flight_transfer() {
        let (mut controller, mut bundle, mut request) = write_setup();
        request.set_command(Command::Read);
        controller.advance(&mut bundle, &request).expect("setup");
        assert_eq!(controller.active_responder(), Some(0));
        controller.reset();
        assert_eq!(controller.phase(), Phase::Idle);
    }
}
