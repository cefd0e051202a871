//! Hardware tester contract and a behavioral implementation of it.
//!
//! A [`HardwareTester`] accepts stimulus (`poke`), checks (`expect`) and clock
//! half-cycles (`step`), then executes everything in `compile_and_run`. The
//! [`RecordingTester`] executes against a [`Responder`] model instead of
//! compiled hardware, which keeps the drive sequences testable in-process.

use std::fmt;

use apb_model::{BusShape, Driver, SignalBundle, SignalField, SignalValue, WaveForm};
use log::{debug, warn};

use crate::{HarnessError, Responder};

/// A pin on the device under test.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Pin {
    /// A bus wire.
    Bus(SignalField),
    /// Internal state exposed by the device, e.g. a register output.
    Internal(String),
}

impl fmt::Display for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bus(field) => write!(f, "{field}"),
            Self::Internal(name) => f.write_str(name),
        }
    }
}

impl From<SignalField> for Pin {
    fn from(field: SignalField) -> Self {
        Self::Bus(field)
    }
}

/// External collaborator that exercises a device with recorded stimulus.
pub trait HardwareTester {
    /// Drives `pin` to `value` from this point on.
    fn poke(&mut self, pin: Pin, value: SignalValue);

    /// Checks that `pin` reads `value` at this point.
    fn expect(&mut self, pin: Pin, value: SignalValue);

    /// Advances the device clock by `half_cycles` half periods.
    fn step(&mut self, half_cycles: u32);

    /// Executes all recorded stimulus and reports the outcome of every check.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError`] when the stimulus itself is invalid, e.g. a
    /// poke on a pin the device drives. Nothing is executed in that case.
    fn compile_and_run(&mut self) -> Result<RunReport, HarnessError>;
}

/// One failed expectation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    /// Index of the expectation in the recorded stimulus.
    pub action: usize,
    /// Half-cycle count at which the check ran.
    pub half_cycle: u64,
    /// Checked pin.
    pub pin: Pin,
    /// Expected value.
    pub expected: SignalValue,
    /// Observed value, `None` when the device has no such pin.
    pub actual: Option<SignalValue>,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "half-cycle {}: {} expected {:#x}, got ",
            self.half_cycle,
            self.pin,
            self.expected.as_u64()
        )?;
        match self.actual {
            Some(actual) => write!(f, "{:#x}", actual.as_u64()),
            None => f.write_str("nothing"),
        }
    }
}

/// Outcome of one [`HardwareTester::compile_and_run`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunReport {
    /// Half cycles executed in this run.
    pub half_cycles: u64,
    /// Expectations evaluated.
    pub checked: usize,
    /// Expectations that failed, in stimulus order.
    pub mismatches: Vec<Mismatch>,
}

impl RunReport {
    /// `true` when every expectation held.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.mismatches.is_empty()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} checks passed over {} half-cycles",
            self.checked - self.mismatches.len(),
            self.checked,
            self.half_cycles
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Action {
    Poke(Pin, SignalValue),
    Expect(Pin, SignalValue),
    Step(u32),
}

/// Tester that records stimulus and executes it against a responder model.
///
/// Each run consumes the stimulus recorded since the previous run. Pin levels,
/// clock phase, and responder state carry over between runs. Every rising
/// edge samples the bus into [`RecordingTester::waveform`].
#[derive(Debug)]
pub struct RecordingTester<R> {
    responder: R,
    pins: SignalBundle,
    clock_high: bool,
    half_cycles: u64,
    actions: Vec<Action>,
    waveform: WaveForm,
}

impl<R: Responder> RecordingTester<R> {
    /// Tester for a device with bus `shape`, modelled by `responder`.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Config`] when `shape` is out of range.
    pub fn new(shape: BusShape, responder: R) -> Result<Self, HarnessError> {
        let pins = SignalBundle::for_shape(shape)?;
        let waveform = WaveForm::for_bus(pins.descriptor());
        Ok(Self {
            responder,
            pins,
            clock_high: false,
            half_cycles: 0,
            actions: Vec::new(),
            waveform,
        })
    }

    /// Responder model.
    #[must_use]
    pub const fn responder(&self) -> &R {
        &self.responder
    }

    /// Current pin levels.
    #[must_use]
    pub const fn pins(&self) -> &SignalBundle {
        &self.pins
    }

    /// Bus samples taken at every rising edge so far.
    #[must_use]
    pub const fn waveform(&self) -> &WaveForm {
        &self.waveform
    }

    /// Number of recorded actions not yet executed.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.actions.len()
    }

    fn settle(&mut self) {
        self.responder.respond(&self.pins).apply(&mut self.pins);
    }

    fn observe(&self, pin: &Pin) -> Option<SignalValue> {
        match pin {
            Pin::Bus(field) => self.pins.value(*field),
            Pin::Internal(name) => self.responder.peek(name),
        }
    }

    /// Applies every recorded poke to a scratch copy of the pins, so invalid
    /// stimulus is rejected before anything runs.
    fn check_stimulus(&self) -> Result<(), HarnessError> {
        let mut scratch = self.pins.clone();
        for action in &self.actions {
            if let Action::Poke(pin, value) = action {
                drive(&mut scratch, pin.clone(), *value)?;
            }
        }
        Ok(())
    }

    fn toggle(&mut self) {
        self.settle();
        self.clock_high = !self.clock_high;
        if self.clock_high {
            self.waveform.sample(&self.pins);
            self.responder.clock(&self.pins);
        }
        self.half_cycles += 1;
    }
}

fn drive(pins: &mut SignalBundle, pin: Pin, value: SignalValue) -> Result<(), HarnessError> {
    match pin {
        Pin::Bus(field) if field.driver() == Driver::Controller => {
            pins.set_value(field, value)?;
            Ok(())
        }
        other => Err(HarnessError::NotDrivable(other)),
    }
}

impl<R: Responder> HardwareTester for RecordingTester<R> {
    fn poke(&mut self, pin: Pin, value: SignalValue) {
        self.actions.push(Action::Poke(pin, value));
    }

    fn expect(&mut self, pin: Pin, value: SignalValue) {
        self.actions.push(Action::Expect(pin, value));
    }

    fn step(&mut self, half_cycles: u32) {
        self.actions.push(Action::Step(half_cycles));
    }

    fn compile_and_run(&mut self) -> Result<RunReport, HarnessError> {
        self.check_stimulus()?;
        let start = self.half_cycles;
        let mut report = RunReport::default();

        for (index, action) in std::mem::take(&mut self.actions).into_iter().enumerate() {
            match action {
                Action::Poke(pin, value) => drive(&mut self.pins, pin, value)?,
                Action::Step(half_cycles) => {
                    for _ in 0..half_cycles {
                        self.toggle();
                    }
                }
                Action::Expect(pin, expected) => {
                    self.settle();
                    report.checked += 1;
                    let actual = self.observe(&pin);
                    if actual.map(SignalValue::as_u64) != Some(expected.as_u64()) {
                        let mismatch = Mismatch {
                            action: index,
                            half_cycle: self.half_cycles,
                            pin,
                            expected,
                            actual,
                        };
                        warn!("{mismatch}");
                        report.mismatches.push(mismatch);
                    }
                }
            }
        }
        self.settle();

        report.half_cycles = self.half_cycles - start;
        debug!("{report}");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use apb_model::{BusShape, SignalField, SignalValue};

    use super::{HardwareTester, Pin, RecordingTester};
    use crate::{HarnessError, Register, RegisterFile};

    fn tester() -> RecordingTester<RegisterFile> {
        let registers = (0..2).map(|i| Register::with_init(format!("r{i}"), 0x10 + i));
        RecordingTester::new(
            BusShape::new(1, 16, 1).expect("valid"),
            RegisterFile::new(0, 16, registers),
        )
        .expect("valid")
    }

    fn bit(level: bool) -> SignalValue {
        SignalValue::Bit(level)
    }

    #[test]
    fn expectations_see_combinational_outputs() {
        let mut tester = tester();
        tester.poke(Pin::Bus(SignalField::Address), SignalValue::Bits { value: 1, width: 1 });
        tester.poke(Pin::Bus(SignalField::Select(0)), bit(true));
        tester.poke(Pin::Bus(SignalField::Enable), bit(true));
        tester.expect(SignalField::Ready.into(), bit(true));
        tester.expect(SignalField::ReadData.into(), SignalValue::Bits { value: 0x11, width: 16 });
        tester.expect(Pin::Internal("r0".to_owned()), SignalValue::Bits { value: 0x10, width: 16 });
        assert_eq!(tester.pending(), 6);

        let report = tester.compile_and_run().expect("runs");
        assert!(report.passed(), "{report}");
        assert_eq!(report.checked, 3);
        assert_eq!(report.half_cycles, 0);
        assert_eq!(tester.pending(), 0);
    }

    #[test]
    fn failed_checks_are_reported_not_raised() {
        let mut tester = tester();
        tester.step(2);
        tester.expect(SignalField::Ready.into(), bit(true));
        tester.expect(Pin::Internal("missing".to_owned()), bit(false));

        let report = tester.compile_and_run().expect("runs");
        assert_eq!(report.half_cycles, 2);
        assert_eq!(report.mismatches.len(), 2);
        assert_eq!(report.mismatches[0].action, 1);
        assert_eq!(report.mismatches[0].half_cycle, 2);
        assert_eq!(
            report.mismatches[0].to_string(),
            "half-cycle 2: PREADY expected 0x1, got 0x0"
        );
        assert_eq!(report.mismatches[1].actual, None);
        assert_eq!(tester.waveform().cycles(), 1);
    }

    #[test]
    fn poking_a_responder_output_is_rejected() {
        let mut tester = tester();
        tester.poke(SignalField::ReadData.into(), SignalValue::Bits { value: 0, width: 16 });
        assert_eq!(
            tester.compile_and_run(),
            Err(HarnessError::NotDrivable(Pin::Bus(SignalField::ReadData)))
        );
    }

    #[test]
    fn invalid_stimulus_runs_nothing() {
        let mut tester = tester();
        tester.step(4);
        tester.poke(SignalField::ReadData.into(), SignalValue::Bits { value: 0, width: 16 });
        tester.step(2);
        let pins = tester.pins().clone();

        assert_eq!(
            tester.compile_and_run(),
            Err(HarnessError::NotDrivable(Pin::Bus(SignalField::ReadData)))
        );
        assert_eq!(tester.waveform().cycles(), 0);
        assert_eq!(tester.pending(), 3);
        assert_eq!(tester.pins(), &pins);
    }

    #[test]
    fn mistyped_poke_runs_nothing() {
        let mut tester = tester();
        tester.step(2);
        tester.poke(Pin::Bus(SignalField::Select(0)), SignalValue::Bits { value: 3, width: 8 });

        assert!(matches!(tester.compile_and_run(), Err(HarnessError::Config(_))));
        assert_eq!(tester.waveform().cycles(), 0);
        assert_eq!(tester.pending(), 2);
    }
}
