//! Cycle-indexed handshake scenarios, checked through recorded samples.

#![allow(clippy::pedantic, clippy::nursery)]

use apb_model::{
    make_transfer, BusController, Command, Completion, ControllerConfig, ControllerError,
    ProtocolStall, SignalBundle, SignalField, SignalValue, StepOutcome, TransferRequest, WaveForm,
};
use log as _;
use proptest as _;
use rstest::rstest;
use serde as _;
use serde_json as _;
use thiserror as _;

struct Run {
    controller: BusController,
    bundle: SignalBundle,
    request: TransferRequest,
    waveform: WaveForm,
    completions: Vec<(usize, Completion)>,
}

impl Run {
    fn new(data: u32, responder_count: u16, responder_id: u8) -> Self {
        let (bundle, request) =
            make_transfer(13, data, 16, 32, responder_count, responder_id).expect("valid");
        Self {
            controller: BusController::new(bundle.shape()).expect("valid"),
            waveform: WaveForm::for_bus(bundle.descriptor()),
            bundle,
            request,
            completions: Vec::new(),
        }
    }

    /// Advances one cycle; `responder` then reacts to the bundle before sampling.
    fn cycle(&mut self, responder: impl FnOnce(&mut SignalBundle)) {
        let outcome = self
            .controller
            .advance(&mut self.bundle, &self.request)
            .expect("advance");
        if let StepOutcome::Completed(completion) = outcome {
            self.completions.push((self.waveform.cycles() + 1, completion));
        }
        responder(&mut self.bundle);
        self.waveform.sample(&self.bundle);
    }

    /// 1-based cycles in which a level field was high.
    fn high_cycles(&self, field: SignalField) -> Vec<usize> {
        self.waveform
            .samples(field)
            .expect("tracked")
            .iter()
            .enumerate()
            .filter(|(_, sample)| **sample == Some(SignalValue::Bit(true)))
            .map(|(index, _)| index + 1)
            .collect()
    }
}

/// Idle cycle, request cycle, then the access phase with `waits` stalled cycles.
fn run_transfer(command: Command, waits: usize, read_data: u32) -> Run {
    let mut run = Run::new(45, 1, 0);
    run.cycle(|_| {});
    run.request.set_command(command);
    run.cycle(|_| {});
    run.request.set_command(Command::Idle);
    run.cycle(|bundle| bundle.set_ready(waits == 0));
    for remaining in (0..waits).rev() {
        run.cycle(|bundle| {
            if remaining == 0 {
                bundle.set_ready(true);
                bundle.set_read_data(read_data);
            }
        });
    }
    run.cycle(|bundle| {
        bundle.set_ready(false);
        bundle.set_read_data(0);
    });
    run
}

#[test]
fn scenario_write_without_wait() {
    let run = run_transfer(Command::Write, 0, 0);

    assert_eq!(run.high_cycles(SignalField::Select(0)), vec![2, 3]);
    assert_eq!(run.high_cycles(SignalField::WriteEnable), vec![2, 3, 4]);
    assert_eq!(run.high_cycles(SignalField::Enable), vec![3]);
    assert_eq!(run.high_cycles(SignalField::Ready), vec![3]);
    assert_eq!(run.completions.len(), 1);
    let (cycle, completion) = run.completions[0];
    assert_eq!(cycle, 4);
    assert_eq!(completion.command, Command::Write);
    assert_eq!(completion.address, 13);
    assert_eq!(completion.read_data, None);
    assert_eq!(completion.wait_cycles, 0);
}

#[rstest]
#[case(1)]
#[case(2)]
#[case(5)]
fn scenario_write_with_wait(#[case] waits: usize) {
    let run = run_transfer(Command::Write, waits, 0);

    let access: Vec<usize> = (3..=3 + waits).collect();
    let selected: Vec<usize> = (2..=3 + waits).collect();
    assert_eq!(run.high_cycles(SignalField::Enable), access);
    assert_eq!(run.high_cycles(SignalField::Select(0)), selected);
    assert_eq!(run.high_cycles(SignalField::Ready), vec![3 + waits]);

    let (cycle, completion) = run.completions[0];
    assert_eq!(cycle, 4 + waits);
    assert_eq!(completion.wait_cycles, u32::try_from(waits).expect("small"));
}

#[test]
fn scenario_read_presents_responder_data_on_completion() {
    let run = run_transfer(Command::Read, 1, 13);

    assert!(run.high_cycles(SignalField::WriteEnable).is_empty());
    assert_eq!(
        run.waveform.samples(SignalField::ReadData).expect("tracked")[3],
        Some(SignalValue::Bits {
            value: 13,
            width: 32
        })
    );
    assert_eq!(
        run.waveform.samples(SignalField::WriteData).expect("tracked")[1],
        Some(SignalValue::Bits { value: 0, width: 32 })
    );
    let (cycle, completion) = run.completions[0];
    assert_eq!(cycle, 5);
    assert_eq!(completion.read_data, Some(13));
}

#[test]
fn scenario_second_responder_never_selects_the_first() {
    let mut run = Run::new(45, 2, 1);
    run.cycle(|_| {});
    run.request.set_command(Command::Write);
    run.cycle(|_| {});
    run.request.set_command(Command::Idle);
    run.cycle(|bundle| bundle.set_ready(true));
    run.cycle(|bundle| bundle.set_ready(false));

    assert!(run.high_cycles(SignalField::Select(0)).is_empty());
    assert_eq!(run.high_cycles(SignalField::Select(1)), vec![2, 3]);
    assert_eq!(run.completions[0].1.responder, 1);

    let rendered = run.waveform.render().expect("render");
    assert!(rendered.contains("\"name\": \"PSEL0\",\n            \"wave\": \"0...\""));
    assert!(rendered.contains("\"name\": \"PSEL1\",\n            \"wave\": \"01.0\""));
}

#[test]
fn held_request_runs_transfers_back_to_back() {
    let mut run = Run::new(45, 1, 0);
    run.request.set_command(Command::Write);
    run.cycle(|_| {});
    run.cycle(|bundle| bundle.set_ready(true));
    run.cycle(|_| {});
    run.cycle(|_| {});

    assert_eq!(run.high_cycles(SignalField::Select(0)), vec![1, 2, 3, 4]);
    assert_eq!(run.high_cycles(SignalField::Enable), vec![2, 4]);
    assert_eq!(
        run.completions.iter().map(|(cycle, _)| *cycle).collect::<Vec<_>>(),
        vec![3]
    );
}

#[test]
fn stall_budget_releases_the_bus() {
    let (mut bundle, mut request) = make_transfer(0x80, 1, 16, 32, 1, 0).expect("valid");
    let config = ControllerConfig {
        stall_budget: Some(3),
    };
    let mut controller = BusController::with_config(bundle.shape(), config).expect("valid");
    request.set_command(Command::Read);
    controller.advance(&mut bundle, &request).expect("setup");
    request.set_command(Command::Idle);
    controller.advance(&mut bundle, &request).expect("access");
    for waited in 1..=3 {
        assert_eq!(
            controller.advance(&mut bundle, &request),
            Ok(StepOutcome::Access { waited })
        );
    }
    assert_eq!(
        controller.advance(&mut bundle, &request),
        Err(ControllerError::Stall(ProtocolStall {
            responder: 0,
            address: 0x80,
            waited: 4,
        }))
    );
    assert!(!bundle.enable());
    assert!(!bundle.select(0));
    assert_eq!(controller.advance(&mut bundle, &request), Ok(StepOutcome::Idle));
}
