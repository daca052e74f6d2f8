mod common;

use core::time::Duration;

use chemid_core::charger::ChargerAction;
use chemid_core::clock::{ManualClock, Timebase};
use chemid_core::config::MeasurementConfig;
use chemid_core::procedure::Phase;
use chemid_core::record::{ParsedLine, RECORD_HEADER, parse_line};
use chemid_core::sampling::{LoopError, SamplingLoop, StepOutcome};
use chemid_core::sequencer::{SequenceError, Sequencer};

use common::{MemorySink, PackCharger, PackGauge, PackState};

const PERIOD: Duration = Duration::from_secs(5);

type PackLoop = SamplingLoop<Duration, PackGauge, PackCharger, MemorySink>;

fn run_pack() -> (PackLoop, chemid_core::sampling::RunSummary) {
    let pack = PackState::shared(2_000.0, 4, PERIOD);
    let config = MeasurementConfig::new(2_000, 3_000, 4);
    let mut sampling = SamplingLoop::new(
        Sequencer::new(config).expect("valid config"),
        PackGauge(pack.clone()),
        PackCharger {
            pack: pack.clone(),
            actions: Vec::new(),
        },
        MemorySink::default(),
    );

    let mut clock = ManualClock::new();
    let summary = sampling
        .run_blocking(&mut clock, |outcome| {
            // The operator follows the instructions in the comments.
            let Some(transition) = outcome.record().and_then(|record| record.transition) else {
                return;
            };
            match transition.to {
                Phase::Discharge => pack.borrow_mut().load_connected = true,
                Phase::RelaxDischarged => pack.borrow_mut().load_connected = false,
                _ => {}
            }
        })
        .expect("session completes");
    (sampling, summary)
}

#[test]
fn session_runs_to_completion() {
    let (sampling, summary) = run_pack();
    let sink = sampling.sink();

    assert_eq!(summary.final_phase, Phase::Done);
    assert_eq!(summary.read_failures, 0);
    assert_eq!(summary.records as usize, sink.records.len());
    assert_eq!(sink.records.last().map(|record| record.phase), Some(Phase::Done));
    assert_eq!(
        sampling.charger().actions,
        [ChargerAction::Activate, ChargerAction::Deactivate]
    );
}

#[test]
fn phases_only_move_forward_one_step_at_a_time() {
    let (sampling, _) = run_pack();
    let mut previous = Phase::Init;
    let mut visited = vec![];
    for record in &sampling.sink().records {
        assert!(record.phase >= previous);
        assert!(record.phase.as_index() - previous.as_index() <= 1);
        if record.phase != previous || visited.is_empty() {
            visited.push(record.phase);
        }
        previous = record.phase;
    }
    assert_eq!(
        visited,
        [
            Phase::Charge,
            Phase::RelaxCharged,
            Phase::Discharge,
            Phase::RelaxDischarged,
            Phase::Done,
        ]
    );
}

#[test]
fn elapsed_time_advances_one_period_per_record() {
    let (sampling, summary) = run_pack();
    for (index, record) in sampling.sink().records.iter().enumerate() {
        assert_eq!(record.elapsed_s, 5 * index as i64);
    }
    let last = sampling.sink().records.last().expect("records");
    assert_eq!(summary.elapsed, Duration::from_secs(last.elapsed_s as u64));
}

#[test]
fn exactly_one_comment_per_transition() {
    let (sampling, _) = run_pack();
    let records = &sampling.sink().records;
    let commented = records.iter().filter(|record| !record.comment.is_empty()).count();
    assert_eq!(commented, 5);
    for record in records {
        assert_eq!(record.comment.is_empty(), record.transition.is_none());
    }
}

#[test]
fn rest_phases_last_just_over_their_configured_duration() {
    let (sampling, _) = run_pack();
    let entered = |phase: Phase| {
        sampling
            .sink()
            .records
            .iter()
            .find(|record| record.transition.is_some_and(|t| t.to == phase))
            .map(|record| record.elapsed_s)
            .expect("phase entered")
    };
    assert_eq!(entered(Phase::Discharge) - entered(Phase::RelaxCharged), 7_205);
    assert_eq!(entered(Phase::Done) - entered(Phase::RelaxDischarged), 18_005);
}

#[test]
fn current_is_negated_only_around_discharge() {
    let (sampling, _) = run_pack();
    let mut before = Phase::Init;
    let mut negative = 0;
    for record in &sampling.sink().records {
        let discharging = before == Phase::Discharge || record.phase == Phase::Discharge;
        if discharging {
            assert!(record.current_ma <= 0, "{record:?}");
        } else {
            assert!(record.current_ma >= 0, "{record:?}");
        }
        if record.current_ma < 0 {
            negative += 1;
        }
        before = record.phase;
    }
    assert!(negative > 0);
}

#[test]
fn stream_starts_with_single_header_and_parses_back() {
    let (sampling, _) = run_pack();
    let sink = sampling.sink();
    assert_eq!(sink.headers, 1);
    assert_eq!(sink.lines[0], RECORD_HEADER);
    assert_eq!(sink.lines.len(), sink.records.len() + 1);

    for (line, record) in sink.lines[1..].iter().zip(&sink.records) {
        let Ok(ParsedLine::Row(row)) = parse_line(line) else {
            panic!("unparsable line {line:?}");
        };
        assert_eq!(row.elapsed_s, record.elapsed_s);
        assert_eq!(row.reading.voltage_mv, record.voltage_mv);
        assert_eq!(row.reading.current_ma, record.current_ma);
        assert!((row.reading.temperature_c - record.temperature_c).abs() < 1e-6);
        assert_eq!(row.comment, record.comment);
    }
}

#[test]
fn finished_loop_refuses_further_steps() {
    let (mut sampling, summary) = run_pack();
    let mut clock = ManualClock::starting_at(Duration::from_secs(1_000_000));

    let err = sampling.step(clock.now()).expect_err("session finished");
    assert!(matches!(err, LoopError::Sequence(SequenceError::Finished)));

    let rerun = sampling.run_blocking(&mut clock, |outcome: &StepOutcome<_>| {
        panic!("unexpected outcome {outcome:?}");
    });
    assert!(rerun.is_err());
    assert_eq!(sampling.summary(), summary);
}
