//! End-to-end behavior through the controller: what reaches hardware for
//! a given configuration and sequence.

use cv_engine::{Action, EngineConfig, SequenceEvent};
use cv_ir::library::*;
use cv_ir::{Channel, ScaleConfig, Shape, TickRate};
use cv_master::Controller;

const MAJOR: [f32; 7] = [0.0, 2.0, 4.0, 5.0, 7.0, 9.0, 11.0];

fn ch(n: u8) -> Channel {
    Channel::from_number(n).unwrap()
}

fn controller(hz: u32) -> Controller {
    Controller::with_engine(EngineConfig {
        tick_rate: TickRate::new(hz).unwrap(),
        ..EngineConfig::default()
    })
}

fn close(a: f32, b: f32) -> bool {
    (a - b).abs() < 1e-5
}

#[test]
fn major_scale_snaps_instant_set() {
    let mut c = Controller::new();
    c.set_scale(ch(1), ScaleConfig::custom(&MAJOR, None, None).unwrap()).unwrap();
    c.set_volts(ch(1), 2.35).unwrap();
    let buffer = c.render_frames(1).unwrap();
    assert!(close(buffer.channel(ch(1))[0], 2.0 + 4.0 / 12.0));
    assert!(close(c.output_voltage(ch(1)), 2.0 + 4.0 / 12.0));
    assert!(close(c.voltage(ch(1)).unwrap(), 2.35));
}

#[test]
fn disabled_scale_passes_through() {
    let mut c = Controller::new();
    c.set_scale(ch(1), ScaleConfig::custom(&MAJOR, None, None).unwrap()).unwrap();
    c.runtime().disable_scale(ch(1)).unwrap();
    c.set_volts(ch(1), 2.35).unwrap();
    let buffer = c.render_frames(1).unwrap();
    assert_eq!(buffer.channel(ch(1))[0], 2.35);
}

#[test]
fn chromatic_ramp_only_emits_semitones() {
    let mut c = Controller::new();
    c.set_scale(ch(3), ScaleConfig::chromatic()).unwrap();
    c.set_slew(ch(3), 1.0, Shape::Linear).unwrap();
    c.set_volts(ch(3), 1.0).unwrap();

    let ticks = c.tick_rate().seconds_to_ticks(1.0) as usize;
    let buffer = c.render_frames(ticks).unwrap();
    let samples = buffer.channel(ch(3));
    assert_eq!(samples.len(), ticks);

    let mut distinct = Vec::new();
    for &v in samples {
        let semis = v * 12.0;
        assert!(close(semis, semis.round()), "{v} is not a semitone");
        assert!((0.0..=1.0).contains(&v));
        if !distinct.contains(&semis.round()) {
            distinct.push(semis.round());
        }
    }
    assert!(distinct.len() > 10 && distinct.len() <= 13, "{distinct:?}");
    assert_eq!(*samples.last().unwrap(), 1.0);
    // Slope itself moved smoothly underneath.
    assert!(samples.windows(2).all(|w| w[1] >= w[0]));
}

#[test]
fn times_block_repeats_then_reports_done() {
    let mut c = controller(1000);
    let ramp = vec![to(1.0, 0.002, Shape::Linear), to(0.0, 0.002, Shape::Linear)];
    c.install(ch(2), &[times(3, ramp)]).unwrap();
    c.trigger(ch(2), Action::Restart).unwrap();
    let buffer = c.render_frames(14).unwrap();
    let expected = [0.5, 1.0, 0.5, 0.0];
    let samples = buffer.channel(ch(2));
    for cycle in 0..3 {
        assert_eq!(&samples[cycle * 4..cycle * 4 + 4], &expected);
    }
    assert_eq!(&samples[12..], &[0.0, 0.0]);
    assert_eq!(c.poll_events(), vec![SequenceEvent::Done(ch(2))]);
}

#[test]
fn loop_runs_until_cleared() {
    let mut c = controller(1000);
    c.install(ch(1), &lfo(0.004, 2.0, Shape::Linear)).unwrap();
    c.trigger(ch(1), Action::Restart).unwrap();
    let buffer = c.render_frames(12).unwrap();
    let samples = buffer.channel(ch(1));
    assert_eq!(&samples[..4], &[1.0, 2.0, 0.0, -2.0]);
    assert_eq!(&samples[4..8], &[0.0, 2.0, 0.0, -2.0]);
    assert!(c.poll_events().is_empty());

    c.clear(ch(1)).unwrap();
    let frozen = c.output_voltage(ch(1));
    let buffer = c.render_frames(4).unwrap();
    assert!(buffer.channel(ch(1)).iter().all(|&v| v == frozen));
}

#[test]
fn held_block_waits_for_release() {
    let mut c = controller(1000);
    c.install(ch(4), &adsr(0.002, 0.002, 0.5, 0.002, 4.0)).unwrap();
    c.trigger(ch(4), Action::Restart).unwrap();
    let buffer = c.render_frames(10).unwrap();
    let samples = buffer.channel(ch(4));
    assert_eq!(samples[1], 4.0);
    assert_eq!(samples[3], 2.0);
    assert!(samples[4..].iter().all(|&v| v == 2.0));
    assert!(c.runtime().is_holding(ch(4)));

    c.trigger(ch(4), Action::Release).unwrap();
    let buffer = c.render_frames(3).unwrap();
    assert_eq!(buffer.channel(ch(4))[1], 0.0);
    assert_eq!(c.poll_events(), vec![SequenceEvent::Done(ch(4))]);
}

#[test]
fn locked_block_ignores_retrigger() {
    let mut c = controller(1000);
    c.install(ch(1), &[lock(vec![to(3.0, 0.004, Shape::Linear)]), to(0.0, 0.0, Shape::Now)])
        .unwrap();
    c.trigger(ch(1), Action::Restart).unwrap();
    c.render_frames(2).unwrap();
    assert!(c.runtime().is_locked(ch(1)));
    c.trigger(ch(1), Action::Restart).unwrap();
    let buffer = c.render_frames(2).unwrap();
    assert_eq!(buffer.channel(ch(1)), &[2.25, 3.0]);
    // Lock clears at block end, and the trailing step lands on the next tick.
    assert!(!c.runtime().is_locked(ch(1)));
}

#[test]
fn dynamics_change_between_runs() {
    let mut c = controller(1000);
    c.install(ch(2), &[to(var_or("level", 1.0), 0.0, Shape::Now)]).unwrap();
    c.trigger(ch(2), Action::Restart).unwrap();
    assert_eq!(c.render_frames(1).unwrap().channel(ch(2)), &[1.0]);

    c.set_dynamic(ch(2), "level", -3.0).unwrap();
    c.trigger(ch(2), Action::Restart).unwrap();
    assert_eq!(c.render_frames(1).unwrap().channel(ch(2)), &[-3.0]);
    assert_eq!(c.get_dynamic(ch(2), "level").unwrap(), -3.0);
}

#[test]
fn mutated_dynamic_steps_each_loop_iteration() {
    let mut c = controller(1000);
    let next = op("mod", vec![op("add", vec![var("x"), 0.5.into()]), 2.0.into()]);
    let body = vec![to(mutate(var_or("x", 0.0), next), 0.001, Shape::Linear)];
    c.install(ch(3), &[looping(body)]).unwrap();
    c.trigger(ch(3), Action::Restart).unwrap();
    let buffer = c.render_frames(6).unwrap();
    assert_eq!(buffer.channel(ch(3)), &[0.5, 1.0, 1.5, 0.0, 0.5, 1.0]);
    // The walk has already scheduled the seventh step.
    assert_eq!(c.get_dynamic(ch(3), "x").unwrap(), 1.5);

    // Reinstalling starts the cell over from its default.
    let bump = mutate(var_or("x", 0.0), op("add", vec![var("x"), 0.25.into()]));
    c.install(ch(3), &[to(bump, 0.0, Shape::Now)]).unwrap();
    c.trigger(ch(3), Action::Restart).unwrap();
    assert_eq!(c.render_frames(1).unwrap().channel(ch(3)), &[0.25]);
}

#[test]
fn out_of_range_targets_are_clamped() {
    let mut c = Controller::with_engine(EngineConfig {
        range: cv_ir::OutputRange::new(-5.0, 5.0).unwrap(),
        ..EngineConfig::default()
    });
    c.set_volts(ch(1), 9.0).unwrap();
    c.set_volts(ch(2), -9.0).unwrap();
    let frame = c.render(1, &mut cv_engine::OutputFrame::zero()).unwrap();
    assert_eq!(frame.get(ch(1)), 5.0);
    assert_eq!(frame.get(ch(2)), -5.0);
}
