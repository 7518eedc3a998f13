//! Allocation-free tick path tests.
//!
//! These run the real-time half for thousands of ticks with every channel
//! busy, input handlers firing, and quantizers active, aborting on any heap
//! allocation. Cooperative servicing runs inside the guard too, since the
//! interpreter's advance path is expected to be allocation-free as well.
//!
//! Just run `cargo test`. No feature flags needed.

use assert_no_alloc::{assert_no_alloc, AllocDisabler};

#[cfg(debug_assertions)]
#[global_allocator]
static A: AllocDisabler = AllocDisabler;

use cv_engine::{
    engine, Action, EngineConfig, Host, InputEvent, InputHandler, Interpreter, OutputFrame,
    Realtime,
};
use cv_ir::library::*;
use cv_ir::{Channel, ScaleConfig, Shape, TickRate};
use cv_master::ClockInput;

fn ch(n: u8) -> Channel {
    Channel::from_number(n).unwrap()
}

fn busy_engine() -> (Host, Realtime) {
    let rate = TickRate::new(1000).unwrap();
    let (host, mut rt) = engine(EngineConfig { tick_rate: rate, ..EngineConfig::default() });
    {
        let mut runtime = host.lock();
        runtime.install_desc(ch(1), &lfo(0.05, 4.0, Shape::Sine)).unwrap();
        runtime.install_desc(ch(2), &adsr(0.005, 0.01, 0.5, 0.02, 5.0)).unwrap();
        let burst = vec![to(var_or("peak", 2.0), 0.004, Shape::Exp), to(0.0, 0.004, Shape::Log)];
        runtime.install_desc(ch(3), &[times(3, burst)]).unwrap();
        runtime.install_desc(ch(4), &pulse(0.003, 5.0)).unwrap();
        runtime.set_scale(ch(1), ScaleConfig::chromatic()).unwrap();
        runtime.enable_scale(ch(3), &[0.0, 2.0, 4.0, 5.0, 7.0, 9.0, 11.0], None, None).unwrap();
        runtime.trigger(ch(1), Action::Restart).unwrap();

        let handler: InputHandler = Box::new(|interp: &mut Interpreter, event: InputEvent| {
            match event.kind {
                cv_engine::InputKind::Rising => {
                    interp.trigger(ch(2), Action::Restart)?;
                    interp.trigger(ch(3), Action::Restart)?;
                    interp.trigger(ch(4), Action::Restart)
                }
                _ => interp.trigger(ch(2), Action::Release),
            }
        });
        runtime.set_handler(0, handler).unwrap();
    }
    rt.add_input(Box::new(ClockInput::new(0, 0.04, rate)));
    (host, rt)
}

#[test]
fn realtime_ticks_alloc_free() {
    let (_host, mut rt) = busy_engine();
    let mut frame = OutputFrame::zero();
    assert_no_alloc(|| {
        for _ in 0..5000 {
            rt.tick(&mut frame);
        }
    });
}

#[test]
fn ticks_with_servicing_alloc_free() {
    let (mut host, mut rt) = busy_engine();
    let mut frame = OutputFrame::zero();
    let mut advanced = 0;
    assert_no_alloc(|| {
        for _ in 0..5000 {
            rt.tick(&mut frame);
            advanced += host.service();
        }
    });
    assert!(advanced > 0);
    let mut runtime = host.lock();
    assert!(runtime.poll_event().is_some());
}
