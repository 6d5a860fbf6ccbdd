mod common;

use evhost::{Error, Loop, Revents, RunMode, Timer};
use std::time::{Duration, Instant};

#[test]
fn test_one_shot_fires_once_and_releases_loop() {
    common::init_tracing();

    let start = Instant::now();
    let lp = Loop::new().expect("Failed to create loop");
    let seen = common::log();

    let timer = {
        let seen = seen.clone();
        Timer::new(
            move |w, _, revents| {
                seen.borrow_mut().push((revents, w.is_active()));
                Ok(())
            },
            0.01,
            0.0,
        )
        .expect("Failed to create timer")
    };
    timer.start(&lp, false).expect("Failed to start timer");
    assert_eq!(lp.keepalive(), 1);

    lp.run(RunMode::Default).expect("Run failed");

    assert!(
        start.elapsed() >= Duration::from_millis(10),
        "Timer should not fire before its delay"
    );
    assert_eq!(*seen.borrow(), vec![(Revents::TIMER, false)]);
    assert!(!timer.is_active());
    assert_eq!(lp.keepalive(), 0);
    assert_eq!(lp.attached(), 0);
}

#[test]
fn test_timers_fire_in_deadline_order() {
    common::init_tracing();

    let lp = Loop::new().expect("Failed to create loop");
    let order = common::log();

    let make = |name: &'static str, after: f64| {
        let order = order.clone();
        Timer::new(
            move |_, _, _| {
                order.borrow_mut().push(name);
                Ok(())
            },
            after,
            0.0,
        )
        .expect("Failed to create timer")
    };

    let slow = make("slow", 0.02);
    let fast = make("fast", 0.005);
    slow.start(&lp, false).expect("Failed to start timer");
    fast.start(&lp, false).expect("Failed to start timer");

    lp.run(RunMode::Default).expect("Run failed");

    assert_eq!(*order.borrow(), vec!["fast", "slow"]);
}

#[test]
fn test_repeating_timer() {
    common::init_tracing();

    let start = Instant::now();
    let lp = Loop::new().expect("Failed to create loop");
    let calls = common::counter();

    let timer = {
        let calls = calls.clone();
        Timer::new(
            move |w, lp, _| {
                assert!(w.is_active());
                calls.set(calls.get() + 1);
                if calls.get() == 3 {
                    w.stop(lp)?;
                }
                Ok(())
            },
            0.0,
            0.005,
        )
        .expect("Failed to create timer")
    };
    timer.start(&lp, false).expect("Failed to start timer");

    lp.run(RunMode::Default).expect("Run failed");

    assert_eq!(calls.get(), 3);
    assert!(start.elapsed() >= Duration::from_millis(10));
    assert!(!timer.is_active());
    assert_eq!(lp.keepalive(), 0);
}

#[test]
fn test_again() {
    common::init_tracing();

    let lp = Loop::new().expect("Failed to create loop");
    let timer = Timer::new(|_, _, _| Ok(()), 0.0, 0.0).expect("Failed to create timer");

    // Inactive one-shot: nothing to restart.
    timer.again(&lp, false).expect("Again failed");
    assert!(!timer.is_active());
    assert_eq!(lp.attached(), 0);

    // Inactive repeating: starts with the repeat interval as delay.
    timer.set(0.0, 5.0).expect("Failed to reconfigure timer");
    timer.again(&lp, false).expect("Again failed");
    assert!(timer.is_active());
    assert_eq!(timer.after(), 5.0);
    assert_eq!(lp.keepalive(), 1);

    let remaining = timer.remaining(&lp).expect("Remaining failed");
    assert!(remaining > 4.9 && remaining <= 5.0, "remaining = {remaining}");

    // Active repeating: stays active, daemon flag follows the call.
    timer.again(&lp, true).expect("Again failed");
    assert!(timer.is_active());
    assert!(timer.is_daemon());
    assert_eq!(lp.keepalive(), 0);
    assert_eq!(lp.attached(), 1);

    timer.stop(&lp).expect("Failed to stop timer");
    assert_eq!(lp.attached(), 0);
}

#[test]
fn test_again_stops_active_one_shot() {
    common::init_tracing();

    let lp = Loop::new().expect("Failed to create loop");
    let timer = Timer::new(|_, _, _| Ok(()), 10.0, 0.0).expect("Failed to create timer");

    timer.start(&lp, false).expect("Failed to start timer");
    timer.again(&lp, false).expect("Again failed");

    assert!(!timer.is_active());
    assert_eq!(lp.keepalive(), 0);
    assert_eq!(lp.attached(), 0);
}

#[test]
fn test_remaining() {
    common::init_tracing();

    let lp = Loop::new().expect("Failed to create loop");
    let timer = Timer::new(|_, _, _| Ok(()), 2.5, 0.0).expect("Failed to create timer");

    assert_eq!(timer.remaining(&lp).expect("Remaining failed"), 2.5);

    timer.start(&lp, true).expect("Failed to start timer");
    let remaining = timer.remaining(&lp).expect("Remaining failed");
    assert!(remaining > 2.4 && remaining <= 2.5, "remaining = {remaining}");

    timer.stop(&lp).expect("Failed to stop timer");
}

#[test]
fn test_invalid_arguments() {
    let cases = [
        (-1.0, 0.0),
        (f64::NAN, 0.0),
        (f64::INFINITY, 0.0),
        (0.0, -0.5),
        (0.0, f64::INFINITY),
    ];

    for (after, repeat) in cases {
        assert!(
            matches!(
                Timer::new(|_, _, _| Ok(()), after, repeat),
                Err(Error::InvalidArgument(_))
            ),
            "after = {after}, repeat = {repeat}"
        );
    }
}

#[test]
fn test_set_rejected_while_active() {
    common::init_tracing();

    let lp = Loop::new().expect("Failed to create loop");
    let timer = Timer::new(|_, _, _| Ok(()), 1.0, 0.0).expect("Failed to create timer");

    timer.set(2.0, 1.0).expect("Failed to reconfigure timer");
    assert_eq!((timer.after(), timer.repeat()), (2.0, 1.0));

    timer.start(&lp, true).expect("Failed to start timer");
    assert!(matches!(timer.set(3.0, 0.0), Err(Error::LifecycleMisuse(_))));
    assert!(matches!(timer.set(-3.0, 0.0), Err(Error::InvalidArgument(_))));

    timer.stop(&lp).expect("Failed to stop timer");
}
