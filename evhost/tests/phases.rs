mod common;

use evhost::{Check, Idle, Loop, Prepare, Revents, RunMode, Timer};

fn recorder(log: &common::Log<&'static str>, name: &'static str) -> impl Fn() + 'static {
    let log = log.clone();
    move || log.borrow_mut().push(name)
}

#[test]
fn test_prepare_timer_check_order() {
    common::init_tracing();

    let lp = Loop::new().expect("Failed to create loop");
    let log = common::log();

    let prepare = {
        let record = recorder(&log, "prepare");
        Prepare::new(move |_, _, revents| {
            assert_eq!(revents, Revents::PREPARE);
            record();
            Ok(())
        })
    };
    let check = {
        let record = recorder(&log, "check");
        Check::new(move |_, _, revents| {
            assert_eq!(revents, Revents::CHECK);
            record();
            Ok(())
        })
    };
    let timer = {
        let record = recorder(&log, "timer");
        Timer::new(
            move |_, _, _| {
                record();
                Ok(())
            },
            0.0,
            0.0,
        )
        .expect("Failed to create timer")
    };

    prepare.start(&lp, true).expect("Failed to start prepare watcher");
    check.start(&lp, true).expect("Failed to start check watcher");
    timer.start(&lp, false).expect("Failed to start timer");

    lp.run(RunMode::Default).expect("Run failed");

    assert_eq!(*log.borrow(), vec!["prepare", "timer", "check"]);

    prepare.stop(&lp).expect("Failed to stop prepare watcher");
    check.stop(&lp).expect("Failed to stop check watcher");
}

#[test]
fn test_idle_runs_when_nothing_is_pending() {
    common::init_tracing();

    let lp = Loop::new().expect("Failed to create loop");
    let log = common::log();

    let prepare = {
        let record = recorder(&log, "prepare");
        Prepare::new(move |_, _, _| {
            record();
            Ok(())
        })
    };
    let check = {
        let record = recorder(&log, "check");
        Check::new(move |_, _, _| {
            record();
            Ok(())
        })
    };
    let idle = {
        let record = recorder(&log, "idle");
        Idle::new(move |w, lp, revents| {
            assert_eq!(revents, Revents::IDLE);
            record();
            w.stop(lp)?;
            Ok(())
        })
    };

    prepare.start(&lp, true).expect("Failed to start prepare watcher");
    check.start(&lp, true).expect("Failed to start check watcher");
    idle.start(&lp, false).expect("Failed to start idle watcher");

    lp.run(RunMode::Default).expect("Run failed");

    assert_eq!(*log.borrow(), vec!["prepare", "idle", "check"]);

    prepare.stop(&lp).expect("Failed to stop prepare watcher");
    check.stop(&lp).expect("Failed to stop check watcher");
}

#[test]
fn test_idle_waits_for_other_events() {
    common::init_tracing();

    let lp = Loop::new().expect("Failed to create loop");
    let log = common::log();

    let idle = {
        let record = recorder(&log, "idle");
        Idle::new(move |_, _, _| {
            record();
            Ok(())
        })
    };
    let timer = {
        let record = recorder(&log, "timer");
        Timer::new(
            move |_, _, _| {
                record();
                Ok(())
            },
            0.0,
            0.0,
        )
        .expect("Failed to create timer")
    };

    idle.start(&lp, true).expect("Failed to start idle watcher");
    timer.start(&lp, false).expect("Failed to start timer");

    lp.run(RunMode::Default).expect("Run failed");

    assert_eq!(*log.borrow(), vec!["timer"]);
    idle.stop(&lp).expect("Failed to stop idle watcher");
}

#[test]
fn test_nested_run_tracks_depth() {
    common::init_tracing();

    let lp = Loop::new().expect("Failed to create loop");
    let depths = common::log();

    let check = {
        let depths = depths.clone();
        Check::new(move |_, lp, _| {
            depths.borrow_mut().push(("check", lp.depth()?));
            Ok(())
        })
    };
    let timer = {
        let depths = depths.clone();
        Timer::new(
            move |_, lp, _| {
                depths.borrow_mut().push(("timer", lp.depth()?));
                lp.run(RunMode::NoWait)?;
                Ok(())
            },
            0.0,
            0.0,
        )
        .expect("Failed to create timer")
    };

    check.start(&lp, true).expect("Failed to start check watcher");
    timer.start(&lp, false).expect("Failed to start timer");

    lp.run(RunMode::Default).expect("Run failed");

    let depths = depths.borrow();
    assert_eq!(depths[0], ("timer", 1));
    assert!(depths[1..].iter().all(|&(name, _)| name == "check"));
    assert!(depths.contains(&("check", 2)));
    assert_eq!(lp.depth().expect("Depth failed"), 0);

    check.stop(&lp).expect("Failed to stop check watcher");
}
