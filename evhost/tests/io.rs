mod common;

use evhost::{Backend, Error, Io, Loop, Revents, RunMode};
use std::os::fd::AsRawFd;
use std::os::unix::net::UnixStream;

/// Descriptor number far above anything a test process opens.
const UNUSED_FD: i32 = 100_000;

fn recording_io(fd: i32, events: Revents, seen: &common::Log<(i32, Revents)>) -> Io {
    let seen = seen.clone();
    Io::new(
        move |w, _, revents| {
            seen.borrow_mut().push((w.fd(), revents));
            Ok(())
        },
        fd,
        events,
    )
    .expect("Failed to create io watcher")
}

#[test]
fn test_two_ready_descriptors_in_one_iteration() {
    common::init_tracing();

    let lp = Loop::new().expect("Failed to create loop");
    let seen = common::log();

    let (a, _a_peer) = common::readable_pair();
    let (b, _b_peer) = common::readable_pair();

    let io_a = recording_io(a.as_raw_fd(), Revents::READ, &seen);
    let io_b = recording_io(b.as_raw_fd(), Revents::READ, &seen);
    io_a.start(&lp, false).expect("Failed to start io watcher");
    io_b.start(&lp, false).expect("Failed to start io watcher");

    lp.run(RunMode::NoWait).expect("Run failed");

    let mut seen = seen.borrow().clone();
    seen.sort_by_key(|(fd, _)| *fd);
    let mut expected = vec![(a.as_raw_fd(), Revents::READ), (b.as_raw_fd(), Revents::READ)];
    expected.sort_by_key(|(fd, _)| *fd);
    assert_eq!(seen, expected);

    // Level triggered: still active and still ready.
    assert!(io_a.is_active() && io_b.is_active());
    assert_eq!(lp.keepalive(), 2);

    io_a.stop(&lp).expect("Failed to stop io watcher");
    io_b.stop(&lp).expect("Failed to stop io watcher");
    assert_eq!(lp.keepalive(), 0);
}

#[test]
fn test_only_requested_events_are_reported() {
    common::init_tracing();

    let lp = Loop::new().expect("Failed to create loop");
    let seen = common::log();

    // Readable and writable, but each watcher only asks for one of them.
    let (a, _peer) = common::readable_pair();
    let reader = recording_io(a.as_raw_fd(), Revents::READ, &seen);
    let writer = recording_io(a.as_raw_fd(), Revents::WRITE, &seen);
    reader.start(&lp, false).expect("Failed to start io watcher");
    writer.start(&lp, false).expect("Failed to start io watcher");

    lp.run(RunMode::NoWait).expect("Run failed");

    let seen = seen.borrow();
    assert_eq!(seen.len(), 2);
    assert!(seen.contains(&(a.as_raw_fd(), Revents::READ)));
    assert!(seen.contains(&(a.as_raw_fd(), Revents::WRITE)));

    reader.stop(&lp).expect("Failed to stop io watcher");
    writer.stop(&lp).expect("Failed to stop io watcher");
}

#[test]
fn test_stopped_watcher_is_not_polled() {
    common::init_tracing();

    let lp = Loop::new().expect("Failed to create loop");
    let seen = common::log();

    let (a, _peer) = common::readable_pair();
    let io = recording_io(a.as_raw_fd(), Revents::READ, &seen);
    io.start(&lp, false).expect("Failed to start io watcher");
    io.stop(&lp).expect("Failed to stop io watcher");

    lp.run(RunMode::NoWait).expect("Run failed");
    assert!(seen.borrow().is_empty());
}

#[test]
fn test_poll_backend() {
    common::init_tracing();

    let lp = Loop::builder()
        .backend(Backend::POLL)
        .build()
        .expect("Failed to create loop");
    assert_eq!(lp.backend().expect("Backend failed"), Backend::POLL);

    let seen = common::log();
    let (a, _peer) = common::readable_pair();
    let io = recording_io(a.as_raw_fd(), Revents::READ, &seen);
    io.start(&lp, false).expect("Failed to start io watcher");

    lp.run(RunMode::NoWait).expect("Run failed");
    assert_eq!(*seen.borrow(), vec![(a.as_raw_fd(), Revents::READ)]);

    io.stop(&lp).expect("Failed to stop io watcher");
}

#[test]
fn test_invalid_descriptor_stops_watcher() {
    common::init_tracing();

    for backend in Backend::supported().iter() {
        let lp = Loop::builder()
            .backend(backend)
            .build()
            .expect("Failed to create loop");

        let seen = common::log();
        let io = recording_io(UNUSED_FD, Revents::READ, &seen);
        io.start(&lp, false).expect("Failed to start io watcher");

        lp.run(RunMode::NoWait).expect("Run failed");

        assert_eq!(
            *seen.borrow(),
            vec![(UNUSED_FD, Revents::ERROR | Revents::READ | Revents::WRITE)],
            "backend {backend:?}"
        );
        assert!(!io.is_active());
        assert_eq!(lp.attached(), 0);
        assert_eq!(lp.keepalive(), 0);
    }
}

#[test]
fn test_invalid_arguments() {
    let make = |fd, events| Io::new(|_, _, _| Ok(()), fd, events);

    assert!(matches!(make(-1, Revents::READ), Err(Error::InvalidArgument(_))));
    assert!(matches!(make(0, Revents::empty()), Err(Error::InvalidArgument(_))));
    assert!(matches!(make(0, Revents::TIMER), Err(Error::InvalidArgument(_))));
    assert!(matches!(
        make(0, Revents::READ | Revents::SIGNAL),
        Err(Error::InvalidArgument(_))
    ));
    assert!(make(0, Revents::READ | Revents::WRITE).is_ok());
}

#[test]
fn test_set_moves_inactive_watcher() {
    common::init_tracing();

    let lp = Loop::new().expect("Failed to create loop");
    let seen = common::log();

    let (idle_end, _idle_peer) = UnixStream::pair().expect("Failed to create socket pair");
    let (ready, _ready_peer) = common::readable_pair();

    let io = recording_io(idle_end.as_raw_fd(), Revents::READ, &seen);
    io.set(ready.as_raw_fd(), Revents::READ)
        .expect("Failed to reconfigure io watcher");
    assert_eq!(io.fd(), ready.as_raw_fd());
    assert_eq!(io.events(), Revents::READ);

    io.start(&lp, false).expect("Failed to start io watcher");
    assert!(matches!(
        io.set(idle_end.as_raw_fd(), Revents::READ),
        Err(Error::LifecycleMisuse(_))
    ));

    lp.run(RunMode::NoWait).expect("Run failed");
    assert_eq!(*seen.borrow(), vec![(ready.as_raw_fd(), Revents::READ)]);

    io.stop(&lp).expect("Failed to stop io watcher");
}
