use evhost::{Backend, Revents};

#[test]
fn test_revents_keep_libev_bit_values() {
    assert_eq!(Revents::READ.bits(), 0x01);
    assert_eq!(Revents::WRITE.bits(), 0x02);
    assert_eq!(Revents::TIMER.bits(), 0x100);
    assert_eq!(Revents::SIGNAL.bits(), 0x400);
    assert_eq!(Revents::CHECK.bits(), 0x8000);
}

#[test]
fn test_backend_names_are_case_insensitive() {
    assert_eq!(Backend::parse_name("EPOLL"), Some(Backend::EPOLL));
    assert_eq!(Backend::parse_name(" poll "), Some(Backend::POLL));
    assert_eq!(Backend::parse_name("kqueue"), None);
}

#[test]
fn test_parse_name_differs_from_flag_lookup() {
    // The generated lookup only matches exact flag names.
    assert_eq!(Backend::from_name("EPOLL"), Some(Backend::EPOLL));
    assert_eq!(Backend::from_name("epoll"), None);
    assert_eq!(Backend::parse_name("epoll"), Some(Backend::EPOLL));
}

#[test]
fn test_recommended_backend_is_supported() {
    assert!(Backend::supported().contains(Backend::recommended()));
}
