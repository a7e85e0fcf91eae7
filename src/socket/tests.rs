use super::*;

const POOL: usize = 3;

fn table() -> SocketTable<POOL> {
    SocketTable::new()
}

#[test]
fn test_allocation_until_exhausted() {
    let mut sockets = table();
    for handle in 0..POOL as u8 {
        let id = sockets.find_free().unwrap();
        assert!(sockets.assign(id, handle, Protocol::Tcp, 0));
    }
    assert_eq!(sockets.find_free(), None);
    assert_eq!(sockets.in_use(), POOL);

    assert!(sockets.release(SocketId(1)));
    assert_eq!(sockets.find_free(), Some(SocketId(1)));
}

#[test]
fn test_handle_owned_by_one_slot() {
    let mut sockets = table();
    sockets.assign(SocketId(0), 4, Protocol::Tcp, 0);
    sockets.assign(SocketId(2), 4, Protocol::Udp, 0);

    assert!(sockets.get(SocketId(0)).unwrap().is_free());
    assert_eq!(sockets.find_handle(4), Some(SocketId(2)));
    assert_eq!(sockets.handles().count(), 1);
}

#[test]
fn test_udp_connected_at_creation() {
    let mut sockets = table();
    sockets.assign(SocketId(0), 0, Protocol::Udp, 0);
    sockets.assign(SocketId(1), 1, Protocol::Tcp, 0);

    assert!(sockets.get(SocketId(0)).unwrap().connected);
    assert!(!sockets.get(SocketId(1)).unwrap().connected);
    assert!(sockets.get(SocketId(1)).unwrap().open);
}

#[test]
fn test_release_handle_is_idempotent() {
    let mut sockets = table();
    sockets.assign(SocketId(0), 2, Protocol::Tcp, 0);
    sockets.set_pending(2, 17);

    assert!(sockets.release_handle(2));
    assert!(!sockets.release_handle(2));
    assert!(!sockets.release_handle(5));

    let slot = sockets.get(SocketId(0)).unwrap();
    assert!(slot.is_free());
    assert!(!slot.connected);
    assert!(!slot.open);
    assert_eq!(slot.pending, 0);
}

#[test]
fn test_pending_for_unknown_handle() {
    let mut sockets = table();
    sockets.assign(SocketId(1), 3, Protocol::Tcp, 0);

    assert!(!sockets.set_pending(6, 10));
    assert!(sockets.set_pending(3, 10));
    assert_eq!(sockets.get(SocketId(1)).unwrap().pending, 10);
}

#[test]
fn test_out_of_range_ids() {
    let mut sockets = table();
    assert!(!sockets.assign(SocketId(POOL), 0, Protocol::Tcp, 0));
    assert!(!sockets.release(SocketId(POOL + 1)));
    assert!(sockets.active(SocketId(0)).is_none());
    assert!(sockets.get(SocketId(POOL)).is_none());
}
