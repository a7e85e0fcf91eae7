mod common;

use core::net::Ipv4Addr;

use common::{Answer, Shared, SimClock, SimTransport, error, info};
use libcellular::at::{Response, ResponseKind};
use libcellular::engine::{CancelFlag, Engine, Error, Flow, NetworkEvent, Reply, State};
use libcellular::modem::status::{DeviceType, Registration};
use libcellular::socket::{Protocol, SocketId};

type SimEngine<'a> = Engine<'a, SimTransport, SimClock, 7>;

fn setup<'a>(cancel: &'a CancelFlag) -> (Shared, SimEngine<'a>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let sim = Shared::default();
    sim.borrow_mut().powered = true;
    let engine = Engine::new(
        SimTransport(sim.clone()),
        SimClock(sim.clone()),
        cancel,
        15_000,
    );
    (sim, engine)
}

#[test]
fn test_command_ok() {
    let cancel = CancelFlag::new();
    let (sim, mut engine) = setup(&cancel);

    engine.command(format_args!("AT"), 1_000).unwrap();
    assert_eq!(sim.borrow().commands, vec!["AT".to_string()]);
}

#[test]
fn test_error_text_is_kept() {
    let cancel = CancelFlag::new();
    let (sim, mut engine) = setup(&cancel);
    sim.borrow_mut().reply(
        "AT+CPIN?",
        &[Answer::Text("\r\n+CME ERROR: SIM not inserted\r\n".into())],
    );
    sim.borrow_mut().reply("AT+COPS=0", &[error()]);

    assert_eq!(
        engine.command(format_args!("AT+CPIN?"), 1_000),
        Err(Error::Protocol)
    );
    assert_eq!(engine.last_error(), "+CME ERROR: SIM not inserted");

    assert_eq!(
        engine.command(format_args!("AT+COPS=0"), 1_000),
        Err(Error::Protocol)
    );
    assert_eq!(engine.last_error(), "ERROR");
}

#[test]
fn test_urcs_during_command_update_state() {
    let cancel = CancelFlag::new();
    let (sim, mut engine) = setup(&cancel);
    engine
        .state_mut()
        .sockets
        .assign(SocketId(0), 4, Protocol::Tcp, 0);
    sim.borrow_mut().reply(
        "AT+CSQ",
        &[Answer::Text(
            "\r\n+UUSORD: 4,12\r\n\r\n+CREG: 5\r\n\r\n+CSQ: 15,2\r\n\r\nOK\r\n".into(),
        )],
    );

    let mut seen = Vec::new();
    engine
        .query(format_args!("AT+CSQ"), 1_000, &mut |r: &Response<'_>, _: &mut State<7>| {
            if let Some(body) = r.plus_body() {
                seen.push(body.to_string());
            }
            Flow::Continue
        })
        .unwrap();

    assert_eq!(seen, vec!["UUSORD: 4,12", "CREG: 5", "CSQ: 15,2"]);
    let state = engine.state();
    assert_eq!(state.sockets.active(SocketId(0)).unwrap().pending, 12);
    assert_eq!(state.network.csd, Registration::Roaming);
}

#[test]
fn test_cancel_blocks_transmit() {
    let cancel = CancelFlag::new();
    let (sim, mut engine) = setup(&cancel);

    cancel.cancel();
    assert_eq!(engine.command(format_args!("AT"), 1_000), Err(Error::Cancelled));
    assert_eq!(engine.send_raw(b"xyz"), Err(Error::Cancelled));
    assert!(sim.borrow().commands.is_empty());

    let was = engine.suspend_cancel();
    assert!(was);
    engine.command(format_args!("AT"), 1_000).unwrap();
    engine.restore_cancel(was);
    assert!(engine.is_cancelled());

    cancel.resume();
    engine.command(format_args!("AT"), 1_000).unwrap();
    assert_eq!(sim.borrow().count("AT"), 2);
}

#[test]
fn test_silent_module_times_out() {
    let cancel = CancelFlag::new();
    let (sim, mut engine) = setup(&cancel);
    sim.borrow_mut().reply("AT+COPS=0", &[Answer::Silent]);

    assert_eq!(
        engine.command(format_args!("AT+COPS=0"), 500),
        Err(Error::Timeout)
    );
    assert!(sim.borrow().now >= 500);
}

#[test]
fn test_aborted() {
    let cancel = CancelFlag::new();
    let (sim, mut engine) = setup(&cancel);
    sim.borrow_mut()
        .reply("AT+COPS=?", &[Answer::Text("\r\nABORTED\r\n".into())]);

    assert_eq!(
        engine.command(format_args!("AT+COPS=?"), 1_000),
        Err(Error::Aborted)
    );
}

#[test]
fn test_prompt_then_raw_payload() {
    let cancel = CancelFlag::new();
    let (sim, mut engine) = setup(&cancel);
    sim.borrow_mut().reply(
        "AT+UDWNFILE=\"cfg\",3",
        &[Answer::Prompt {
            len: 3,
            then: "\r\nOK\r\n".into(),
        }],
    );

    let reply = engine.execute(
        format_args!("AT+UDWNFILE=\"cfg\",3"),
        1_000,
        &mut |_, _| Flow::Continue,
    );
    assert_eq!(reply, Ok(Reply::Prompt));
    engine.send_raw(b"abc").unwrap();
    assert_eq!(
        engine.wait_final(1_000, &mut |_, _| Flow::Continue),
        Ok(Reply::Ok)
    );
    assert_eq!(sim.borrow().payloads, vec![b"abc".to_vec()]);

    // a prompt is not an acceptable end for a plain command
    assert_eq!(
        engine.command(format_args!("AT+UDWNFILE=\"cfg\",3"), 1_000),
        Err(Error::Protocol)
    );
}

#[test]
fn test_decoder_stop_ends_exchange() {
    let cancel = CancelFlag::new();
    let (sim, mut engine) = setup(&cancel);
    sim.borrow_mut().reply("AT+CGMM", &[info("SARA-U260")]);

    let mut model = String::new();
    let reply = engine.execute(format_args!("AT+CGMM"), 1_000, &mut |r, _| {
        if r.kind == ResponseKind::Unknown {
            model = r.text().to_string();
            return Flow::Stop;
        }
        Flow::Continue
    });
    assert_eq!(reply, Ok(Reply::Stopped));
    assert_eq!(model, "SARA-U260");

    // the trailing OK is still queued and gets swallowed
    engine.pump(10).unwrap();
    engine.command(format_args!("AT"), 1_000).unwrap();
}

#[test]
fn test_gprs_watchdog_reports_disconnect() {
    let cancel = CancelFlag::new();
    let (sim, mut engine) = setup(&cancel);
    {
        let state = engine.state_mut();
        state.device = DeviceType::SaraU260;
        state.attached = true;
        state.ip = Some(Ipv4Addr::new(10, 52, 1, 7));
    }

    sim.borrow_mut().inject("\r\n+CIEV: 9,0\r\n");
    engine.pump(10).unwrap();
    assert!(engine.state().watchdog_armed());
    assert_eq!(engine.poll_event(), None);

    engine.pump(15_000).unwrap();
    assert_eq!(engine.poll_event(), Some(NetworkEvent::Disconnected));
    assert!(!engine.state().attached);
    assert_eq!(engine.state().ip, None);
}

#[test]
fn test_gprs_reattach_clears_watchdog() {
    let cancel = CancelFlag::new();
    let (sim, mut engine) = setup(&cancel);
    {
        let state = engine.state_mut();
        state.device = DeviceType::SaraU260;
        state.attached = true;
    }

    sim.borrow_mut().inject("\r\n+CIEV: 9,0\r\n");
    engine.pump(10).unwrap();
    let at = sim.borrow().now + 5_000;
    sim.borrow_mut().schedule(at, "\r\n+CIEV: 9,2\r\n");
    engine.pump(20_000).unwrap();

    assert!(!engine.state().watchdog_armed());
    assert_eq!(engine.poll_event(), None);
    assert!(engine.state().attached);
}

#[test]
fn test_gprs_indicator_ignored_on_lte() {
    let cancel = CancelFlag::new();
    let (sim, mut engine) = setup(&cancel);
    {
        let state = engine.state_mut();
        state.device = DeviceType::SaraR410;
        state.attached = true;
    }

    sim.borrow_mut().inject("\r\n+CIEV: 9,0\r\n");
    engine.pump(20_000).unwrap();
    assert!(!engine.state().watchdog_armed());
    assert_eq!(engine.poll_event(), None);
}

#[test]
fn test_pdp_deactivated_by_network() {
    let cancel = CancelFlag::new();
    let (sim, mut engine) = setup(&cancel);
    {
        let state = engine.state_mut();
        state.attached = true;
        state.ip = Some(Ipv4Addr::new(10, 52, 1, 7));
    }

    sim.borrow_mut().inject("\r\n+UUPSDD: 0\r\n");
    engine.pump(10).unwrap();
    assert_eq!(engine.poll_event(), Some(NetworkEvent::PdpDeactivated));
    assert_eq!(engine.state().ip, None);
    assert!(!engine.state().attached);
}

#[test]
fn test_remote_close_releases_slot() {
    let cancel = CancelFlag::new();
    let (sim, mut engine) = setup(&cancel);
    engine
        .state_mut()
        .sockets
        .assign(SocketId(2), 5, Protocol::Udp, 0);

    sim.borrow_mut().inject("\r\n+UUSOCL: 5\r\n\r\n+UUSOCL: 6\r\n");
    engine.pump(10).unwrap();
    assert!(engine.state().sockets.active(SocketId(2)).is_none());
    assert_eq!(engine.state().sockets.in_use(), 0);
}

#[test]
fn test_event_queue_keeps_newest() {
    let cancel = CancelFlag::new();
    let (_sim, mut engine) = setup(&cancel);

    engine.state_mut().push_event(NetworkEvent::Connected);
    for _ in 0..libcellular::engine::EVENT_QUEUE_DEPTH {
        engine.state_mut().push_event(NetworkEvent::PdpDeactivated);
    }
    assert_eq!(engine.poll_event(), Some(NetworkEvent::PdpDeactivated));
}

#[test]
fn test_purge_drops_buffered_bytes() {
    let cancel = CancelFlag::new();
    let (sim, mut engine) = setup(&cancel);

    sim.borrow_mut().inject("\r\n+UUSOCL: 0\r\nOK\r\n");
    engine.purge().unwrap();
    assert_eq!(
        engine.wait_final(50, &mut |_, _| Flow::Continue),
        Err(Error::Timeout)
    );
}
