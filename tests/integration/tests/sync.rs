//! Integration tests for UDP master/slave sync
//!
//! These tests verify sync over real loopback sockets:
//! - A master broadcasting every presented frame and a final bye
//! - A slave seeking to a distant master, following it, and stopping on bye

use anyhow::Result;
use avclock::net::{parse_datagram, DatagramSource, SyncMessage, UdpDatagramSource, UdpMaster, UdpSlave};
use avclock::sim::SimMedia;
use avclock::utils::{SystemTimeSource, TimeSource, UdpConfig};
use avclock::{PlayerEvent, StopReason, SyncLink};
use avclock_integration_tests::SessionBuilder;
use serial_test::serial;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[test]
#[serial]
fn test_master_broadcasts_positions_and_bye() -> Result<()> {
    let mut receiver = UdpDatagramSource::bind("127.0.0.1", 0)?;
    let port = receiver.local_addr()?.port();

    let master = UdpMaster::connect("127.0.0.1", port)?;
    let (builder, _clock) = SessionBuilder::virtual_time(1.0, 25.0);
    let mut session = builder.sync(SyncLink::Master(master)).build()?;

    assert_eq!(session.controller.run()?, StopReason::EndOfStream);
    drop(session);

    let mut messages = Vec::new();
    while let Some(datagram) = receiver.recv_timeout(0.2)? {
        messages.push(parse_datagram(&datagram).expect("master sent garbage"));
    }

    assert_eq!(messages.last(), Some(&SyncMessage::Bye));
    let positions: Vec<f64> = messages
        .iter()
        .filter_map(|m| match m {
            SyncMessage::Position(pts) => Some(*pts),
            SyncMessage::Bye => None,
        })
        .collect();
    assert!(positions.len() >= 20, "only {} positions arrived", positions.len());
    assert!(positions.windows(2).all(|w| w[1] > w[0]));
    assert!((positions.last().unwrap() - 0.96).abs() < 1e-6);
    Ok(())
}

#[test]
#[serial]
fn test_slave_follows_master() -> Result<()> {
    let source = UdpDatagramSource::bind("127.0.0.1", 0)?;
    let port = source.local_addr()?.port();
    let slave = UdpSlave::new(Box::new(source), &UdpConfig::default());

    let master = thread::spawn(move || -> Result<f64> {
        let master = UdpMaster::connect("127.0.0.1", port)?;
        let started = Instant::now();
        let mut last = 0.0;
        while started.elapsed() < Duration::from_millis(1200) {
            last = 10.0 + started.elapsed().as_secs_f64();
            master.send_position(last);
            thread::sleep(Duration::from_millis(20));
        }
        master.send_bye();
        Ok(last)
    });

    let time: Arc<dyn TimeSource> = Arc::new(SystemTimeSource::new());
    let mut session = SessionBuilder::new(SimMedia::new(60.0, 25.0), time)
        .sync(SyncLink::Slave(slave))
        .build()?;

    let reason = session.controller.run()?;
    let last_sent = master.join().expect("master thread panicked")?;

    assert_eq!(reason, StopReason::MasterExited);
    assert!(session.events.contains(&PlayerEvent::MasterExited));

    let seeks = session.events.count(|e| matches!(e, PlayerEvent::Seeked { .. }));
    assert_eq!(seeks, 1);

    let presented = session.video.as_ref().unwrap().presented();
    let last = *presented.last().unwrap();
    assert!((last - last_sent).abs() < 0.5, "slave at {}, master at {}", last, last_sent);
    Ok(())
}
