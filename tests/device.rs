use rplidarc1::types::AngleKey;
use rplidarc1::{Error, HealthStatus, RplidarC1, ScanConfig, ScanOutput, ScanState};
use std::collections::{HashMap, VecDeque};
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Serial port stand-in. Writing a command frame queues the bytes scripted for that command;
/// reading an empty port times out like a real one.
#[derive(Clone, Default)]
struct MockPort {
    rx: Arc<Mutex<VecDeque<u8>>>,
    tx: Arc<Mutex<Vec<u8>>>,
    script: Arc<Mutex<HashMap<u8, VecDeque<Vec<u8>>>>>,
    broken: Arc<AtomicBool>,
}

impl MockPort {
    fn respond(&self, command: u8, bytes: Vec<u8>) {
        self.script
            .lock()
            .unwrap()
            .entry(command)
            .or_default()
            .push_back(bytes);
    }

    fn written(&self) -> Vec<u8> {
        self.tx.lock().unwrap().clone()
    }

    fn count_frames(&self, command: u8) -> usize {
        self.written()
            .windows(2)
            .filter(|w| w[0] == 0xA5 && w[1] == command)
            .count()
    }

    /// Bytes that arrive without being asked for, e.g. a reply that shows up too late.
    fn inject(&self, bytes: &[u8]) {
        self.rx.lock().unwrap().extend(bytes.iter().copied());
    }

    fn break_link(&self) {
        self.broken.store(true, Ordering::SeqCst);
    }
}

impl Read for MockPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged"));
        }
        let mut rx = self.rx.lock().unwrap();
        if rx.is_empty() {
            drop(rx);
            thread::sleep(Duration::from_millis(2));
            return Err(io::Error::new(io::ErrorKind::TimedOut, "timed out"));
        }
        let n = buf.len().min(rx.len());
        for slot in buf.iter_mut().take(n) {
            *slot = rx.pop_front().unwrap();
        }
        Ok(n)
    }
}

impl Write for MockPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.tx.lock().unwrap().extend_from_slice(buf);
        if buf.len() >= 2 && buf[0] == 0xA5 {
            let reply = self
                .script
                .lock()
                .unwrap()
                .get_mut(&buf[1])
                .and_then(|replies| replies.pop_front());
            if let Some(reply) = reply {
                self.rx.lock().unwrap().extend(reply);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn descriptor(length: u32, mode: u32, data_type: u8) -> Vec<u8> {
    let packed = (length & 0x3FFF_FFFF) | (mode << 30);
    let mut out = vec![0xA5, 0x5A];
    out.extend_from_slice(&packed.to_le_bytes());
    out.push(data_type);
    out
}

fn packet(start: bool, degrees: u16, distance_mm: u16) -> [u8; 5] {
    let s = start as u8;
    let angle = ((degrees * 64) << 1) | 1;
    let distance = distance_mm * 4;
    [
        (30 << 2) | ((1 - s) << 1) | s,
        angle as u8,
        (angle >> 8) as u8,
        distance as u8,
        (distance >> 8) as u8,
    ]
}

fn scan_reply(packets: &[[u8; 5]]) -> Vec<u8> {
    let mut out = descriptor(5, 1, 0x81);
    for p in packets {
        out.extend_from_slice(p);
    }
    out
}

fn device(port: &MockPort) -> RplidarC1<MockPort> {
    init_logging();
    RplidarC1::with_stream(Box::new(port.clone()))
}

fn wait_until(deadline: Duration, mut done: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    done()
}

#[test]
fn scan_recovers_from_corrupt_byte() {
    let port = MockPort::default();
    let mut stream = scan_reply(&[
        packet(true, 10, 100),
        packet(false, 20, 200),
        packet(false, 30, 300),
    ]);
    stream.push(0x00);
    stream.extend_from_slice(&packet(false, 40, 400));
    stream.extend_from_slice(&packet(false, 50, 500));
    port.respond(0x20, stream);

    let mut lidar = device(&port);
    let session = lidar.scan(&ScanConfig::default()).unwrap();
    let queue = session.measurements().unwrap().clone();

    let mut received = Vec::new();
    for _ in 0..5 {
        received.push(queue.recv_timeout(Duration::from_secs(2)).unwrap());
    }
    let stats = session.finish().unwrap();

    let angles: Vec<f32> = received.iter().map(|m| m.angle_degrees).collect();
    assert_eq!(angles, vec![10.0, 20.0, 30.0, 40.0, 50.0]);
    let distances: Vec<u16> = received.iter().map(|m| m.distance_mm).collect();
    assert_eq!(distances, vec![100, 200, 300, 400, 500]);
    assert!(received[0].start_of_revolution);
    assert!(queue.try_recv().is_err());

    assert_eq!(stats.packets, 5);
    assert_eq!(stats.resyncs, 1);
    assert_eq!(stats.discarded_bytes, 1);
    assert_eq!(lidar.state(), ScanState::Idle);
    assert_eq!(port.count_frames(0x25), 1);
}

#[test]
fn mapping_keeps_latest_distance_per_angle() {
    let port = MockPort::default();
    port.respond(
        0x20,
        scan_reply(&[
            packet(true, 90, 1000),
            packet(false, 180, 500),
            packet(false, 90, 0),
        ]),
    );

    let mut lidar = device(&port);
    let session = lidar
        .scan(&ScanConfig::with_output(ScanOutput::mapping()))
        .unwrap();
    assert!(session.measurements().is_none());
    let map = session.scan_map().unwrap().clone();

    assert!(wait_until(Duration::from_secs(2), || {
        map.get(AngleKey::from_degrees(90.0)) == Some(None)
    }));
    session.finish().unwrap();

    assert_eq!(map.len(), 2);
    assert_eq!(map.distance_at(90.0), None);
    assert_eq!(map.distance_at(180.0), Some(500));
    assert_eq!(map.get(AngleKey::from_degrees(270.0)), None);
}

#[test]
fn shutdown_is_idempotent() {
    let port = MockPort::default();
    let mut lidar = device(&port);

    lidar.shutdown().unwrap();
    lidar.shutdown().unwrap();
    drop(lidar);

    assert_eq!(port.written(), vec![0xA5, 0x25]);
}

#[test]
fn commands_fail_after_shutdown() {
    let port = MockPort::default();
    let mut lidar = device(&port);
    lidar.shutdown().unwrap();

    assert!(!lidar.is_connected());
    assert!(matches!(
        lidar.get_health(),
        Err(Error::OperationFail { .. })
    ));
}

#[test]
fn health_error_keeps_device_code() {
    let port = MockPort::default();
    let mut reply = descriptor(3, 0, 0x06);
    reply.extend_from_slice(&[2, 0x01, 0x80]);
    port.respond(0x52, reply);

    let mut lidar = device(&port);
    match lidar.healthcheck() {
        Err(e @ Error::DeviceError { .. }) => {
            assert_eq!(e.device_code(), Some(0x8001));
            assert!(e.to_string().contains("0x8001"));
        }
        other => panic!("expected device error, got {:?}", other),
    }
}

#[test]
fn health_warning_is_reported() {
    let port = MockPort::default();
    for _ in 0..2 {
        let mut reply = descriptor(3, 0, 0x06);
        reply.extend_from_slice(&[1, 0x34, 0x12]);
        port.respond(0x52, reply);
    }

    let mut lidar = device(&port);
    assert_eq!(lidar.get_health().unwrap(), HealthStatus::Warning(0x1234));
    match lidar.healthcheck() {
        Err(Error::DeviceError { status }) => assert_eq!(status, HealthStatus::Warning(0x1234)),
        other => panic!("expected device error, got {:?}", other),
    }
}

#[test]
fn startup_resets_after_protection_stop() {
    let port = MockPort::default();
    let mut bad = descriptor(3, 0, 0x06);
    bad.extend_from_slice(&[2, 0x02, 0x00]);
    let mut good = descriptor(3, 0, 0x06);
    good.extend_from_slice(&[0, 0, 0]);
    port.respond(0x52, bad);
    port.respond(0x52, good);

    let mut lidar = device(&port);
    assert_eq!(lidar.startup().unwrap(), HealthStatus::Good);
    assert_eq!(port.count_frames(0x40), 1);
    assert_eq!(lidar.state(), ScanState::Idle);
}

#[test]
fn get_info_decodes_identity() {
    let port = MockPort::default();
    let mut reply = descriptor(20, 0, 0x04);
    reply.extend_from_slice(&[0x41, 0x02, 0x01, 0x07]);
    reply.extend(0u8..16);
    port.respond(0x50, reply);

    let mut lidar = device(&port);
    let info = lidar.get_info().unwrap();
    assert_eq!(info.model, 0x41);
    assert_eq!(info.firmware_major, 1);
    assert_eq!(info.firmware_minor, 2);
    assert_eq!(info.hardware, 7);
    assert_eq!(info.serial_number_hex(), "000102030405060708090A0B0C0D0E0F");
}

#[test]
fn silent_device_times_out() {
    let port = MockPort::default();
    let mut lidar = device(&port);
    assert!(matches!(
        lidar.get_sample_rate(),
        Err(Error::OperationTimeout)
    ));
    assert_eq!(lidar.state(), ScanState::Idle);
    assert!(lidar.is_connected());
}

#[test]
fn late_reply_does_not_poison_next_command() {
    let port = MockPort::default();
    let mut info = descriptor(20, 0, 0x04);
    info.extend_from_slice(&[0x41, 0x02, 0x01, 0x07]);
    info.extend(0u8..16);
    port.respond(0x50, info[..4].to_vec());

    let mut lidar = device(&port);
    assert!(matches!(
        lidar.get_info_with_timeout(Duration::from_millis(100)),
        Err(Error::OperationTimeout)
    ));
    assert_eq!(lidar.state(), ScanState::Idle);

    port.inject(&info[4..]);
    let mut health = descriptor(3, 0, 0x06);
    health.extend_from_slice(&[0, 0, 0]);
    port.respond(0x52, health);
    assert_eq!(lidar.get_health().unwrap(), HealthStatus::Good);

    let mut info_again = descriptor(20, 0, 0x04);
    info_again.extend_from_slice(&[0x41, 0x02, 0x01, 0x07]);
    info_again.extend(0u8..16);
    port.respond(0x50, info_again);
    assert_eq!(lidar.get_info().unwrap().model, 0x41);
}

#[test]
fn bad_descriptor_faults_scan() {
    let port = MockPort::default();
    port.respond(0x20, vec![0xA5, 0x5B, 0x05, 0x00, 0x00, 0x40, 0x81]);

    let mut lidar = device(&port);
    assert!(matches!(
        lidar.scan(&ScanConfig::default()),
        Err(Error::ProtocolError { .. })
    ));
    assert_eq!(lidar.state(), ScanState::Faulted);
    assert!(matches!(
        lidar.scan(&ScanConfig::default()),
        Err(Error::OperationFail { .. })
    ));

    lidar.reset().unwrap();
    assert_eq!(lidar.state(), ScanState::Idle);
}

#[test]
fn scan_needs_an_output() {
    let port = MockPort::default();
    let mut lidar = device(&port);
    let config = ScanConfig::with_output(ScanOutput {
        enable_queue: false,
        enable_mapping: false,
    });
    assert!(matches!(
        lidar.scan(&config),
        Err(Error::OperationFail { .. })
    ));
    assert!(port.written().is_empty());
}

#[test]
fn stalled_scan_faults_until_reset() {
    let port = MockPort::default();
    port.respond(0x20, descriptor(5, 1, 0x81));

    let mut lidar = device(&port);
    let config = ScanConfig {
        stall_timeout: Duration::from_millis(100),
        ..ScanConfig::default()
    };
    let session = lidar.scan(&config).unwrap();
    assert!(wait_until(Duration::from_secs(2), || !session.is_running()));
    assert!(matches!(session.finish(), Err(Error::OperationTimeout)));
    assert_eq!(lidar.state(), ScanState::Faulted);

    lidar.reset().unwrap();
    assert_eq!(lidar.state(), ScanState::Idle);
}

#[test]
fn garbage_stream_fails_alignment() {
    let port = MockPort::default();
    let mut reply = descriptor(5, 1, 0x81);
    reply.extend(std::iter::repeat(0xFF).take(200));
    port.respond(0x20, reply);

    let mut lidar = device(&port);
    let config = ScanConfig {
        max_resync_shifts: 16,
        max_alignment_failures: 3,
        ..ScanConfig::default()
    };
    let session = lidar.scan(&config).unwrap();
    assert!(wait_until(Duration::from_secs(2), || !session.is_running()));
    assert!(matches!(
        session.finish(),
        Err(Error::AlignmentError { shifts: 16 })
    ));
    assert_eq!(lidar.state(), ScanState::Faulted);
}

#[test]
fn broken_link_releases_transport() {
    let port = MockPort::default();
    port.respond(0x20, descriptor(5, 1, 0x81));

    let mut lidar = device(&port);
    let session = lidar.scan(&ScanConfig::default()).unwrap();
    port.break_link();
    assert!(wait_until(Duration::from_secs(2), || !session.is_running()));
    assert!(matches!(session.finish(), Err(Error::IoError(_))));
    assert_eq!(lidar.state(), ScanState::Faulted);
    assert!(!lidar.is_connected());
}

#[test]
fn dropping_session_stops_force_scan() {
    let port = MockPort::default();
    port.respond(0x21, scan_reply(&[packet(true, 0, 250)]));

    let mut lidar = device(&port);
    let config = ScanConfig {
        force: true,
        ..ScanConfig::default()
    };
    {
        let session = lidar.scan(&config).unwrap();
        let first = session
            .measurements()
            .unwrap()
            .recv_timeout(Duration::from_secs(2))
            .unwrap();
        assert_eq!(first.distance_mm, 250);
    }

    assert_eq!(lidar.state(), ScanState::Idle);
    assert_eq!(port.count_frames(0x21), 1);
    assert_eq!(port.count_frames(0x20), 0);
    assert!(port.written().ends_with(&[0xA5, 0x25]));
}
