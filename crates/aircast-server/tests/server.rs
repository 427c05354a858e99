//! End-to-end tests driving a real server over localhost sockets.
//!
//! Clients are plain std sockets so the server's own runtime stays the only
//! async context in play.

use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream, UdpSocket};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use aircast_capture::{
    AudioFormat, AudioSink, CaptureBackend, CaptureConfig, CaptureResult, EndpointInfo,
    SampleEncoding, ToneCapture,
};
use aircast_server::{Server, ServerState};

const CMD_GET_FORMAT: u32 = 1;
const CMD_START_PLAY: u32 = 2;
const CMD_HEARTBEAT: u32 = 3;

const MAX_UDP_PAYLOAD: usize = 1464;

fn test_config() -> CaptureConfig {
    CaptureConfig {
        encoding: SampleEncoding::S16,
        channels: 2,
        sample_rate: 48000,
        ..Default::default()
    }
}

fn expected_format() -> AudioFormat {
    AudioFormat {
        encoding: SampleEncoding::S16,
        channels: 2,
        sample_rate: 48000,
    }
}

/// Backend that parks its sink where the test can drop it, simulating an
/// audio source dying while the server is up.
#[derive(Default)]
struct HeldSinkCapture {
    sink: Arc<Mutex<Option<AudioSink>>>,
}

impl CaptureBackend for HeldSinkCapture {
    fn start(&mut self, config: &CaptureConfig, sink: AudioSink) -> CaptureResult<AudioFormat> {
        *self.sink.lock().unwrap() = Some(sink);
        Ok(AudioFormat {
            encoding: config.encoding,
            channels: config.channels,
            sample_rate: config.sample_rate,
        })
    }

    fn stop(&mut self) {
        self.sink.lock().unwrap().take();
    }

    fn list_endpoints(&self) -> CaptureResult<Vec<EndpointInfo>> {
        Ok(Vec::new())
    }

    fn default_endpoint_id(&self) -> CaptureResult<String> {
        Ok("held".to_string())
    }
}

fn start_server() -> (Server, SocketAddr, SocketAddr) {
    let server = Server::new(Box::new(ToneCapture::new()));
    server
        .start("127.0.0.1", 0, &test_config())
        .expect("server should start");
    let (control, data) = server.local_endpoints().expect("server is running");
    (server, control, data)
}

fn connect(control: SocketAddr) -> TcpStream {
    let stream = TcpStream::connect(control).expect("connect to control channel");
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    stream
}

fn send_tag(stream: &mut TcpStream, tag: u32) {
    stream.write_all(&tag.to_le_bytes()).expect("send command");
}

fn read_u32(stream: &mut TcpStream) -> u32 {
    let mut buf = [0u8; 4];
    stream.read_exact(&mut buf).expect("read u32");
    u32::from_le_bytes(buf)
}

/// Read the next reply tag, skipping any server-initiated heartbeats that
/// may interleave once a session is playing.
fn read_reply_tag(stream: &mut TcpStream) -> u32 {
    loop {
        let tag = read_u32(stream);
        if tag != CMD_HEARTBEAT {
            return tag;
        }
    }
}

fn get_format(stream: &mut TcpStream) -> Vec<u8> {
    send_tag(stream, CMD_GET_FORMAT);
    assert_eq!(read_reply_tag(stream), CMD_GET_FORMAT);
    let size = read_u32(stream) as usize;
    let mut blob = vec![0u8; size];
    stream.read_exact(&mut blob).expect("read format blob");
    blob
}

fn start_play(stream: &mut TcpStream) -> i32 {
    send_tag(stream, CMD_START_PLAY);
    assert_eq!(read_reply_tag(stream), CMD_START_PLAY);
    let mut buf = [0u8; 4];
    stream.read_exact(&mut buf).expect("read session id");
    i32::from_le_bytes(buf)
}

fn register_udp(data: SocketAddr, id: i32) -> UdpSocket {
    let udp = UdpSocket::bind("127.0.0.1:0").expect("bind client udp");
    udp.set_read_timeout(Some(Duration::from_secs(3))).unwrap();
    udp.send_to(&id.to_le_bytes(), data).expect("register udp");
    udp
}

fn recv_segment(udp: &UdpSocket) -> usize {
    let mut buf = [0u8; 2048];
    let (len, _) = udp.recv_from(&mut buf).expect("receive audio segment");
    len
}

#[test]
fn end_to_end_stream() {
    let (server, control, data) = start_server();
    let mut client = connect(control);

    // Format query returns the descriptor produced by capture start.
    let blob = get_format(&mut client);
    assert_eq!(blob, expected_format().to_bytes());

    // Play request yields a positive session id.
    let id = start_play(&mut client);
    assert!(id > 0);
    assert_eq!(server.session_count(), 1);

    // After UDP registration, raw PCM segments arrive, each within the MTU
    // budget and frame-aligned.
    let udp = register_udp(data, id);
    let block_align = expected_format().block_align() as usize;
    for _ in 0..10 {
        let len = recv_segment(&udp);
        assert!(len > 0 && len <= MAX_UDP_PAYLOAD);
        assert_eq!(len % block_align, 0);
    }

    server.stop();
}

#[test]
fn session_ids_distinct_across_connections() {
    let (server, control, _) = start_server();

    let mut a = connect(control);
    let mut b = connect(control);
    let id_a = start_play(&mut a);
    let id_b = start_play(&mut b);

    assert!(id_a > 0);
    assert!(id_b > 0);
    assert_ne!(id_a, id_b);

    server.stop();
}

#[test]
fn repeat_start_play_rejected_without_closing() {
    let (server, control, data) = start_server();
    let mut client = connect(control);

    let id = start_play(&mut client);
    assert!(id > 0);

    // Second start_play answers with the explicit "already playing" id 0
    // and leaves the original session intact.
    let repeat = start_play(&mut client);
    assert_eq!(repeat, 0);
    assert_eq!(server.session_count(), 1);

    // The original session still streams.
    let udp = register_udp(data, id);
    assert!(recv_segment(&udp) > 0);

    server.stop();
}

#[test]
fn udp_reregistration_moves_the_stream() {
    let (server, control, data) = start_server();
    let mut client = connect(control);
    let id = start_play(&mut client);

    let first = register_udp(data, id);
    assert!(recv_segment(&first) > 0);

    // Re-register from a different socket; the stream follows.
    let second = register_udp(data, id);
    assert!(recv_segment(&second) > 0);

    server.stop();
}

#[test]
fn peer_failure_does_not_affect_others() {
    let (server, control, data) = start_server();

    let mut a = connect(control);
    let mut b = connect(control);
    let id_a = start_play(&mut a);
    let id_b = start_play(&mut b);

    let udp_a = register_udp(data, id_a);
    let udp_b = register_udp(data, id_b);
    assert!(recv_segment(&udp_a) > 0);
    assert!(recv_segment(&udp_b) > 0);

    // Kill A's control connection and data socket entirely.
    drop(a);
    drop(udp_a);

    // B keeps receiving across many subsequent segments.
    for _ in 0..20 {
        assert!(recv_segment(&udp_b) > 0);
    }

    server.stop();
}

#[test]
fn invalid_command_closes_connection() {
    let (server, control, _) = start_server();
    let mut client = connect(control);

    send_tag(&mut client, 99);

    // Server closes the socket; the next read sees EOF.
    let mut buf = [0u8; 4];
    match client.read(&mut buf) {
        Ok(0) => {}
        Ok(n) => panic!("unexpected {n} bytes after protocol violation"),
        Err(e) => assert!(
            matches!(e.kind(), ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted),
            "unexpected error: {e}"
        ),
    }

    server.stop();
}

#[test]
fn cmd_none_is_a_protocol_violation() {
    let (server, control, _) = start_server();
    let mut client = connect(control);

    send_tag(&mut client, 0);

    let mut buf = [0u8; 4];
    assert!(matches!(client.read(&mut buf), Ok(0) | Err(_)));

    server.stop();
}

#[test]
fn silent_peer_evicted_by_heartbeat() {
    let (server, control, _) = start_server();
    let mut client = connect(control);

    let id = start_play(&mut client);
    assert!(id > 0);
    assert_eq!(server.session_count(), 1);

    // Never answer heartbeats. With a 3s cadence and 5s window the session
    // must be gone within two check cycles of the last activity.
    let deadline = Instant::now() + Duration::from_secs(9);
    while server.session_count() > 0 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(200));
    }
    assert_eq!(server.session_count(), 0);

    server.stop();
}

#[test]
fn responsive_peer_stays_alive() {
    let (server, control, _) = start_server();
    let mut client = connect(control);

    let id = start_play(&mut client);
    assert!(id > 0);

    // Echo every server heartbeat back for longer than the timeout window.
    let deadline = Instant::now() + Duration::from_secs(8);
    client
        .set_read_timeout(Some(Duration::from_millis(500)))
        .unwrap();
    while Instant::now() < deadline {
        let mut buf = [0u8; 4];
        match client.read_exact(&mut buf) {
            Ok(()) if u32::from_le_bytes(buf) == CMD_HEARTBEAT => {
                client.write_all(&CMD_HEARTBEAT.to_le_bytes()).unwrap();
            }
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {}
            Err(e) => panic!("control read failed: {e}"),
        }
    }
    assert_eq!(server.session_count(), 1);

    server.stop();
}

#[test]
fn shutdown_terminates_all_sessions() {
    let (server, control, data) = start_server();

    let mut a = connect(control);
    let mut b = connect(control);
    let id_a = start_play(&mut a);
    let id_b = start_play(&mut b);
    let _udp_a = register_udp(data, id_a);
    let _udp_b = register_udp(data, id_b);
    assert_eq!(server.session_count(), 2);

    server.stop();
    assert_eq!(server.state(), ServerState::Stopped);
    assert_eq!(server.session_count(), 0);

    // Both control connections observe close.
    for client in [&mut a, &mut b] {
        let mut buf = [0u8; 4];
        loop {
            match client.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(_) => continue, // drain in-flight heartbeats
            }
        }
    }

    // Second stop is a no-op, and wait returns immediately.
    server.stop();
    server.wait();
    assert_eq!(server.state(), ServerState::Stopped);
}

#[test]
fn capture_death_stops_the_server() {
    let backend = HeldSinkCapture::default();
    let sink = Arc::clone(&backend.sink);

    let server = Server::new(Box::new(backend));
    server
        .start("127.0.0.1", 0, &test_config())
        .expect("server should start");
    let (control, _) = server.local_endpoints().unwrap();

    let mut client = connect(control);
    let id = start_play(&mut client);
    assert!(id > 0);
    assert_eq!(server.session_count(), 1);

    // Drop the sink: the broadcast channel closes and the server must come
    // all the way down, not linger as a zombie.
    sink.lock().unwrap().take();

    server.wait();
    assert_eq!(server.state(), ServerState::Stopped);
    assert_eq!(server.session_count(), 0);
    assert!(server.local_endpoints().is_none());

    // The control connection observes close.
    let mut buf = [0u8; 4];
    assert!(matches!(client.read(&mut buf), Ok(0) | Err(_)));

    // stop after the fact is a no-op.
    server.stop();
    assert_eq!(server.state(), ServerState::Stopped);
}

#[test]
fn concurrent_stop_and_wait_both_complete() {
    let (server, control, _) = start_server();
    let server = std::sync::Arc::new(server);
    let mut client = connect(control);
    let id = start_play(&mut client);
    assert!(id > 0);

    // Let the waiter grab the thread join first, then stop from here;
    // stop must still block until teardown is finished.
    let waiter = Arc::clone(&server);
    let handle = std::thread::spawn(move || {
        waiter.wait();
        assert_eq!(waiter.state(), ServerState::Stopped);
    });
    std::thread::sleep(Duration::from_millis(200));

    server.stop();
    assert_eq!(server.state(), ServerState::Stopped);
    assert_eq!(server.session_count(), 0);

    handle.join().unwrap();
}

#[test]
fn peer_joining_mid_stream_receives() {
    let (server, control, data) = start_server();

    let mut a = connect(control);
    let id_a = start_play(&mut a);
    let udp_a = register_udp(data, id_a);
    assert!(recv_segment(&udp_a) > 0);

    // B registers while A's stream is in full flight and starts receiving
    // without any re-handshake on A's side.
    let mut b = connect(control);
    let id_b = start_play(&mut b);
    let udp_b = register_udp(data, id_b);
    assert!(recv_segment(&udp_b) > 0);
    assert!(recv_segment(&udp_a) > 0);

    server.stop();
}

#[test]
fn wait_unblocks_on_external_stop() {
    let (server, _, _) = start_server();
    let server = std::sync::Arc::new(server);

    let stopper = std::sync::Arc::clone(&server);
    let handle = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(300));
        stopper.stop();
    });

    server.wait();
    handle.join().unwrap();
    assert_eq!(server.state(), ServerState::Stopped);
}
