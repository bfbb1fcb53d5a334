use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use glam::Vec2;

use dogfight::arena::MatchOutcome;
use dogfight_client::{ClientConfig, SessionController, SessionError, SessionState};

const STEP: Duration = Duration::from_millis(5);
const DEADLINE: Duration = Duration::from_secs(3);

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn config() -> ClientConfig {
    ClientConfig {
        auth_timeout: Duration::from_millis(500),
        connect_timeout: Duration::from_secs(1),
    }
}

/// One scripted peer on the far end of the connection.
struct Peer {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl Peer {
    fn new(stream: TcpStream) -> Self {
        stream.set_read_timeout(Some(DEADLINE)).unwrap();
        Self {
            reader: BufReader::new(stream.try_clone().unwrap()),
            writer: stream,
        }
    }

    /// Read the next line and assert its prefix.
    fn expect(&mut self, prefix: &str) -> String {
        let mut line = String::new();
        self.reader.read_line(&mut line).unwrap();
        let line = line.trim().to_string();
        assert!(
            line.to_ascii_uppercase()
                .starts_with(&prefix.to_ascii_uppercase()),
            "expected a {prefix} line, got {line:?}"
        );
        line
    }

    fn send(&mut self, line: &str) {
        writeln!(self.writer, "{line}").unwrap();
    }

    /// Hold the connection open until the client hangs up.
    fn wait_close(&mut self) {
        let mut sink = String::new();
        loop {
            sink.clear();
            match self.reader.read_line(&mut sink) {
                Ok(0) | Err(_) => return,
                Ok(_) => {}
            }
        }
    }
}

fn serve<F>(script: F) -> (SocketAddr, JoinHandle<()>)
where
    F: FnOnce(&mut Peer) + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut peer = Peer::new(stream);
        script(&mut peer);
    });
    (addr, handle)
}

/// Server half of a successful login: LOGIN in, acknowledgement out,
/// roster after the LIST request.
fn login_handshake(peer: &mut Peer) {
    peer.expect("LOGIN:");
    peer.send("Login successful");
    peer.expect("LIST");
    peer.send("UPDATE_LIST:alice,bob");
}

fn login(addr: SocketAddr) -> SessionController {
    let mut session = SessionController::new(config());
    session
        .login("127.0.0.1", addr.port(), "alice", "secret")
        .unwrap();
    session
}

fn pump_until(session: &mut SessionController, what: &str, pred: impl Fn(&SessionController) -> bool) {
    let deadline = Instant::now() + DEADLINE;
    loop {
        session.update();
        if pred(session) {
            return;
        }
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(STEP);
    }
}

#[test]
fn test_login_success_enters_lobby() {
    init_logging();
    let (addr, server) = serve(|peer| {
        let line = peer.expect("LOGIN:");
        assert_eq!(line, "LOGIN:alice:secret");
        peer.send("Login successful");
        peer.expect("LIST");
        peer.send("UPDATE_LIST:alice,bob");
        peer.wait_close();
    });

    let mut session = login(addr);
    assert_eq!(session.state(), SessionState::InLobby);
    assert_eq!(session.identity().unwrap().as_str(), "alice");

    pump_until(&mut session, "the roster", |s| {
        s.lobby().is_some_and(|l| l.players().len() == 2)
    });
    assert_eq!(
        session.lobby().unwrap().players(),
        ["alice".to_string(), "bob".to_string()]
    );

    session.disconnect();
    server.join().unwrap();
}

#[test]
fn test_login_rejection_reports_server_text() {
    init_logging();
    let (addr, server) = serve(|peer| {
        peer.expect("LOGIN:");
        peer.send("Invalid credentials");
    });

    let mut session = SessionController::new(config());
    let err = session
        .login("127.0.0.1", addr.port(), "alice", "wrong")
        .unwrap_err();
    match err {
        SessionError::AuthRejected(text) => assert_eq!(text, "Invalid credentials"),
        other => panic!("Expected AuthRejected, got {other:?}"),
    }
    assert_eq!(session.state(), SessionState::Disconnected);
    server.join().unwrap();
}

#[test]
fn test_login_times_out_on_silence() {
    init_logging();
    let (addr, _server) = serve(|peer| {
        peer.expect("LOGIN:");
        peer.wait_close();
    });

    let mut session = SessionController::new(config());
    let err = session
        .login("127.0.0.1", addr.port(), "alice", "secret")
        .unwrap_err();
    assert!(matches!(err, SessionError::AuthTimeout));
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[test]
fn test_login_connect_failure() {
    init_logging();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut session = SessionController::new(config());
    let err = session
        .login("127.0.0.1", addr.port(), "alice", "secret")
        .unwrap_err();
    assert!(matches!(err, SessionError::Connect(_)));
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[test]
fn test_register_reports_server_verdict() {
    init_logging();
    let (addr, server) = serve(|peer| {
        let line = peer.expect("REGISTER:");
        assert_eq!(line, "REGISTER:alice:alice@example.com:secret");
        peer.send("Registration successful! Please log in.");
    });

    let mut session = SessionController::new(config());
    let reply = session
        .register("127.0.0.1", addr.port(), "alice", "alice@example.com", "secret")
        .unwrap();
    assert!(reply.accepted);
    assert_eq!(reply.message, "Registration successful! Please log in.");
    assert_eq!(session.state(), SessionState::Disconnected);
    server.join().unwrap();

    let (addr, server) = serve(|peer| {
        peer.expect("REGISTER:");
        peer.send("Username already taken");
    });
    let reply = session
        .register("127.0.0.1", addr.port(), "alice", "alice@example.com", "secret")
        .unwrap();
    assert!(!reply.accepted);
    server.join().unwrap();
}

#[test]
fn test_lines_racing_the_login_are_not_lost() {
    init_logging();
    let (addr, server) = serve(|peer| {
        peer.expect("LOGIN:");
        peer.send("Login successful");
        // These land before the lobby queue exists; the backlog handoff
        // must carry them over.
        peer.send("UPDATE_LIST:alice,bob");
        peer.send("CHAT:bob:welcome");
        peer.expect("LIST");
        peer.send("UPDATE_LIST:alice,bob,carol");
        peer.wait_close();
    });

    let mut session = login(addr);
    pump_until(&mut session, "the full roster", |s| {
        s.lobby().is_some_and(|l| l.players().len() == 3)
    });

    let lobby = session.lobby().unwrap();
    assert_eq!(lobby.chat().len(), 1);
    assert_eq!(lobby.chat()[0].text, "welcome");

    session.disconnect();
    server.join().unwrap();
}

#[test]
fn test_invite_match_and_return_to_lobby() {
    init_logging();
    let (addr, server) = serve(|peer| {
        login_handshake(peer);

        peer.send("INVITE_REQUEST:bob:alice,carol");
        assert_eq!(peer.expect("INVITE_RESP:"), "INVITE_RESP:bob:ACCEPT");
        peer.send("INVITE_RESULT:bob:alice:ACCEPTED");

        peer.send("STATE:|alice:100,bob:100|alice:100:100,bob:400:100");
        assert_eq!(peer.expect("MOVE:"), "MOVE:120:100");
        assert_eq!(peer.expect("FIRE:"), "FIRE:120:100:10:0");
        peer.send("FIRE_ACK:1:alice:130:100");

        peer.send("GAME_OVER:bob");
        peer.expect("LIST");
        peer.send("UPDATE_LIST:alice,bob");
        peer.wait_close();
    });

    let mut session = login(addr);

    pump_until(&mut session, "the invitation", |s| {
        s.lobby().is_some_and(|l| l.pending_invite() == Some("bob"))
    });
    session.respond_invite(true).unwrap();

    pump_until(&mut session, "the match to be accepted", |s| {
        s.state() == SessionState::AwaitingMatchStart
    });
    pump_until(&mut session, "the first snapshot", |s| {
        s.state() == SessionState::InMatch
    });

    let arena = session.arena().unwrap();
    assert_eq!(arena.local_position(), Some(Vec2::new(100.0, 100.0)));
    assert_eq!(
        arena.position_of(&"bob".into()),
        Some(Vec2::new(400.0, 100.0))
    );

    // One frame of rightward input: 200 u/s for 0.1 s.
    session.move_local(Vec2::new(1.0, 0.0), 0.1).unwrap();
    session.fire().unwrap();

    pump_until(&mut session, "the fire acknowledgement", |s| {
        s.arena().is_some_and(|a| a.projectile_count() == 1)
    });

    pump_until(&mut session, "the verdict", |s| {
        s.arena().is_some_and(|a| a.outcome() == Some(MatchOutcome::Loss))
    });

    session.return_to_lobby().unwrap();
    assert_eq!(session.state(), SessionState::InLobby);
    assert!(session.arena().is_none());
    pump_until(&mut session, "the fresh roster", |s| {
        s.lobby().is_some_and(|l| !l.players().is_empty())
    });

    session.disconnect();
    server.join().unwrap();
}

#[test]
fn test_rejected_invite_stays_in_lobby() {
    init_logging();
    let (addr, server) = serve(|peer| {
        login_handshake(peer);
        peer.send("INVITE_REQUEST:bob:alice");
        assert_eq!(peer.expect("INVITE_RESP:"), "INVITE_RESP:bob:REJECT");
        peer.send("INVITE_RESULT:bob:alice:REJECTED");
        peer.send("CHAT:bob:next time");
        peer.wait_close();
    });

    let mut session = login(addr);
    pump_until(&mut session, "the invitation", |s| {
        s.lobby().is_some_and(|l| l.pending_invite().is_some())
    });
    session.respond_invite(false).unwrap();

    // The rejection leaves the session in the lobby, still receiving.
    pump_until(&mut session, "post-rejection chat", |s| {
        s.lobby().is_some_and(|l| !l.chat().is_empty())
    });
    assert_eq!(session.state(), SessionState::InLobby);

    session.disconnect();
    server.join().unwrap();
}

#[test]
fn test_stat_query_roundtrip() {
    init_logging();
    let (addr, server) = serve(|peer| {
        login_handshake(peer);
        assert_eq!(peer.expect("QUERY2"), "QUERY2");
        peer.send("QUERY2_RESULT:Matches played: 12");
        peer.wait_close();
    });

    let mut session = login(addr);
    session.request_query(2).unwrap();
    pump_until(&mut session, "the query result", |s| {
        s.lobby().is_some_and(|l| l.query_result().is_some())
    });
    assert_eq!(
        session.lobby().unwrap().query_result(),
        Some("Matches played: 12")
    );

    session.disconnect();
    server.join().unwrap();
}

#[test]
fn test_logout_waits_for_acknowledgement() {
    init_logging();
    let (addr, server) = serve(|peer| {
        login_handshake(peer);
        peer.expect("LOGOUT");
        peer.send("LOGOUT_OK");
        peer.wait_close();
    });

    let mut session = login(addr);
    session.request_logout().unwrap();
    assert_eq!(session.state(), SessionState::AwaitingLogout);

    // Local input is ignored until the server acknowledges.
    session.invite("bob").unwrap();
    session.send_chat("too late").unwrap();
    assert_eq!(session.state(), SessionState::AwaitingLogout);

    pump_until(&mut session, "the logout acknowledgement", |s| {
        s.state() == SessionState::Disconnected
    });
    assert!(session.status().is_none());
    server.join().unwrap();
}

#[test]
fn test_delete_account_completes_on_close() {
    init_logging();
    let (addr, server) = serve(|peer| {
        login_handshake(peer);
        peer.expect("DELETE_ME");
        // The server deletes the account and just closes the connection.
    });

    let mut session = login(addr);
    session.delete_account().unwrap();
    assert_eq!(session.state(), SessionState::AwaitingLogout);

    pump_until(&mut session, "the connection to close", |s| {
        s.state() == SessionState::Disconnected
    });
    assert!(session.status().is_none());
    server.join().unwrap();
}

#[test]
fn test_connection_loss_is_surfaced() {
    init_logging();
    let (addr, server) = serve(|peer| {
        login_handshake(peer);
        // Abrupt close, no LOGOUT_OK.
    });

    let mut session = login(addr);
    pump_until(&mut session, "the dropout", |s| {
        s.state() == SessionState::Disconnected
    });
    assert_eq!(session.status(), Some("Connection lost."));
    server.join().unwrap();
}
