//! Line transport over one long-lived TCP connection.
//!
//! A single background thread pumps inbound lines into a central buffer
//! and fans each line out to every registered subscriber queue. Both the
//! buffer and the registry sit behind one mutex, so a line is appended
//! and fanned out in a single critical section: a subscriber registered
//! concurrently either sees a given line or does not, never a partial
//! delivery. Sends go through a cloned write handle and never touch the
//! pump.

use std::collections::VecDeque;
use std::io::{self, BufRead, BufReader, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

#[derive(Default)]
struct Inbox {
    central: VecDeque<String>,
    sinks: Vec<Sender<String>>,
    closed: bool,
}

#[derive(Default)]
struct Shared {
    inbox: Mutex<Inbox>,
    arrived: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inbox> {
        self.inbox.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct Transport {
    stream: TcpStream,
    shared: Arc<Shared>,
    running: Arc<AtomicBool>,
    pump: Option<JoinHandle<()>>,
}

impl Transport {
    /// Open the connection and start the read pump. The pump runs exactly
    /// once per transport, for the lifetime of the connection.
    pub fn connect<A: ToSocketAddrs>(addr: A, timeout: Duration) -> io::Result<Self> {
        let mut last_err = None;
        for candidate in addr.to_socket_addrs()? {
            match TcpStream::connect_timeout(&candidate, timeout) {
                Ok(stream) => return Self::start(stream),
                Err(err) => last_err = Some(err),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::AddrNotAvailable, "no addresses resolved")
        }))
    }

    fn start(stream: TcpStream) -> io::Result<Self> {
        stream.set_nodelay(true)?;
        let reader = stream.try_clone()?;

        let shared = Arc::new(Shared::default());
        let running = Arc::new(AtomicBool::new(true));

        let pump = thread::Builder::new().name("net-pump".into()).spawn({
            let shared = Arc::clone(&shared);
            let running = Arc::clone(&running);
            move || read_pump(reader, shared, running)
        })?;

        if let Ok(peer) = stream.peer_addr() {
            log::info!("connected to {peer}");
        }

        Ok(Self {
            stream,
            shared,
            running,
            pump: Some(pump),
        })
    }

    /// Register a subscriber queue. Every line the pump delivers from this
    /// moment on lands in the returned receiver, in arrival order. Dropping
    /// the receiver unsubscribes; the pump prunes it at the next fan-out.
    pub fn subscribe(&self) -> Receiver<String> {
        let (tx, rx) = mpsc::channel();
        let mut inbox = self.shared.lock();
        if !inbox.closed {
            inbox.sinks.push(tx);
        }
        rx
    }

    /// Register a subscriber queue, first draining the central buffer into
    /// it. Drain and registration happen under one lock acquisition, so no
    /// line can slip between them: the receiver sees exactly the backlog
    /// followed by everything delivered afterwards.
    pub fn subscribe_with_backlog(&self) -> Receiver<String> {
        let (tx, rx) = mpsc::channel();
        let mut inbox = self.shared.lock();
        for line in inbox.central.drain(..) {
            let _ = tx.send(line);
        }
        if !inbox.closed {
            inbox.sinks.push(tx);
        }
        rx
    }

    /// Non-blocking removal of the oldest buffered line.
    pub fn drain_central(&self) -> Option<String> {
        self.shared.lock().central.pop_front()
    }

    /// Blocking removal of the oldest buffered line, bounded by `timeout`.
    /// Used only for the synchronous authentication handshake, before any
    /// subscriber exists. Returns `None` on timeout or a closed stream.
    pub fn take_central(&self, timeout: Duration) -> Option<String> {
        let inbox = self.shared.lock();
        let (mut inbox, _) = self
            .shared
            .arrived
            .wait_timeout_while(inbox, timeout, |inbox| {
                inbox.central.is_empty() && !inbox.closed
            })
            .unwrap_or_else(PoisonError::into_inner);
        inbox.central.pop_front()
    }

    /// Discard every buffered-but-undelivered central line.
    pub fn clear_central(&self) {
        self.shared.lock().central.clear();
    }

    /// Write one line, newline-terminated, in a single call. Failures are
    /// the caller's problem; a send into a torn-down connection must not
    /// be swallowed here.
    pub fn send(&self, line: &str) -> io::Result<()> {
        log::trace!("send: {line}");
        let mut framed = String::with_capacity(line.len() + 1);
        framed.push_str(line);
        framed.push('\n');
        (&self.stream).write_all(framed.as_bytes())
    }

    /// False once the pump has stopped, whether by disposal or because the
    /// stream ended.
    pub fn is_open(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop the pump, close the socket and refuse further buffering.
    /// In-flight sends fail naturally once the socket is shut down.
    pub fn dispose(&self) {
        self.running.store(false, Ordering::SeqCst);
        let _ = self.stream.shutdown(Shutdown::Both);

        let mut inbox = self.shared.lock();
        inbox.closed = true;
        inbox.sinks.clear();
        drop(inbox);
        self.shared.arrived.notify_all();
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.dispose();
        if let Some(pump) = self.pump.take() {
            let _ = pump.join();
        }
    }
}

fn read_pump(stream: TcpStream, shared: Arc<Shared>, running: Arc<AtomicBool>) {
    let mut reader = BufReader::new(stream);
    let mut buf = String::new();

    while running.load(Ordering::SeqCst) {
        buf.clear();
        match reader.read_line(&mut buf) {
            Ok(0) => {
                log::info!("server closed the connection");
                break;
            }
            Ok(_) => {
                let line = buf.trim_end_matches(['\r', '\n']);
                log::trace!("recv: {line}");

                let mut inbox = shared.lock();
                if inbox.closed {
                    break;
                }
                inbox.central.push_back(line.to_string());
                inbox.sinks.retain(|sink| sink.send(line.to_string()).is_ok());
                drop(inbox);
                shared.arrived.notify_all();
            }
            Err(err) => {
                if running.load(Ordering::SeqCst) {
                    log::warn!("read pump stopped: {err}");
                }
                break;
            }
        }
    }

    running.store(false, Ordering::SeqCst);
    let mut inbox = shared.lock();
    inbox.closed = true;
    // Dropping the senders tells every subscriber the stream ended.
    inbox.sinks.clear();
    drop(inbox);
    shared.arrived.notify_all();
}
