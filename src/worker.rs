//! The per-worker event loop: readiness multiplexing over the listening
//! socket and every live connection, accepting new connections, and driving
//! each existing one exactly one step per readiness event.
//!
//! Grounded on `server.c`'s `conn_loop` (the `select`-based original) and
//! the teacher's `chopin/src/worker.rs` (the `epoll`-based rewrite of the
//! same idea: one `Worker` per core, one `Slab` of live connections, one
//! `Epoll` instance). The state-machine contract from spec §4.6 is
//! preserved exactly: after a handler call returns, the connection's
//! `state` alone decides what the loop does next — `Sending` is kept for
//! the next iteration, `Complete` is torn down, `ErrRecoverable` gets one
//! more attempt at a response, and `ErrUnrecoverable` is torn down without
//! sending anything.

use std::os::fd::{AsRawFd, OwnedFd};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::conn::{ConnState, Connection};
use crate::config::ServerSettings;
use crate::handler;
use crate::slab::Slab;
use crate::syscalls::{self, Epoll, Interest};
use crate::{log_error, log_info};

/// Sentinel key identifying the listening socket in the epoll event stream,
/// distinct from every `Slab` key (which are plain small `usize`s handed
/// out starting at zero).
const LISTEN_KEY: u64 = u64::MAX;

/// How long a single `epoll_wait` call blocks before the loop re-checks the
/// shutdown flag. The spec's readiness wait has no timeout at all (blocks
/// forever); this bound exists purely so `Ctrl-C` (wired up in
/// `server.rs`) is noticed promptly instead of only between connections.
const SHUTDOWN_POLL_MS: i32 = 1000;

pub struct Worker {
    id: usize,
    settings: ServerSettings,
}

impl Worker {
    pub fn new(id: usize, settings: ServerSettings) -> Worker {
        Worker { id, settings }
    }

    /// Runs the event loop on `listen_fd` until `shutdown` is set. Returns
    /// on a worker-fatal error (anything from the readiness wait other than
    /// `EINTR`, which the loop simply restarts on) — the caller logs and
    /// the worker's OS thread exits, exactly as a worker process exiting
    /// would in the spec's multi-process deployment.
    pub fn run(&mut self, listen_fd: OwnedFd, shutdown: &AtomicBool) -> std::io::Result<()> {
        let epoll = Epoll::new()?;
        epoll.add(listen_fd.as_raw_fd(), LISTEN_KEY, Interest::Readable)?;

        let mut conns: Slab<Connection> = Slab::new();
        let mut events_buf = Vec::with_capacity(256);

        log_info!(self.settings.log_level, "worker {} accepting connections", self.id);

        while !shutdown.load(Ordering::Relaxed) {
            let ready = epoll.wait(&mut events_buf, SHUTDOWN_POLL_MS)?;

            for event in &ready {
                if event.key == LISTEN_KEY {
                    self.accept_all(listen_fd.as_raw_fd(), &epoll, &mut conns);
                    continue;
                }
                self.service(event.key as usize, event.readable, event.writable, &epoll, &mut conns);
            }
        }

        log_info!(self.settings.log_level, "worker {} shutting down", self.id);
        Ok(())
    }

    /// Drains the accept queue (step 3, spec §4.6): `EAGAIN` just means
    /// another worker won the race for this particular connection, which is
    /// expected and not logged.
    fn accept_all(&self, listen_fd: std::os::fd::RawFd, epoll: &Epoll, conns: &mut Slab<Connection>) {
        loop {
            match syscalls::accept(listen_fd) {
                Ok(None) => break,
                Ok(Some(fd)) => {
                    let raw = fd.as_raw_fd();
                    let conn = Connection::new(fd, self.settings.read_buf_size);
                    let key = conns.insert(conn);
                    if let Err(e) = epoll.add(raw, key as u64, Interest::Readable) {
                        log_error!(self.settings.log_level, "failed to register accepted socket: {e}");
                        conns.remove(key);
                    }
                }
                Err(e) => {
                    log_error!(self.settings.log_level, "accept failed: {e}");
                    break;
                }
            }
        }
    }

    /// Drives one connection one step and then acts on whatever terminal
    /// (or non-terminal) state it ends up in, per spec §4.6 step 5.
    fn service(&self, key: usize, readable: bool, writable: bool, epoll: &Epoll, conns: &mut Slab<Connection>) {
        let Some(conn) = conns.get_mut(key) else {
            return;
        };

        match conn.state {
            ConnState::Waiting if readable => handler::process_request(conn, &self.settings),
            ConnState::Sending if writable => handler::process_request_write(conn, &self.settings),
            _ => return,
        }

        match conn.state {
            ConnState::Waiting => {
                // Incomplete read (would-block): nothing to do, the
                // connection stays registered for read-readiness.
            }
            ConnState::Sending => {
                // First transition into `Sending` needs write-readiness
                // registered; re-entering `Sending` after a partial write
                // is already registered for it.
                let fd = conn.socket.as_raw_fd();
                let _ = epoll.modify(fd, key as u64, Interest::Writable);
            }
            ConnState::ErrRecoverable => {
                handler::send_emergency_500(conn, &self.settings);
                self.finish(key, epoll, conns);
            }
            ConnState::ErrUnrecoverable => {
                log_error!(self.settings.log_level, "unrecoverable error, closing connection");
                self.finish(key, epoll, conns);
            }
            ConnState::Complete => {
                self.finish(key, epoll, conns);
            }
        }
    }

    /// Tears down a connection that reached `Complete` (including the two
    /// error states, both of which collapse to `Complete` before this is
    /// called): unregisters it from `epoll`, drops it — closing the socket
    /// and, if open, the body file fd — and frees its slab slot.
    fn finish(&self, key: usize, epoll: &Epoll, conns: &mut Slab<Connection>) {
        if let Some(conn) = conns.get(key) {
            let _ = epoll.remove(conn.socket.as_raw_fd());
        }
        conns.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::LogLevel;
    use std::net::Ipv4Addr;
    use std::sync::atomic::AtomicBool;

    fn test_settings(doc_root: std::path::PathBuf) -> ServerSettings {
        ServerSettings {
            doc_root,
            host: "127.0.0.1".into(),
            port: 0,
            process_count: 1,
            listen_backlog: 16,
            read_buf_size: 8192,
            uri_length_limit: 2048,
            req_size_limit: 8192,
            log_level: LogLevel::Fatal,
        }
    }

    #[test]
    fn serves_a_get_request_end_to_end() {
        let dir = tempfile::TempDir::new().unwrap();
        let root = std::fs::canonicalize(dir.path()).unwrap();
        std::fs::write(root.join("index.html"), "hello\n").unwrap();

        let settings = test_settings(root);
        let listen_fd = syscalls::listen(&Ipv4Addr::LOCALHOST, 0, 16).unwrap();
        let mut addr: libc::sockaddr_in = unsafe { std::mem::zeroed() };
        let mut len = std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
        unsafe {
            libc::getsockname(listen_fd.as_raw_fd(), &mut addr as *mut _ as *mut libc::sockaddr, &mut len);
        }
        let port = u16::from_be(addr.sin_port);

        let shutdown = std::sync::Arc::new(AtomicBool::new(false));
        let shutdown_worker = shutdown.clone();
        let handle = std::thread::spawn(move || {
            let mut worker = Worker::new(0, settings);
            let _ = worker.run(listen_fd, &shutdown_worker);
        });

        // Give the worker a moment to enter epoll_wait before connecting.
        std::thread::sleep(std::time::Duration::from_millis(50));

        use std::io::{Read, Write};
        let mut client = std::net::TcpStream::connect((Ipv4Addr::LOCALHOST, port)).unwrap();
        client.write_all(b"GET / HTTP/1.1\r\n\r\n").unwrap();
        let mut response = Vec::new();
        client.read_to_end(&mut response).unwrap();

        let text = String::from_utf8_lossy(&response);
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Length: 6"));
        assert!(text.ends_with("hello\n"));

        shutdown.store(true, Ordering::Relaxed);
        handle.join().unwrap();
    }

    /// A client that shuts down its write half immediately after connecting,
    /// without ever sending a request line, must not leave its connection
    /// stuck in `Waiting` forever (see the matching "Open Question
    /// resolutions" entry in DESIGN.md). The worker should observe the
    /// zero-byte read as EOF and tear the connection down; from the client's
    /// side that shows up as its own read reaching EOF promptly instead of
    /// hanging until a timeout.
    #[test]
    fn half_closed_before_any_bytes_is_torn_down() {
        let dir = tempfile::TempDir::new().unwrap();
        let root = std::fs::canonicalize(dir.path()).unwrap();
        std::fs::write(root.join("index.html"), "hello\n").unwrap();

        let settings = test_settings(root);
        let listen_fd = syscalls::listen(&Ipv4Addr::LOCALHOST, 0, 16).unwrap();
        let mut addr: libc::sockaddr_in = unsafe { std::mem::zeroed() };
        let mut len = std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
        unsafe {
            libc::getsockname(listen_fd.as_raw_fd(), &mut addr as *mut _ as *mut libc::sockaddr, &mut len);
        }
        let port = u16::from_be(addr.sin_port);

        let shutdown = std::sync::Arc::new(AtomicBool::new(false));
        let shutdown_worker = shutdown.clone();
        let handle = std::thread::spawn(move || {
            let mut worker = Worker::new(0, settings);
            let _ = worker.run(listen_fd, &shutdown_worker);
        });

        std::thread::sleep(std::time::Duration::from_millis(50));

        use std::io::Read;
        let mut client = std::net::TcpStream::connect((Ipv4Addr::LOCALHOST, port)).unwrap();
        client.shutdown(std::net::Shutdown::Write).unwrap();
        client
            .set_read_timeout(Some(std::time::Duration::from_secs(2)))
            .unwrap();

        let mut buf = [0u8; 16];
        let n = client.read(&mut buf).expect("server should close its end, not hang");
        assert_eq!(n, 0, "no response bytes expected for a request that was never sent");

        shutdown.store(true, Ordering::Relaxed);
        handle.join().unwrap();
    }
}
