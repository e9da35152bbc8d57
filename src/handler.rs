//! Request handling: reads the request line, parses it, resolves it to a
//! file, and writes the response. Grounded on `handler.c`'s
//! `process_request`/`send_response`/`process_request_write` trio.
//!
//! The original uses `setjmp`/`longjmp` (`abort_req`) to unwind out of a
//! handler the moment a syscall fails, after first stamping the connection's
//! terminal state so the loop in `server.c`'s `conn_loop` knows what to do
//! next. [`Abort`] is the explicit-control-flow replacement the spec's
//! design notes ask for: every site that would have called `abort_req()`
//! instead sets `conn.state` and returns `Err(Abort)`, which `?` threads
//! straight back up to the worker without any handler in between needing to
//! know about it.
//!
//! One wrinkle `handler.c` never had to think about: `HttpRequest::uri` and
//! the path resolver's output both borrow the connection's own arena. The
//! parse-and-resolve step below runs inside its own block and extracts only
//! owned, `'static`-shaped data (a `PathBuf`, a `Copy` method) out of it, so
//! that borrow ends before any function needing `&mut Connection` is
//! called — see the module-level note in `http.rs` for the other half of
//! this.

use std::fs::File;
use std::io::Write;
use std::os::fd::AsRawFd;
use std::path::PathBuf;

use crate::config::ServerSettings;
use crate::conn::{ConnState, Connection};
use crate::content_type::ContentType;
use crate::date::http_date_now;
use crate::http::{HttpMethod, HttpResponse, StatusCode};
use crate::parser::ParseError;
use crate::path::{self, ResolveError};
use crate::parser;
use crate::syscalls;
use crate::{log_error, log_info, log_warn};

/// The non-local return from deep in request handling back to the worker's
/// recovery point (spec §4.7), expressed as a plain unit error threaded by
/// `?` instead of `setjmp`/`longjmp`. By the time this is ever constructed,
/// `conn.state` has already been set to a terminal state — that invariant is
/// the entire contract; nothing reads the `Abort` value itself.
struct Abort;

const HEADER_BUF_SIZE: usize = 4096;

enum Parsed {
    Error(StatusCode),
    Resolved { method: HttpMethod, path: PathBuf },
}

/// Drives a `Waiting` connection one step: reads whatever is available,
/// and if that completes a request line, parses it, resolves it, and writes
/// a response (or the start of one). Leaves `conn.state` updated in every
/// case — including "no data yet", which leaves it `Waiting` unchanged.
pub fn process_request(conn: &mut Connection, settings: &ServerSettings) {
    let _ = try_process_request(conn, settings);
}

fn try_process_request(conn: &mut Connection, settings: &ServerSettings) -> Result<(), Abort> {
    let cap = conn.read_buf.len();
    let n = match syscalls::read_once(conn.socket.as_raw_fd(), &mut conn.read_buf) {
        Ok(0) => {
            // Peer closed before sending anything. Not a protocol error and
            // not worth a response; just recycle the connection.
            conn.state = ConnState::Complete;
            return Err(Abort);
        }
        Ok(n) => n,
        Err(e) if syscalls::would_block(&e) => return Ok(()), // still Waiting
        Err(e) => {
            log_error!(settings.log_level, "read socket failed: {e}");
            conn.state = ConnState::ErrUnrecoverable;
            return Err(Abort);
        }
    };
    conn.read_buf_len = n;

    // This block is where the connection's arena gets borrowed (through the
    // parsed request's `uri` and the resolver's output). Everything it
    // hands back to `parsed` is owned, so that borrow is gone by the time
    // we act on the result.
    let parsed = {
        let arena = &conn.arena;
        let data = &conn.read_buf[..n];
        match parser::parse_request(data, settings.uri_length_limit, arena) {
            Err(err) => {
                if err == ParseError::InvalidSyntax && n >= cap.saturating_sub(1) && !data.contains(&b'\r') {
                    // The request-line terminator never showed up and the
                    // read filled the whole buffer: this request line is
                    // longer than a worker will ever manage to read in one
                    // call. The source enumerates this case
                    // (`READ_REQ_DATA_TOO_LARGE`) but its own read is
                    // already capped at the buffer size, so it can never
                    // actually reach it; here we detect it directly and
                    // answer with the 400 the source intended.
                    log_warn!(settings.log_level, "request too large");
                } else {
                    log_warn!(settings.log_level, "invalid request: {err:?}");
                }
                Parsed::Error(status_for_parse_error(err))
            }
            Ok(request) => match path::resolve(request.uri, &settings.doc_root, arena) {
                Ok(resolved) => Parsed::Resolved {
                    method: request.method,
                    path: resolved.to_path_buf(),
                },
                Err(err) => {
                    log_warn!(
                        settings.log_level,
                        "path resolution failed for {:?}: {err:?}",
                        String::from_utf8_lossy(request.uri)
                    );
                    Parsed::Error(status_for_resolve_error(err))
                }
            },
        }
    };

    match parsed {
        Parsed::Error(status) => error_response(conn, settings, status),
        Parsed::Resolved { method, path } => serve_resolved(conn, settings, method, &path),
    }
}

fn serve_resolved(conn: &mut Connection, settings: &ServerSettings, method: HttpMethod, resolved: &std::path::Path) -> Result<(), Abort> {
    let metadata = match std::fs::metadata(resolved) {
        Ok(metadata) if metadata.is_file() => metadata,
        Ok(_) => return error_response(conn, settings, StatusCode::NotFound),
        Err(e) => {
            log_warn!(settings.log_level, "stat failed for {resolved:?}: {e}");
            return error_response(conn, settings, status_for_io_error(&e));
        }
    };

    let content_type = ContentType::from_path(resolved);
    let body_size = metadata.len();

    let file = if method == HttpMethod::Get {
        match File::open(resolved) {
            Ok(file) => Some(file),
            Err(e) => {
                log_warn!(settings.log_level, "open failed for {resolved:?}: {e}");
                return error_response(conn, settings, status_for_io_error(&e));
            }
        }
    } else {
        None
    };

    let date = http_date_now();
    let length = body_size.to_string();
    let mut response = HttpResponse::for_method(method, StatusCode::Ok);
    response.push_header("Date", &date);
    response.push_header("Content-Length", &length);
    response.push_header("Content-Type", content_type.as_str());
    response.push_header("Connection", "Close");
    response.body_size = body_size;

    write_response_head(conn, settings, &response)?;
    if conn.state == ConnState::Sending {
        conn.file = file;
    }
    Ok(())
}

fn status_for_parse_error(err: ParseError) -> StatusCode {
    match err {
        ParseError::InvalidSyntax => StatusCode::BadRequest,
        ParseError::InvalidMethod => StatusCode::MethodNotAllowed,
        ParseError::InvalidVersion => StatusCode::VersionNotSupported,
        ParseError::UriTooLong => StatusCode::UriTooLong,
    }
}

fn status_for_resolve_error(err: ResolveError) -> StatusCode {
    match err {
        ResolveError::Forbidden => StatusCode::Forbidden,
        ResolveError::NotFound => StatusCode::NotFound,
        ResolveError::Internal => StatusCode::InternalServerError,
    }
}

fn status_for_io_error(err: &std::io::Error) -> StatusCode {
    match err.kind() {
        std::io::ErrorKind::PermissionDenied => StatusCode::Forbidden,
        std::io::ErrorKind::NotFound => StatusCode::NotFound,
        _ => StatusCode::InternalServerError,
    }
}

/// Builds and writes a body-less error response: `Date` and
/// `Content-Length: 0`, matching `error_response` in the source exactly
/// (it never attaches `Content-Type` or `Connection` to an error reply).
fn error_response(conn: &mut Connection, settings: &ServerSettings, status: StatusCode) -> Result<(), Abort> {
    log_info!(settings.log_level, "error response {}", status.code());
    let date = http_date_now();
    let mut response = HttpResponse::new(status);
    response.push_header("Date", &date);
    response.push_header("Content-Length", "0");
    write_response_head(conn, settings, &response)
}

/// Assembles the status line and headers into a stack buffer and writes
/// them in one blocking call (spec §4.4): the socket is briefly switched
/// back to blocking mode for this single write, then returned to
/// non-blocking before any body streaming begins. A short write is treated
/// as fatal rather than retried, per the spec's documented simplification.
fn write_response_head(conn: &mut Connection, settings: &ServerSettings, response: &HttpResponse<'_>) -> Result<(), Abort> {
    let mut buf = [0u8; HEADER_BUF_SIZE];
    let len = format_head(response, &mut buf);

    let fd = conn.socket.as_raw_fd();
    if let Err(e) = syscalls::set_blocking(fd) {
        log_error!(settings.log_level, "failed to switch socket to blocking mode: {e}");
        conn.state = ConnState::ErrUnrecoverable;
        return Err(Abort);
    }

    match syscalls::write_once(fd, &buf[..len]) {
        Ok(n) if n == len => {}
        Ok(_) => {
            log_error!(settings.log_level, "short write on response header");
            conn.state = ConnState::ErrUnrecoverable;
            return Err(Abort);
        }
        Err(e) => {
            log_error!(settings.log_level, "failed to write to socket: {e}");
            conn.state = ConnState::ErrUnrecoverable;
            return Err(Abort);
        }
    }

    if !response.has_body() {
        conn.state = ConnState::Complete;
        return Ok(());
    }

    if let Err(e) = syscalls::set_nonblocking(fd) {
        log_error!(settings.log_level, "failed to switch socket to non-blocking mode: {e}");
        conn.state = ConnState::ErrUnrecoverable;
        return Err(Abort);
    }

    conn.state = ConnState::Sending;
    conn.read_buf_len = 0;
    conn.read_buf_cursor = 0;
    Ok(())
}

/// `HTTP/1.1 <code> <reason>\r\n`, then every header, then (for non-HEAD
/// responses only) the blank line that terminates the header block. A HEAD
/// reply therefore ends right after its last header, with no body and no
/// separator line — preserved from `send_response` in the source rather
/// than "corrected" to always emit the blank line, since the server never
/// keeps the connection open afterwards for a client to misparse.
fn format_head(response: &HttpResponse<'_>, buf: &mut [u8; HEADER_BUF_SIZE]) -> usize {
    let mut cursor = std::io::Cursor::new(&mut buf[..]);
    let _ = write!(cursor, "HTTP/1.1 {} {}\r\n", response.status.code(), response.status.reason());
    for (name, value) in &response.headers {
        let _ = write!(cursor, "{name}: {value}\r\n");
    }
    if response.has_body() {
        let _ = write!(cursor, "\r\n");
    }
    cursor.position() as usize
}

/// Used only when the worker observes a connection in `ErrRecoverable`: an
/// abort happened before any response bytes reached the wire, so one last
/// attempt at a plain 500 is worth making (spec §4.5, §7). Arena-free and
/// allocation-free by construction, since whatever put the connection in
/// this state may itself have been an allocation failure.
pub fn send_emergency_500(conn: &mut Connection, settings: &ServerSettings) {
    let date = http_date_now();
    let mut buf = [0u8; HEADER_BUF_SIZE];
    let mut c = std::io::Cursor::new(&mut buf[..]);
    let _ = write!(
        c,
        "HTTP/1.1 {} {}\r\nDate: {date}\r\nContent-Length: 0\r\n\r\n",
        StatusCode::InternalServerError.code(),
        StatusCode::InternalServerError.reason(),
    );
    let len = c.position() as usize;
    let fd = conn.socket.as_raw_fd();
    let _ = syscalls::set_blocking(fd);
    if let Err(e) = syscalls::write_once(fd, &buf[..len]) {
        log_error!(settings.log_level, "emergency 500 write failed: {e}");
    }
    conn.state = ConnState::Complete;
}

/// Drives a `Sending` connection one step: refills the streaming buffer
/// from the open body file when drained, then writes as much as the
/// non-blocking socket currently accepts. Mirrors `process_request_write`
/// in the source exactly, including reusing `read_buf` for both roles.
pub fn process_request_write(conn: &mut Connection, settings: &ServerSettings) {
    let _ = try_stream(conn, settings);
}

fn try_stream(conn: &mut Connection, settings: &ServerSettings) -> Result<(), Abort> {
    loop {
        if conn.read_buf_cursor == conn.read_buf_len {
            let file = conn.file.as_mut().expect("Sending state always carries an open body file");
            let n = match std::io::Read::read(file, &mut conn.read_buf) {
                Ok(0) => {
                    conn.state = ConnState::Complete;
                    return Ok(());
                }
                Ok(n) => n,
                Err(e) => {
                    log_error!(settings.log_level, "failed to read from file: {e}");
                    conn.state = ConnState::ErrUnrecoverable;
                    return Err(Abort);
                }
            };
            conn.read_buf_len = n;
            conn.read_buf_cursor = 0;
        }

        let fd = conn.socket.as_raw_fd();
        match syscalls::write_once(fd, &conn.read_buf[conn.read_buf_cursor..conn.read_buf_len]) {
            Ok(n) => conn.read_buf_cursor += n,
            Err(e) if syscalls::would_block(&e) => return Ok(()),
            Err(e) => {
                log_error!(settings.log_level, "failed to write to socket: {e}");
                conn.state = ConnState::ErrUnrecoverable;
                return Err(Abort);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_head_omits_blank_line_for_head() {
        let mut response = HttpResponse::for_method(HttpMethod::Head, StatusCode::Ok);
        response.push_header("Content-Length", "6");
        let mut buf = [0u8; HEADER_BUF_SIZE];
        let len = format_head(&response, &mut buf);
        let text = std::str::from_utf8(&buf[..len]).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(!text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn format_head_includes_blank_line_for_get() {
        let mut response = HttpResponse::for_method(HttpMethod::Get, StatusCode::Ok);
        response.push_header("Content-Length", "6");
        let mut buf = [0u8; HEADER_BUF_SIZE];
        let len = format_head(&response, &mut buf);
        let text = std::str::from_utf8(&buf[..len]).unwrap();
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn format_head_error_response_has_no_blank_line() {
        let mut response = HttpResponse::new(StatusCode::NotFound);
        response.push_header("Content-Length", "0");
        let mut buf = [0u8; HEADER_BUF_SIZE];
        let len = format_head(&response, &mut buf);
        let text = std::str::from_utf8(&buf[..len]).unwrap();
        assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(!text.contains("\r\n\r\n"));
    }

    #[test]
    fn status_mapping_matches_spec_table() {
        assert_eq!(status_for_parse_error(ParseError::InvalidSyntax), StatusCode::BadRequest);
        assert_eq!(status_for_parse_error(ParseError::InvalidMethod), StatusCode::MethodNotAllowed);
        assert_eq!(status_for_parse_error(ParseError::InvalidVersion), StatusCode::VersionNotSupported);
        assert_eq!(status_for_parse_error(ParseError::UriTooLong), StatusCode::UriTooLong);
        assert_eq!(status_for_resolve_error(ResolveError::Forbidden), StatusCode::Forbidden);
        assert_eq!(status_for_resolve_error(ResolveError::NotFound), StatusCode::NotFound);
    }
}
