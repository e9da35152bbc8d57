//! Wire-level HTTP types: methods, versions, status codes, and the
//! arena-backed request/response structures the rest of the core passes
//! around.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Head,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Head => "HEAD",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpVersion {
    Http10,
    Http11,
}

impl HttpVersion {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpVersion::Http10 => "HTTP/1.0",
            HttpVersion::Http11 => "HTTP/1.1",
        }
    }
}

/// Status codes the server can emit. `UriTooLong` is sent on the wire as
/// 514, not the standard 414 — see DESIGN.md for why that discrepancy from
/// the original source is preserved rather than "corrected".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok,
    BadRequest,
    Forbidden,
    NotFound,
    MethodNotAllowed,
    UriTooLong,
    InternalServerError,
    VersionNotSupported,
}

impl StatusCode {
    pub fn code(self) -> u16 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::BadRequest => 400,
            StatusCode::Forbidden => 403,
            StatusCode::NotFound => 404,
            StatusCode::MethodNotAllowed => 405,
            StatusCode::UriTooLong => 514,
            StatusCode::InternalServerError => 500,
            StatusCode::VersionNotSupported => 505,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::Forbidden => "Forbidden",
            StatusCode::NotFound => "Not Found",
            StatusCode::MethodNotAllowed => "Method Not Allowed",
            StatusCode::UriTooLong => "URI Too Long",
            StatusCode::InternalServerError => "Internal Server Error",
            StatusCode::VersionNotSupported => "Version Not Supported",
        }
    }
}

/// A parsed request line. `uri` is a copy living in the connection's arena,
/// not a borrow of the read buffer, so it survives the read buffer being
/// reused as the streaming buffer once the response starts.
///
/// `uri` is raw bytes, not a `&str`: the wire format never guarantees UTF-8,
/// and Linux filenames carry no such guarantee either, so nothing upstream
/// of the filesystem call that actually opens the file should reject a URI
/// on encoding grounds. `original_source/src/http.c`'s `parse_http_req`
/// copies the URI token with a plain `memcpy`, never validates its
/// encoding, and passes it straight through to `resolve_path`'s `snprintf`;
/// this type preserves that behavior instead of narrowing it.
#[derive(Debug, Clone, Copy)]
pub struct HttpRequest<'a> {
    pub method: HttpMethod,
    pub uri: &'a [u8],
    pub version: HttpVersion,
}

/// A response under construction. Headers are kept in insertion order
/// because the wire format requires it and nothing downstream needs to
/// look them up by name.
///
/// Deliberately holds no reference to the originating [`HttpRequest`]: the
/// only thing downstream ever needs from it is "does this carry a body",
/// which is decided once, up front, from the (`Copy`) method — not kept as
/// a live borrow. A request's `uri` borrows the connection's arena, and
/// holding onto that borrow here would make every later mutation of the
/// owning `Connection` (setting `state`, attaching `file`) a borrow-checker
/// conflict for no actual benefit.
pub struct HttpResponse<'a> {
    pub status: StatusCode,
    pub headers: Vec<(&'static str, &'a str)>,
    pub body_size: u64,
    has_body: bool,
}

impl<'a> HttpResponse<'a> {
    /// A response with no associated request (every error reply): never
    /// carries a body, matching `error_response`'s `resp.req = NULL` in the
    /// source.
    pub fn new(status: StatusCode) -> Self {
        HttpResponse {
            status,
            headers: Vec::new(),
            body_size: 0,
            has_body: false,
        }
    }

    /// A response to `method`: carries a body unless `method` is `HEAD`.
    pub fn for_method(method: HttpMethod, status: StatusCode) -> Self {
        HttpResponse {
            status,
            headers: Vec::new(),
            body_size: 0,
            has_body: method != HttpMethod::Head,
        }
    }

    pub fn push_header(&mut self, name: &'static str, value: &'a str) {
        self.headers.push((name, value));
    }

    /// Whether the body (for GET) or the blank separator line (for any
    /// method) follows the header block. HEAD and header-only error
    /// responses never carry one.
    pub fn has_body(&self) -> bool {
        self.has_body
    }
}
