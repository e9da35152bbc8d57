//! Request-line parser.
//!
//! Headers are never parsed: nothing downstream depends on a request
//! header, so the server reads exactly one request line and ignores
//! whatever bytes follow it in the buffer.

use crate::arena::Arena;
use crate::http::{HttpMethod, HttpRequest, HttpVersion};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    InvalidSyntax,
    InvalidMethod,
    InvalidVersion,
    UriTooLong,
}

/// Parses the request line out of `data` (the bytes read off the socket)
/// and copies the URI into `arena`. `uri_length_limit` bounds the URI
/// token's length, not the whole request line.
pub fn parse_request<'a>(
    data: &[u8],
    uri_length_limit: usize,
    arena: &'a Arena,
) -> Result<HttpRequest<'a>, ParseError> {
    let line_end = find(data, b'\r').ok_or(ParseError::InvalidSyntax)?;
    let line = &data[..line_end];

    let method_end = find(line, b' ').ok_or(ParseError::InvalidSyntax)?;
    let method_token = &line[..method_end];
    let method = parse_method(method_token)?;

    let after_method = &line[method_end..];
    let method_spaces = skip_spaces(after_method);
    if method_spaces == 0 {
        return Err(ParseError::InvalidSyntax);
    }
    let rest = &after_method[method_spaces..];

    let uri_end = find(rest, b' ').ok_or(ParseError::InvalidSyntax)?;
    let uri_token = &rest[..uri_end];
    if uri_token.len() > uri_length_limit {
        return Err(ParseError::UriTooLong);
    }

    let after_uri = &rest[uri_end..];
    let uri_spaces = skip_spaces(after_uri);
    if uri_spaces == 0 {
        return Err(ParseError::InvalidSyntax);
    }
    let version_token = &after_uri[uri_spaces..];
    let version = parse_version(version_token)?;

    Ok(HttpRequest {
        method,
        uri: arena.alloc_bytes(uri_token),
        version,
    })
}

fn parse_method(token: &[u8]) -> Result<HttpMethod, ParseError> {
    match token {
        b"GET" => Ok(HttpMethod::Get),
        b"HEAD" => Ok(HttpMethod::Head),
        _ => Err(ParseError::InvalidMethod),
    }
}

fn parse_version(token: &[u8]) -> Result<HttpVersion, ParseError> {
    match token {
        b"HTTP/1.1" => Ok(HttpVersion::Http11),
        b"HTTP/1.0" => Ok(HttpVersion::Http10),
        _ => Err(ParseError::InvalidVersion),
    }
}

fn find(haystack: &[u8], needle: u8) -> Option<usize> {
    haystack.iter().position(|&b| b == needle)
}

fn skip_spaces(data: &[u8]) -> usize {
    data.iter().take_while(|&&b| b == b' ').count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str, limit: usize) -> Result<(HttpMethod, Vec<u8>, HttpVersion), ParseError> {
        let arena = Arena::new();
        let req = parse_request(line.as_bytes(), limit, &arena)?;
        Ok((req.method, req.uri.to_vec(), req.version))
    }

    #[test]
    fn parses_simple_get() {
        let (method, uri, version) = parse("GET / HTTP/1.1\r\n\r\n", 2048).unwrap();
        assert_eq!(method, HttpMethod::Get);
        assert_eq!(uri, b"/");
        assert_eq!(version, HttpVersion::Http11);
    }

    #[test]
    fn parses_head_http_10() {
        let (method, uri, version) = parse("HEAD /a/b.txt HTTP/1.0\r\n\r\n", 2048).unwrap();
        assert_eq!(method, HttpMethod::Head);
        assert_eq!(uri, b"/a/b.txt");
        assert_eq!(version, HttpVersion::Http10);
    }

    #[test]
    fn uri_with_non_utf8_byte_parses_without_error() {
        // Raw high-bit byte in the URI token: not valid UTF-8, but a real
        // possibility on Linux, whose filesystems don't require filenames to
        // be UTF-8. The parser copies it through untouched rather than
        // rejecting it with 400.
        let mut line = b"GET /a\xffb HTTP/1.1\r\n\r\n".to_vec();
        let arena = Arena::new();
        let req = parse_request(&line, 2048, &arena).unwrap();
        assert_eq!(req.uri, b"/a\xffb");
        line.clear(); // arena holds its own copy, independent of the source buffer
    }

    #[test]
    fn rejects_unknown_method() {
        assert_eq!(
            parse("POST / HTTP/1.1\r\n\r\n", 2048).unwrap_err(),
            ParseError::InvalidMethod
        );
    }

    #[test]
    fn rejects_unknown_version() {
        assert_eq!(
            parse("GET / HTTP/2.0\r\n\r\n", 2048).unwrap_err(),
            ParseError::InvalidVersion
        );
    }

    #[test]
    fn rejects_uri_over_limit() {
        assert_eq!(
            parse("GET /aaaaaaaaaa HTTP/1.1\r\n\r\n", 4).unwrap_err(),
            ParseError::UriTooLong
        );
    }

    #[test]
    fn rejects_missing_crlf() {
        assert_eq!(parse("GET / HTTP/1.1", 2048).unwrap_err(), ParseError::InvalidSyntax);
    }

    #[test]
    fn rejects_missing_version() {
        assert_eq!(parse("GET /\r\n\r\n", 2048).unwrap_err(), ParseError::InvalidSyntax);
    }
}
