//! URI parsing and the string builtins that don't belong to the function
//! registry proper: `SUBSTRING`, `IS_VALID_HOST_LABEL`, `PARSE_URL`,
//! `URI_ENCODE`.

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};

/// A parsed URI, exposing the fixed field set §4.7 documents:
/// `scheme`, `path`, `normalizedPath`, `authority`, `isIp`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Uri {
    scheme: String,
    authority: String,
    path: String,
    normalized_path: String,
    is_ip: bool,
}

impl Uri {
    /// The URI scheme, e.g. `"https"`.
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// The authority component (host, optionally `host:port`).
    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// The path component, exactly as it appeared in the source string.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The path with a single trailing `/` guaranteed and no duplicate
    /// leading slash.
    pub fn normalized_path(&self) -> &str {
        &self.normalized_path
    }

    /// Whether the authority's host is a literal IPv4 or IPv6 address.
    pub fn is_ip(&self) -> bool {
        self.is_ip
    }

    /// Reads one of the four fixed fields by name, for `GET_PROPERTY` on a
    /// URI object. Unknown names are not reachable here; the attribute
    /// resolver only calls this with names it already validated.
    pub fn field(&self, name: &str) -> Option<crate::value::TypedValue> {
        use crate::value::TypedValue;
        match name {
            "scheme" => Some(TypedValue::from(self.scheme.as_str())),
            "authority" => Some(TypedValue::from(self.authority.as_str())),
            "path" => Some(TypedValue::from(self.path.as_str())),
            "normalizedPath" => Some(TypedValue::from(self.normalized_path.as_str())),
            "isIp" => Some(TypedValue::from(self.is_ip)),
            _ => None,
        }
    }
}

/// `parseURL(s)`: returns `None` if the string has a query component,
/// cannot be split into scheme/authority/path, or is otherwise malformed.
pub fn parse_url(input: &str) -> Option<Uri> {
    let (scheme, rest) = input.split_once("://")?;
    if scheme.is_empty() {
        return None;
    }
    // A query component makes the URL ineligible for endpoint use.
    if rest.contains('?') {
        return None;
    }
    let (authority, path) = match rest.find('/') {
        Some(idx) => (&rest[..idx], &rest[idx..]),
        None => (rest, ""),
    };
    if authority.is_empty() {
        return None;
    }
    let host = authority.rsplit_once(':').map(|(h, _)| h).unwrap_or(authority);
    let is_ip = is_ip_literal(host);
    let normalized_path = normalize_path(path);
    Some(Uri {
        scheme: scheme.to_owned(),
        authority: authority.to_owned(),
        path: path.to_owned(),
        normalized_path,
        is_ip,
    })
}

fn normalize_path(path: &str) -> String {
    if path.is_empty() {
        return "/".to_owned();
    }
    if path.ends_with('/') {
        path.to_owned()
    } else {
        let mut normalized = String::with_capacity(path.len() + 1);
        normalized.push_str(path);
        normalized.push('/');
        normalized
    }
}

fn is_ip_literal(host: &str) -> bool {
    let bracketed = host.strip_prefix('[').and_then(|h| h.strip_suffix(']'));
    if let Some(v6) = bracketed {
        return v6.parse::<std::net::Ipv6Addr>().is_ok();
    }
    host.parse::<std::net::Ipv4Addr>().is_ok()
}

/// `isValidHostLabel(s, allowDots)`: a DNS label is 1-63 characters, starts
/// and ends with an alphanumeric, and contains only alphanumerics and `-`
/// (plus `.` as a label separator when `allow_dots` is set).
pub fn is_valid_host_label(input: &str, allow_dots: bool) -> bool {
    if input.is_empty() {
        return false;
    }
    if allow_dots {
        return input.split('.').all(|label| is_valid_single_label(label));
    }
    is_valid_single_label(input)
}

fn is_valid_single_label(label: &str) -> bool {
    if label.is_empty() || label.len() > 63 {
        return false;
    }
    let bytes = label.as_bytes();
    let first_ok = bytes[0].is_ascii_alphanumeric();
    let last_ok = bytes[bytes.len() - 1].is_ascii_alphanumeric();
    first_ok && last_ok && bytes.iter().all(|b| b.is_ascii_alphanumeric() || *b == b'-')
}

/// `SUBSTRING(start, end, reverse)`: out-of-range bounds (start/end beyond
/// the string's length, or `start >= end`) yield `None` rather than
/// panicking. Indexing is by byte, matching the `u8` operand width; inputs
/// are expected to be ASCII host-name fragments in practice.
pub fn substring(input: &str, start: u8, end: u8, reverse: bool) -> Option<String> {
    let bytes = input.as_bytes();
    let len = bytes.len();
    let (start, end) = (start as usize, end as usize);
    if start >= end || end > len {
        return None;
    }
    let (start, end) = if reverse {
        (len - end, len - start)
    } else {
        (start, end)
    };
    std::str::from_utf8(&bytes[start..end]).ok().map(str::to_owned)
}

/// Characters that must be percent-encoded in a URI component, beyond the
/// `CONTROLS` set: unreserved-minus-everything, per RFC 3986 §2.3 plus the
/// common extra-safe set most SDKs also encode.
const URI_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'/')
    .add(b':')
    .add(b';')
    .add(b'=')
    .add(b'@')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'|')
    .add(b'+')
    .add(b',')
    .add(b'!')
    .add(b'$')
    .add(b'&')
    .add(b'\'')
    .add(b'(')
    .add(b')')
    .add(b'*');

/// `uriEncode(s)`: percent-encodes everything outside the unreserved set.
pub fn uri_encode(input: &str) -> String {
    utf8_percent_encode(input, URI_ENCODE_SET).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_url_rejects_query() {
        assert!(parse_url("https://x/y?z=1").is_none());
    }

    #[test]
    fn parse_url_splits_scheme_authority_path() {
        let uri = parse_url("https://x/y").unwrap();
        assert_eq!(uri.scheme(), "https");
        assert_eq!(uri.authority(), "x");
        assert_eq!(uri.path(), "/y");
    }

    #[test]
    fn parse_url_detects_ip_authority() {
        let uri = parse_url("http://127.0.0.1:8080/").unwrap();
        assert!(uri.is_ip());
        let uri = parse_url("http://example.com/").unwrap();
        assert!(!uri.is_ip());
    }

    #[test]
    fn substring_reverse_and_out_of_range() {
        assert_eq!(substring("abcdefgh", 0, 4, true).as_deref(), Some("efgh"));
        assert_eq!(substring("ab", 0, 4, true), None);
    }

    #[test]
    fn host_label_validation() {
        assert!(is_valid_host_label("bucket-1", false));
        assert!(!is_valid_host_label("-bucket", false));
        assert!(is_valid_host_label("a.b.c", true));
        assert!(!is_valid_host_label("a.b.c", false));
    }

    #[test]
    fn uri_encode_escapes_reserved_characters() {
        assert_eq!(uri_encode("a b/c"), "a%20b%2Fc");
    }
}
