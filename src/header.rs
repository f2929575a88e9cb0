//! Response header rewriting for compressed bodies.

use crate::codec::Codec;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use std::borrow::Cow;

/// Read/write access to a response's headers.
///
/// Names are [`HeaderName`]s, which are always lower-case, so hosts that
/// store headers case-sensitively see canonical names.
pub trait HeaderAccess {
    /// Returns the header's value, with repeated field lines joined by `", "`.
    ///
    /// Lines that are not valid text are left out.
    fn get_header(&self, name: &HeaderName) -> Option<Cow<'_, str>>;

    /// Returns true if some line of the header is not valid text.
    fn has_opaque_value(&self, _name: &HeaderName) -> bool {
        false
    }

    /// Replaces every value of the header with `value`.
    fn set_header(&mut self, name: HeaderName, value: HeaderValue);

    /// Adds `value` as another line, keeping the existing ones.
    fn append_header(&mut self, name: HeaderName, value: HeaderValue);

    /// Removes the header entirely.
    fn remove_header(&mut self, name: &HeaderName);
}

impl HeaderAccess for HeaderMap {
    fn get_header(&self, name: &HeaderName) -> Option<Cow<'_, str>> {
        let mut values = self
            .get_all(name)
            .into_iter()
            .filter_map(|v| v.to_str().ok());
        let first = values.next()?;
        match values.next() {
            None => Some(Cow::Borrowed(first)),
            Some(second) => {
                let mut joined = format!("{first}, {second}");
                for value in values {
                    joined.push_str(", ");
                    joined.push_str(value);
                }
                Some(Cow::Owned(joined))
            }
        }
    }

    fn has_opaque_value(&self, name: &HeaderName) -> bool {
        self.get_all(name).into_iter().any(|v| v.to_str().is_err())
    }

    fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.insert(name, value);
    }

    fn append_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.append(name, value);
    }

    fn remove_header(&mut self, name: &HeaderName) {
        self.remove(name);
    }
}

const ACCEPT_ENCODING: &str = "Accept-Encoding";

/// Computes the `Vary` value for a response that varies on `Accept-Encoding`.
///
/// Applying the result again leaves it unchanged.
pub fn merge_vary(existing: Option<&str>) -> Cow<'_, str> {
    let Some(existing) = existing.map(str::trim).filter(|v| !v.is_empty()) else {
        return Cow::Borrowed(ACCEPT_ENCODING);
    };

    let covered = existing.split(',').any(|v| {
        let v = v.trim();
        v == "*" || v.eq_ignore_ascii_case(ACCEPT_ENCODING)
    });
    if covered {
        Cow::Borrowed(existing)
    } else {
        Cow::Owned(format!("{existing}, {ACCEPT_ENCODING}"))
    }
}

/// Rewrites headers for a body that is about to be compressed with `codec`.
///
/// Sets `Content-Encoding`, merges `Vary`, and drops `Content-Length` and
/// `Accept-Ranges`, which describe the uncompressed body. Must run before any
/// compressed byte is produced.
pub fn apply_headers<H>(headers: &mut H, codec: Codec)
where
    H: HeaderAccess + ?Sized,
{
    headers.set_header(
        header::CONTENT_ENCODING,
        HeaderValue::from_static(codec.content_encoding()),
    );

    let existing = headers.get_header(&header::VARY).map(Cow::into_owned);
    if headers.has_opaque_value(&header::VARY) {
        // Lines that cannot be read back are kept verbatim
        if merge_vary(existing.as_deref()) != existing.as_deref().unwrap_or_default() {
            headers.append_header(header::VARY, HeaderValue::from_static(ACCEPT_ENCODING));
        }
    } else if let Ok(value) = HeaderValue::from_str(&merge_vary(existing.as_deref())) {
        // Rewritten even when unchanged so repeated field lines collapse into one
        headers.set_header(header::VARY, value);
    }

    headers.remove_header(&header::CONTENT_LENGTH);
    headers.remove_header(&header::ACCEPT_RANGES);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn headers<I>(pairs: I) -> HeaderMap
    where
        I: IntoIterator<Item = (&'static str, &'static str)>,
    {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(name, HeaderValue::from_static(value));
        }
        map
    }

    fn vary_values(map: &HeaderMap) -> Vec<&str> {
        map.get_all(header::VARY)
            .into_iter()
            .map(|v| v.to_str().unwrap())
            .collect()
    }

    #[test]
    fn test_merge_vary() {
        assert_eq!(merge_vary(None), "Accept-Encoding");
        assert_eq!(merge_vary(Some("")), "Accept-Encoding");
        assert_eq!(merge_vary(Some("*")), "*");
        assert_eq!(merge_vary(Some("Origin")), "Origin, Accept-Encoding");
        assert_eq!(merge_vary(Some("accept-encoding")), "accept-encoding");
        assert_eq!(
            merge_vary(Some("Origin, accept-encoding")),
            "Origin, accept-encoding"
        );
    }

    #[test]
    fn test_merge_vary_idempotent() {
        for input in [None, Some("*"), Some("Origin"), Some("Origin, Cookie")] {
            let once = merge_vary(input).into_owned();
            let twice = merge_vary(Some(once.as_str())).into_owned();
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_apply_sets_content_encoding() {
        let mut map = HeaderMap::new();
        apply_headers(&mut map, Codec::Deflate);
        assert_eq!(map.get(header::CONTENT_ENCODING).unwrap(), "deflate");
    }

    #[test]
    fn test_apply_vary_absent() {
        let mut map = HeaderMap::new();
        apply_headers(&mut map, Codec::Gzip);
        assert_eq!(vary_values(&map), vec!["Accept-Encoding"]);
    }

    #[test]
    fn test_apply_vary_star() {
        let mut map = headers([("vary", "*")]);
        apply_headers(&mut map, Codec::Gzip);
        assert_eq!(vary_values(&map), vec!["*"]);
    }

    #[test]
    fn test_apply_vary_appended() {
        let mut map = headers([("vary", "Origin")]);
        apply_headers(&mut map, Codec::Gzip);
        assert_eq!(vary_values(&map), vec!["Origin, Accept-Encoding"]);
    }

    #[test]
    fn test_apply_vary_multiple_lines_collapsed() {
        let mut map = headers([("vary", "Origin"), ("vary", "Cookie")]);
        apply_headers(&mut map, Codec::Gzip);
        assert_eq!(vary_values(&map), vec!["Origin, Cookie, Accept-Encoding"]);
    }

    #[test]
    fn test_apply_vary_covered_lines_collapsed() {
        let mut map = headers([("vary", "Origin"), ("vary", "Accept-Encoding")]);
        apply_headers(&mut map, Codec::Gzip);
        assert_eq!(vary_values(&map), vec!["Origin, Accept-Encoding"]);
    }

    fn raw_vary(map: &HeaderMap) -> Vec<&[u8]> {
        map.get_all(header::VARY).into_iter().map(|v| v.as_bytes()).collect()
    }

    #[test]
    fn test_apply_keeps_opaque_vary_lines() {
        let mut map = HeaderMap::new();
        map.append(header::VARY, HeaderValue::from_bytes(b"X-\xffFoo").unwrap());
        assert!(map.has_opaque_value(&header::VARY));

        apply_headers(&mut map, Codec::Gzip);
        assert_eq!(raw_vary(&map), vec![&b"X-\xffFoo"[..], &b"Accept-Encoding"[..]]);

        apply_headers(&mut map, Codec::Gzip);
        assert_eq!(raw_vary(&map), vec![&b"X-\xffFoo"[..], &b"Accept-Encoding"[..]]);
    }

    #[test]
    fn test_opaque_vary_with_star_untouched() {
        let mut map = HeaderMap::new();
        map.append(header::VARY, HeaderValue::from_bytes(b"X-\xffFoo").unwrap());
        map.append(header::VARY, HeaderValue::from_static("*"));

        apply_headers(&mut map, Codec::Deflate);
        assert_eq!(raw_vary(&map), vec![&b"X-\xffFoo"[..], &b"*"[..]]);
    }

    #[test]
    fn test_apply_twice_is_idempotent() {
        let mut map = headers([("vary", "Origin")]);
        apply_headers(&mut map, Codec::Gzip);
        apply_headers(&mut map, Codec::Gzip);
        assert_eq!(vary_values(&map), vec!["Origin, Accept-Encoding"]);
        assert_eq!(map.get_all(header::CONTENT_ENCODING).iter().count(), 1);
    }

    #[test]
    fn test_apply_removes_length_and_ranges() {
        let mut map = headers([("content-length", "2048"), ("accept-ranges", "bytes")]);
        apply_headers(&mut map, Codec::Gzip);
        assert!(map.get(header::CONTENT_LENGTH).is_none());
        assert!(map.get(header::ACCEPT_RANGES).is_none());
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let mut map = HeaderMap::new();
        map.insert(
            HeaderName::from_bytes(b"VARY").unwrap(),
            HeaderValue::from_static("Origin"),
        );
        assert_eq!(map.get_header(&header::VARY).as_deref(), Some("Origin"));

        apply_headers(&mut map, Codec::Gzip);
        assert_eq!(map.get("Vary").unwrap(), "Origin, Accept-Encoding");
    }

    /// A host that stores header names verbatim.
    #[derive(Default)]
    struct CaseSensitiveHost {
        headers: HashMap<String, String>,
    }

    impl HeaderAccess for CaseSensitiveHost {
        fn get_header(&self, name: &HeaderName) -> Option<Cow<'_, str>> {
            self.headers.get(name.as_str()).map(|v| Cow::Borrowed(v.as_str()))
        }

        fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
            self.headers
                .insert(name.as_str().to_owned(), value.to_str().unwrap().to_owned());
        }

        fn append_header(&mut self, name: HeaderName, value: HeaderValue) {
            let value = value.to_str().unwrap();
            self.headers
                .entry(name.as_str().to_owned())
                .and_modify(|v| {
                    v.push_str(", ");
                    v.push_str(value);
                })
                .or_insert_with(|| value.to_owned());
        }

        fn remove_header(&mut self, name: &HeaderName) {
            self.headers.remove(name.as_str());
        }
    }

    #[test]
    fn test_case_sensitive_host_sees_canonical_names() {
        let mut host = CaseSensitiveHost::default();
        host.headers.insert("vary".into(), "Origin".into());
        host.headers.insert("content-length".into(), "10".into());

        apply_headers(&mut host, Codec::Brotli);

        assert_eq!(host.headers["content-encoding"], "br");
        assert_eq!(host.headers["vary"], "Origin, Accept-Encoding");
        assert!(!host.headers.contains_key("content-length"));
    }
}
