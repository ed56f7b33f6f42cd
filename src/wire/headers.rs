//! Header flattening and merging.

use http::header::{HeaderMap, HeaderName, HeaderValue, EXPECT};

use super::{HttpHeader, WireError};

/// Flatten a header map into one entry per distinct name.
///
/// Values keep their original order. Non-UTF-8 bytes are replaced, since the wire
/// carries header values as protobuf strings.
pub fn flatten_headers(headers: &HeaderMap) -> Vec<HttpHeader> {
    headers
        .keys()
        .map(|name| HttpHeader {
            header: name.as_str().to_owned(),
            values: headers
                .get_all(name)
                .iter()
                .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
                .collect(),
        })
        .collect()
}

/// Merge wire header entries into `target`.
///
/// Every name present in `entries` has its previous values replaced by the
/// entry's values; an entry with no values removes the header. Names are
/// canonicalized to their lowercase form. Nothing is modified if any entry is invalid.
pub fn merge_headers_replace(target: &mut HeaderMap, entries: &[HttpHeader]) -> Result<(), WireError> {
    let mut decoded = Vec::with_capacity(entries.len());
    for entry in entries {
        let name = HeaderName::from_bytes(entry.header.as_bytes())
            .map_err(|_| WireError::InvalidHeaderName(entry.header.clone()))?;
        let values = entry
            .values
            .iter()
            .map(|v| HeaderValue::from_str(v).map_err(|_| WireError::InvalidHeaderValue(entry.header.clone())))
            .collect::<Result<Vec<_>, _>>()?;
        decoded.push((name, values));
    }

    for (name, values) in decoded {
        target.remove(&name);
        for value in values {
            target.append(name.clone(), value);
        }
    }
    Ok(())
}

/// Whether the headers declare `Expect: 100-continue`.
pub fn is_expect_continue(headers: &HeaderMap) -> bool {
    headers
        .get(EXPECT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("100-continue"))
}
