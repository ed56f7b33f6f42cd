//! Protocol version strings as carried in request metadata.

use http::Version;

const MAX_VERSION_PART: u32 = 1_000_000;

/// Render a version the way it travels on the wire (`HTTP/1.1`, `HTTP/2.0`, ...).
pub fn format_version(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "HTTP/0.9",
        Version::HTTP_10 => "HTTP/1.0",
        Version::HTTP_2 => "HTTP/2.0",
        Version::HTTP_3 => "HTTP/3.0",
        _ => "HTTP/1.1",
    }
}

/// Parse `HTTP/<major>.<minor>` into its numeric parts.
pub fn parse_version(proto: &str) -> Option<(u32, u32)> {
    match proto {
        "HTTP/1.1" => return Some((1, 1)),
        "HTTP/1.0" => return Some((1, 0)),
        _ => {}
    }
    let rest = proto.strip_prefix("HTTP/")?;
    let (major, minor) = rest.split_once('.')?;
    Some((parse_part(major)?, parse_part(minor)?))
}

fn parse_part(part: &str) -> Option<u32> {
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    part.parse().ok().filter(|n| *n <= MAX_VERSION_PART)
}

/// Map parsed version numbers onto the versions `http` can represent.
pub fn to_http_version(major: u32, minor: u32) -> Option<Version> {
    match (major, minor) {
        (0, 9) => Some(Version::HTTP_09),
        (1, 0) => Some(Version::HTTP_10),
        (1, 1) => Some(Version::HTTP_11),
        (2, 0) => Some(Version::HTTP_2),
        (3, 0) => Some(Version::HTTP_3),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_versions() {
        assert_eq!(parse_version("HTTP/1.1"), Some((1, 1)));
        assert_eq!(parse_version("HTTP/1.0"), Some((1, 0)));
        assert_eq!(parse_version("HTTP/2.0"), Some((2, 0)));
        assert_eq!(parse_version("HTTP/10.42"), Some((10, 42)));
    }

    #[test]
    fn rejects_malformed_versions() {
        for proto in ["", "HTTP", "HTTP/", "HTTP/1", "HTTP/1.", "HTTP/a.b", "HTTP/+1.1", "HTTPS/1.1", "http/1.1", "HTTP/1.1.1", "HTTP/2000000.0"] {
            assert_eq!(parse_version(proto), None, "{proto:?} should not parse");
        }
    }

    #[test]
    fn round_trips_known_versions() {
        for version in [Version::HTTP_09, Version::HTTP_10, Version::HTTP_11, Version::HTTP_2, Version::HTTP_3] {
            let (major, minor) = parse_version(format_version(version)).unwrap();
            assert_eq!(to_http_version(major, minor), Some(version));
        }
        assert_eq!(to_http_version(1, 5), None);
    }
}
