//! Document identifiers and their spill-artifact paths
//!
//! Identifiers are URI-like strings. The on-disk name of a spilled document is
//! derived from its identifier:
//!
//! ```text
//! https://www.example.com/docs/a   ->  https/www.example.com/docs/a.json
//! urn:isbn:0451450523              ->  _/urn%3Aisbn%3A0451450523.json
//! mem://../etc/                    ->  mem/%2E%2E/etc/%.json
//! ```
//!
//! The scheme becomes the first directory; keys without one live under `_`,
//! which no scheme can be. The rest is split on `/` and each segment is
//! percent-encoded so that distinct keys never share a file:
//! - `%`, `\`, control characters and `: * ? " < > |` are escaped
//! - a leading `.` is escaped, so `.` and `..` never reach the filesystem
//! - a directory segment ending in `.json` has that dot escaped, so it cannot
//!   clash with an artifact file
//! - an empty segment is written as a lone `%`, which no escape produces

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use nom::{
    bytes::complete::{tag, take_till, take_while},
    character::complete::{alpha1, char},
    combinator::recognize,
    multi::separated_list0,
    sequence::{pair, terminated},
    IResult,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Extension appended to every spill artifact
pub const ARTIFACT_EXTENSION: &str = "json";

/// Directory holding artifacts of keys without a scheme
const NO_SCHEME_DIR: &str = "_";

/// Characters percent-encoded in artifact path segments
const UNSAFE_PATH_CHARS: &[char] = &['%', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Unique, totally ordered identifier of a document
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentKey(String);

impl DocumentKey {
    /// Create a key, rejecting empty or all-whitespace identifiers
    pub fn new(key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(Error::InvalidArgument(
                "document key cannot be blank".to_string(),
            ));
        }
        Ok(DocumentKey(key))
    }

    /// The identifier as given
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The scheme of the identifier, if it has one (`https` for `https://a/b`)
    pub fn scheme(&self) -> Option<&str> {
        split_scheme(&self.0).0
    }

    /// Relative path of this key's spill artifact under a base directory
    ///
    /// Distinct keys always map to distinct paths.
    pub fn artifact_path(&self) -> Result<PathBuf> {
        let (scheme, rest) = split_scheme(&self.0);
        let (_, segments) = path_segments(rest)?;

        let mut path = PathBuf::from(scheme.unwrap_or(NO_SCHEME_DIR));
        let last = segments.len().saturating_sub(1);
        for (i, segment) in segments.into_iter().enumerate() {
            if i == last {
                path.push(format!("{}.{}", encode_segment(segment, false), ARTIFACT_EXTENSION));
            } else {
                path.push(encode_segment(segment, true));
            }
        }
        Ok(path)
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DocumentKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for DocumentKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        DocumentKey::new(s)
    }
}

impl TryFrom<&str> for DocumentKey {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        DocumentKey::new(value)
    }
}

impl TryFrom<String> for DocumentKey {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        DocumentKey::new(value)
    }
}

impl From<DocumentKey> for String {
    fn from(key: DocumentKey) -> Self {
        key.0
    }
}

fn is_scheme_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')
}

/// Parse a URI scheme followed by `://`
fn scheme(input: &str) -> IResult<&str, &str> {
    terminated(recognize(pair(alpha1, take_while(is_scheme_char))), tag("://"))(input)
}

/// Split `scheme://rest` into its scheme and the remainder
pub fn split_scheme(input: &str) -> (Option<&str>, &str) {
    match scheme(input) {
        Ok((rest, scheme)) => (Some(scheme), rest),
        Err(_) => (None, input),
    }
}

/// Split a path on `/`, keeping empty segments
fn path_segments(input: &str) -> IResult<&str, Vec<&str>> {
    separated_list0(char('/'), take_till(|c| c == '/'))(input)
}

/// Percent-encode one path segment; `is_dir` marks a non-final segment
fn encode_segment(segment: &str, is_dir: bool) -> String {
    if segment.is_empty() {
        return "%".to_string();
    }

    let suffix = format!(".{}", ARTIFACT_EXTENSION);
    let clashing_dot = (is_dir && segment.ends_with(&suffix)).then(|| segment.len() - suffix.len());

    let mut encoded = String::with_capacity(segment.len());
    for (i, c) in segment.char_indices() {
        let escape = UNSAFE_PATH_CHARS.contains(&c)
            || c.is_control()
            || (c == '.' && (i == 0 || Some(i) == clashing_dot));
        if escape {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                encoded.push_str(&format!("%{:02X}", byte));
            }
        } else {
            encoded.push(c);
        }
    }
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_blank_key_rejected() {
        assert!(matches!(DocumentKey::new(""), Err(Error::InvalidArgument(_))));
        assert!(matches!(DocumentKey::new("   "), Err(Error::InvalidArgument(_))));
        assert!(DocumentKey::new("http://a").is_ok());
    }

    #[test]
    fn test_split_scheme() {
        assert_eq!(split_scheme("https://example.com/a"), (Some("https"), "example.com/a"));
        assert_eq!(split_scheme("s3+tls://bucket/x"), (Some("s3+tls"), "bucket/x"));
        assert_eq!(split_scheme("no-scheme/here"), (None, "no-scheme/here"));
        assert_eq!(split_scheme("1http://x"), (None, "1http://x"));
    }

    fn path_of(s: &str) -> PathBuf {
        DocumentKey::new(s).unwrap().artifact_path().unwrap()
    }

    #[test]
    fn test_artifact_path_keeps_scheme() {
        let key = DocumentKey::new("http://www.example.com/document/txt1").unwrap();
        assert_eq!(
            key.artifact_path().unwrap(),
            Path::new("http/www.example.com/document/txt1.json")
        );
        assert_eq!(key.scheme(), Some("http"));
        assert_eq!(path_of("no-scheme/here"), Path::new("_/no-scheme/here.json"));
    }

    #[test]
    fn test_artifact_path_cannot_escape_base() {
        let path = path_of("file://../../etc/passwd");
        assert_eq!(path, Path::new("file/%2E%2E/%2E%2E/etc/passwd.json"));
        assert!(path.is_relative());
        assert_eq!(path_of("file://./x"), Path::new("file/%2E/x.json"));
        assert_eq!(path_of("/abs"), Path::new("_/%/abs.json"));
    }

    #[test]
    fn test_artifact_path_unsafe_chars() {
        assert_eq!(
            path_of("urn:isbn:0451450523"),
            Path::new("_/urn%3Aisbn%3A0451450523.json")
        );
        assert_eq!(path_of("https://host/b?q=1"), Path::new("https/host/b%3Fq=1.json"));
        assert_eq!(path_of("http://a\\b"), Path::new("http/a%5Cb.json"));
        assert_eq!(path_of("http://50%"), Path::new("http/50%25.json"));
    }

    #[test]
    fn test_artifact_path_empty_segments() {
        assert_eq!(path_of("https://"), Path::new("https/%.json"));
        assert_eq!(path_of("http://a/"), Path::new("http/a/%.json"));
        assert_eq!(path_of("http://host//a"), Path::new("http/host/%/a.json"));
    }

    #[test]
    fn test_artifact_path_directory_cannot_clash_with_file() {
        assert_eq!(path_of("http://a/b"), Path::new("http/a/b.json"));
        assert_eq!(path_of("http://a/b.json/c"), Path::new("http/a/b%2Ejson/c.json"));
    }

    #[test]
    fn test_artifact_paths_are_distinct() {
        let keys = [
            "http://same/doc",
            "https://same/doc",
            "same/doc",
            "urn:isbn:1",
            "urn_isbn_1",
            "urn%3Aisbn%3A1",
            "http://a",
            "http://a/",
            "http://a//",
            "http://a/b",
            "http://a\\b",
            "http://a/.b",
            "http://a/%2Eb",
            "http://a/b.json",
            "http://a/b.json/c",
            "http://a/b%2Ejson/c",
            "_://x",
            "x",
        ];
        let paths: std::collections::HashSet<PathBuf> =
            keys.iter().map(|k| path_of(k)).collect();
        assert_eq!(paths.len(), keys.len());
    }

    #[test]
    fn test_key_order_and_serde() {
        let a = DocumentKey::new("http://a").unwrap();
        let b = DocumentKey::new("http://b").unwrap();
        assert!(a < b);

        let json = serde_json::to_string(&a).unwrap();
        assert_eq!(json, "\"http://a\"");
        let back: DocumentKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, a);
        assert!(serde_json::from_str::<DocumentKey>("\" \"").is_err());
    }
}
