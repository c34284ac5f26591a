//! Media locators and RTP destinations.
//!
//! A locator is a `scheme:remainder` string naming a source or a sink:
//!
//! ```text
//! file:///media/clip.mjpeg   source file
//! file:/media/clip.mjpeg     single-slash form of the same
//! /media/clip.mjpeg          bare path, treated as file
//! rtp://10.0.0.2:42050/video RTP destination
//! ```

use std::fmt;
use std::path::PathBuf;

use crate::error::BackendError;

pub const DEFAULT_STREAM_NAME: &str = "video";

/// URI-like name of a media source or sink.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaLocator(String);

impl MediaLocator {
    pub fn new(locator: impl Into<String>) -> Self {
        Self(locator.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Split `scheme:rest`. A one-letter prefix is a drive letter, not a
    /// scheme, so `C:/clip.mjpeg` stays a bare path.
    fn split_scheme(&self) -> Option<(&str, &str)> {
        let (scheme, rest) = self.0.split_once(':')?;
        let mut chars = scheme.chars();
        let valid = scheme.len() > 1
            && chars.next().is_some_and(|c| c.is_ascii_alphabetic())
            && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
        valid.then_some((scheme, rest))
    }

    /// Scheme before the first `:`; bare paths report `file`.
    pub fn scheme(&self) -> &str {
        self.split_scheme().map_or("file", |(scheme, _)| scheme)
    }

    /// Everything after `scheme:` with any leading `//` removed, or the
    /// whole string for bare paths.
    pub fn remainder(&self) -> &str {
        match self.split_scheme() {
            Some((_, rest)) => rest.strip_prefix("//").unwrap_or(rest),
            None => &self.0,
        }
    }

    /// Filesystem path for `file` locators. Accepts `file:///p`, `file:/p`
    /// and bare paths; `file:/C:/p` maps to the drive path `C:/p`.
    pub fn file_path(&self) -> Option<PathBuf> {
        if self.scheme() != "file" || self.is_empty() {
            return None;
        }
        let path = self.remainder();
        let bytes = path.as_bytes();
        let drive = bytes.len() >= 3
            && bytes[0] == b'/'
            && bytes[1].is_ascii_alphabetic()
            && bytes[2] == b':';
        Some(PathBuf::from(if drive { &path[1..] } else { path }))
    }
}

impl fmt::Display for MediaLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MediaLocator {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Remote endpoint of a transmission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub host: String,
    pub port: u16,
    pub stream_name: String,
}

impl Destination {
    /// Destination carrying the default `video` stream name.
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            stream_name: DEFAULT_STREAM_NAME.to_string(),
        }
    }

    /// `rtp://{host}:{port}/{stream}` descriptor handed to the sink.
    pub fn locator(&self) -> MediaLocator {
        MediaLocator(format!(
            "rtp://{}:{}/{}",
            self.host, self.port, self.stream_name
        ))
    }

    /// `host:port` for socket address resolution.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Parse an `rtp://host:port/stream` locator.
    ///
    /// ```
    /// use vidcast::locator::{Destination, MediaLocator};
    ///
    /// let dest = Destination::parse(&MediaLocator::new("rtp://10.0.0.2:42050/video")).unwrap();
    /// assert_eq!(dest.host, "10.0.0.2");
    /// assert_eq!(dest.port, 42050);
    /// assert_eq!(dest.stream_name, "video");
    /// ```
    pub fn parse(locator: &MediaLocator) -> Result<Self, BackendError> {
        let invalid = || BackendError::Unsupported(format!("not an RTP destination: {locator}"));

        if locator.scheme() != "rtp" {
            return Err(invalid());
        }
        let rest = locator.remainder();
        let (authority, stream) = match rest.split_once('/') {
            Some((authority, stream)) if !stream.is_empty() => (authority, stream),
            Some((authority, _)) => (authority, DEFAULT_STREAM_NAME),
            None => (rest, DEFAULT_STREAM_NAME),
        };
        let (host, port) = authority.rsplit_once(':').ok_or_else(invalid)?;
        let port: u16 = port.parse().map_err(|_| invalid())?;
        if host.is_empty() || port == 0 {
            return Err(invalid());
        }

        Ok(Self {
            host: host.to_string(),
            port,
            stream_name: stream.to_string(),
        })
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.locator())
    }
}
