// Playback sources
// Local files and remote URLs, disambiguated from the string form

use std::fmt;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::probe::Hint;

use crate::config::PlayerConfig;
use crate::error::{PlayerError, Result};

/// Identifies the audio content to play.
///
/// Strings starting with `http://` or `https://` are remote; everything
/// else is treated as a local file path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Local(PathBuf),
    Remote(String),
}

impl Source {
    /// Classify a source string.
    pub fn parse(s: &str) -> Source {
        if s.starts_with("http://") || s.starts_with("https://") {
            Source::Remote(s.to_string())
        } else {
            Source::Local(PathBuf::from(s))
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Source::Remote(_))
    }

    /// Remote streams are read straight off the socket and cannot seek.
    pub fn is_seekable(&self) -> bool {
        matches!(self, Source::Local(_))
    }

    /// Open the source into a stream the decoder can probe.
    pub(crate) fn open(&self, config: &PlayerConfig) -> Result<OpenedSource> {
        match self {
            Source::Local(path) => {
                if path.as_os_str().is_empty() {
                    return Err(PlayerError::InvalidSource("empty source".into()));
                }
                let file = std::fs::File::open(path)?;
                Ok(OpenedSource {
                    stream: MediaSourceStream::new(Box::new(file), Default::default()),
                    hint: self.extension_hint(),
                    seekable: true,
                })
            }
            Source::Remote(url) => {
                let client = reqwest::blocking::Client::builder()
                    .connect_timeout(config.connect_timeout())
                    // No overall timeout: endless streams stay connected
                    .timeout(None::<std::time::Duration>)
                    .build()?;
                let response = client.get(url).send()?.error_for_status()?;
                let len = response.content_length();
                let body = RemoteStream {
                    body: Mutex::new(response),
                    len,
                };
                Ok(OpenedSource {
                    stream: MediaSourceStream::new(Box::new(body), Default::default()),
                    hint: self.extension_hint(),
                    seekable: false,
                })
            }
        }
    }

    /// Extension-based format hint for the probe.
    fn extension_hint(&self) -> Hint {
        let mut hint = Hint::new();
        if let Some(ext) = self.extension_of() {
            hint.with_extension(&ext);
        }
        hint
    }

    fn extension_of(&self) -> Option<String> {
        match self {
            Source::Local(path) => path
                .extension()
                .and_then(|e| e.to_str())
                .map(str::to_string),
            Source::Remote(url) => url
                .split(|c| c == '?' || c == '#')
                .next()
                .and_then(|path| path.rsplit('/').next())
                .and_then(|name| name.rsplit_once('.'))
                .map(|(_, ext)| ext.to_string()),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Local(path) => write!(f, "{}", path.display()),
            Source::Remote(url) => f.write_str(url),
        }
    }
}

impl From<&str> for Source {
    fn from(s: &str) -> Source {
        Source::parse(s)
    }
}

impl From<String> for Source {
    fn from(s: String) -> Source {
        Source::parse(&s)
    }
}

impl From<&Path> for Source {
    fn from(path: &Path) -> Source {
        Source::Local(path.to_path_buf())
    }
}

impl From<PathBuf> for Source {
    fn from(path: PathBuf) -> Source {
        Source::Local(path)
    }
}

/// A probed-ready media stream plus what the decoder needs to know.
pub(crate) struct OpenedSource {
    pub stream: MediaSourceStream,
    pub hint: Hint,
    pub seekable: bool,
}

/// HTTP response body wrapped as an unseekable Symphonia media source.
struct RemoteStream {
    body: Mutex<reqwest::blocking::Response>,
    len: Option<u64>,
}

impl Read for RemoteStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.body.get_mut().read(buf)
    }
}

impl Seek for RemoteStream {
    fn seek(&mut self, _pos: SeekFrom) -> std::io::Result<u64> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "remote streams are not seekable",
        ))
    }
}

impl MediaSource for RemoteStream {
    fn is_seekable(&self) -> bool {
        false
    }

    fn byte_len(&self) -> Option<u64> {
        self.len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_urls_are_remote() {
        assert!(Source::parse("http://example.com/a.mp3").is_remote());
        assert!(Source::parse("https://example.com/a.flac").is_remote());
    }

    #[test]
    fn test_paths_are_local() {
        assert!(!Source::parse("/music/track.flac").is_remote());
        assert!(!Source::parse("relative/track.ogg").is_remote());
        // A scheme-less host-looking string is still a path
        assert!(!Source::parse("example.com/a.mp3").is_remote());
    }

    #[test]
    fn test_extension_from_path() {
        assert_eq!(
            Source::parse("/music/track.flac").extension_of().as_deref(),
            Some("flac")
        );
        assert_eq!(Source::parse("/music/track").extension_of(), None);
    }

    #[test]
    fn test_extension_from_url_ignores_query() {
        let source = Source::parse("https://cdn.example.com/albums/01.mp3?token=abc#t=10");
        assert_eq!(source.extension_of().as_deref(), Some("mp3"));
    }

    #[test]
    fn test_only_local_sources_are_seekable() {
        assert!(Source::parse("/music/track.flac").is_seekable());
        assert!(!Source::parse("https://example.com/a.mp3").is_seekable());
    }

    #[test]
    fn test_opening_empty_path_is_rejected() {
        let err = Source::parse("").open(&PlayerConfig::default()).unwrap_err();
        assert!(matches!(err, PlayerError::InvalidSource(_)));
    }

    #[test]
    fn test_from_conversions() {
        assert_eq!(
            Source::from("https://example.com/a.mp3"),
            Source::Remote("https://example.com/a.mp3".to_string())
        );
        assert_eq!(
            Source::from(PathBuf::from("/music/a.mp3")),
            Source::Local(PathBuf::from("/music/a.mp3"))
        );
    }
}
