//! Cover Art Loading Abstraction
//!
//! The collection never decodes tags or fetches remote art itself. It asks a
//! host-provided [`CoverArtLoader`] for an album cover, scaled to a square of
//! `scale_px` pixels, and consumes the encoded image bytes it returns.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Everything a loader needs to locate the art for one song.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CoverArtRequest {
    /// URL of the song whose album cover is wanted
    pub song_url: String,
    /// Art found automatically next to or inside the file
    pub art_automatic: String,
    /// Art chosen by the user; takes precedence over `art_automatic`
    pub art_manual: String,
    /// Edge length of the square thumbnail, in pixels
    pub scale_px: u32,
}

impl CoverArtRequest {
    pub fn new(song_url: impl Into<String>, scale_px: u32) -> Self {
        Self {
            song_url: song_url.into(),
            art_automatic: String::new(),
            art_manual: String::new(),
            scale_px,
        }
    }

    pub fn with_art(mut self, art_automatic: impl Into<String>, art_manual: impl Into<String>) -> Self {
        self.art_automatic = art_automatic.into();
        self.art_manual = art_manual.into();
        self
    }

    /// The art location the loader should try first, if any is known.
    pub fn preferred_art(&self) -> Option<&str> {
        [self.art_manual.as_str(), self.art_automatic.as_str()]
            .into_iter()
            .find(|art| !art.is_empty())
    }
}

/// Completion of one cover request, keyed by the id the requester assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverArtResult {
    pub request_id: u64,
    /// Encoded image (PNG/JPEG) when loading succeeded
    pub image: Option<Bytes>,
}

impl CoverArtResult {
    pub fn success(&self) -> bool {
        self.image.as_ref().is_some_and(|bytes| !bytes.is_empty())
    }
}

/// Host-provided cover art loader.
///
/// Returning `Ok(None)` means "no cover exists"; an `Err` means loading
/// failed. Callers treat both the same way and cache a negative entry.
#[async_trait]
pub trait CoverArtLoader: Send + Sync {
    async fn load_cover(&self, request: CoverArtRequest) -> Result<Option<Bytes>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_art_wins() {
        let request = CoverArtRequest::new("file:///music/a.flac", 32)
            .with_art("file:///music/cover.jpg", "file:///pictures/custom.png");
        assert_eq!(request.preferred_art(), Some("file:///pictures/custom.png"));

        let request = CoverArtRequest::new("file:///music/a.flac", 32);
        assert_eq!(request.preferred_art(), None);
    }

    #[test]
    fn test_result_success() {
        let empty = CoverArtResult {
            request_id: 1,
            image: Some(Bytes::new()),
        };
        assert!(!empty.success());

        let loaded = CoverArtResult {
            request_id: 2,
            image: Some(Bytes::from_static(b"\x89PNG")),
        };
        assert!(loaded.success());
    }
}
