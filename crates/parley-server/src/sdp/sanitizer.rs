//! Offer sanitizer
//!
//! Offers are forwarded verbatim into another peer's media engine, so the
//! relay checks each media section before passing one on. Sections of a
//! kind outside the allowed set reject the whole offer. `a=extmap` lines
//! naming a denied header extension are cut out and the rest is kept.
//! Anything that fails to parse is rejected.
//!
//! Session-level `a=extmap` lines are left alone unless the policy sets
//! `strip_session_extmaps`. Browsers apply them to every media section.

use std::borrow::Cow;
use std::ops::Range;
use thiserror::Error;

use super::{Extmap, SdpError, SessionDescription};

/// RTP header extensions whose parsers have shipped memory-safety bugs in
/// browser media engines
pub const DEFAULT_DENIED_EXTENSIONS: &[&str] = &[
    "https://aomediacodec.github.io/av1-rtp-spec/#dependency-descriptor-rtp-header-extension",
    "http://www.webrtc.org/experiments/rtp-hdrext/generic-frame-descriptor-00",
    "http://www.webrtc.org/experiments/rtp-hdrext/video-layers-allocation00",
    "http://www.webrtc.org/experiments/rtp-hdrext/color-space",
    "http://tools.ietf.org/html/draft-ietf-avtext-framemarking-07",
];

pub const DEFAULT_ALLOWED_MEDIA: &[&str] = &["audio", "video"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdpPolicy {
    pub allowed_media: Vec<String>,
    pub denied_extensions: Vec<String>,
    /// Also inspect `a=extmap` lines above the first `m=` line
    pub strip_session_extmaps: bool,
}

impl Default for SdpPolicy {
    fn default() -> Self {
        Self {
            allowed_media: DEFAULT_ALLOWED_MEDIA.iter().map(|s| s.to_string()).collect(),
            denied_extensions: DEFAULT_DENIED_EXTENSIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            strip_session_extmaps: false,
        }
    }
}

/// Reason an offer was refused
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Violation {
    #[error("offer carries no sdp string")]
    MissingSdp,

    #[error("malformed session description: {0}")]
    Malformed(#[from] SdpError),

    #[error("media kind '{kind}' is not allowed")]
    DisallowedMedia { kind: String },
}

/// Result of a successful sanitize pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sanitized<'a> {
    /// Borrowed when nothing had to be removed
    pub sdp: Cow<'a, str>,
    /// URIs of the extmap lines that were cut, in order
    pub stripped: Vec<String>,
}

impl Sanitized<'_> {
    pub fn is_modified(&self) -> bool {
        matches!(self.sdp, Cow::Owned(_))
    }
}

#[derive(Debug, Clone, Default)]
pub struct SdpSanitizer {
    policy: SdpPolicy,
}

impl SdpSanitizer {
    pub fn new(policy: SdpPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &SdpPolicy {
        &self.policy
    }

    pub fn sanitize<'a>(&self, text: &'a str) -> Result<Sanitized<'a>, Violation> {
        let sdp = SessionDescription::parse(text)?;

        let mut removed = Vec::new();
        let mut stripped = Vec::new();

        if self.policy.strip_session_extmaps {
            self.scan_extmaps(&sdp, sdp.session_lines(), &mut removed, &mut stripped)?;
        }

        for section in sdp.media_sections() {
            if !self.is_allowed_media(section.kind) {
                return Err(Violation::DisallowedMedia {
                    kind: section.kind.to_string(),
                });
            }

            self.scan_extmaps(&sdp, section.lines.clone(), &mut removed, &mut stripped)?;
        }

        if removed.is_empty() {
            return Ok(Sanitized {
                sdp: Cow::Borrowed(text),
                stripped,
            });
        }

        Ok(Sanitized {
            sdp: Cow::Owned(sdp.render_without(&removed)),
            stripped,
        })
    }

    /// Collect the denied `a=extmap` lines in `range`
    fn scan_extmaps(
        &self,
        sdp: &SessionDescription<'_>,
        range: Range<usize>,
        removed: &mut Vec<usize>,
        stripped: &mut Vec<String>,
    ) -> Result<(), Violation> {
        for idx in range {
            let content = sdp.lines()[idx].content;
            if !content.starts_with(Extmap::PREFIX) {
                continue;
            }

            let extmap = Extmap::parse(content, idx + 1)?;
            if self.is_denied_extension(extmap.uri) {
                tracing::debug!(
                    "Stripping denied header extension {} (id {})",
                    extmap.uri,
                    extmap.id
                );
                removed.push(idx);
                stripped.push(extmap.uri.to_string());
            }
        }

        Ok(())
    }

    fn is_allowed_media(&self, kind: &str) -> bool {
        self.policy.allowed_media.iter().any(|allowed| allowed == kind)
    }

    fn is_denied_extension(&self, uri: &str) -> bool {
        self.policy.denied_extensions.iter().any(|denied| denied == uri)
    }
}
