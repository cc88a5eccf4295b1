//! Session description model
//!
//! A minimal line-oriented view of an SDP blob. Each line keeps its own
//! terminator so rendering the kept lines back gives the original bytes,
//! whatever mix of `\n` and `\r\n` the sender used.

mod sanitizer;

pub use sanitizer::{Sanitized, SdpPolicy, SdpSanitizer, Violation};

use regex::Regex;
use std::ops::Range;
use std::sync::LazyLock;
use thiserror::Error;

// a=extmap:<id>[/<direction>] <uri>[ <extension attributes>]
static RE_EXTMAP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^a=extmap:(\d+)(?:/([a-z]+))?[ \t]+(\S+)(?:[ \t].*)?$").unwrap()
});

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SdpError {
    #[error("session description is empty")]
    Empty,

    #[error("session description must start with a v= line")]
    MissingVersion,

    #[error("line {line}: blank line inside session description")]
    BlankLine { line: usize },

    #[error("line {line}: expected <type>=<value>")]
    InvalidLine { line: usize },

    #[error("line {line}: malformed m= line")]
    InvalidMediaLine { line: usize },

    #[error("line {line}: malformed a=extmap attribute")]
    InvalidExtmap { line: usize },
}

/// One line of the description, without and with its terminator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Line<'a> {
    pub content: &'a str,
    pub ending: &'a str,
}

/// A media section: its `m=` kind plus the line indices it spans
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSection<'a> {
    pub kind: &'a str,
    pub lines: Range<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    SendOnly,
    RecvOnly,
    SendRecv,
    Inactive,
}

/// A parsed `a=extmap` attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extmap<'a> {
    pub id: u8,
    pub direction: Option<Direction>,
    pub uri: &'a str,
}

impl<'a> Extmap<'a> {
    pub const PREFIX: &'static str = "a=extmap:";

    /// Parse an `a=extmap:` line. `line_no` is only used for error reporting.
    pub fn parse(content: &'a str, line_no: usize) -> Result<Self, SdpError> {
        let invalid = SdpError::InvalidExtmap { line: line_no };
        let caps = RE_EXTMAP.captures(content).ok_or(invalid.clone())?;

        let id = caps[1].parse::<u8>().map_err(|_| invalid.clone())?;
        if id == 0 {
            return Err(invalid);
        }

        let direction = match caps.get(2).map(|m| m.as_str()) {
            None => None,
            Some("sendonly") => Some(Direction::SendOnly),
            Some("recvonly") => Some(Direction::RecvOnly),
            Some("sendrecv") => Some(Direction::SendRecv),
            Some("inactive") => Some(Direction::Inactive),
            Some(_) => return Err(invalid),
        };

        let uri = caps.get(3).map(|m| m.as_str()).ok_or(invalid)?;

        Ok(Self { id, direction, uri })
    }
}

#[derive(Debug, Clone)]
pub struct SessionDescription<'a> {
    lines: Vec<Line<'a>>,
    media: Vec<MediaSection<'a>>,
}

impl<'a> SessionDescription<'a> {
    pub fn parse(text: &'a str) -> Result<Self, SdpError> {
        let lines = split_lines(text);
        if lines.is_empty() {
            return Err(SdpError::Empty);
        }

        for (idx, line) in lines.iter().enumerate() {
            if line.content.is_empty() {
                return Err(SdpError::BlankLine { line: idx + 1 });
            }
            if !is_sdp_line(line.content) {
                return Err(SdpError::InvalidLine { line: idx + 1 });
            }
        }

        if !lines[0].content.starts_with("v=") {
            return Err(SdpError::MissingVersion);
        }

        let mut media: Vec<MediaSection<'a>> = Vec::new();
        for (idx, line) in lines.iter().enumerate() {
            let Some(rest) = line.content.strip_prefix("m=") else {
                continue;
            };

            // m=<media> <port> <proto> <fmt> ...
            let tokens: Vec<&str> = rest.split_whitespace().collect();
            if tokens.len() < 4 {
                return Err(SdpError::InvalidMediaLine { line: idx + 1 });
            }

            if let Some(previous) = media.last_mut() {
                previous.lines.end = idx;
            }
            media.push(MediaSection {
                kind: tokens[0],
                lines: idx..lines.len(),
            });
        }

        Ok(Self { lines, media })
    }

    pub fn lines(&self) -> &[Line<'a>] {
        &self.lines
    }

    pub fn media_sections(&self) -> &[MediaSection<'a>] {
        &self.media
    }

    /// Lines before the first `m=` line
    pub fn session_lines(&self) -> Range<usize> {
        let end = self
            .media
            .first()
            .map(|section| section.lines.start)
            .unwrap_or(self.lines.len());
        0..end
    }

    /// Render the description, skipping the line indices in `removed`
    pub fn render_without(&self, removed: &[usize]) -> String {
        let mut out = String::new();
        for (idx, line) in self.lines.iter().enumerate() {
            if removed.contains(&idx) {
                continue;
            }
            out.push_str(line.content);
            out.push_str(line.ending);
        }
        out
    }

    pub fn render(&self) -> String {
        self.render_without(&[])
    }
}

fn is_sdp_line(content: &str) -> bool {
    let bytes = content.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_lowercase() && bytes[1] == b'='
}

/// Split into lines, keeping the exact terminator of each.
///
/// A trailing terminator does not produce an empty final line.
fn split_lines(text: &str) -> Vec<Line<'_>> {
    let mut lines = Vec::new();
    let mut rest = text;

    while !rest.is_empty() {
        match rest.find('\n') {
            Some(pos) => {
                let (content, ending) = if pos > 0 && rest.as_bytes()[pos - 1] == b'\r' {
                    (&rest[..pos - 1], &rest[pos - 1..=pos])
                } else {
                    (&rest[..pos], &rest[pos..=pos])
                };
                lines.push(Line { content, ending });
                rest = &rest[pos + 1..];
            }
            None => {
                lines.push(Line {
                    content: rest,
                    ending: "",
                });
                rest = "";
            }
        }
    }

    lines
}
