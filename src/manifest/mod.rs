//! HLS manifest model and parser
//!
//! A manifest is kept as an ordered list of lines so the rewriter can drop
//! lines without disturbing anything it does not understand. Segments are a
//! derived view over those lines.
//!
//! Parsing never fails: anything that is not blank and does not look like a
//! media reference is kept as a directive, recognised or not.

pub mod ad_block;
pub mod classifier;
pub mod markers;
pub mod rewriter;

pub use ad_block::{AdBlockState, AdBlockTracker, Transition};
pub use classifier::{ClassificationContext, SegmentClassifier, Verdict};
pub use markers::MarkerSet;
pub use rewriter::{ManifestRewriter, RewriteOutcome};

use tracing::trace;

/// Canonical manifest served when an upstream manifest is nothing but an ad insertion
pub const EMPTY_STREAM_MANIFEST: &str =
    "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:2\n#EXT-X-MEDIA-SEQUENCE:0\n";

/// Recognised directive tags. Everything else is `Other` and passes through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveKind {
    Header,
    Version,
    TargetDuration,
    MediaSequence,
    SegmentDuration,
    Discontinuity,
    DateRange,
    CueOut,
    CueIn,
    Scte35,
    ProgramDateTime,
    StreamInf,
    EndList,
    Other,
}

impl DirectiveKind {
    fn from_tag(tag: &str) -> Self {
        match tag {
            "#EXTM3U" => Self::Header,
            "#EXT-X-VERSION" => Self::Version,
            "#EXT-X-TARGETDURATION" => Self::TargetDuration,
            "#EXT-X-MEDIA-SEQUENCE" => Self::MediaSequence,
            "#EXTINF" => Self::SegmentDuration,
            "#EXT-X-DISCONTINUITY" => Self::Discontinuity,
            "#EXT-X-DATERANGE" => Self::DateRange,
            "#EXT-X-CUE-OUT" | "#EXT-X-CUE-OUT-CONT" => Self::CueOut,
            "#EXT-X-CUE-IN" => Self::CueIn,
            "#EXT-X-SCTE35" | "#EXT-OATCLS-SCTE35" => Self::Scte35,
            "#EXT-X-PROGRAM-DATE-TIME" => Self::ProgramDateTime,
            "#EXT-X-STREAM-INF" => Self::StreamInf,
            "#EXT-X-ENDLIST" => Self::EndList,
            _ => Self::Other,
        }
    }
}

/// A `#`-prefixed line: tag, optional value after the first `:`, and the trimmed raw text
#[derive(Debug, Clone, PartialEq)]
pub struct Directive {
    pub kind: DirectiveKind,
    pub tag: String,
    pub value: Option<String>,
    pub raw: String,
}

impl Directive {
    fn parse(raw: &str) -> Self {
        let (tag, value) = match raw.split_once(':') {
            Some((tag, value)) => (tag, Some(value.to_string())),
            None => (raw, None),
        };
        Self {
            kind: DirectiveKind::from_tag(tag),
            tag: tag.to_string(),
            value,
            raw: raw.to_string(),
        }
    }

    /// Duration carried by an `#EXTINF` header. Malformed or negative values read as 0.
    pub fn duration(&self) -> Option<f64> {
        if self.kind != DirectiveKind::SegmentDuration {
            return None;
        }
        let value = self.value.as_deref().unwrap_or("");
        let number = value.split(',').next().unwrap_or("").trim();
        Some(
            number
                .parse::<f64>()
                .ok()
                .filter(|d| d.is_finite() && *d >= 0.0)
                .unwrap_or(0.0),
        )
    }

    /// Title part of an `#EXTINF` header (text after the first comma)
    pub fn title(&self) -> Option<&str> {
        if self.kind != DirectiveKind::SegmentDuration {
            return None;
        }
        self.value
            .as_deref()
            .and_then(|v| v.split_once(','))
            .map(|(_, title)| title.trim())
            .filter(|t| !t.is_empty())
    }

    /// Attribute list (`KEY=VALUE,KEY="quoted, value"`) with quotes stripped
    pub fn attributes(&self) -> Vec<(String, String)> {
        self.value
            .as_deref()
            .map(parse_attribute_list)
            .unwrap_or_default()
    }

    pub fn attribute(&self, key: &str) -> Option<String> {
        self.attributes()
            .into_iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    }
}

/// A non-directive, non-blank line
#[derive(Debug, Clone, PartialEq)]
pub struct MediaReference {
    pub uri: String,
    /// True when the reference follows `#EXT-X-STREAM-INF` (a variant playlist, not a segment)
    pub is_variant: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Line {
    Directive(Directive),
    Media(MediaReference),
    Blank,
}

impl Line {
    pub fn text(&self) -> &str {
        match self {
            Line::Directive(d) => &d.raw,
            Line::Media(m) => &m.uri,
            Line::Blank => "",
        }
    }

    pub fn as_directive(&self) -> Option<&Directive> {
        match self {
            Line::Directive(d) => Some(d),
            _ => None,
        }
    }

    pub fn is_segment_header(&self) -> bool {
        matches!(self, Line::Directive(d) if d.kind == DirectiveKind::SegmentDuration)
    }
}

/// One playable chunk derived from a media reference and its header
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub duration: f64,
    pub url: String,
    pub title: Option<String>,
    pub source_line_index: usize,
    pub header_line_index: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    pub lines: Vec<Line>,
}

/// Parse manifest text. Tolerates CRLF/LF mixes, blank lines and a leading BOM.
pub fn parse(text: &str) -> Manifest {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut lines = Vec::new();
    let mut after_stream_inf = false;

    for raw_line in text.lines() {
        let line = raw_line.trim();
        if line.is_empty() {
            lines.push(Line::Blank);
            continue;
        }
        if line.starts_with('#') {
            let directive = Directive::parse(line);
            if directive.kind == DirectiveKind::Other {
                trace!(target = "manifest.parse", line, "passing through unrecognised directive");
            }
            if directive.kind == DirectiveKind::StreamInf {
                after_stream_inf = true;
            }
            lines.push(Line::Directive(directive));
            continue;
        }
        lines.push(Line::Media(MediaReference {
            uri: line.to_string(),
            is_variant: after_stream_inf,
        }));
        after_stream_inf = false;
    }

    Manifest { lines }
}

impl Manifest {
    /// Ordered media segments. A reference with no preceding `#EXTINF` has duration 0.
    pub fn segments(&self) -> Vec<Segment> {
        let mut segments = Vec::new();
        let mut pending_header: Option<usize> = None;

        for (index, line) in self.lines.iter().enumerate() {
            match line {
                Line::Directive(d) if d.kind == DirectiveKind::SegmentDuration => {
                    pending_header = Some(index);
                }
                Line::Media(media) if !media.is_variant => {
                    let header_index = pending_header.take();
                    let header = header_index.and_then(|i| self.lines[i].as_directive());
                    segments.push(Segment {
                        duration: header.and_then(Directive::duration).unwrap_or(0.0),
                        url: media.uri.clone(),
                        title: header.and_then(Directive::title).map(str::to_string),
                        source_line_index: index,
                        header_line_index: header_index,
                    });
                }
                _ => {}
            }
        }

        segments
    }

    pub fn directives(&self) -> impl Iterator<Item = &Directive> {
        self.lines.iter().filter_map(Line::as_directive)
    }

    pub fn segment_header_count(&self) -> usize {
        self.lines.iter().filter(|l| l.is_segment_header()).count()
    }

    pub fn media_reference_count(&self) -> usize {
        self.lines
            .iter()
            .filter(|l| matches!(l, Line::Media(m) if !m.is_variant))
            .count()
    }

    pub fn has_discontinuity(&self) -> bool {
        self.directives()
            .any(|d| d.kind == DirectiveKind::Discontinuity)
    }

    pub fn is_master(&self) -> bool {
        self.directives().any(|d| d.kind == DirectiveKind::StreamInf)
    }

    /// Render lines back to text, one per line, with a trailing newline
    pub fn to_text(&self) -> String {
        render(self.lines.iter())
    }
}

/// Join lines with `\n`, ending with a newline when there is any content
pub(crate) fn render<'a>(lines: impl Iterator<Item = &'a Line>) -> String {
    let mut out = String::new();
    for line in lines {
        out.push_str(line.text());
        out.push('\n');
    }
    out
}

fn parse_attribute_list(input: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    let flush = |part: &str, out: &mut Vec<(String, String)>| {
        if let Some((key, value)) = part.split_once('=') {
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(value);
            out.push((key.trim().to_string(), value.to_string()));
        }
    };

    for ch in input.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            ',' if !in_quotes => {
                flush(&current, &mut out);
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    flush(&current, &mut out);
    out
}
