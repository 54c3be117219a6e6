//! Manifest rewriter
//!
//! One synchronous pass over the parsed lines. Segment headers are held
//! pending until their media reference arrives so a header and its reference
//! are always committed or dropped together.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::observability::metrics::metrics;

use super::{
    AdBlockTracker, ClassificationContext, Line, Manifest, MarkerSet, Segment, SegmentClassifier,
    Transition, Verdict, EMPTY_STREAM_MANIFEST, parse, render,
};

/// Result of one rewrite pass
#[derive(Debug, Clone, PartialEq)]
pub struct RewriteOutcome {
    pub text: String,
    pub segments_removed: usize,
    /// Part of `segments_removed` swallowed inside explicit ad blocks
    pub segments_in_ad_blocks: usize,
    pub segments_kept: usize,
    /// Kept segments whose score fell in the suspicious band
    pub suspicious_kept: usize,
    /// Explicit ad metadata or ad-indicating lines were present in the input
    pub ad_markers_seen: bool,
    /// The input ended while still inside an ad block
    pub unterminated_ad_block: bool,
    /// The input was replaced by [`EMPTY_STREAM_MANIFEST`]
    pub collapsed: bool,
    pub elapsed: Duration,
}

impl RewriteOutcome {
    /// Whether an alternate source is worth looking for
    pub fn needs_probe(&self) -> bool {
        let ads_detected = self.ad_markers_seen || self.segments_removed > 0;
        ads_detected
            && (self.segments_kept == 0 || self.suspicious_kept > 0 || self.unterminated_ad_block)
    }

    /// Every segment was removed but the text still carries playlist metadata
    pub fn is_degenerate(&self) -> bool {
        !self.collapsed && self.segments_kept == 0 && self.segments_removed > 0
    }
}

/// A unit of output: either a standalone line or a committed header/reference pair
/// (with any directives that sat between them).
#[derive(Debug)]
enum Unit {
    Line(Line),
    Segment(Vec<Line>),
}

#[derive(Debug, Clone, Default)]
pub struct ManifestRewriter {
    classifier: SegmentClassifier,
    markers: MarkerSet,
}

impl ManifestRewriter {
    pub fn new(classifier: SegmentClassifier, markers: MarkerSet) -> Self {
        Self { classifier, markers }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            SegmentClassifier::new(config.classifier.clone()),
            MarkerSet::new(&config.markers),
        )
    }

    pub fn markers(&self) -> &MarkerSet {
        &self.markers
    }

    pub fn rewrite(&self, text: &str) -> RewriteOutcome {
        let started = Instant::now();
        let manifest = parse(text);
        let ad_markers_seen = self.markers.contains_ad_markers(&manifest);
        let headers_in = manifest.segment_header_count();

        if ad_markers_seen && headers_in == 0 && !manifest.is_master() {
            info!(
                target = "manifest.rewrite",
                "ad-only manifest replaced with empty stream"
            );
            return self.finish(
                RewriteOutcome {
                    text: EMPTY_STREAM_MANIFEST.to_string(),
                    segments_removed: manifest.media_reference_count(),
                    segments_in_ad_blocks: 0,
                    segments_kept: 0,
                    suspicious_kept: 0,
                    ad_markers_seen,
                    unterminated_ad_block: false,
                    collapsed: true,
                    elapsed: Duration::ZERO,
                },
                started,
            );
        }

        let segments = manifest.segments();
        let context = ClassificationContext::build(
            &manifest,
            &segments,
            &self.markers,
            self.classifier.config(),
        );
        let pass = self.structural_pass(&manifest, &segments, &context);
        let unterminated_ad_block = pass.tracker.in_ad_block();
        if unterminated_ad_block {
            warn!(
                target = "manifest.rewrite",
                blocks = pass.tracker.blocks_entered(),
                "manifest ended inside an ad block; remainder suppressed"
            );
            metrics().unterminated_ad_blocks.add(1, &[]);
        }

        let units = self.sweep(pass.units);
        let segments_kept = units
            .iter()
            .filter(|u| matches!(u, Unit::Segment(_)))
            .count();
        let text = render(collapse_blank_runs(units).iter());

        self.finish(
            RewriteOutcome {
                text,
                segments_removed: headers_in.saturating_sub(segments_kept),
                segments_in_ad_blocks: pass.tracker.headers_suppressed(),
                segments_kept,
                suspicious_kept: pass.suspicious_kept,
                ad_markers_seen,
                unterminated_ad_block,
                collapsed: false,
                elapsed: Duration::ZERO,
            },
            started,
        )
    }

    /// The input with only its ad markup removed: ad directives, plus any
    /// ad-indicating reference together with its header. `None` when no
    /// segment survives.
    pub fn strip_ad_markup(&self, text: &str) -> Option<String> {
        let manifest = parse(text);
        let mut kept: Vec<Line> = Vec::with_capacity(manifest.lines.len());
        let mut header_at: Option<usize> = None;

        for line in manifest.lines {
            match &line {
                Line::Directive(d) if self.markers.is_ad_directive(d) => continue,
                Line::Media(m) if !m.is_variant && self.markers.is_ad_indicating(&m.uri) => {
                    if let Some(at) = header_at.take() {
                        kept.truncate(at);
                    }
                    continue;
                }
                Line::Media(_) => header_at = None,
                _ if line.is_segment_header() => header_at = Some(kept.len()),
                _ => {}
            }
            kept.push(line);
        }

        let stripped = Manifest { lines: kept };
        stripped
            .segments()
            .iter()
            .any(|s| s.header_line_index.is_some())
            .then(|| stripped.to_text())
    }

    fn structural_pass(
        &self,
        manifest: &Manifest,
        segments: &[Segment],
        context: &ClassificationContext,
    ) -> StructuralPass {
        let by_line: HashMap<usize, &Segment> = segments
            .iter()
            .map(|s| (s.source_line_index, s))
            .collect();

        let mut tracker = AdBlockTracker::new();
        let mut units = Vec::with_capacity(manifest.lines.len());
        let mut pending: Option<Vec<Line>> = None;
        let mut suspicious_kept = 0;

        for (index, line) in manifest.lines.iter().enumerate() {
            match line {
                Line::Blank => {
                    if pending.is_none() && !tracker.in_ad_block() {
                        units.push(Unit::Line(Line::Blank));
                    }
                }
                Line::Directive(directive) => {
                    let transition = tracker.on_directive(directive, &self.markers);
                    match transition {
                        Transition::Entered => {
                            if pending.take().is_some() {
                                debug!(
                                    target = "manifest.rewrite",
                                    line = index,
                                    "pending segment dropped at ad block start"
                                );
                            }
                        }
                        Transition::Suppressed => {}
                        Transition::Exited { .. } | Transition::Unchanged => {
                            if !transition.emits_line() {
                                continue;
                            }
                            if line.is_segment_header() {
                                if pending.replace(vec![line.clone()]).is_some() {
                                    debug!(
                                        target = "manifest.rewrite",
                                        line = index,
                                        "segment header without a reference dropped"
                                    );
                                }
                            } else if let Some(group) = pending.as_mut() {
                                group.push(line.clone());
                            } else {
                                units.push(Unit::Line(line.clone()));
                            }
                        }
                    }
                }
                Line::Media(media) => {
                    if tracker.on_media() == Transition::Suppressed {
                        pending = None;
                        continue;
                    }
                    if media.is_variant {
                        match pending.as_mut() {
                            Some(group) => group.push(line.clone()),
                            None => units.push(Unit::Line(line.clone())),
                        }
                        continue;
                    }
                    let Some(mut group) = pending.take() else {
                        debug!(
                            target = "manifest.rewrite",
                            uri = %media.uri,
                            "media reference without a segment header dropped"
                        );
                        continue;
                    };
                    let Some(segment) = by_line.get(&index) else {
                        continue;
                    };
                    let (score, verdict) = self.classifier.classify(segment, context);
                    match verdict {
                        Verdict::Drop => {
                            debug!(
                                target = "manifest.rewrite",
                                uri = %media.uri,
                                duration = segment.duration,
                                score,
                                "ad segment dropped"
                            );
                        }
                        Verdict::Suspicious | Verdict::Keep => {
                            if verdict == Verdict::Suspicious {
                                suspicious_kept += 1;
                            }
                            group.push(line.clone());
                            units.push(Unit::Segment(group));
                        }
                    }
                }
            }
        }

        if pending.is_some() {
            debug!(
                target = "manifest.rewrite",
                "trailing segment header without a reference dropped"
            );
        }

        StructuralPass {
            units,
            tracker,
            suspicious_kept,
        }
    }

    /// Remove anything still ad-indicating. Segments go as whole pairs.
    fn sweep(&self, units: Vec<Unit>) -> Vec<Unit> {
        units
            .into_iter()
            .filter(|unit| match unit {
                Unit::Line(Line::Directive(d)) => !self.markers.is_ad_directive(d),
                Unit::Line(Line::Media(m)) => !self.markers.is_ad_indicating(&m.uri),
                Unit::Line(Line::Blank) => true,
                Unit::Segment(lines) => {
                    let residual = lines.iter().any(|line| match line {
                        Line::Directive(d) => self.markers.is_ad_directive(d),
                        Line::Media(m) => self.markers.is_ad_indicating(&m.uri),
                        Line::Blank => false,
                    });
                    if residual {
                        debug!(
                            target = "manifest.rewrite",
                            "segment with residual ad markup removed"
                        );
                    }
                    !residual
                }
            })
            .collect()
    }

    fn finish(&self, mut outcome: RewriteOutcome, started: Instant) -> RewriteOutcome {
        outcome.elapsed = started.elapsed();
        let m = metrics();
        m.manifests_rewritten.add(1, &[]);
        m.segments_removed.add(outcome.segments_removed as u64, &[]);
        m.rewrite_duration.record(outcome.elapsed.as_secs_f64(), &[]);
        debug!(
            target = "manifest.rewrite",
            removed = outcome.segments_removed,
            kept = outcome.segments_kept,
            suspicious = outcome.suspicious_kept,
            collapsed = outcome.collapsed,
            elapsed_us = outcome.elapsed.as_micros() as u64,
            "manifest rewritten"
        );
        outcome
    }
}

struct StructuralPass {
    units: Vec<Unit>,
    tracker: AdBlockTracker,
    suspicious_kept: usize,
}

/// Flatten units, collapsing blank runs to one and trimming blanks at both ends
fn collapse_blank_runs(units: Vec<Unit>) -> Vec<Line> {
    let mut lines: Vec<Line> = Vec::new();
    for unit in units {
        let group = match unit {
            Unit::Line(line) => vec![line],
            Unit::Segment(group) => group,
        };
        for line in group {
            let is_blank = line == Line::Blank;
            let previous_blank = lines.last().is_none_or(|l| *l == Line::Blank);
            if is_blank && previous_blank {
                continue;
            }
            lines.push(line);
        }
    }
    while lines.last() == Some(&Line::Blank) {
        lines.pop();
    }
    lines
}
