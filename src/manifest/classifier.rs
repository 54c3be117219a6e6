//! Segment classifier
//!
//! Scores each media segment with an additive, capped probability of being an
//! advertisement. The weights come from [`ClassifierConfig`]; the context
//! statistics are computed once per manifest and are read-only while scoring.

use std::collections::HashSet;

use tracing::debug;

use crate::config::{ClassifierConfig, ClusteringConfig};

use super::{Manifest, MarkerSet, Segment};

/// Manifest-wide facts every segment score depends on
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassificationContext {
    pub mean_duration: f64,
    pub stddev_duration: f64,
    pub has_discontinuity: bool,
    pub has_ad_markers: bool,
    /// `source_line_index` of every member of a suspicious duration cluster
    pub suspicious_line_indices: HashSet<usize>,
}

impl ClassificationContext {
    pub fn build(
        manifest: &Manifest,
        segments: &[Segment],
        markers: &MarkerSet,
        config: &ClassifierConfig,
    ) -> Self {
        let (mean_duration, stddev_duration) = duration_stats(segments);
        let has_discontinuity = manifest.has_discontinuity();
        let suspicious_line_indices = suspicious_clusters(
            segments,
            mean_duration,
            stddev_duration,
            has_discontinuity,
            &config.clustering,
        );

        Self {
            mean_duration,
            stddev_duration,
            has_discontinuity,
            has_ad_markers: markers.has_ad_metadata(manifest),
            suspicious_line_indices,
        }
    }
}

/// Decision derived from a score
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Keep,
    /// Logged, but kept
    Suspicious,
    /// Dropped together with its header
    Drop,
}

impl Verdict {
    pub fn from_score(score: f64, config: &ClassifierConfig) -> Self {
        if score >= config.drop_threshold {
            Verdict::Drop
        } else if score >= config.suspicious_threshold {
            Verdict::Suspicious
        } else {
            Verdict::Keep
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SegmentClassifier {
    config: ClassifierConfig,
}

impl SegmentClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Probability in `[0, 1]` that `segment` is an ad
    pub fn score(&self, segment: &Segment, context: &ClassificationContext) -> f64 {
        let config = &self.config;
        let mut score = 0.0;

        if let Some(band) = config
            .duration_bands
            .iter()
            .find(|band| band.contains(segment.duration))
        {
            score += band.weight;
        }

        let url = segment.url.to_lowercase();
        let title = segment.title.as_deref().unwrap_or("").to_lowercase();
        let primary = |text: &str| {
            config
                .primary_url_markers
                .iter()
                .any(|m| text.contains(&m.to_lowercase()))
        };
        if primary(&url) || primary(&title) {
            score += config.primary_url_weight;
        } else if config
            .secondary_url_markers
            .iter()
            .any(|m| url.contains(&m.to_lowercase()))
        {
            score += config.secondary_url_weight;
        }

        if context.has_ad_markers {
            score += config.ad_metadata_weight;
        }
        if context.has_discontinuity {
            score += config.discontinuity_weight;
        }
        if context
            .suspicious_line_indices
            .contains(&segment.source_line_index)
        {
            score += config.cluster_weight;
        }

        let z = (segment.duration - context.mean_duration).abs()
            / (context.stddev_duration + config.epsilon);
        if z > config.strong_outlier_z {
            score += config.strong_outlier_weight;
        } else if z > config.mild_outlier_z {
            score += config.mild_outlier_weight;
        }

        f64::min(score, 1.0)
    }

    pub fn classify(&self, segment: &Segment, context: &ClassificationContext) -> (f64, Verdict) {
        let score = self.score(segment, context);
        let verdict = Verdict::from_score(score, &self.config);
        if verdict == Verdict::Suspicious {
            debug!(
                target = "manifest.classify",
                url = %segment.url,
                duration = segment.duration,
                score,
                "suspicious segment kept"
            );
        }
        (score, verdict)
    }
}

/// Population mean and standard deviation of segment durations
fn duration_stats(segments: &[Segment]) -> (f64, f64) {
    if segments.is_empty() {
        return (0.0, 0.0);
    }
    let n = segments.len() as f64;
    let mean = segments.iter().map(|s| s.duration).sum::<f64>() / n;
    let variance = segments
        .iter()
        .map(|s| (s.duration - mean).powi(2))
        .sum::<f64>()
        / n;
    (mean, variance.sqrt())
}

/// Runs of consecutive, similar, above-average durations look like ad pods.
fn suspicious_clusters(
    segments: &[Segment],
    mean: f64,
    stddev: f64,
    has_discontinuity: bool,
    config: &ClusteringConfig,
) -> HashSet<usize> {
    let (tolerance, floor) = if has_discontinuity {
        (
            config.tolerance_with_discontinuity,
            config.min_duration_with_discontinuity,
        )
    } else {
        (config.tolerance, config.min_duration)
    };
    let threshold = mean + config.stddev_factor * stddev;

    let mut suspicious = HashSet::new();
    let mut group: Vec<&Segment> = Vec::new();

    for segment in segments {
        if segment.duration <= threshold {
            flush_group(&mut group, &mut suspicious, floor, config.min_group_size);
            continue;
        }
        if let Some(previous) = group.last() {
            if (segment.duration - previous.duration).abs() >= tolerance {
                flush_group(&mut group, &mut suspicious, floor, config.min_group_size);
            }
        }
        group.push(segment);
    }
    flush_group(&mut group, &mut suspicious, floor, config.min_group_size);

    suspicious
}

fn flush_group(
    group: &mut Vec<&Segment>,
    suspicious: &mut HashSet<usize>,
    floor: f64,
    min_group_size: usize,
) {
    let qualifies = group.len() >= min_group_size
        && group.first().is_some_and(|first| first.duration >= floor);
    if qualifies {
        suspicious.extend(group.iter().map(|s| s.source_line_index));
    }
    group.clear();
}
