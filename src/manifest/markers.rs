//! Explicit ad markers
//!
//! One place decides what an ad marker looks like. The state machine, the
//! residual-marker sweep and the prober's candidate check all ask this set.

use crate::config::MarkerConfig;

use super::{Directive, DirectiveKind, Line, Manifest};

#[derive(Debug, Clone)]
pub struct MarkerSet {
    ad_classes: Vec<String>,
    ad_id_prefixes: Vec<String>,
    line_markers: Vec<String>,
}

impl Default for MarkerSet {
    fn default() -> Self {
        Self::new(&MarkerConfig::default())
    }
}

impl MarkerSet {
    pub fn new(config: &MarkerConfig) -> Self {
        let lower = |values: &[String]| -> Vec<String> {
            values.iter().map(|v| v.to_lowercase()).collect()
        };
        Self {
            ad_classes: lower(config.ad_classes.as_slice()),
            ad_id_prefixes: lower(config.ad_id_prefixes.as_slice()),
            line_markers: lower(config.ad_line_markers.as_slice()),
        }
    }

    /// Substring check against the configured ad line markers (case-insensitive)
    pub fn is_ad_indicating(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.line_markers.iter().any(|m| lower.contains(m.as_str()))
    }

    /// Does this directive open an ad block (ad date range, SCTE-35 cue-out)?
    pub fn is_ad_range_start(&self, directive: &Directive) -> bool {
        match directive.kind {
            DirectiveKind::CueOut => true,
            DirectiveKind::Scte35 => !is_yes(directive.attribute("CUE-IN")),
            DirectiveKind::DateRange => {
                self.is_ad_date_range(directive) && !closes_scte35_range(directive)
            }
            _ => false,
        }
    }

    /// Does this directive close an ad block (program date time, cue-in)?
    pub fn is_ad_range_end(&self, directive: &Directive) -> bool {
        match directive.kind {
            DirectiveKind::ProgramDateTime | DirectiveKind::CueIn => true,
            DirectiveKind::Scte35 => is_yes(directive.attribute("CUE-IN")),
            DirectiveKind::DateRange => closes_scte35_range(directive),
            _ => false,
        }
    }

    /// Any directive that carries ad metadata, whether it opens, closes or annotates a block
    pub fn is_ad_directive(&self, directive: &Directive) -> bool {
        match directive.kind {
            DirectiveKind::CueOut | DirectiveKind::CueIn | DirectiveKind::Scte35 => true,
            DirectiveKind::DateRange => self.is_ad_date_range(directive),
            _ => self.is_ad_indicating(&directive.raw),
        }
    }

    /// Whether the manifest carries explicit ad metadata anywhere
    pub fn has_ad_metadata(&self, manifest: &Manifest) -> bool {
        manifest.directives().any(|d| self.is_ad_directive(d))
    }

    /// Whether any line (directive or media reference) looks like ad content
    pub fn contains_ad_markers(&self, manifest: &Manifest) -> bool {
        manifest.lines.iter().any(|line| match line {
            Line::Directive(d) => self.is_ad_directive(d),
            Line::Media(m) => self.is_ad_indicating(&m.uri),
            Line::Blank => false,
        })
    }

    fn is_ad_date_range(&self, directive: &Directive) -> bool {
        let attributes = directive.attributes();
        let class_match = attributes.iter().any(|(k, v)| {
            k.eq_ignore_ascii_case("CLASS") && self.ad_classes.contains(&v.to_lowercase())
        });
        let id_match = attributes.iter().any(|(k, v)| {
            k.eq_ignore_ascii_case("ID") && {
                let id = v.to_lowercase();
                self.ad_id_prefixes.iter().any(|p| id.starts_with(p.as_str()))
            }
        });
        let scte35 = attributes
            .iter()
            .any(|(k, _)| k.to_ascii_uppercase().starts_with("SCTE35-"));

        class_match || id_match || scte35 || self.is_ad_indicating(&directive.raw)
    }
}

fn is_yes(value: Option<String>) -> bool {
    value.is_some_and(|v| v.eq_ignore_ascii_case("YES"))
}

/// A date range carrying only `SCTE35-IN` marks the end of a splice
fn closes_scte35_range(directive: &Directive) -> bool {
    let attributes = directive.attributes();
    let has = |key: &str| attributes.iter().any(|(k, _)| k.eq_ignore_ascii_case(key));
    has("SCTE35-IN") && !has("SCTE35-OUT")
}
