//! Ad-block state machine
//!
//! Explicit markers are authoritative: while the tracker is inside an ad block
//! every line is suppressed regardless of what the classifier thinks of it.

use super::{Directive, DirectiveKind, MarkerSet};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AdBlockState {
    #[default]
    Normal,
    InAdBlock,
}

/// What the tracker did with one directive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Still `Normal`; the directive is not an ad-range start
    Unchanged,
    /// `Normal -> InAdBlock`; the opening marker itself is dropped
    Entered,
    /// `InAdBlock -> Normal`; emit the closing line only if `emit` is set
    Exited { emit: bool },
    /// `InAdBlock -> InAdBlock`; the line is dropped
    Suppressed,
}

impl Transition {
    /// Whether the directive that caused this transition belongs in the output
    pub fn emits_line(self) -> bool {
        matches!(self, Transition::Unchanged | Transition::Exited { emit: true })
    }
}

#[derive(Debug, Clone, Default)]
pub struct AdBlockTracker {
    state: AdBlockState,
    blocks_entered: usize,
    headers_suppressed: usize,
}

impl AdBlockTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> AdBlockState {
        self.state
    }

    pub fn in_ad_block(&self) -> bool {
        self.state == AdBlockState::InAdBlock
    }

    pub fn blocks_entered(&self) -> usize {
        self.blocks_entered
    }

    /// Segment headers swallowed inside ad blocks
    pub fn headers_suppressed(&self) -> usize {
        self.headers_suppressed
    }

    pub fn on_directive(&mut self, directive: &Directive, markers: &MarkerSet) -> Transition {
        match self.state {
            AdBlockState::Normal => {
                if markers.is_ad_range_start(directive) {
                    self.state = AdBlockState::InAdBlock;
                    self.blocks_entered += 1;
                    Transition::Entered
                } else {
                    Transition::Unchanged
                }
            }
            AdBlockState::InAdBlock => {
                if markers.is_ad_range_end(directive) {
                    self.state = AdBlockState::Normal;
                    // Timestamps belong to the content that follows; cue markers do not
                    Transition::Exited {
                        emit: directive.kind == DirectiveKind::ProgramDateTime,
                    }
                } else {
                    if directive.kind == DirectiveKind::SegmentDuration {
                        self.headers_suppressed += 1;
                    }
                    Transition::Suppressed
                }
            }
        }
    }

    /// Media references are suppressed while inside a block
    pub fn on_media(&self) -> Transition {
        match self.state {
            AdBlockState::Normal => Transition::Unchanged,
            AdBlockState::InAdBlock => Transition::Suppressed,
        }
    }
}
