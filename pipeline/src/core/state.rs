//! Pipeline state machine.
//!
//! ```text
//! Init -> Prepared -> Executed -> Updated -> Done
//!   |        |
//!   +--------+--> Aborted   (no trigger detected)
//! ```
//!
//! A failed prepare skips `Prepared` and goes straight from `Init` to
//! `Updated`, since the update phase always runs when a comment exists.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Init,
    Prepared,
    Executed,
    Updated,
    Done,
    Aborted,
}

impl PipelineState {
    pub fn can_transition_to(self, next: PipelineState) -> bool {
        use PipelineState as S;
        matches!(
            (self, next),
            (S::Init, S::Prepared)
                | (S::Init, S::Aborted)
                | (S::Init, S::Updated)
                | (S::Init, S::Done)
                | (S::Prepared, S::Executed)
                | (S::Prepared, S::Aborted)
                | (S::Prepared, S::Updated)
                | (S::Executed, S::Updated)
                | (S::Updated, S::Done)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Aborted)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Prepared => "prepared",
            Self::Executed => "executed",
            Self::Updated => "updated",
            Self::Done => "done",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
