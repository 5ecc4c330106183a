use crate::plane::Peak;
use crate::source::SourceModel;

/// Reduction stage, used for progress reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReductionStage {
    Sizing,
    Accumulating,
    Finalizing,
    Synchronizing,
    Pointing,
}

impl std::fmt::Display for ReductionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sizing => write!(f, "Sizing map"),
            Self::Accumulating => write!(f, "Accumulating"),
            Self::Finalizing => write!(f, "Finalizing map"),
            Self::Synchronizing => write!(f, "Removing model"),
            Self::Pointing => write!(f, "Locating source"),
        }
    }
}

/// Thread-safe progress reporting for a reduction.
///
/// All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    /// A new stage has started. `total_items` is the number of work items
    /// in this stage (e.g. integrations), if known.
    fn begin_stage(&self, _stage: ReductionStage, _total_items: Option<usize>) {}

    fn advance(&self, _items_done: usize) {}

    fn finish_stage(&self) {}

    /// A new round of the iteration has started.
    fn begin_round(&self, _round: usize, _rounds: usize) {}
}

/// No-op progress reporter, used when `run_reduction` delegates.
pub(super) struct NoOpReporter;
impl ProgressReporter for NoOpReporter {}

/// Result of a reduction job.
#[derive(Debug)]
pub struct ReductionOutput {
    pub model: SourceModel,
    pub rounds: usize,
    /// Samples accumulated in the last round.
    pub contributions: usize,
    pub pointing: Option<Peak>,
}

impl ReductionOutput {
    pub fn is_empty(&self) -> bool {
        self.model.is_empty()
    }
}
