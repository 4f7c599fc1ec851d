//! Typed events and per-chunk results for a batch job.

/// One event on a batch job's ordered event channel.
///
/// Consumers (a UI, a CLI, a test harness) subscribe to the job's
/// [`BatchHandle`](super::BatchHandle) stream and render these without the
/// dispatcher knowing anything about presentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchEvent {
    /// Progress snapshot. Emitted once before any work (`processed == 0`),
    /// once per resolved chunk, and once after the last chunk resolves.
    /// `processed` is monotonically non-decreasing across a job; consumers
    /// must tolerate more than `total + 1` snapshots.
    Progress {
        /// Number of chunks in the job.
        total: usize,
        /// Number of chunks resolved so far.
        processed: usize,
    },

    /// Incremental per-chunk output: the chunk's accumulated text after a new
    /// fragment, and once more on completion. Item events from different
    /// chunks interleave arbitrarily; within one chunk they follow fragment
    /// emission order.
    Item {
        /// Index of the chunk in the original order.
        index: usize,
        /// Text accumulated for this chunk so far.
        text: String,
        /// True once the chunk has permanently failed or been cancelled.
        failed: bool,
    },

    /// Final event: the aggregated text in original chunk order.
    Done {
        /// Cleaned, order-preserving concatenation of all chunk results.
        text: String,
    },
}

/// How a chunk's slot was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemStatus {
    /// The chunk's stream completed without error.
    Ok,
    /// Retries were exhausted; the slot holds an error marker.
    Failed,
    /// The job was cancelled before this chunk started; the slot holds a
    /// cancellation marker.
    Cancelled,
}

/// Resolution record for one chunk, produced exactly once per index.
///
/// The complete collection for a job has exactly one entry per chunk index,
/// no gaps, no duplicates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemResult {
    /// Index of the chunk in the original order.
    pub index: usize,
    /// Final text for the slot: model output, or a marker on failure.
    pub text: String,
    /// How the slot was resolved.
    pub status: ItemStatus,
}
