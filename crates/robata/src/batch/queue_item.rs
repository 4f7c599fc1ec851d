//! Work items queued for the batch worker pool.

use uuid::Uuid;

/// One chunk awaiting dispatch, tagged with its position in the original
/// order.
///
/// The index is assigned by the dispatcher's single-threaded enumeration step
/// before fan-out, which is what guarantees no two workers ever resolve the
/// same slot. The id identifies the task itself, independent of its payload.
#[derive(Debug, Clone)]
pub(crate) struct ChunkTask {
    /// Unique identifier for this task
    id: Uuid,

    /// Position of the chunk in the original order
    index: usize,

    /// The chunk text to send to the backend
    text: String,
}

impl ChunkTask {
    /// Creates a task for the chunk at `index`.
    pub(crate) fn new(index: usize, text: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            index,
            text,
        }
    }

    /// Index of the chunk in the original order.
    pub(crate) fn index(&self) -> usize {
        self.index
    }

    /// The chunk text.
    pub(crate) fn text(&self) -> &str {
        &self.text
    }

    /// Unique identifier of this task.
    #[allow(dead_code)]
    pub(crate) fn id(&self) -> Uuid {
        self.id
    }
}

impl PartialEq for ChunkTask {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ChunkTask {}
