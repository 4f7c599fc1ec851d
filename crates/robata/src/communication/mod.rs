//! Internal channel plumbing shared by the batch and comparison engines.

mod item_stream;
mod pill;

pub use item_stream::ItemStream;
pub(crate) use pill::Pill;
