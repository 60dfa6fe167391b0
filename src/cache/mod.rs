//! Reader-side snapshots of the persisted documents
//!
//! Each store keeps the generation it last loaded; `get()` reloads only when
//! the database reports a newer generation and hands out the snapshot as an
//! `Arc`, so readers never see a document change under them.

mod events;
mod mapping;

pub use events::EventLogStore;
pub use mapping::MappingCacheStore;

use std::sync::Arc;

struct Cached<T> {
    generation: i64,
    snapshot: Arc<T>,
}

impl<T> Cached<T> {
    fn current(slot: &Option<Self>, generation: i64) -> Option<Arc<T>> {
        slot.as_ref()
            .filter(|cached| cached.generation == generation)
            .map(|cached| Arc::clone(&cached.snapshot))
    }
}
