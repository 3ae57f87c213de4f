use std::sync::Arc;

use tracing::warn;

use super::provider::{MessageBodyWriter, ProviderEntry};
use crate::media::MediaType;
use crate::model::EntityType;

/// The writers able to handle one entity type, in registry order.
#[derive(Debug)]
pub struct WriterSubSet {
    ty: EntityType,
    entries: Vec<Arc<ProviderEntry>>,
}

impl WriterSubSet {
    pub(crate) fn new(ty: EntityType, entries: Vec<Arc<ProviderEntry>>) -> Self {
        Self { ty, entries }
    }

    #[must_use]
    pub fn entity_type(&self) -> EntityType {
        self.ty
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Union of the producible types of every writer, first occurrence kept.
    #[must_use]
    pub fn all_producible_media_types(&self) -> Vec<MediaType> {
        let mut types: Vec<MediaType> = Vec::new();
        for media in self.entries.iter().flat_map(|entry| &entry.produces) {
            if !types.contains(media) {
                types.push(media.clone());
            }
        }
        types
    }

    /// First writer that produces a type compatible with `media_type` and accepts the entity.
    /// Writers that cannot be instantiated are skipped.
    #[must_use]
    pub fn best_writer(
        &self,
        generic: &EntityType,
        media_type: &MediaType,
    ) -> Option<Arc<dyn MessageBodyWriter>> {
        self.entries
            .iter()
            .filter(|entry| entry.produces_compatible(media_type))
            .find_map(|entry| {
                let writer = match entry.instance() {
                    Ok(instance) => instance.writer?,
                    Err(err) => {
                        warn!(provider = %entry.name, error = %err, "Writer could not be initialized; skipping");
                        return None;
                    }
                };
                writer
                    .is_writeable(&self.ty, generic, media_type)
                    .then_some(writer)
            })
    }
}
