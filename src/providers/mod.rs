//! # Providers Module
//!
//! Registry of entity providers: message body readers and writers, exception mappers and
//! context resolvers.
//!
//! ## Ordering
//!
//! Readers, writers and context resolvers are kept in two groups, custom providers first and
//! defaults second; registration order is preserved inside each group. Lookups take the first
//! entry that qualifies.
//!
//! ## Concurrency
//!
//! Each ordered list is an immutable snapshot behind an [`ArcSwap`]. Registration and removal
//! publish a new snapshot with `rcu`; dispatch threads `load` the current snapshot and never
//! block or observe a half-updated list. Exception mappers live in a [`DashMap`] keyed by fault
//! class; the superclass walk is repeated on every lookup so newly registered mappers are seen
//! immediately.
//!
//! ## Lifecycles
//!
//! Singleton providers are shared. Per-request providers are instantiated once at registration
//! to probe their capabilities and then afresh for every lookup; an instance that fails to
//! construct is skipped and the lookup continues with the next candidate.

mod builtin;
mod provider;
mod writers;

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use http::StatusCode;
use tracing::{debug, error, info, warn};

pub use builtin::{default_providers, BytesProvider, JsonProvider, StringProvider, WebApplicationMapper};
pub use provider::{
    ContextResolver, ExceptionMapper, MessageBodyReader, MessageBodyWriter, Provider,
    ProviderInstance,
};
pub use writers::WriterSubSet;

use provider::{Lifecycle, ProviderEntry};

use crate::error::{ApplicationError, FaultClass};
use crate::media::{MediaType, ALL, TEXT_PLAIN};
use crate::model::{EntityType, Reply};

/// Body of the reply for checked faults nobody maps.
pub const NO_MAPPER_MESSAGE: &str = "No exception mapper was found";

#[derive(Debug, Default)]
struct Ordered {
    custom: Vec<Arc<ProviderEntry>>,
    defaults: Vec<Arc<ProviderEntry>>,
}

impl Ordered {
    fn iter(&self) -> impl Iterator<Item = &Arc<ProviderEntry>> {
        self.custom.iter().chain(self.defaults.iter())
    }

    fn with(&self, entry: &Arc<ProviderEntry>) -> Self {
        let mut next = Self {
            custom: self.custom.clone(),
            defaults: self.defaults.clone(),
        };
        if entry.is_default {
            next.defaults.push(Arc::clone(entry));
        } else {
            next.custom.push(Arc::clone(entry));
        }
        next
    }

    fn without(&self, remove: &dyn Fn(&ProviderEntry) -> bool) -> Self {
        Self {
            custom: self.custom.iter().filter(|e| !remove(e)).cloned().collect(),
            defaults: self.defaults.iter().filter(|e| !remove(e)).cloned().collect(),
        }
    }
}

#[derive(Debug, Clone)]
struct MapperSlot {
    entry: Arc<ProviderEntry>,
}

/// The provider registry shared by all dispatches.
#[derive(Debug)]
pub struct Providers {
    next_id: AtomicU64,
    all: ArcSwap<Vec<Arc<ProviderEntry>>>,
    readers: ArcSwap<Ordered>,
    writers: ArcSwap<Ordered>,
    resolvers: ArcSwap<Ordered>,
    mappers: DashMap<usize, MapperSlot>,
}

impl Default for Providers {
    fn default() -> Self {
        Self::new()
    }
}

impl Providers {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            all: ArcSwap::from_pointee(Vec::new()),
            readers: ArcSwap::from_pointee(Ordered::default()),
            writers: ArcSwap::from_pointee(Ordered::default()),
            resolvers: ArcSwap::from_pointee(Ordered::default()),
            mappers: DashMap::new(),
        }
    }

    /// A registry holding [`default_providers`].
    #[must_use]
    pub fn with_defaults() -> Self {
        let providers = Self::new();
        for provider in default_providers() {
            let _registered = providers.add(provider, true);
        }
        providers
    }

    /// Registers `provider`.
    ///
    /// Returns `false` (and logs why) if a media type does not parse, the probe instance of a
    /// per-request provider cannot be created, or the instance has no capability at all.
    pub fn add(&self, provider: Provider, is_default: bool) -> bool {
        let Provider {
            name,
            lifecycle,
            consumes,
            produces,
        } = provider;

        let consumes = match parse_or_all(&consumes) {
            Ok(types) => types,
            Err(err) => {
                warn!(provider = %name, error = %err, "Provider rejected: invalid consumed media type");
                return false;
            }
        };
        let produces = match parse_or_all(&produces) {
            Ok(types) => types,
            Err(err) => {
                warn!(provider = %name, error = %err, "Provider rejected: invalid produced media type");
                return false;
            }
        };

        let probe = match &lifecycle {
            Lifecycle::Singleton(instance) => instance.clone(),
            Lifecycle::PerRequest(factory) => match factory() {
                Ok(instance) => instance,
                Err(err) => {
                    warn!(provider = %name, error = %err, "Provider rejected: cannot be instantiated");
                    return false;
                }
            },
        };
        if probe.is_empty() {
            warn!(provider = %name, "Provider rejected: no reader, writer, mapper or resolver");
            return false;
        }

        let entry = Arc::new(ProviderEntry {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            name,
            is_default,
            consumes,
            produces,
            lifecycle,
            read_type: probe.reader.as_ref().and_then(|r| r.supported_type()),
            write_type: probe.writer.as_ref().and_then(|w| w.supported_type()),
            mapped_class: probe.exception_mapper.as_ref().map(|m| m.fault_class()),
            context_type: probe.context_resolver.as_ref().map(|c| c.context_type()),
            is_reader: probe.reader.is_some(),
            is_writer: probe.writer.is_some(),
        });

        if entry.is_reader {
            self.readers.rcu(|current| current.with(&entry));
        }
        if entry.is_writer {
            self.writers.rcu(|current| current.with(&entry));
        }
        if entry.context_type.is_some() {
            self.resolvers.rcu(|current| current.with(&entry));
        }
        if let Some(class) = entry.mapped_class {
            self.register_mapper(class, &entry);
        }
        self.all.rcu(|current| {
            let mut next = Vec::clone(current);
            next.push(Arc::clone(&entry));
            next
        });

        info!(
            provider = %entry.name,
            is_default,
            reader = entry.is_reader,
            writer = entry.is_writer,
            exception_mapper = entry.mapped_class.map(FaultClass::name),
            context_resolver = entry.context_type.is_some(),
            "Provider registered"
        );
        true
    }

    fn register_mapper(&self, class: &'static FaultClass, entry: &Arc<ProviderEntry>) {
        use dashmap::mapref::entry::Entry;
        match self.mappers.entry(class.key()) {
            Entry::Vacant(vacant) => {
                vacant.insert(MapperSlot {
                    entry: Arc::clone(entry),
                });
            }
            Entry::Occupied(mut occupied) => {
                let existing = &occupied.get().entry;
                if entry.is_default && !existing.is_default {
                    debug!(
                        fault_class = class.name(),
                        provider = %entry.name,
                        kept = %existing.name,
                        "Default exception mapper not installed over custom mapper"
                    );
                    return;
                }
                if !existing.is_default {
                    warn!(
                        fault_class = class.name(),
                        provider = %entry.name,
                        replaced = %existing.name,
                        "Replacing custom exception mapper"
                    );
                }
                occupied.insert(MapperSlot {
                    entry: Arc::clone(entry),
                });
            }
        }
    }

    /// Removes every provider registered under `name`; returns whether one was found.
    pub fn remove(&self, name: &str) -> bool {
        self.remove_where(&|entry: &ProviderEntry| entry.name == name) > 0
    }

    fn remove_where(&self, remove: &dyn Fn(&ProviderEntry) -> bool) -> usize {
        let before = self.all.load().len();
        self.readers.rcu(|current| current.without(remove));
        self.writers.rcu(|current| current.without(remove));
        self.resolvers.rcu(|current| current.without(remove));
        self.mappers.retain(|_, slot| !remove(&slot.entry));
        let previous = self.all.rcu(|current| {
            current
                .iter()
                .filter(|entry| !remove(entry))
                .cloned()
                .collect::<Vec<_>>()
        });
        let after = self.all.load().len();
        debug!(removed = before.saturating_sub(after), total = previous.len(), "Providers removed");
        before.saturating_sub(after)
    }

    /// Instantiates every per-request provider once and removes those that fail.
    ///
    /// Returns the number of providers removed.
    pub fn init_all(&self) -> usize {
        let failed: Vec<u64> = self
            .all
            .load()
            .iter()
            .filter(|entry| entry.is_per_request())
            .filter_map(|entry| match entry.instance() {
                Ok(_) => None,
                Err(err) => {
                    warn!(provider = %entry.name, error = %err, "Provider failed to initialize; removing");
                    Some(entry.id)
                }
            })
            .collect();
        if failed.is_empty() {
            return 0;
        }
        self.remove_where(&|entry: &ProviderEntry| failed.contains(&entry.id))
    }

    /// Number of registered providers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.all.load().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.all.load().is_empty()
    }

    /// First reader that consumes `media_type` and can read `ty`.
    #[must_use]
    pub fn best_reader(
        &self,
        ty: &EntityType,
        media_type: &MediaType,
    ) -> Option<Arc<dyn MessageBodyReader>> {
        let readers = self.readers.load();
        let found = readers
            .iter()
            .filter(|entry| entry.read_type.is_none_or(|t| t == *ty))
            .filter(|entry| entry.consumes_compatible(media_type))
            .find_map(|entry| {
                let reader = match entry.instance() {
                    Ok(instance) => instance.reader?,
                    Err(err) => {
                        warn!(provider = %entry.name, error = %err, "Reader could not be initialized; skipping");
                        return None;
                    }
                };
                reader.is_readable(ty, media_type).then_some(reader)
            });
        found
    }

    /// Writers whose declared entity type admits `ty`, in registry order.
    #[must_use]
    pub fn writer_sub_set(&self, ty: &EntityType) -> WriterSubSet {
        let writers = self.writers.load();
        let entries = writers
            .iter()
            .filter(|entry| entry.write_type.is_none_or(|t| t == *ty))
            .cloned()
            .collect();
        WriterSubSet::new(*ty, entries)
    }

    /// Mapper for `class`, walking up the hierarchy until one is found.
    #[must_use]
    pub fn exception_mapper(&self, class: &'static FaultClass) -> Option<Arc<dyn ExceptionMapper>> {
        for candidate in class.lineage() {
            let Some(entry) = self
                .mappers
                .get(&candidate.key())
                .map(|slot| Arc::clone(&slot.entry))
            else {
                continue;
            };
            match entry.instance() {
                Ok(instance) => {
                    if let Some(mapper) = instance.exception_mapper {
                        debug!(
                            fault_class = class.name(),
                            mapped_as = candidate.name(),
                            provider = %entry.name,
                            "Exception mapper found"
                        );
                        return Some(mapper);
                    }
                }
                Err(err) => {
                    warn!(provider = %entry.name, error = %err, "Exception mapper could not be initialized; skipping");
                }
            }
        }
        None
    }

    /// Turns a fault into a reply.
    ///
    /// - a mapper for the fault class (or an ancestor) produces the reply; a mapper returning
    ///   nothing yields a bare 500
    /// - an unmapped fault carrying a reply yields that reply
    /// - an unmapped unchecked fault is returned as `Err`
    /// - an unmapped checked fault yields a 500 with a short text body
    ///
    /// # Errors
    ///
    /// The fault itself when it is unchecked and nothing maps it.
    pub fn convert(&self, error: ApplicationError) -> Result<Reply, ApplicationError> {
        let class = error.class();
        if let Some(mapper) = self.exception_mapper(class) {
            return Ok(mapper.to_reply(error).unwrap_or_else(|| {
                warn!(fault_class = class.name(), "Exception mapper returned no reply");
                Reply::new(StatusCode::INTERNAL_SERVER_ERROR)
            }));
        }
        if error.reply().is_some() {
            return Ok(error
                .into_reply()
                .unwrap_or_else(|| Reply::new(StatusCode::INTERNAL_SERVER_ERROR)));
        }
        if class.is_unchecked() {
            return Err(error);
        }
        error!(fault_class = class.name(), error = %error, "No exception mapper found");
        Ok(Reply::new(StatusCode::INTERNAL_SERVER_ERROR)
            .media_type(TEXT_PLAIN.clone())
            .entity(NO_MAPPER_MESSAGE.to_string()))
    }

    /// Context of type `C` for entities of `for_type`.
    ///
    /// Resolvers are tried in registry order; a resolver qualifies when its context type is
    /// exactly `C` and, if `media_type` is given, it produces a compatible type. The first value
    /// returned wins.
    #[must_use]
    pub fn context<C: Any + Send + Sync>(
        &self,
        for_type: &EntityType,
        media_type: Option<&MediaType>,
    ) -> Option<Arc<C>> {
        let wanted = EntityType::of::<C>();
        let resolvers = self.resolvers.load();
        let found = resolvers
            .iter()
            .filter(|entry| entry.context_type == Some(wanted))
            .filter(|entry| media_type.is_none_or(|m| entry.produces_compatible(m)))
            .find_map(|entry| {
                let resolver = match entry.instance() {
                    Ok(instance) => instance.context_resolver?,
                    Err(err) => {
                        warn!(provider = %entry.name, error = %err, "Context resolver could not be initialized; skipping");
                        return None;
                    }
                };
                resolver.context(for_type)?.downcast::<C>().ok()
            });
        found
    }
}

fn parse_or_all(types: &[String]) -> Result<Vec<MediaType>, crate::error::MediaTypeError> {
    if types.is_empty() {
        return Ok(vec![ALL.clone()]);
    }
    types.iter().map(|t| t.parse()).collect()
}
