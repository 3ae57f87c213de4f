use std::any::Any;
use std::fmt;
use std::sync::Arc;

use http::HeaderMap;

use crate::error::{ApplicationError, FaultClass};
use crate::media::MediaType;
use crate::model::{Entity, EntityType, Reply};

/// Converts request bodies into entities.
pub trait MessageBodyReader: Send + Sync {
    /// Narrowest entity type this reader handles; `None` if it decides in
    /// [`is_readable`](MessageBodyReader::is_readable).
    fn supported_type(&self) -> Option<EntityType> {
        None
    }

    fn is_readable(&self, ty: &EntityType, media_type: &MediaType) -> bool;

    /// # Errors
    ///
    /// Any [`ApplicationError`]; it is routed through exception mapping like a method fault.
    fn read_from(
        &self,
        ty: &EntityType,
        media_type: &MediaType,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<Entity, ApplicationError>;
}

/// Converts entities into response bodies.
pub trait MessageBodyWriter: Send + Sync {
    /// Narrowest entity type this writer handles; `None` if it decides in
    /// [`is_writeable`](MessageBodyWriter::is_writeable).
    fn supported_type(&self) -> Option<EntityType> {
        None
    }

    /// `ty` is the runtime type of the entity, `generic` the declared type (the resource
    /// method's return type or the type carried by a generic entity).
    fn is_writeable(&self, ty: &EntityType, generic: &EntityType, media_type: &MediaType) -> bool;

    /// Serializes `entity`; may add response headers.
    ///
    /// # Errors
    ///
    /// Any [`ApplicationError`]; it is routed through exception mapping.
    fn write_to(
        &self,
        entity: &Entity,
        generic: &EntityType,
        media_type: &MediaType,
        headers: &mut HeaderMap,
    ) -> Result<Vec<u8>, ApplicationError>;
}

/// Turns faults of one class (and its subclasses, unless more specific mappers exist) into
/// replies.
pub trait ExceptionMapper: Send + Sync {
    fn fault_class(&self) -> &'static FaultClass;

    /// `None` is answered with a bare 500.
    fn to_reply(&self, error: ApplicationError) -> Option<Reply>;
}

/// Supplies a shared context object (configuration, codecs, ...) of one type.
pub trait ContextResolver: Send + Sync {
    /// Type of the values returned by [`context`](ContextResolver::context).
    fn context_type(&self) -> EntityType;

    /// Context to use for entities of `for_type`, if this resolver covers it.
    fn context(&self, for_type: &EntityType) -> Option<Arc<dyn Any + Send + Sync>>;
}

/// Capabilities of one provider instance.
///
/// A single provider may act as reader, writer, exception mapper and context resolver at
/// once; each capability is an independent handle.
#[derive(Clone, Default)]
pub struct ProviderInstance {
    pub reader: Option<Arc<dyn MessageBodyReader>>,
    pub writer: Option<Arc<dyn MessageBodyWriter>>,
    pub exception_mapper: Option<Arc<dyn ExceptionMapper>>,
    pub context_resolver: Option<Arc<dyn ContextResolver>>,
}

impl ProviderInstance {
    pub fn reader(reader: impl MessageBodyReader + 'static) -> Self {
        Self {
            reader: Some(Arc::new(reader)),
            ..Self::default()
        }
    }

    pub fn writer(writer: impl MessageBodyWriter + 'static) -> Self {
        Self {
            writer: Some(Arc::new(writer)),
            ..Self::default()
        }
    }

    /// One object serving both directions.
    pub fn reader_writer<P>(provider: P) -> Self
    where
        P: MessageBodyReader + MessageBodyWriter + 'static,
    {
        let provider = Arc::new(provider);
        Self {
            reader: Some(Arc::clone(&provider) as Arc<dyn MessageBodyReader>),
            writer: Some(provider as Arc<dyn MessageBodyWriter>),
            ..Self::default()
        }
    }

    pub fn exception_mapper(mapper: impl ExceptionMapper + 'static) -> Self {
        Self {
            exception_mapper: Some(Arc::new(mapper)),
            ..Self::default()
        }
    }

    pub fn context_resolver(resolver: impl ContextResolver + 'static) -> Self {
        Self {
            context_resolver: Some(Arc::new(resolver)),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reader.is_none()
            && self.writer.is_none()
            && self.exception_mapper.is_none()
            && self.context_resolver.is_none()
    }
}

impl fmt::Debug for ProviderInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderInstance")
            .field("reader", &self.reader.is_some())
            .field("writer", &self.writer.is_some())
            .field("exception_mapper", &self.exception_mapper.is_some())
            .field("context_resolver", &self.context_resolver.is_some())
            .finish()
    }
}

type InstanceFactory = Arc<dyn Fn() -> Result<ProviderInstance, ApplicationError> + Send + Sync>;

#[derive(Clone)]
pub(crate) enum Lifecycle {
    Singleton(ProviderInstance),
    PerRequest(InstanceFactory),
}

/// A provider ready for registration.
///
/// Media types default to `*/*` in both directions.
#[derive(Clone)]
pub struct Provider {
    pub(crate) name: String,
    pub(crate) lifecycle: Lifecycle,
    pub(crate) consumes: Vec<String>,
    pub(crate) produces: Vec<String>,
}

impl Provider {
    /// A provider whose single instance serves every request.
    pub fn singleton(name: &str, instance: ProviderInstance) -> Self {
        Self {
            name: name.to_string(),
            lifecycle: Lifecycle::Singleton(instance),
            consumes: Vec::new(),
            produces: Vec::new(),
        }
    }

    /// A provider instantiated for every lookup. The factory is probed once at registration
    /// to learn the capabilities.
    pub fn per_request<F>(name: &str, factory: F) -> Self
    where
        F: Fn() -> Result<ProviderInstance, ApplicationError> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            lifecycle: Lifecycle::PerRequest(Arc::new(factory)),
            consumes: Vec::new(),
            produces: Vec::new(),
        }
    }

    #[must_use]
    pub fn consumes(mut self, types: &[&str]) -> Self {
        self.consumes.extend(types.iter().map(ToString::to_string));
        self
    }

    #[must_use]
    pub fn produces(mut self, types: &[&str]) -> Self {
        self.produces.extend(types.iter().map(ToString::to_string));
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("name", &self.name)
            .field("consumes", &self.consumes)
            .field("produces", &self.produces)
            .finish_non_exhaustive()
    }
}

/// A registered provider: parsed media types plus what the registration probe learned.
pub(crate) struct ProviderEntry {
    pub id: u64,
    pub name: String,
    pub is_default: bool,
    pub consumes: Vec<MediaType>,
    pub produces: Vec<MediaType>,
    pub lifecycle: Lifecycle,
    pub read_type: Option<EntityType>,
    pub write_type: Option<EntityType>,
    pub mapped_class: Option<&'static FaultClass>,
    pub context_type: Option<EntityType>,
    pub is_reader: bool,
    pub is_writer: bool,
}

impl ProviderEntry {
    /// The instance to use for one lookup: the singleton, or a fresh per-request instance.
    pub fn instance(&self) -> Result<ProviderInstance, ApplicationError> {
        match &self.lifecycle {
            Lifecycle::Singleton(instance) => Ok(instance.clone()),
            Lifecycle::PerRequest(factory) => factory(),
        }
    }

    pub fn is_per_request(&self) -> bool {
        matches!(self.lifecycle, Lifecycle::PerRequest(_))
    }

    pub fn consumes_compatible(&self, media_type: &MediaType) -> bool {
        self.consumes.iter().any(|m| m.is_compatible(media_type))
    }

    pub fn produces_compatible(&self, media_type: &MediaType) -> bool {
        self.produces.iter().any(|m| m.is_compatible(media_type))
    }
}

impl fmt::Debug for ProviderEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderEntry")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("is_default", &self.is_default)
            .finish_non_exhaustive()
    }
}
