use std::any::{type_name, Any, TypeId};
use std::fmt;

use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};

use crate::media::MediaType;

/// Runtime identity of an entity type, used to select readers, writers and context resolvers.
#[derive(Clone, Copy)]
pub struct EntityType {
    id: TypeId,
    name: &'static str,
}

impl EntityType {
    #[must_use]
    pub fn of<T: Any>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    #[must_use]
    pub fn id(&self) -> TypeId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn is<T: Any>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }
}

impl PartialEq for EntityType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for EntityType {}

impl std::hash::Hash for EntityType {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// A type-erased entity value.
pub struct Entity {
    value: Box<dyn Any + Send + Sync>,
    ty: EntityType,
}

impl Entity {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            value: Box::new(value),
            ty: EntityType::of::<T>(),
        }
    }

    #[must_use]
    pub fn entity_type(&self) -> EntityType {
        self.ty
    }

    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Takes the value back out, or returns the entity unchanged if it is not a `T`.
    pub fn downcast<T: Any>(self) -> Result<T, Entity> {
        let ty = self.ty;
        self.value
            .downcast::<T>()
            .map(|value| *value)
            .map_err(|value| Entity { value, ty })
    }

    #[must_use]
    pub fn as_any(&self) -> &(dyn Any + Send + Sync) {
        self.value.as_ref()
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity").field("type", &self.ty).finish()
    }
}

/// An entity whose declared type overrides the resource method's return type when a writer is
/// chosen.
#[derive(Debug)]
pub struct GenericEntity {
    pub entity: Entity,
    pub declared: EntityType,
}

impl GenericEntity {
    pub fn new<T: Any + Send + Sync>(value: T, declared: EntityType) -> Self {
        Self {
            entity: Entity::new(value),
            declared,
        }
    }
}

/// Bytes ready for the wire. Only the charset is adjusted on the way out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Representation {
    pub media_type: Option<MediaType>,
    pub body: Vec<u8>,
}

impl Representation {
    #[must_use]
    pub fn new(media_type: Option<MediaType>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            media_type,
            body: body.into(),
        }
    }

    #[must_use]
    pub fn charset(&self) -> Option<&str> {
        self.media_type.as_ref().and_then(MediaType::charset)
    }
}

/// What a resource method hands back as body.
#[derive(Debug)]
pub enum Payload {
    Entity(Entity),
    Generic(GenericEntity),
    Representation(Representation),
}

impl Payload {
    pub fn entity<T: Any + Send + Sync>(value: T) -> Self {
        Payload::Entity(Entity::new(value))
    }
}

/// Return value of a resource method.
#[derive(Debug)]
pub enum Returned {
    /// No entity: answered with 204.
    Nothing,
    Value(Payload),
    Reply(Reply),
}

impl Returned {
    pub fn entity<T: Any + Send + Sync>(value: T) -> Self {
        Returned::Value(Payload::entity(value))
    }

    /// `Nothing` for `None`, otherwise the entity.
    pub fn optional<T: Any + Send + Sync>(value: Option<T>) -> Self {
        value.map_or(Returned::Nothing, Returned::entity)
    }
}

impl From<Reply> for Returned {
    fn from(reply: Reply) -> Self {
        Returned::Reply(reply)
    }
}

impl From<Representation> for Returned {
    fn from(representation: Representation) -> Self {
        Returned::Value(Payload::Representation(representation))
    }
}

/// A response built by application code or an exception mapper.
#[derive(Debug)]
pub struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    media_type: Option<MediaType>,
    body: Option<Payload>,
}

impl Reply {
    #[must_use]
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            media_type: None,
            body: None,
        }
    }

    #[must_use]
    pub fn ok() -> Self {
        Self::new(StatusCode::OK)
    }

    #[must_use]
    pub fn entity<T: Any + Send + Sync>(self, value: T) -> Self {
        self.payload(Payload::entity(value))
    }

    #[must_use]
    pub fn payload(mut self, payload: Payload) -> Self {
        self.body = Some(payload);
        self
    }

    #[must_use]
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Fixes the response media type; negotiation is skipped.
    #[must_use]
    pub fn media_type(mut self, media_type: MediaType) -> Self {
        self.media_type = Some(media_type);
        self
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    #[must_use]
    pub fn declared_media_type(&self) -> Option<&MediaType> {
        self.media_type.as_ref()
    }

    #[must_use]
    pub fn body(&self) -> Option<&Payload> {
        self.body.as_ref()
    }

    pub(crate) fn into_parts(self) -> (StatusCode, HeaderMap, Option<MediaType>, Option<Payload>) {
        (self.status, self.headers, self.media_type, self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Widget(u32);

    #[test]
    fn test_entity_downcast() {
        let entity = Entity::new(Widget(3));
        assert!(entity.entity_type().is::<Widget>());
        assert_eq!(entity.downcast_ref::<Widget>(), Some(&Widget(3)));
        let entity = entity.downcast::<String>().expect_err("not a string");
        assert_eq!(entity.downcast::<Widget>().expect("widget"), Widget(3));
    }

    #[test]
    fn test_optional_maps_none_to_nothing() {
        assert!(matches!(Returned::optional::<Widget>(None), Returned::Nothing));
        assert!(matches!(
            Returned::optional(Some(Widget(1))),
            Returned::Value(Payload::Entity(_))
        ));
    }
}
