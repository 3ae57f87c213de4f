//! Providers registered as defaults unless disabled in the configuration.

use http::{HeaderMap, StatusCode};

use super::provider::{ExceptionMapper, MessageBodyReader, MessageBodyWriter, Provider, ProviderInstance};
use crate::error::{ApplicationError, FaultClass, WEB_APPLICATION};
use crate::media::MediaType;
use crate::model::{Entity, EntityType, Reply};

/// `String` as text.
#[derive(Debug, Default, Clone, Copy)]
pub struct StringProvider;

impl MessageBodyReader for StringProvider {
    fn supported_type(&self) -> Option<EntityType> {
        Some(EntityType::of::<String>())
    }

    fn is_readable(&self, ty: &EntityType, _media_type: &MediaType) -> bool {
        ty.is::<String>()
    }

    fn read_from(
        &self,
        _ty: &EntityType,
        _media_type: &MediaType,
        _headers: &HeaderMap,
        body: &[u8],
    ) -> Result<Entity, ApplicationError> {
        let text = String::from_utf8(body.to_vec())
            .map_err(|err| ApplicationError::status(StatusCode::BAD_REQUEST).with_source(err))?;
        Ok(Entity::new(text))
    }
}

impl MessageBodyWriter for StringProvider {
    fn supported_type(&self) -> Option<EntityType> {
        Some(EntityType::of::<String>())
    }

    fn is_writeable(&self, ty: &EntityType, _generic: &EntityType, _media_type: &MediaType) -> bool {
        ty.is::<String>()
    }

    fn write_to(
        &self,
        entity: &Entity,
        _generic: &EntityType,
        _media_type: &MediaType,
        _headers: &mut HeaderMap,
    ) -> Result<Vec<u8>, ApplicationError> {
        entity
            .downcast_ref::<String>()
            .map(|text| text.as_bytes().to_vec())
            .ok_or_else(|| unexpected(entity, "text"))
    }
}

/// Raw bytes.
#[derive(Debug, Default, Clone, Copy)]
pub struct BytesProvider;

impl MessageBodyReader for BytesProvider {
    fn supported_type(&self) -> Option<EntityType> {
        Some(EntityType::of::<Vec<u8>>())
    }

    fn is_readable(&self, ty: &EntityType, _media_type: &MediaType) -> bool {
        ty.is::<Vec<u8>>()
    }

    fn read_from(
        &self,
        _ty: &EntityType,
        _media_type: &MediaType,
        _headers: &HeaderMap,
        body: &[u8],
    ) -> Result<Entity, ApplicationError> {
        Ok(Entity::new(body.to_vec()))
    }
}

impl MessageBodyWriter for BytesProvider {
    fn supported_type(&self) -> Option<EntityType> {
        Some(EntityType::of::<Vec<u8>>())
    }

    fn is_writeable(&self, ty: &EntityType, _generic: &EntityType, _media_type: &MediaType) -> bool {
        ty.is::<Vec<u8>>()
    }

    fn write_to(
        &self,
        entity: &Entity,
        _generic: &EntityType,
        _media_type: &MediaType,
        _headers: &mut HeaderMap,
    ) -> Result<Vec<u8>, ApplicationError> {
        entity
            .downcast_ref::<Vec<u8>>()
            .cloned()
            .ok_or_else(|| unexpected(entity, "bytes"))
    }
}

/// `serde_json::Value` as JSON.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonProvider;

impl MessageBodyReader for JsonProvider {
    fn supported_type(&self) -> Option<EntityType> {
        Some(EntityType::of::<serde_json::Value>())
    }

    fn is_readable(&self, ty: &EntityType, media_type: &MediaType) -> bool {
        ty.is::<serde_json::Value>() && is_json(media_type)
    }

    fn read_from(
        &self,
        _ty: &EntityType,
        _media_type: &MediaType,
        _headers: &HeaderMap,
        body: &[u8],
    ) -> Result<Entity, ApplicationError> {
        let value: serde_json::Value = serde_json::from_slice(body)
            .map_err(|err| ApplicationError::status(StatusCode::BAD_REQUEST).with_source(err))?;
        Ok(Entity::new(value))
    }
}

impl MessageBodyWriter for JsonProvider {
    fn supported_type(&self) -> Option<EntityType> {
        Some(EntityType::of::<serde_json::Value>())
    }

    fn is_writeable(&self, ty: &EntityType, _generic: &EntityType, media_type: &MediaType) -> bool {
        ty.is::<serde_json::Value>() && is_json(media_type)
    }

    fn write_to(
        &self,
        entity: &Entity,
        _generic: &EntityType,
        _media_type: &MediaType,
        _headers: &mut HeaderMap,
    ) -> Result<Vec<u8>, ApplicationError> {
        let value = entity
            .downcast_ref::<serde_json::Value>()
            .ok_or_else(|| unexpected(entity, "JSON"))?;
        serde_json::to_vec(value).map_err(|err| {
            ApplicationError::status(StatusCode::INTERNAL_SERVER_ERROR).with_source(err)
        })
    }
}

/// Answers [`WEB_APPLICATION`] faults with the reply they carry.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebApplicationMapper;

impl ExceptionMapper for WebApplicationMapper {
    fn fault_class(&self) -> &'static FaultClass {
        &WEB_APPLICATION
    }

    fn to_reply(&self, error: ApplicationError) -> Option<Reply> {
        Some(
            error
                .into_reply()
                .unwrap_or_else(|| Reply::new(StatusCode::INTERNAL_SERVER_ERROR)),
        )
    }
}

/// The default provider set, in registration order.
#[must_use]
pub fn default_providers() -> Vec<Provider> {
    vec![
        Provider::singleton("string", ProviderInstance::reader_writer(StringProvider))
            .consumes(&["text/plain", "*/*"])
            .produces(&["text/plain", "*/*"]),
        Provider::singleton("bytes", ProviderInstance::reader_writer(BytesProvider))
            .consumes(&["application/octet-stream", "*/*"])
            .produces(&["application/octet-stream", "*/*"]),
        Provider::singleton("json", ProviderInstance::reader_writer(JsonProvider))
            .consumes(&["application/json"])
            .produces(&["application/json"]),
        Provider::singleton(
            "web-application-mapper",
            ProviderInstance::exception_mapper(WebApplicationMapper),
        ),
    ]
}

fn is_json(media_type: &MediaType) -> bool {
    !media_type.is_concrete()
        || media_type.sub_type() == "json"
        || media_type.sub_type().ends_with("+json")
}

fn unexpected(entity: &Entity, what: &str) -> ApplicationError {
    ApplicationError::status(StatusCode::INTERNAL_SERVER_ERROR).with_source(std::io::Error::other(
        format!("cannot write {} as {what}", entity.entity_type()),
    ))
}
