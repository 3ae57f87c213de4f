//! Turns method results and replies into wire responses.

use http::{header, HeaderMap, HeaderValue, StatusCode};
use tracing::{debug, error, warn};

use super::context::CallContext;
use super::request::Response;
use crate::error::DispatchError;
use crate::media::{negotiate_media_type, supported_charset, MediaType, TEXT_PLAIN};
use crate::model::{Entity, EntityType, Payload, Reply, Representation, Returned, ResourceMethod};
use crate::providers::{Providers, WriterSubSet};

/// Converts what a resource method returned.
pub(crate) fn returned_to_response(
    returned: Returned,
    method: &ResourceMethod,
    context: &CallContext,
    providers: &Providers,
) -> Result<Response, DispatchError> {
    match returned {
        Returned::Nothing => Ok(Response::new(StatusCode::NO_CONTENT)),
        Returned::Value(payload) => {
            reply_to_response(Reply::ok().payload(payload), Some(method), context, providers)
        }
        Returned::Reply(reply) => reply_to_response(reply, Some(method), context, providers),
    }
}

/// Converts a reply. `method` is `None` for replies produced outside a resource method, such as
/// exception mapping; their media type defaults to `text/plain`.
pub(crate) fn reply_to_response(
    reply: Reply,
    method: Option<&ResourceMethod>,
    context: &CallContext,
    providers: &Providers,
) -> Result<Response, DispatchError> {
    let (status, mut headers, explicit, body) = reply.into_parts();
    let body = match body {
        None => {
            let status = if status == StatusCode::OK {
                StatusCode::NO_CONTENT
            } else {
                status
            };
            return Ok(Response {
                status,
                headers,
                body: Vec::new(),
            });
        }
        Some(Payload::Representation(representation)) => {
            write_representation(representation, explicit, &mut headers)
        }
        Some(Payload::Entity(entity)) => {
            let generic = method
                .and_then(ResourceMethod::return_type)
                .unwrap_or_else(|| entity.entity_type());
            write_entity(&entity, generic, explicit, method, context, providers, &mut headers)?
        }
        Some(Payload::Generic(generic)) => write_entity(
            &generic.entity,
            generic.declared,
            explicit,
            method,
            context,
            providers,
            &mut headers,
        )?,
    };
    Ok(Response {
        status,
        headers,
        body,
    })
}

fn write_representation(
    representation: Representation,
    explicit: Option<MediaType>,
    headers: &mut HeaderMap,
) -> Vec<u8> {
    let Representation { media_type, body } = representation;
    if let Some(media_type) = explicit.or(media_type) {
        let media_type = match media_type.charset() {
            Some(charset) => {
                let normalized = supported_charset(Some(charset));
                if !normalized.eq_ignore_ascii_case(charset) {
                    debug!(from = %charset, to = %normalized, "Relabelling representation charset");
                }
                media_type.with_param("charset", normalized)
            }
            None => media_type,
        };
        set_content_type(headers, &media_type);
    }
    body
}

fn write_entity(
    entity: &Entity,
    generic: EntityType,
    explicit: Option<MediaType>,
    method: Option<&ResourceMethod>,
    context: &CallContext,
    providers: &Providers,
    headers: &mut HeaderMap,
) -> Result<Vec<u8>, DispatchError> {
    let ty = entity.entity_type();
    let writers = providers.writer_sub_set(&ty);
    if writers.is_empty() {
        error!(entity_type = %ty, "No message body writer for entity type");
        return Err(DispatchError::NoMessageBodyWriter {
            type_name: ty.name(),
            media_type: None,
        });
    }
    let media_type = determine_media_type(explicit, method, &writers, context)?;
    let Some(writer) = writers.best_writer(&generic, &media_type) else {
        error!(entity_type = %ty, media_type = %media_type, "No message body writer for negotiated media type");
        return Err(DispatchError::NoMessageBodyWriter {
            type_name: ty.name(),
            media_type: Some(media_type),
        });
    };
    let body = writer.write_to(entity, &generic, &media_type, headers)?;
    if !headers.contains_key(header::CONTENT_TYPE) {
        set_content_type(headers, &media_type);
    }
    Ok(body)
}

/// Response media type for an entity.
///
/// An explicit reply media type wins; without a resource method the answer is `text/plain`;
/// otherwise the method's producible types (or, if it declares none, everything the writers
/// can produce) are negotiated against the client's accepted types.
fn determine_media_type(
    explicit: Option<MediaType>,
    method: Option<&ResourceMethod>,
    writers: &WriterSubSet,
    context: &CallContext,
) -> Result<MediaType, DispatchError> {
    if let Some(explicit) = explicit {
        return Ok(explicit);
    }
    let Some(method) = method else {
        return Ok(TEXT_PLAIN.clone());
    };
    let producible = if method.produces().is_empty() {
        writers.all_producible_media_types()
    } else {
        method.produces().to_vec()
    };
    let accepted = context.accepted_media_types().media_types();
    negotiate_media_type(producible, &accepted).inspect_err(|_| {
        warn!(method = %method.name(), "No acceptable response media type");
    })
}

fn set_content_type(headers: &mut HeaderMap, media_type: &MediaType) {
    match HeaderValue::from_str(&media_type.to_string()) {
        Ok(value) => {
            headers.insert(header::CONTENT_TYPE, value);
        }
        Err(err) => warn!(media_type = %media_type, error = %err, "Cannot render Content-Type"),
    }
}
