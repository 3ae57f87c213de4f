use std::cmp::{Ordering, Reverse};
use std::sync::Arc;

use arc_swap::ArcSwap;
use http::{header, HeaderValue, Method, StatusCode};
use tracing::{debug, error, info, info_span, warn};

use super::context::{CallContext, Invocation, RoleChecker};
use super::convert::{reply_to_response, returned_to_response};
use super::request::{Request, Response};
use crate::config::DispatcherConfig;
use crate::error::{join_methods, ApplicationError, DispatchError};
use crate::media::MediaType;
use crate::model::{ResourceClass, ResourceMethod, ResourceObject, SubResourceLocator};
use crate::path::{compare_rank, select_best, MatchResult, PathExpression, Ranked, RemainingPath};
use crate::providers::{Provider, ProviderInstance, Providers};

/// Outcome of a dispatch phase that may answer the request early.
#[derive(Debug)]
pub(crate) enum Step<T> {
    Continue(T),
    Handled(Response),
}

struct RootCandidate<'a> {
    class: &'a Arc<ResourceClass>,
    path: &'a PathExpression,
    result: MatchResult,
}

impl Ranked for RootCandidate<'_> {
    fn path_expression(&self) -> &PathExpression {
        self.path
    }
}

enum SubCandidate<'a> {
    Method(&'a ResourceMethod),
    Locator(&'a SubResourceLocator, MatchResult),
}

impl Ranked for SubCandidate<'_> {
    fn path_expression(&self) -> &PathExpression {
        match self {
            SubCandidate::Method(method) => method.path_expression(),
            SubCandidate::Locator(locator, _) => locator.path_expression(),
        }
    }

    fn is_locator(&self) -> bool {
        matches!(self, SubCandidate::Locator(..))
    }
}

struct MethodCandidate<'a> {
    index: usize,
    method: &'a ResourceMethod,
    result: MatchResult,
}

/// Routes requests to resource classes, invokes the selected resource method and converts its
/// result.
///
/// Registration may happen at any time, including while requests are being dispatched on other
/// threads; dispatch only ever reads consistent snapshots.
pub struct Dispatcher {
    config: DispatcherConfig,
    roots: ArcSwap<Vec<Arc<ResourceClass>>>,
    providers: Providers,
    role_checker: Option<Arc<dyn RoleChecker>>,
}

impl Dispatcher {
    /// A dispatcher with no resources; the built-in providers are registered unless disabled.
    #[must_use]
    pub fn new(config: DispatcherConfig) -> Self {
        let providers = if config.load_default_providers {
            Providers::with_defaults()
        } else {
            Providers::new()
        };
        info!(
            base_path = %config.base_path,
            max_locator_depth = config.max_locator_depth,
            default_providers = providers.len(),
            "Dispatcher created"
        );
        Self {
            config,
            roots: ArcSwap::from_pointee(Vec::new()),
            providers,
            role_checker: None,
        }
    }

    /// Installs the collaborator answering role checks.
    #[must_use]
    pub fn with_role_checker(mut self, checker: impl RoleChecker + 'static) -> Self {
        self.role_checker = Some(Arc::new(checker));
        self
    }

    #[must_use]
    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    #[must_use]
    pub fn providers(&self) -> &Providers {
        &self.providers
    }

    /// Registers a root resource class.
    ///
    /// Registering the same class again is a no-op returning `true`. A class without a path or
    /// factory, or whose path equals the path of another registered class, is rejected with
    /// `false`; the existing registration stays in place.
    pub fn add_root_resource_class(&self, class: &Arc<ResourceClass>) -> bool {
        let Some(path) = class.path() else {
            warn!(class = %class.name(), "Root resource class rejected: no path");
            return false;
        };
        if !class.has_factory() {
            warn!(class = %class.name(), "Root resource class rejected: no factory");
            return false;
        }

        enum Outcome {
            Added,
            AlreadyRegistered,
            DuplicatePath(String),
        }
        let mut outcome = Outcome::Added;
        self.roots.rcu(|current| {
            if current.iter().any(|existing| is_same_class(existing, class)) {
                outcome = Outcome::AlreadyRegistered;
                return Arc::clone(current);
            }
            if let Some(existing) = current.iter().find(|existing| existing.path() == Some(path)) {
                outcome = Outcome::DuplicatePath(existing.name().to_string());
                return Arc::clone(current);
            }
            outcome = Outcome::Added;
            let mut next = Vec::clone(current);
            next.push(Arc::clone(class));
            Arc::new(next)
        });

        match outcome {
            Outcome::Added => {
                info!(
                    class = %class.name(),
                    path = %path,
                    total_roots = self.roots.load().len(),
                    "Root resource class registered"
                );
                true
            }
            Outcome::AlreadyRegistered => {
                debug!(class = %class.name(), "Root resource class already registered");
                true
            }
            Outcome::DuplicatePath(existing) => {
                warn!(
                    class = %class.name(),
                    path = %path,
                    existing = %existing,
                    "Root resource class rejected: path already registered"
                );
                false
            }
        }
    }

    /// Registers a provider; see [`Providers::add`].
    pub fn add_provider(&self, provider: Provider, is_default: bool) -> bool {
        self.providers.add(provider, is_default)
    }

    /// Registers an already constructed provider instance as a singleton.
    pub fn add_provider_instance(&self, name: &str, instance: ProviderInstance, is_default: bool) -> bool {
        self.providers.add(Provider::singleton(name, instance), is_default)
    }

    /// Templates of the registered root resource classes, in registration order.
    #[must_use]
    pub fn root_uris(&self) -> Vec<String> {
        self.roots
            .load()
            .iter()
            .filter_map(|class| class.path().map(ToString::to_string))
            .collect()
    }

    /// Dispatches `request`; always produces a response.
    ///
    /// Faults that escape exception mapping are logged and answered with a bare 500.
    pub fn handle(&self, request: Request) -> Response {
        match self.try_handle(request) {
            Ok(response) => response,
            Err(err) => {
                error!(
                    fault_class = err.class().name(),
                    error = %err,
                    "Unmapped fault escaped dispatch"
                );
                Response::new(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }

    /// Dispatches `request`.
    ///
    /// # Errors
    ///
    /// An unchecked [`ApplicationError`] for which no exception mapper exists.
    pub fn try_handle(&self, mut request: Request) -> Result<Response, ApplicationError> {
        let mut context = CallContext::new(&request, self.role_checker.clone());
        let span = info_span!(
            "dispatch",
            request_id = %context.request_id(),
            method = %request.method(),
            path = %request.path()
        );
        let _entered = span.enter();

        let body = request.take_body();
        let response = match self.dispatch(&request, &mut context, body) {
            Ok(response) => response,
            Err(err) => self.error_response(err, &context)?,
        };
        Ok(self.finish(response, request.method()))
    }

    fn dispatch(
        &self,
        request: &Request,
        context: &mut CallContext,
        body: Option<Vec<u8>>,
    ) -> Result<Response, DispatchError> {
        let Some(path) = self.relative_path(request.path()) else {
            debug!(base_path = %self.config.base_path, "Request outside the base path");
            return Err(DispatchError::RootResourceNotFound {
                path: request.path().to_string(),
            });
        };

        // P1: root resource
        let (object, remaining) = self.identify_root_resource(&path, context)?;
        // P2: sub-resource locators
        let (mut object, remaining) = self.resolve_resource_object(object, remaining, context)?;
        // P3: resource method
        let class = Arc::clone(object.class());
        let index = match self.identify_method(&class, &remaining, context)? {
            Step::Continue(index) => index,
            Step::Handled(response) => return Ok(response),
        };
        let method = &class.methods()[index];

        context.set_read_only();
        debug!(method = %method.name(), "Invoking resource method");
        let returned = {
            let mut invocation = Invocation::new(context, &self.providers, body);
            method.invoke(object.instance_mut(), &mut invocation)?
        };
        returned_to_response(returned, method, context, &self.providers)
    }

    /// Strips the base path; `None` if the request is outside it.
    fn relative_path(&self, raw: &str) -> Option<RemainingPath> {
        let base = self.config.normalized_base_path();
        if base.is_empty() || base == "/" {
            return Some(RemainingPath::new(raw));
        }
        let rest = raw.strip_prefix(base)?;
        (rest.is_empty() || rest.starts_with('/') || rest.starts_with(';'))
            .then(|| RemainingPath::new(rest))
    }

    fn identify_root_resource(
        &self,
        path: &RemainingPath,
        context: &mut CallContext,
    ) -> Result<(ResourceObject, RemainingPath), DispatchError> {
        let roots = self.roots.load();
        let candidates = roots.iter().filter_map(|class| {
            let expr = class.path()?;
            let result = expr.match_path(path)?;
            (result.remainder.is_empty_or_slash() || class.has_sub_resource_methods_or_locators())
                .then_some(RootCandidate {
                    class,
                    path: expr,
                    result,
                })
        });
        let Some(best) = select_best(candidates) else {
            warn!(path = %path, roots = roots.len(), "No root resource class matches");
            return Err(DispatchError::RootResourceNotFound {
                path: path.to_string(),
            });
        };
        debug!(
            class = %best.class.name(),
            template = %best.path,
            remainder = %best.result.remainder,
            "Root resource class selected"
        );

        context.add_path_params(&best.result.variables)?;
        context.add_for_matched(&best.result.matched, best.class.name());
        let instance = best.class.instantiate(context)?;
        Ok((
            ResourceObject::from_parts(Arc::clone(best.class), instance),
            best.result.remainder,
        ))
    }

    fn resolve_resource_object(
        &self,
        mut object: ResourceObject,
        mut remaining: RemainingPath,
        context: &mut CallContext,
    ) -> Result<(ResourceObject, RemainingPath), DispatchError> {
        let mut depth = 0;
        loop {
            if remaining.is_empty_or_slash() {
                return Ok((object, remaining));
            }
            let class = Arc::clone(object.class());
            let methods = class
                .methods()
                .iter()
                .filter(|method| method.is_sub_resource_method())
                .filter(|method| method.path_expression().match_complete(&remaining).is_some())
                .map(SubCandidate::Method);
            let locators = class.locators().iter().filter_map(|locator| {
                locator
                    .path_expression()
                    .match_path(&remaining)
                    .map(|result| SubCandidate::Locator(locator, result))
            });
            let Some(best) = select_best(methods.chain(locators)) else {
                warn!(class = %class.name(), remaining = %remaining, "No sub-resource matches");
                return Err(DispatchError::ResourceNotFound {
                    path: context.request_path().to_string(),
                });
            };

            match best {
                SubCandidate::Method(method) => {
                    debug!(method = %method.name(), "Sub-resource method selected");
                    return Ok((object, remaining));
                }
                SubCandidate::Locator(locator, result) => {
                    depth += 1;
                    if depth > self.config.max_locator_depth {
                        error!(
                            limit = self.config.max_locator_depth,
                            locator = %locator.name(),
                            "Sub-resource locator chain too deep"
                        );
                        return Err(DispatchError::LocatorDepthExceeded {
                            limit: self.config.max_locator_depth,
                        });
                    }
                    context.add_path_params(&result.variables)?;
                    context.add_for_matched(&result.matched, class.name());
                    let next = {
                        let mut invocation = Invocation::new(context, &self.providers, None);
                        locator.locate(object.instance_mut(), &mut invocation)?
                    };
                    debug!(
                        locator = %locator.name(),
                        next = %next.class().name(),
                        depth,
                        "Sub-resource located"
                    );
                    object = next;
                    remaining = result.remainder;
                }
            }
        }
    }

    fn identify_method(
        &self,
        class: &ResourceClass,
        remaining: &RemainingPath,
        context: &mut CallContext,
    ) -> Result<Step<usize>, DispatchError> {
        let matching: Vec<MethodCandidate<'_>> = class
            .methods()
            .iter()
            .enumerate()
            .filter_map(|(index, method)| {
                method
                    .path_expression()
                    .match_complete(remaining)
                    .map(|result| MethodCandidate {
                        index,
                        method,
                        result,
                    })
            })
            .collect();
        if matching.is_empty() {
            warn!(class = %class.name(), remaining = %remaining, "No resource method matches path");
            return Err(DispatchError::ResourceMethodNotFound {
                path: context.request_path().to_string(),
            });
        }

        let http_method = context.method().clone();
        let supporting: Vec<&MethodCandidate<'_>> = matching
            .iter()
            .filter(|candidate| candidate.method.supports(&http_method))
            .collect();
        if supporting.is_empty() {
            let allowed = allowed_methods(matching.iter().map(|candidate| candidate.method));
            if http_method == Method::OPTIONS {
                debug!(allowed = %join_methods(&allowed), "Answering OPTIONS");
                return Ok(Step::Handled(options_response(&allowed)));
            }
            warn!(method = %http_method, allowed = %join_methods(&allowed), "Method not allowed");
            return Err(DispatchError::MethodNotAllowed {
                method: http_method,
                allowed,
            });
        }

        let given = context.entity_media_type().cloned();
        let consuming: Vec<&MethodCandidate<'_>> = match &given {
            Some(given) => supporting
                .iter()
                .copied()
                .filter(|candidate| candidate.method.consumes().iter().any(|c| c.includes(given)))
                .collect(),
            None => supporting.clone(),
        };
        if consuming.is_empty() {
            let consumed = union(supporting.iter().flat_map(|c| c.method.consumes()));
            warn!(given = ?given, "Unsupported request media type");
            return Err(DispatchError::UnsupportedMediaType {
                given: given.unwrap_or_else(|| crate::media::ALL.clone()),
                consumed,
            });
        }

        let accepted = context.accepted_media_types().media_types();
        let producing: Vec<&MethodCandidate<'_>> = consuming
            .iter()
            .copied()
            .filter(|candidate| produce_score(candidate.method, &accepted).is_some())
            .collect();
        if producing.is_empty() {
            let producible = union(consuming.iter().flat_map(|c| c.method.produces()));
            warn!(accepted = ?accepted, "No resource method produces an accepted media type");
            return Err(DispatchError::NotAcceptable { producible });
        }

        let is_head = http_method == Method::HEAD;
        let best = producing
            .into_iter()
            .reduce(|best, next| {
                match compare_methods(next.method, best.method, given.as_ref(), &accepted, is_head) {
                    Ordering::Less => next,
                    _ => best,
                }
            })
            .ok_or_else(|| DispatchError::ResourceMethodNotFound {
                path: context.request_path().to_string(),
            })?;

        context.add_path_params(&best.result.variables)?;
        if !best.result.matched.is_empty() {
            context.add_for_matched(&best.result.matched, class.name());
        }
        debug!(method = %best.method.name(), "Resource method selected");
        Ok(Step::Continue(best.index))
    }

    /// Routes a phase failure through exception mapping and converts the resulting reply.
    fn error_response(&self, err: DispatchError, context: &CallContext) -> Result<Response, ApplicationError> {
        let status = err.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %err, "Dispatch failed");
        } else {
            debug!(status = status.as_u16(), error = %err, "Dispatch failed");
        }
        let reply = self.providers.convert(err.into_application_error())?;
        match reply_to_response(reply, None, context, &self.providers) {
            Ok(response) => Ok(response),
            Err(err) => {
                error!(error = %err, "Error reply could not be converted");
                Ok(Response::new(StatusCode::INTERNAL_SERVER_ERROR))
            }
        }
    }

    fn finish(&self, mut response: Response, method: &Method) -> Response {
        if *method == Method::HEAD && self.config.strip_head_body {
            response.body.clear();
        }
        response
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.config)
            .field("roots", &self.root_uris())
            .field("providers", &self.providers.len())
            .finish_non_exhaustive()
    }
}

fn is_same_class(a: &Arc<ResourceClass>, b: &Arc<ResourceClass>) -> bool {
    Arc::ptr_eq(a, b) || (a.instance_type() == b.instance_type() && a.name() == b.name())
}

/// Declared methods, plus HEAD when GET is present, plus OPTIONS.
fn allowed_methods<'a>(methods: impl Iterator<Item = &'a ResourceMethod>) -> Vec<Method> {
    let mut allowed: Vec<Method> = Vec::new();
    for method in methods {
        if !allowed.contains(method.http_method()) {
            allowed.push(method.http_method().clone());
        }
    }
    if allowed.contains(&Method::GET) && !allowed.contains(&Method::HEAD) {
        allowed.push(Method::HEAD);
    }
    if !allowed.contains(&Method::OPTIONS) {
        allowed.push(Method::OPTIONS);
    }
    allowed
}

fn options_response(allowed: &[Method]) -> Response {
    let mut response = Response::new(StatusCode::OK);
    if let Ok(value) = HeaderValue::from_str(&join_methods(allowed)) {
        response.headers.insert(header::ALLOW, value);
    }
    response
}

fn union<'a>(types: impl Iterator<Item = &'a MediaType>) -> Vec<MediaType> {
    let mut all: Vec<MediaType> = Vec::new();
    for media in types {
        if !all.contains(media) {
            all.push(media.clone());
        }
    }
    all
}

/// 3 for an exact consumable type, 2 for `type/*` of the same type, 1 for `*/*`.
fn consume_score(method: &ResourceMethod, given: Option<&MediaType>) -> u8 {
    let Some(given) = given else {
        return 0;
    };
    method
        .consumes()
        .iter()
        .filter(|c| c.includes(given))
        .map(|c| {
            if c.equals_ignoring_params(given) {
                3
            } else if !c.is_wildcard_type() {
                2
            } else {
                1
            }
        })
        .max()
        .unwrap_or(0)
}

/// Position of the first accepted type the method can produce, with the specificity of the
/// best producible type for it. A method declaring no types produces anything.
fn produce_score(method: &ResourceMethod, accepted: &[MediaType]) -> Option<(usize, u8)> {
    if method.produces().is_empty() {
        return Some((0, 0));
    }
    accepted.iter().enumerate().find_map(|(index, acc)| {
        method
            .produces()
            .iter()
            .filter(|p| p.is_compatible(acc))
            .map(|p| p.specificity())
            .max()
            .map(|specificity| (index, specificity))
    })
}

/// `Less` when `a` is the better method.
fn compare_methods(
    a: &ResourceMethod,
    b: &ResourceMethod,
    given: Option<&MediaType>,
    accepted: &[MediaType],
    is_head: bool,
) -> Ordering {
    let produce_key = |m: &ResourceMethod| {
        produce_score(m, accepted).map(|(index, specificity)| (index, Reverse(specificity)))
    };
    consume_score(b, given)
        .cmp(&consume_score(a, given))
        .then_with(|| produce_key(a).cmp(&produce_key(b)))
        .then_with(|| {
            if is_head {
                let explicit = |m: &ResourceMethod| *m.http_method() != Method::HEAD;
                explicit(a).cmp(&explicit(b))
            } else {
                Ordering::Equal
            }
        })
        .then_with(|| compare_rank(a, b))
}
