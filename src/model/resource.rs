use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use http::Method;

use super::entity::{EntityType, Returned};
use crate::dispatcher::{CallContext, Invocation};
use crate::error::{ApplicationError, ModelError, INVALID_STATE};
use crate::media::{MediaType, ALL};
use crate::path::{PathExpression, Ranked};

/// Type-erased resource instance.
pub type Instance = Box<dyn Any + Send>;

type Handler =
    Arc<dyn Fn(&mut (dyn Any + Send), &mut Invocation<'_>) -> Result<Returned, ApplicationError> + Send + Sync>;
type Locator = Arc<
    dyn Fn(&mut (dyn Any + Send), &mut Invocation<'_>) -> Result<ResourceObject, ApplicationError>
        + Send
        + Sync,
>;
type Factory = Arc<dyn Fn(&CallContext) -> Result<Instance, ApplicationError> + Send + Sync>;

/// Declaration of a resource method: HTTP method, optional sub-path and media types.
#[derive(Debug, Clone)]
pub struct MethodDef {
    http_method: Method,
    name: Option<String>,
    path: Option<String>,
    consumes: Vec<String>,
    produces: Vec<String>,
    return_type: Option<EntityType>,
}

impl MethodDef {
    #[must_use]
    pub fn new(http_method: Method) -> Self {
        Self {
            http_method,
            name: None,
            path: None,
            consumes: Vec::new(),
            produces: Vec::new(),
            return_type: None,
        }
    }

    /// Makes this a sub-resource method bound to `template` below the class path.
    #[must_use]
    pub fn path(mut self, template: &str) -> Self {
        self.path = Some(template.to_string());
        self
    }

    #[must_use]
    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
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

    /// Static return type, used for writer selection when the returned entity is not a
    /// [`GenericEntity`](super::GenericEntity).
    #[must_use]
    pub fn returns<T: Any>(mut self) -> Self {
        self.return_type = Some(EntityType::of::<T>());
        self
    }
}

/// A resource method or sub-resource method of a [`ResourceClass`].
pub struct ResourceMethod {
    name: String,
    http_method: Method,
    path: PathExpression,
    sub_resource: bool,
    consumes: Vec<MediaType>,
    produces: Vec<MediaType>,
    return_type: Option<EntityType>,
    handler: Handler,
}

impl ResourceMethod {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn http_method(&self) -> &Method {
        &self.http_method
    }

    /// True if the method declares its own path.
    #[must_use]
    pub fn is_sub_resource_method(&self) -> bool {
        self.sub_resource
    }

    /// Consumable types; `*/*` when nothing is declared.
    #[must_use]
    pub fn consumes(&self) -> &[MediaType] {
        &self.consumes
    }

    /// Producible types; empty when nothing is declared.
    #[must_use]
    pub fn produces(&self) -> &[MediaType] {
        &self.produces
    }

    #[must_use]
    pub fn return_type(&self) -> Option<EntityType> {
        self.return_type
    }

    /// True if this method answers `method`; a GET method answers HEAD.
    #[must_use]
    pub fn supports(&self, method: &Method) -> bool {
        self.http_method == method || (method == Method::HEAD && self.http_method == Method::GET)
    }

    pub(crate) fn invoke(
        &self,
        instance: &mut (dyn Any + Send),
        invocation: &mut Invocation<'_>,
    ) -> Result<Returned, ApplicationError> {
        (self.handler)(instance, invocation)
    }
}

impl Ranked for ResourceMethod {
    fn path_expression(&self) -> &PathExpression {
        &self.path
    }
}

impl fmt::Debug for ResourceMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceMethod")
            .field("name", &self.name)
            .field("http_method", &self.http_method)
            .field("path", &self.path.template())
            .field("consumes", &self.consumes)
            .field("produces", &self.produces)
            .finish_non_exhaustive()
    }
}

/// A sub-resource locator: a path below the class that yields the next resource object.
pub struct SubResourceLocator {
    name: String,
    path: PathExpression,
    locator: Locator,
}

impl SubResourceLocator {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn locate(
        &self,
        instance: &mut (dyn Any + Send),
        invocation: &mut Invocation<'_>,
    ) -> Result<ResourceObject, ApplicationError> {
        (self.locator)(instance, invocation)
    }
}

impl Ranked for SubResourceLocator {
    fn path_expression(&self) -> &PathExpression {
        &self.path
    }

    fn is_locator(&self) -> bool {
        true
    }
}

impl fmt::Debug for SubResourceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubResourceLocator")
            .field("name", &self.name)
            .field("path", &self.path.template())
            .finish_non_exhaustive()
    }
}

/// Immutable description of a root resource or sub-resource class.
pub struct ResourceClass {
    name: String,
    instance_type: TypeId,
    path: Option<PathExpression>,
    methods: Vec<ResourceMethod>,
    locators: Vec<SubResourceLocator>,
    factory: Option<Factory>,
}

impl ResourceClass {
    /// Starts describing a resource class whose instances are `T`.
    #[must_use]
    pub fn builder<T: Any + Send>(name: &str) -> ResourceClassBuilder<T> {
        ResourceClassBuilder {
            name: name.to_string(),
            path: None,
            consumes: Vec::new(),
            produces: Vec::new(),
            factory: None,
            methods: Vec::new(),
            locators: Vec::new(),
            _instance: PhantomData,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn instance_type(&self) -> TypeId {
        self.instance_type
    }

    /// Class-level path; `None` for classes only reachable through locators.
    #[must_use]
    pub fn path(&self) -> Option<&PathExpression> {
        self.path.as_ref()
    }

    #[must_use]
    pub fn methods(&self) -> &[ResourceMethod] {
        &self.methods
    }

    #[must_use]
    pub fn locators(&self) -> &[SubResourceLocator] {
        &self.locators
    }

    #[must_use]
    pub fn has_factory(&self) -> bool {
        self.factory.is_some()
    }

    /// True if the class can consume more path than its own template.
    #[must_use]
    pub fn has_sub_resource_methods_or_locators(&self) -> bool {
        !self.locators.is_empty() || self.methods.iter().any(ResourceMethod::is_sub_resource_method)
    }

    /// Creates an instance for a request.
    pub(crate) fn instantiate(&self, context: &CallContext) -> Result<Instance, ApplicationError> {
        match &self.factory {
            Some(factory) => factory(context),
            None => Err(ApplicationError::new(
                &INVALID_STATE,
                format!("{} cannot be instantiated: no factory", self.name),
            )),
        }
    }
}

impl fmt::Debug for ResourceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceClass")
            .field("name", &self.name)
            .field("path", &self.path.as_ref().map(PathExpression::template))
            .field("methods", &self.methods)
            .field("locators", &self.locators)
            .finish_non_exhaustive()
    }
}

struct PendingLocator {
    name: String,
    path: String,
    locator: Locator,
}

/// Builder for [`ResourceClass`]. Templates and media types are validated by
/// [`build`](ResourceClassBuilder::build).
pub struct ResourceClassBuilder<T> {
    name: String,
    path: Option<String>,
    consumes: Vec<String>,
    produces: Vec<String>,
    factory: Option<Factory>,
    methods: Vec<(MethodDef, Handler)>,
    locators: Vec<PendingLocator>,
    _instance: PhantomData<fn() -> T>,
}

impl<T: Any + Send> ResourceClassBuilder<T> {
    /// Class path template; required for root resource classes.
    #[must_use]
    pub fn path(mut self, template: &str) -> Self {
        self.path = Some(template.to_string());
        self
    }

    /// Default consumable types for methods declaring none.
    #[must_use]
    pub fn consumes(mut self, types: &[&str]) -> Self {
        self.consumes.extend(types.iter().map(ToString::to_string));
        self
    }

    /// Default producible types for methods declaring none.
    #[must_use]
    pub fn produces(mut self, types: &[&str]) -> Self {
        self.produces.extend(types.iter().map(ToString::to_string));
        self
    }

    /// How an instance is created for each request that reaches this class as root.
    #[must_use]
    pub fn factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&CallContext) -> Result<T, ApplicationError> + Send + Sync + 'static,
    {
        self.factory = Some(Arc::new(move |context: &CallContext| {
            factory(context).map(|instance| Box::new(instance) as Instance)
        }));
        self
    }

    #[must_use]
    pub fn handle<F>(mut self, def: MethodDef, handler: F) -> Self
    where
        F: Fn(&mut T, &mut Invocation<'_>) -> Result<Returned, ApplicationError>
            + Send
            + Sync
            + 'static,
    {
        let handler: Handler = Arc::new(move |instance: &mut (dyn Any + Send), invocation: &mut Invocation<'_>| {
            handler(downcast_instance::<T>(instance)?, invocation)
        });
        self.methods.push((def, handler));
        self
    }

    /// A GET method; `path` may be empty for the class path itself.
    #[must_use]
    pub fn get<F>(self, path: &str, handler: F) -> Self
    where
        F: Fn(&mut T, &mut Invocation<'_>) -> Result<Returned, ApplicationError>
            + Send
            + Sync
            + 'static,
    {
        self.handle(def_for(Method::GET, path), handler)
    }

    #[must_use]
    pub fn post<F>(self, path: &str, handler: F) -> Self
    where
        F: Fn(&mut T, &mut Invocation<'_>) -> Result<Returned, ApplicationError>
            + Send
            + Sync
            + 'static,
    {
        self.handle(def_for(Method::POST, path), handler)
    }

    #[must_use]
    pub fn put<F>(self, path: &str, handler: F) -> Self
    where
        F: Fn(&mut T, &mut Invocation<'_>) -> Result<Returned, ApplicationError>
            + Send
            + Sync
            + 'static,
    {
        self.handle(def_for(Method::PUT, path), handler)
    }

    #[must_use]
    pub fn delete<F>(self, path: &str, handler: F) -> Self
    where
        F: Fn(&mut T, &mut Invocation<'_>) -> Result<Returned, ApplicationError>
            + Send
            + Sync
            + 'static,
    {
        self.handle(def_for(Method::DELETE, path), handler)
    }

    /// A sub-resource locator at `path`.
    #[must_use]
    pub fn locator<F>(mut self, path: &str, locator: F) -> Self
    where
        F: Fn(&mut T, &mut Invocation<'_>) -> Result<ResourceObject, ApplicationError>
            + Send
            + Sync
            + 'static,
    {
        let locator: Locator = Arc::new(move |instance: &mut (dyn Any + Send), invocation: &mut Invocation<'_>| {
            locator(downcast_instance::<T>(instance)?, invocation)
        });
        self.locators.push(PendingLocator {
            name: format!("locator {path}"),
            path: path.to_string(),
            locator,
        });
        self
    }

    /// Compiles all templates and media types.
    ///
    /// # Errors
    ///
    /// [`ModelError::InvalidPath`] or [`ModelError::InvalidMediaType`] naming the offending
    /// class, method or locator.
    pub fn build(self) -> Result<Arc<ResourceClass>, ModelError> {
        let class_name = self.name;
        let path = self
            .path
            .as_deref()
            .map(|template| compile_path(&class_name, template))
            .transpose()?;
        let class_consumes = parse_media_types(&class_name, &self.consumes)?;
        let class_produces = parse_media_types(&class_name, &self.produces)?;

        let mut methods = Vec::with_capacity(self.methods.len());
        for (def, handler) in self.methods {
            let name = def.name.clone().unwrap_or_else(|| {
                format!(
                    "{} {} {}",
                    class_name,
                    def.http_method,
                    def.path.as_deref().unwrap_or("")
                )
                .trim_end()
                .to_string()
            });
            let (method_path, sub_resource) = match def.path.as_deref() {
                Some(template) if !template.trim_matches('/').is_empty() => {
                    (compile_path(&name, template)?, true)
                }
                _ => (PathExpression::empty(), false),
            };
            let mut consumes = parse_media_types(&name, &def.consumes)?;
            if consumes.is_empty() {
                consumes.clone_from(&class_consumes);
            }
            if consumes.is_empty() {
                consumes.push(ALL.clone());
            }
            let mut produces = parse_media_types(&name, &def.produces)?;
            if produces.is_empty() {
                produces.clone_from(&class_produces);
            }
            methods.push(ResourceMethod {
                name,
                http_method: def.http_method,
                path: method_path,
                sub_resource,
                consumes,
                produces,
                return_type: def.return_type,
                handler,
            });
        }

        let locators = self
            .locators
            .into_iter()
            .map(|pending| {
                Ok(SubResourceLocator {
                    path: compile_path(&pending.name, &pending.path)?,
                    name: pending.name,
                    locator: pending.locator,
                })
            })
            .collect::<Result<Vec<_>, ModelError>>()?;

        Ok(Arc::new(ResourceClass {
            name: class_name,
            instance_type: TypeId::of::<T>(),
            path,
            methods,
            locators,
            factory: self.factory,
        }))
    }
}

/// A resource instance together with its class.
pub struct ResourceObject {
    class: Arc<ResourceClass>,
    instance: Instance,
}

impl ResourceObject {
    /// Pairs `instance` with `class`; used by sub-resource locators.
    ///
    /// # Errors
    ///
    /// An [`INVALID_STATE`] fault if `class` does not describe `T`.
    pub fn new<T: Any + Send>(class: &Arc<ResourceClass>, instance: T) -> Result<Self, ApplicationError> {
        if class.instance_type != TypeId::of::<T>() {
            return Err(ApplicationError::new(
                &INVALID_STATE,
                format!("{} does not describe {}", class.name, type_name::<T>()),
            ));
        }
        Ok(Self {
            class: Arc::clone(class),
            instance: Box::new(instance),
        })
    }

    pub(crate) fn from_parts(class: Arc<ResourceClass>, instance: Instance) -> Self {
        Self { class, instance }
    }

    #[must_use]
    pub fn class(&self) -> &Arc<ResourceClass> {
        &self.class
    }

    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.instance.downcast_ref::<T>()
    }

    pub(crate) fn instance_mut(&mut self) -> &mut (dyn Any + Send) {
        self.instance.as_mut()
    }
}

impl fmt::Debug for ResourceObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceObject")
            .field("class", &self.class.name)
            .finish_non_exhaustive()
    }
}

fn def_for(method: Method, path: &str) -> MethodDef {
    let def = MethodDef::new(method);
    if path.trim_matches('/').is_empty() {
        def
    } else {
        def.path(path)
    }
}

fn downcast_instance<T: Any>(instance: &mut (dyn Any + Send)) -> Result<&mut T, ApplicationError> {
    instance.downcast_mut::<T>().ok_or_else(|| {
        ApplicationError::new(
            &INVALID_STATE,
            format!("resource instance is not a {}", type_name::<T>()),
        )
    })
}

fn compile_path(owner: &str, template: &str) -> Result<PathExpression, ModelError> {
    PathExpression::compile(template).map_err(|source| ModelError::InvalidPath {
        owner: owner.to_string(),
        source,
    })
}

fn parse_media_types(owner: &str, types: &[String]) -> Result<Vec<MediaType>, ModelError> {
    types
        .iter()
        .map(|text| {
            text.parse::<MediaType>()
                .map_err(|source| ModelError::InvalidMediaType {
                    owner: owner.to_string(),
                    source,
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TemplateError;

    struct Widgets;

    fn widgets() -> ResourceClassBuilder<Widgets> {
        ResourceClass::builder::<Widgets>("Widgets")
            .path("/widgets")
            .factory(|_| Ok(Widgets))
    }

    #[test]
    fn test_build_defaults_media_types() {
        let class = widgets()
            .produces(&["application/json"])
            .get("", |_, _| Ok(Returned::Nothing))
            .handle(
                MethodDef::new(Method::POST).consumes(&["text/plain"]).produces(&["text/plain"]),
                |_, _| Ok(Returned::Nothing),
            )
            .build()
            .expect("class");
        let get = &class.methods()[0];
        assert_eq!(get.consumes(), &[ALL.clone()]);
        assert_eq!(get.produces()[0].to_string(), "application/json");
        assert!(!get.is_sub_resource_method());
        let post = &class.methods()[1];
        assert_eq!(post.consumes()[0].to_string(), "text/plain");
        assert!(!class.has_sub_resource_methods_or_locators());
    }

    #[test]
    fn test_sub_resource_methods_and_locators_are_detected() {
        let class = widgets()
            .get("{id}", |_, _| Ok(Returned::Nothing))
            .build()
            .expect("class");
        assert!(class.has_sub_resource_methods_or_locators());
        assert!(class.methods()[0].is_sub_resource_method());
        assert_eq!(class.methods()[0].name(), "Widgets GET {id}");
    }

    #[test]
    fn test_invalid_definitions_are_rejected() {
        let err = widgets()
            .get("{id", |_, _| Ok(Returned::Nothing))
            .build()
            .expect_err("bad template");
        assert!(matches!(
            err,
            ModelError::InvalidPath {
                source: TemplateError::UnclosedVariable { .. },
                ..
            }
        ));
        let err = widgets()
            .produces(&["json"])
            .build()
            .expect_err("bad media type");
        assert!(matches!(err, ModelError::InvalidMediaType { .. }));
    }

    #[test]
    fn test_resource_object_checks_instance_type() {
        struct Other;
        let class = widgets().build().expect("class");
        assert!(ResourceObject::new(&class, Widgets).is_ok());
        let err = ResourceObject::new(&class, Other).expect_err("type mismatch");
        assert!(err.class().is_a(&INVALID_STATE));
    }

    #[test]
    fn test_head_is_answered_by_get() {
        let class = widgets()
            .get("", |_, _| Ok(Returned::Nothing))
            .build()
            .expect("class");
        let get = &class.methods()[0];
        assert!(get.supports(&Method::GET));
        assert!(get.supports(&Method::HEAD));
        assert!(!get.supports(&Method::POST));
    }
}
