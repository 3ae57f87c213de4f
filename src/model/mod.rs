//! # Model Module
//!
//! The immutable resource model consumed by the dispatcher, and the values flowing through it.
//!
//! A [`ResourceClass`] describes one resource type: its path template, its resource methods
//! (optionally bound to sub-paths) and its sub-resource locators. Classes are assembled with
//! [`ResourceClass::builder`]; handlers are ordinary closures over the instance type:
//!
//! ```rust
//! use restdispatch::model::{ResourceClass, Returned};
//!
//! struct Greeter;
//!
//! let class = ResourceClass::builder::<Greeter>("Greeter")
//!     .path("/hello/{name}")
//!     .produces(&["text/plain"])
//!     .factory(|_| Ok(Greeter))
//!     .get("", |_, inv| {
//!         let name = inv.context().path_param("name").unwrap_or_default();
//!         Ok(Returned::entity(format!("hello {name}")))
//!     })
//!     .build()
//!     .unwrap();
//! assert_eq!(class.methods().len(), 1);
//! ```
//!
//! Method results are [`Returned`] values: nothing (204), a payload, or a full [`Reply`].

mod entity;
mod resource;

pub use entity::{Entity, EntityType, GenericEntity, Payload, Reply, Representation, Returned};
pub use resource::{
    Instance, MethodDef, ResourceClass, ResourceClassBuilder, ResourceMethod, ResourceObject,
    SubResourceLocator,
};
