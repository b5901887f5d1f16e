//! Entity metadata.
//!
//! Entity types declare their constraints through [`Entity`]; the
//! [`DeclarationCatalog`] caches those lists per type and merges in
//! declarations registered at runtime.

mod catalog;
mod entity;

pub use catalog::DeclarationCatalog;
pub use entity::Entity;
