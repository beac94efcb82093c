//! `idgov-core`: identity-governance building blocks shared by every crate.
//!
//! Identifiers, the shared error type and a couple of marker traits. No
//! evaluation logic lives here.

pub mod entity;
pub mod error;
pub mod id;
pub mod value_object;

pub use entity::Entity;
pub use error::{CoreError, CoreResult};
pub use id::{ObjectId, PolicyId, PrincipalId, RoleId};
pub use value_object::ValueObject;
