//! Storage is organized around [store::Store], a mapping of four named top-level fields:
//!   - `sites`: per-domain aggregates.
//!   - `sessions`: closed session history, newest last.
//!   - `settings`: user settings.
//!   - `focusMode`: the focus mode singleton.
//!
//! Reads always return every field, substituting defaults. Writes shallow-merge the fields they
//! carry. Everything that has to read before writing goes through [SerializedStore].

pub mod blob_store;
pub mod entities;
pub mod field_store;
#[cfg(test)]
pub mod memory;
pub mod store;

pub use store::{open_store, LocalStore, SerializedStore, Store, StoreBackend};
