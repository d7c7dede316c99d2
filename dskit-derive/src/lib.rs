#![recursion_limit = "128"]
//! # dskit derive macros
//!
//! Procedural macros that implement the dskit record traits.
//!
//! ## Macros
//!
//! ### `Entity`
//!
//! Derives `PropertyLoadSaver` and `Entity` for a struct with named fields,
//! making it storable through `Repo<E>` and `DsKit`.
//!
//! - **Container attribute**: `#[entity(kind = "...", created(...), updated(...))]`
//! - **Field attributes**: `#[entity(key)]`, `#[entity(parent)]`,
//!   `#[entity(meta)]`, `#[entity(ignore)]`, `#[entity(no_index)]`,
//!   `#[entity(rename = "...")]`
//!
//! ```rust,ignore
//! use dskit::entity::EntityMeta;
//! use dskit::Entity;
//!
//! #[derive(Entity, Default, Clone, Debug)]
//! #[entity(kind = "Order", updated(enabled = true, indexed = true))]
//! pub struct Order {
//!     #[entity(meta)]
//!     meta: EntityMeta,
//!     #[entity(parent)]
//!     customer: Option<Key>,
//!     total: f64,
//!     #[entity(no_index)]
//!     notes: String,
//! }
//! ```
//!
//! ### `Convertible`
//!
//! Derives `Convertible` so a type can be used as an entity field:
//! structs with named fields are stored as embedded entities, enums with
//! unit variants are stored as the variant name.
//!
//! ```rust,ignore
//! #[derive(Convertible, Default, Clone, Debug)]
//! pub struct Address {
//!     pub street: String,
//!     pub city: String,
//! }
//!
//! #[derive(Convertible, Clone, Debug)]
//! pub enum Status {
//!     Open,
//!     Closed,
//! }
//! ```

extern crate proc_macro;
mod attributes;
mod convertible;
mod entity;

use crate::convertible::{generate_convertible_for_enum, generate_convertible_for_struct};
use crate::entity::generate_entity_for_struct;
use proc_macro::TokenStream;
use syn::{Data, DeriveInput};

/// Derives `Convertible` for structs with named fields and unit-only enums.
///
/// # Attributes
///
/// - `#[converter(ignored = "a, b")]` - fields that are neither stored nor
///   loaded; they keep their default value on load
///
/// # Errors
///
/// Returns a compile error if:
/// - The struct is a tuple or unit struct
/// - An enum variant carries data
/// - The type is a union
///
/// Structs must implement `Default`: properties missing from the stored
/// value leave the field at its default.
#[proc_macro_derive(Convertible, attributes(converter))]
pub fn derive_convertible(input: TokenStream) -> TokenStream {
    let ast = syn::parse_macro_input!(input as DeriveInput);

    match ast.data {
        Data::Struct(ref data) => match generate_convertible_for_struct(&ast, data) {
            Ok(token_stream) => token_stream,
            Err(e) => e.to_compile_error().into(),
        },
        Data::Enum(ref data) => match generate_convertible_for_enum(&ast, data) {
            Ok(token_stream) => token_stream,
            Err(e) => e.to_compile_error().into(),
        },
        Data::Union(_) => {
            let error = syn::Error::new_spanned(
                &ast,
                "Cannot derive Convertible for unions. Only structs and enums are supported.",
            );
            error.to_compile_error().into()
        }
    }
}

/// Derives `PropertyLoadSaver` and `Entity` for a struct.
///
/// # Container attribute
///
/// - `kind = "..."` - the storage kind, defaults to the struct name
/// - `created(enabled = bool, indexed = bool)` - the `_created` timestamp,
///   enabled and unindexed by default
/// - `updated(enabled = bool, indexed = bool)` - the `_updated` timestamp,
///   disabled by default
///
/// Timestamps are only written by a struct with a `#[entity(meta)]` field.
///
/// # Field attributes
///
/// - `key` - an `Option<Key>` field receiving the key the record is stored under
/// - `parent` - an `Option<Key>` field used as the parent of newly created keys
/// - `meta` - an `EntityMeta` field holding key and timestamps, also enabling
///   the lifecycle hooks
/// - `ignore` - not stored, not loaded
/// - `no_index` - stored unindexed
/// - `rename = "..."` - the property name, defaults to the field name
///
/// # Errors
///
/// Returns a compile error for enums, unions, tuple structs, unknown
/// attributes or more than one `key`, `parent` or `meta` field.
#[proc_macro_derive(Entity, attributes(entity))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let ast = syn::parse_macro_input!(input as DeriveInput);

    match ast.data {
        Data::Struct(ref data) => match generate_entity_for_struct(&ast, data) {
            Ok(token_stream) => token_stream,
            Err(e) => e.to_compile_error().into(),
        },
        Data::Enum(_) => {
            let error = syn::Error::new_spanned(
                &ast,
                "Cannot derive Entity for enums. Only structs are supported.",
            );
            error.to_compile_error().into()
        }
        Data::Union(_) => {
            let error = syn::Error::new_spanned(
                &ast,
                "Cannot derive Entity for unions. Only structs are supported.",
            );
            error.to_compile_error().into()
        }
    }
}
