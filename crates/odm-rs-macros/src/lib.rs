//! # odm-rs-macros
//!
//! Procedural macros for odm-rs. Provides `#[derive(Document)]`, which builds a
//! record type's descriptor table from its field annotations and implements the
//! object-safe accessors the engine drives.
//!
//! This crate is independent of all other odm-rs crates because proc-macro crates
//! cannot depend on crates that use them.

mod document;

use proc_macro::TokenStream;
use syn::{parse_macro_input, DeriveInput};

/// Derives `Document` and `DocumentType` for a struct with named fields.
///
/// # Struct attributes
///
/// - `#[document(name = "User")]` - the registered type name (defaults to the
///   struct name)
/// - `#[document(crate = "odm_rs::db")]` - path to the `odm-rs-db` crate when
///   it is only reachable through the facade
///
/// # Field attributes
///
/// - `base` - marks the `DocumentBase` field (detected by type when omitted)
/// - `required` - the field must be set
/// - `min_len = N`, `max_len = N` - bounds on text length in characters
/// - `validation = "email"` or `validation = "/pattern/flags"`
/// - `model = "User"` - relation target; inferred from `Relation<T>` /
///   `RelationList<T>` when omitted
/// - `relation = "one" | "many"` - checked against the field type
/// - `autosave` - saving the parent saves related records first
///
/// Stored keys follow `#[serde(rename = "...")]` and default to the field name.
///
/// # Examples
///
/// ```ignore
/// #[derive(Debug, Default, Serialize, Deserialize, Document)]
/// pub struct User {
///     #[serde(flatten)]
///     #[document(base)]
///     pub base: DocumentBase,
///     #[document(required, min_len = 2)]
///     pub name: String,
///     #[document(validation = "email")]
///     pub email: String,
///     #[document(autosave)]
///     pub messages: RelationList<Message>,
/// }
/// ```
#[proc_macro_derive(Document, attributes(document))]
pub fn derive_document(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    document::derive_document_impl(input).into()
}
