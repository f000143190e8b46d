//! `#[derive(Document)]` implementation.
//!
//! This module generates implementations of `odm_rs_db::document::DocumentType`
//! and `odm_rs_db::document::Document` for a struct: the descriptor table built
//! from `#[document(...)]` annotations, field views for validation, relation
//! accessors, stored-form conversion, and the partial-update merge.

use darling::{FromDeriveInput, FromField};
use proc_macro2::TokenStream;
use quote::quote;
use syn::ext::IdentExt;
use syn::{DeriveInput, Type};

/// Struct-level attributes parsed from `#[document(...)]`.
#[derive(Debug, FromDeriveInput)]
#[darling(attributes(document), supports(struct_named))]
pub struct DocumentOpts {
    pub ident: syn::Ident,
    pub generics: syn::Generics,
    pub data: darling::ast::Data<(), FieldOpts>,

    /// The registered type name; defaults to the struct name.
    #[darling(default)]
    pub name: Option<String>,

    /// Path to the `odm-rs-db` crate.
    #[darling(default, rename = "crate")]
    pub krate: Option<syn::Path>,
}

/// Per-field attributes parsed from `#[document(...)]`.
#[derive(Debug, FromField)]
#[darling(attributes(document), forward_attrs(serde))]
pub struct FieldOpts {
    pub ident: Option<syn::Ident>,
    pub ty: syn::Type,
    pub attrs: Vec<syn::Attribute>,

    /// Marks the `DocumentBase` field.
    #[darling(default)]
    pub base: bool,

    #[darling(default)]
    pub required: bool,

    #[darling(default)]
    pub min_len: Option<usize>,

    #[darling(default)]
    pub max_len: Option<usize>,

    /// `email` or a delimited pattern.
    #[darling(default)]
    pub validation: Option<String>,

    /// Relation target type name.
    #[darling(default)]
    pub model: Option<String>,

    /// `one` or `many`.
    #[darling(default)]
    pub relation: Option<String>,

    #[darling(default)]
    pub autosave: bool,
}

/// The shape of a field as seen from its Rust type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Shape {
    Text,
    Integer,
    Float,
    Bool,
    Sequence,
    Mapping,
    Timestamp,
    Identifier,
    Json,
    Embedded,
    One,
    Many,
}

impl Shape {
    const fn is_relation(self) -> bool {
        matches!(self, Self::One | Self::Many)
    }

    fn tokens(self, krate: &syn::Path) -> TokenStream {
        let shape = quote! { #krate::fields::FieldShape };
        match self {
            Self::Text => quote! { #shape::Text },
            Self::Integer => quote! { #shape::Integer },
            Self::Float => quote! { #shape::Float },
            Self::Bool => quote! { #shape::Bool },
            Self::Sequence => quote! { #shape::Sequence },
            Self::Mapping => quote! { #shape::Mapping },
            Self::Timestamp => quote! { #shape::Timestamp },
            Self::Identifier => quote! { #shape::Identifier },
            Self::Json => quote! { #shape::Json },
            Self::Embedded => quote! { #shape::Embedded },
            Self::One => quote! { #shape::Reference(#krate::fields::Cardinality::One) },
            Self::Many => quote! { #shape::Reference(#krate::fields::Cardinality::Many) },
        }
    }
}

/// One field after annotation checks.
struct FieldPlan<'a> {
    opts: &'a FieldOpts,
    ident: &'a syn::Ident,
    name: String,
    key: String,
    shape: Shape,
    model: Option<String>,
}

/// Generates the `DocumentType` and `Document` implementations.
pub fn derive_document_impl(input: DeriveInput) -> TokenStream {
    let opts = match DocumentOpts::from_derive_input(&input) {
        Ok(o) => o,
        Err(e) => return e.write_errors(),
    };

    if !opts.generics.params.is_empty() {
        return syn::Error::new_spanned(
            &opts.generics,
            "#[derive(Document)] does not support generic structs",
        )
        .to_compile_error();
    }

    let struct_name = &opts.ident;
    let type_name = opts.name.clone().unwrap_or_else(|| struct_name.to_string());
    let krate = opts
        .krate
        .clone()
        .unwrap_or_else(|| syn::parse_quote!(::odm_rs_db));

    let fields = opts
        .data
        .as_ref()
        .take_struct()
        .expect("#[derive(Document)] only supports named structs")
        .fields;

    let mut errors: Option<syn::Error> = None;

    let mut base_field: Option<&syn::Ident> = None;
    let mut plans = Vec::new();
    for f in &fields {
        let ident = f.ident.as_ref().expect("named struct fields have idents");
        if f.base || is_document_base(&f.ty) {
            if base_field.is_some() {
                push_error(&mut errors, syn::Error::new_spanned(
                    ident,
                    "only one field can hold the DocumentBase",
                ));
            }
            base_field = Some(ident);
            continue;
        }
        match plan_field(f, ident) {
            Ok(plan) => plans.push(plan),
            Err(err) => push_error(&mut errors, err),
        }
    }

    let Some(base) = base_field else {
        push_error(&mut errors, syn::Error::new_spanned(
            struct_name,
            "#[derive(Document)] requires a field of type DocumentBase marked #[document(base)]",
        ));
        return errors.map(|e| e.to_compile_error()).unwrap_or_default();
    };
    if let Some(errors) = errors {
        return errors.to_compile_error();
    }

    let descriptor_tokens: Vec<TokenStream> =
        plans.iter().map(|p| generate_descriptor(p, &krate)).collect();
    let field_value_arms: Vec<TokenStream> = plans
        .iter()
        .map(|p| generate_field_value_arm(p, &krate))
        .collect();
    let relation_names: Vec<&str> = plans
        .iter()
        .filter(|p| p.shape.is_relation())
        .map(|p| p.name.as_str())
        .collect();
    let relation_idents: Vec<&syn::Ident> = plans
        .iter()
        .filter(|p| p.shape.is_relation())
        .map(|p| p.ident)
        .collect();
    let merge_tokens: Vec<TokenStream> =
        plans.iter().map(|p| generate_merge(p, &krate)).collect();

    quote! {
        impl #krate::document::DocumentType for #struct_name {
            fn describe() -> ::std::result::Result<
                #krate::document::DocumentMeta,
                #krate::fields::SchemaError,
            > {
                #krate::document::DocumentMeta::new(#type_name, vec![#(#descriptor_tokens),*])
            }

            fn document_meta() -> &'static #krate::document::DocumentMeta {
                static META: ::std::sync::LazyLock<#krate::document::DocumentMeta> =
                    ::std::sync::LazyLock::new(|| {
                        <#struct_name as #krate::document::DocumentType>::describe()
                            .unwrap_or_else(|err| {
                                panic!("invalid document schema for '{}': {}", #type_name, err)
                            })
                    });
                &META
            }
        }

        impl #krate::document::Document for #struct_name {
            fn meta(&self) -> &'static #krate::document::DocumentMeta {
                <Self as #krate::document::DocumentType>::document_meta()
            }

            fn base(&self) -> &#krate::document::DocumentBase {
                &self.#base
            }

            fn base_mut(&mut self) -> &mut #krate::document::DocumentBase {
                &mut self.#base
            }

            fn field_value(&self, field: &str) -> ::std::option::Option<#krate::value::FieldValue<'_>> {
                match field {
                    #(#field_value_arms,)*
                    _ => ::std::option::Option::None,
                }
            }

            fn relation(&self, field: &str) -> ::std::option::Option<&dyn #krate::relation::RelationValue> {
                match field {
                    #(#relation_names => ::std::option::Option::Some(&self.#relation_idents),)*
                    _ => ::std::option::Option::None,
                }
            }

            fn relation_mut(
                &mut self,
                field: &str,
            ) -> ::std::option::Option<&mut dyn #krate::relation::RelationValue> {
                match field {
                    #(#relation_names => ::std::option::Option::Some(&mut self.#relation_idents),)*
                    _ => ::std::option::Option::None,
                }
            }

            fn to_store(
                &self,
            ) -> #krate::__private::odm_rs_core::OdmResult<
                #krate::__private::serde_json::Map<::std::string::String, #krate::__private::serde_json::Value>,
            > {
                match #krate::__private::serde_json::to_value(self)? {
                    #krate::__private::serde_json::Value::Object(map) => ::std::result::Result::Ok(map),
                    other => ::std::result::Result::Err(
                        #krate::__private::odm_rs_core::OdmError::Mapping(format!(
                            "'{}' serialized to {} instead of a map",
                            #type_name, other
                        )),
                    ),
                }
            }

            #[allow(unused_variables)]
            fn merge_fields(
                &mut self,
                fields: &#krate::__private::serde_json::Map<
                    ::std::string::String,
                    #krate::__private::serde_json::Value,
                >,
            ) -> #krate::__private::odm_rs_core::OdmResult<()> {
                for (key, value) in fields {
                    #(#merge_tokens)*
                }
                ::std::result::Result::Ok(())
            }

            fn as_document(&self) -> &dyn #krate::document::Document {
                self
            }

            fn as_document_mut(&mut self) -> &mut dyn #krate::document::Document {
                self
            }

            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }

            fn into_any(
                self: ::std::boxed::Box<Self>,
            ) -> ::std::boxed::Box<dyn ::std::any::Any + ::std::marker::Send> {
                self
            }
        }
    }
}

fn push_error(errors: &mut Option<syn::Error>, err: syn::Error) {
    match errors {
        Some(existing) => existing.combine(err),
        None => *errors = Some(err),
    }
}

fn plan_field<'a>(f: &'a FieldOpts, ident: &'a syn::Ident) -> syn::Result<FieldPlan<'a>> {
    let name = ident.unraw().to_string();
    let key = serde_rename(&f.attrs)?.unwrap_or_else(|| name.clone());
    let shape = classify(&f.ty);

    if let Some(relation) = &f.relation {
        let declared = match relation.trim().to_ascii_lowercase().as_str() {
            "one" | "11" => Shape::One,
            "many" | "1n" => Shape::Many,
            other => {
                return Err(syn::Error::new_spanned(
                    &f.ty,
                    format!("unknown relation cardinality '{other}', expected \"one\" or \"many\""),
                ))
            }
        };
        if shape.is_relation() && declared != shape {
            return Err(syn::Error::new_spanned(
                &f.ty,
                format!(
                    "field '{name}' is declared relation = \"{relation}\" but its type holds {}",
                    if shape == Shape::Many { "a sequence" } else { "a single record" }
                ),
            ));
        }
        if !shape.is_relation() {
            return Err(syn::Error::new_spanned(
                &f.ty,
                "relation fields must be Relation<T> or RelationList<T>",
            ));
        }
    }

    let model = if shape.is_relation() {
        match &f.model {
            Some(model) => Some(model.clone()),
            None => Some(relation_target(&f.ty).ok_or_else(|| {
                syn::Error::new_spanned(&f.ty, "cannot infer the relation model; add model = \"...\"")
            })?),
        }
    } else {
        f.model.clone()
    };

    Ok(FieldPlan {
        opts: f,
        ident,
        name,
        key,
        shape,
        model,
    })
}

/// Generates a `FieldDescriptor` construction expression for one field.
fn generate_descriptor(plan: &FieldPlan<'_>, krate: &syn::Path) -> TokenStream {
    let name = &plan.name;
    let key = &plan.key;
    let shape = plan.shape.tokens(krate);
    let f = plan.opts;

    let mut chain = Vec::new();
    if key != name {
        chain.push(quote! { .key(#key) });
    }
    if f.required {
        chain.push(quote! { .required() });
    }
    if let Some(min) = f.min_len {
        chain.push(quote! { .min_len(#min) });
    }
    if let Some(max) = f.max_len {
        chain.push(quote! { .max_len(#max) });
    }
    if let Some(validation) = &f.validation {
        chain.push(quote! { .validation(#validation) });
    }
    if let Some(model) = &plan.model {
        chain.push(quote! { .model(#model) });
    }
    match plan.shape {
        Shape::One => chain.push(quote! { .cardinality(#krate::fields::Cardinality::One) }),
        Shape::Many => chain.push(quote! { .cardinality(#krate::fields::Cardinality::Many) }),
        _ => {}
    }
    if f.autosave {
        chain.push(quote! { .autosave() });
    }

    quote! {
        #krate::fields::FieldDescriptor::new(#name, #shape)
            #(#chain)*
    }
}

fn generate_field_value_arm(plan: &FieldPlan<'_>, krate: &syn::Path) -> TokenStream {
    let name = &plan.name;
    let ident = plan.ident;
    let view = if plan.shape == Shape::Embedded {
        if unwrap_option_type(&plan.opts.ty).is_some() {
            quote! { #krate::value::FieldValue::Embedded(self.#ident.is_some()) }
        } else {
            quote! { #krate::value::FieldValue::Embedded(true) }
        }
    } else {
        quote! { #krate::value::AsFieldValue::as_field_value(&self.#ident) }
    };
    quote! { #name => ::std::option::Option::Some(#view) }
}

fn generate_merge(plan: &FieldPlan<'_>, krate: &syn::Path) -> TokenStream {
    let ident = plan.ident;
    let key = &plan.key;
    let name = &plan.name;
    quote! {
        if key.eq_ignore_ascii_case(#key) || key.eq_ignore_ascii_case(#name) {
            self.#ident = #krate::__private::serde_json::from_value(value.clone())?;
            continue;
        }
    }
}

/// Classifies a field type into its shape.
pub(crate) fn classify(ty: &Type) -> Shape {
    let (inner, optional) = match unwrap_option_type(ty) {
        Some(inner) => (inner, true),
        None => (ty, false),
    };
    let Some(segment) = last_segment(inner) else {
        return Shape::Embedded;
    };
    match segment.ident.to_string().as_str() {
        "String" => Shape::Text,
        "i8" | "i16" | "i32" | "i64" | "isize" | "u8" | "u16" | "u32" | "u64" | "usize" => {
            Shape::Integer
        }
        "f32" | "f64" => Shape::Float,
        "bool" => Shape::Bool,
        "Vec" => Shape::Sequence,
        "HashMap" | "BTreeMap" => Shape::Mapping,
        "DateTime" => Shape::Timestamp,
        "ObjectId" => Shape::Identifier,
        "Value" => Shape::Json,
        "Relation" if !optional => Shape::One,
        "RelationList" if !optional => Shape::Many,
        _ => Shape::Embedded,
    }
}

fn is_document_base(ty: &Type) -> bool {
    last_segment(ty).is_some_and(|s| s.ident == "DocumentBase")
}

fn last_segment(ty: &Type) -> Option<&syn::PathSegment> {
    match ty {
        Type::Path(type_path) => type_path.path.segments.last(),
        _ => None,
    }
}

/// Returns the name of `T` in `Relation<T>` or `RelationList<T>`.
fn relation_target(ty: &Type) -> Option<String> {
    let segment = last_segment(ty)?;
    let syn::PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    match args.args.first()? {
        syn::GenericArgument::Type(inner) => last_segment(inner).map(|s| s.ident.to_string()),
        _ => None,
    }
}

/// Reads `rename = "..."` from forwarded `#[serde(...)]` attributes.
fn serde_rename(attrs: &[syn::Attribute]) -> syn::Result<Option<String>> {
    let mut rename = None;
    for attr in attrs.iter().filter(|a| a.path().is_ident("serde")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename") && meta.input.peek(syn::Token![=]) {
                let value: syn::LitStr = meta.value()?.parse()?;
                rename = Some(value.value());
            } else if meta.input.peek(syn::Token![=]) {
                let _: syn::Expr = meta.value()?.parse()?;
            } else if meta.input.peek(syn::token::Paren) {
                let _: proc_macro2::Group = meta.input.parse()?;
            }
            Ok(())
        })?;
    }
    Ok(rename)
}

/// If the type is `Option<T>`, returns `Some(&T)`. Otherwise `None`.
pub(crate) fn unwrap_option_type(ty: &Type) -> Option<&Type> {
    if let Type::Path(type_path) = ty {
        let segment = type_path.path.segments.last()?;
        if segment.ident == "Option" {
            if let syn::PathArguments::AngleBracketed(ref args) = segment.arguments {
                if let Some(syn::GenericArgument::Type(inner)) = args.args.first() {
                    return Some(inner);
                }
            }
        }
    }
    None
}
