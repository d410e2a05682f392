//! Custom derive macros for AMQP 1.0 composite types
//!
//! `SerializeComposite` and `DeserializeComposite` implement `serde::Serialize` and
//! `serde::Deserialize` for a struct with named fields, encoding it as a described list.
//!
//! ```rust,ignore
//! #[derive(SerializeComposite, DeserializeComposite)]
//! #[amqp_contract(
//!     name = "amqp:begin:list",
//!     code = "0x0000_0000:0x0000_0011",
//!     encoding = "list",
//!     rename_all = "kebab-case"
//! )]
//! pub struct Begin {
//!     pub remote_channel: Option<u16>,
//!     pub next_outgoing_id: u32,
//!     #[amqp_contract(default = "u32::MAX")]
//!     pub handle_max: u32,
//!     // ...
//! }
//! ```
//!
//! An `Option` field that is `None` and a `default` field holding its default value are written
//! as `null`, and trailing nulls are left out of the list. On the way back, absent and `null`
//! fields read as `None` or as the default, while a mandatory field that is absent or `null` is
//! reported with `serde::de::Error::missing_field`.

use darling::{ast, util::Override, FromDeriveInput, FromField};
use quote::quote;
use syn::DeriveInput;

mod de;
mod ser;
mod util;

#[derive(Debug, FromDeriveInput)]
#[darling(attributes(amqp_contract), supports(struct_named))]
struct DescribedAttr {
    ident: syn::Ident,
    generics: syn::Generics,
    data: ast::Data<(), FieldAttr>,
    #[darling(default)]
    name: Option<String>,
    #[darling(default)]
    code: Option<String>,
    #[darling(default)]
    encoding: Option<String>,
    #[darling(default)]
    rename_all: String,
}

#[derive(Debug, FromField)]
#[darling(attributes(amqp_contract))]
struct FieldAttr {
    ident: Option<syn::Ident>,
    ty: syn::Type,
    /// `default` falls back to `Default::default()`, `default = "expr"` to the expression
    #[darling(default)]
    default: Option<Override<syn::Expr>>,
}

/// How a field is written and read back
enum FieldKind {
    /// `Option<T>`, `None` is written as `null`
    Optional,
    /// The field is written as `null` when it equals its default
    Default(Option<syn::Expr>),
    /// The field must be present
    Mandatory,
}

struct CompositeField {
    ident: syn::Ident,
    ty: syn::Type,
    /// Name of the field in the AMQP type definition
    name: String,
    kind: FieldKind,
}

struct Composite {
    ident: syn::Ident,
    name: String,
    code: Option<u64>,
    fields: Vec<CompositeField>,
}

#[proc_macro_derive(SerializeComposite, attributes(amqp_contract))]
pub fn derive_serialize_composite(item: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let input = syn::parse_macro_input!(item as DeriveInput);
    let expanded = util::parse_composite(&input).map(|composite| ser::expand_serialize(&composite));
    wrap(expanded)
}

#[proc_macro_derive(DeserializeComposite, attributes(amqp_contract))]
pub fn derive_deserialize_composite(item: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let input = syn::parse_macro_input!(item as DeriveInput);
    let expanded =
        util::parse_composite(&input).map(|composite| de::expand_deserialize(&composite));
    wrap(expanded)
}

fn wrap(expanded: Result<proc_macro2::TokenStream, darling::Error>) -> proc_macro::TokenStream {
    match expanded {
        Ok(tokens) => quote! {
            const _: () = {
                #tokens
            };
        }
        .into(),
        Err(err) => err.write_errors().into(),
    }
}
