use quote::quote;

use crate::{Composite, FieldKind};

pub(crate) fn descriptor(composite: &Composite) -> proc_macro2::TokenStream {
    match composite.code {
        Some(code) => quote!(oxamqp_codec::descriptor::Descriptor::Code(#code)),
        None => {
            let name = &composite.name;
            quote!(oxamqp_codec::descriptor::Descriptor::Name(
                oxamqp_codec::primitives::Symbol::from(#name)
            ))
        }
    }
}

/// Nulls are buffered and only written once a later field carries a value
fn macro_rules_buffer_nulls() -> proc_macro2::TokenStream {
    quote! {
        #[allow(unused_macros)]
        macro_rules! flush_nulls {
            ($state: ident, $nulls: ident) => {
                for __name in $nulls.drain(..) {
                    // `None` and `()` share the same encoding
                    $state.serialize_field(__name, &())?;
                }
            };
        }

        #[allow(unused_macros)]
        macro_rules! buffer_if_none {
            ($state: ident, $nulls: ident, $fident: expr, $fname: expr) => {
                if $fident.is_some() {
                    flush_nulls!($state, $nulls);
                    $state.serialize_field($fname, $fident)?;
                } else {
                    $nulls.push($fname);
                }
            };
        }

        #[allow(unused_macros)]
        macro_rules! buffer_if_eq {
            ($state: ident, $nulls: ident, $fident: expr, $fname: expr, $default: expr) => {
                if *$fident != $default {
                    flush_nulls!($state, $nulls);
                    $state.serialize_field($fname, $fident)?;
                } else {
                    $nulls.push($fname);
                }
            };
        }
    }
}

pub(crate) fn expand_serialize(composite: &Composite) -> proc_macro2::TokenStream {
    let ident = &composite.ident;
    let descriptor = descriptor(composite);
    let len = composite.fields.len();
    let buffer_nulls = macro_rules_buffer_nulls();

    let fields = composite.fields.iter().map(|field| {
        let id = &field.ident;
        let ty = &field.ty;
        let name = &field.name;
        match &field.kind {
            FieldKind::Optional => quote! {
                buffer_if_none!(__state, __nulls, &self.#id, #name);
            },
            FieldKind::Default(None) => quote! {
                buffer_if_eq!(__state, __nulls, &self.#id, #name, <#ty as Default>::default());
            },
            FieldKind::Default(Some(default)) => quote! {
                buffer_if_eq!(__state, __nulls, &self.#id, #name, #default);
            },
            FieldKind::Mandatory => quote! {
                flush_nulls!(__state, __nulls);
                __state.serialize_field(#name, &self.#id)?;
            },
        }
    });

    quote! {
        #buffer_nulls

        #[automatically_derived]
        impl oxamqp_codec::serde::ser::Serialize for #ident {
            #[allow(unused_mut)]
            fn serialize<__S>(&self, __serializer: __S) -> Result<__S::Ok, __S::Error>
            where
                __S: oxamqp_codec::serde::ser::Serializer,
            {
                use oxamqp_codec::serde::ser::SerializeStruct;

                let mut __nulls: Vec<&'static str> = Vec::new();
                // the descriptor does not count towards the number of fields in the list
                let mut __state = __serializer
                    .serialize_struct(oxamqp_codec::__constants::DESCRIBED_LIST, #len + 1)?;
                __state.serialize_field(oxamqp_codec::__constants::DESCRIPTOR, &#descriptor)?;
                #( #fields )*
                // nulls still buffered here are trailing and are left out
                __state.end()
            }
        }
    }
}
