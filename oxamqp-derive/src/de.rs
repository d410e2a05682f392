use quote::quote;

use crate::{Composite, FieldKind};

fn evaluate_descriptor(composite: &Composite) -> proc_macro2::TokenStream {
    let name = &composite.name;
    let matches = match composite.code {
        Some(code) => quote!(__descriptor.matches(#name, #code)),
        None => quote! {
            matches!(
                &__descriptor,
                oxamqp_codec::descriptor::Descriptor::Name(__symbol) if __symbol.as_str() == #name
            )
        },
    };
    quote! {
        if !#matches {
            return Err(oxamqp_codec::serde::de::Error::invalid_value(
                oxamqp_codec::serde::de::Unexpected::Other("descriptor"),
                &self,
            ));
        }
    }
}

pub(crate) fn expand_deserialize(composite: &Composite) -> proc_macro2::TokenStream {
    let ident = &composite.ident;
    let expecting = &composite.name;
    let evaluate_descriptor = evaluate_descriptor(composite);

    let field_idents: Vec<&syn::Ident> = composite.fields.iter().map(|f| &f.ident).collect();
    let field_names: Vec<&String> = composite.fields.iter().map(|f| &f.name).collect();

    // absent and null fields both read as `None` here
    let fields = composite.fields.iter().map(|field| {
        let id = &field.ident;
        let ty = &field.ty;
        let name = &field.name;
        match &field.kind {
            FieldKind::Optional => quote! {
                let #id: #ty = __seq.next_element::<#ty>()?.flatten();
            },
            FieldKind::Default(None) => quote! {
                let #id: #ty = __seq.next_element::<Option<#ty>>()?.flatten().unwrap_or_default();
            },
            FieldKind::Default(Some(default)) => quote! {
                let #id: #ty = __seq
                    .next_element::<Option<#ty>>()?
                    .flatten()
                    .unwrap_or_else(|| #default);
            },
            FieldKind::Mandatory => quote! {
                let #id: #ty = match __seq.next_element::<Option<#ty>>()?.flatten() {
                    Some(__value) => __value,
                    None => return Err(oxamqp_codec::serde::de::Error::missing_field(#name)),
                };
            },
        }
    });

    quote! {
        #[automatically_derived]
        impl<'de> oxamqp_codec::serde::de::Deserialize<'de> for #ident {
            fn deserialize<__D>(__deserializer: __D) -> Result<Self, __D::Error>
            where
                __D: oxamqp_codec::serde::de::Deserializer<'de>,
            {
                struct Visitor;

                impl<'de> oxamqp_codec::serde::de::Visitor<'de> for Visitor {
                    type Value = #ident;

                    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                        formatter.write_str(#expecting)
                    }

                    fn visit_seq<__A>(self, mut __seq: __A) -> Result<Self::Value, __A::Error>
                    where
                        __A: oxamqp_codec::serde::de::SeqAccess<'de>,
                    {
                        let __descriptor: oxamqp_codec::descriptor::Descriptor =
                            match __seq.next_element()? {
                                Some(__descriptor) => __descriptor,
                                None => {
                                    return Err(oxamqp_codec::serde::de::Error::invalid_length(
                                        0, &self,
                                    ))
                                }
                            };
                        #evaluate_descriptor

                        #( #fields )*

                        Ok(#ident { #( #field_idents, )* })
                    }
                }

                // DESCRIPTOR leads the field names so that the field indices line up with the
                // elements of the sequence
                const FIELDS: &[&str] = &[oxamqp_codec::__constants::DESCRIPTOR, #( #field_names, )*];
                __deserializer.deserialize_struct(
                    oxamqp_codec::__constants::DESCRIBED_LIST,
                    FIELDS,
                    Visitor,
                )
            }
        }
    }
}
