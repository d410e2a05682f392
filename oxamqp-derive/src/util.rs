use convert_case::{Case, Casing};
use darling::{util::Override, FromDeriveInput};
use crate::{Composite, CompositeField, DescribedAttr, FieldKind};

pub(crate) fn parse_composite(input: &syn::DeriveInput) -> Result<Composite, darling::Error> {
    let attr = DescribedAttr::from_derive_input(input)?;

    if !attr.generics.params.is_empty() {
        return Err(darling::Error::custom("generic composite types are not supported")
            .with_span(&attr.generics));
    }
    match attr.encoding.as_deref() {
        None | Some("list") => {}
        Some(other) => {
            return Err(darling::Error::unknown_value(other).with_span(&attr.ident))
        }
    }

    let name = attr.name.unwrap_or_else(|| attr.ident.to_string());
    let code = attr.code.as_deref().map(parse_code).transpose()?;

    let fields = attr
        .data
        .take_struct()
        .ok_or_else(|| darling::Error::unsupported_shape("enum"))?
        .fields
        .into_iter()
        .map(|field| {
            let ident = field
                .ident
                .ok_or_else(|| darling::Error::unsupported_shape("tuple struct"))?;
            let name = convert_to_case(&attr.rename_all, ident.to_string())
                .map_err(|err| err.with_span(&ident))?;
            let kind = match field.default {
                Some(Override::Inherit) => FieldKind::Default(None),
                Some(Override::Explicit(expr)) => FieldKind::Default(Some(expr)),
                None if is_option(&field.ty) => FieldKind::Optional,
                None => FieldKind::Mandatory,
            };
            Ok(CompositeField {
                ident,
                ty: field.ty,
                name,
                kind,
            })
        })
        .collect::<Result<Vec<_>, darling::Error>>()?;

    Ok(Composite {
        ident: attr.ident,
        name,
        code,
        fields,
    })
}

/// Parses a numeric descriptor written as `"0x<domain-id>:0x<descriptor-id>"`
pub(crate) fn parse_code(code: &str) -> Result<u64, darling::Error> {
    let invalid = || darling::Error::custom(format!("invalid descriptor code {}", code));
    let half = |s: &str| -> Result<u64, darling::Error> {
        let digits = s.trim().trim_start_matches("0x").replace('_', "");
        u32::from_str_radix(&digits, 16)
            .map(u64::from)
            .map_err(|_| invalid())
    };
    match code.split_once(':') {
        Some((domain, id)) => Ok((half(domain)? << 32) | half(id)?),
        None => Err(invalid()),
    }
}

pub(crate) fn convert_to_case(case: &str, source: String) -> Result<String, darling::Error> {
    let s = match case {
        "" => source,
        "lowercase" => source.to_lowercase(),
        "UPPERCASE" => source.to_uppercase(),
        "PascalCase" => source.to_case(Case::Pascal),
        "camelCase" => source.to_case(Case::Camel),
        "snake_case" => source.to_case(Case::Snake),
        "SCREAMING_SNAKE_CASE" => source.to_case(Case::ScreamingSnake),
        "kebab-case" => source.to_case(Case::Kebab),
        other => {
            return Err(darling::Error::custom(format!(
                "{} case is not implemented",
                other
            )))
        }
    };
    Ok(s)
}

/// Whether the type is spelled `Option<..>`
fn is_option(ty: &syn::Type) -> bool {
    match ty {
        syn::Type::Path(path) if path.qself.is_none() => path
            .path
            .segments
            .last()
            .map(|segment| segment.ident == "Option")
            .unwrap_or(false),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_is_split_into_domain_and_id() {
        assert_eq!(parse_code("0x0000_0000:0x0000_0010").unwrap(), 0x10);
        assert_eq!(
            parse_code("0x0000_beef:0x0000_0001").unwrap(),
            0x0000_beef_0000_0001
        );
        assert!(parse_code("0x10").is_err());
    }

    #[test]
    fn field_names_follow_rename_all() {
        let name = convert_to_case("kebab-case", "next_outgoing_id".to_string()).unwrap();
        assert_eq!(name, "next-outgoing-id");
        assert!(convert_to_case("Train-Case", "a".to_string()).is_err());
    }

    #[test]
    fn option_is_detected_by_its_last_segment() {
        let ty: syn::Type = syn::parse_quote!(Option<Box<Source>>);
        assert!(is_option(&ty));
        let ty: syn::Type = syn::parse_quote!(std::option::Option<u32>);
        assert!(is_option(&ty));
        let ty: syn::Type = syn::parse_quote!(Handle);
        assert!(!is_option(&ty));
    }
}
