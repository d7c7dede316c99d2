use proc_macro::TokenStream;
use quote::quote;
use syn::{DataEnum, DataStruct, DeriveInput, Fields, Result};

use crate::attributes::parse_ignored;

pub(crate) fn generate_convertible_for_struct(
    ast: &DeriveInput,
    data: &DataStruct,
) -> Result<TokenStream> {
    let name = &ast.ident;
    let (impl_generics, ty_generics, where_clause) = ast.generics.split_for_impl();
    let ignored = parse_ignored(&ast.attrs)?;

    let named = match &data.fields {
        Fields::Named(named) => &named.named,
        _ => {
            return Err(syn::Error::new_spanned(
                ast,
                "Convertible can only be derived for structs with named fields",
            ))
        }
    };

    for field in &ignored {
        if !named
            .iter()
            .any(|f| f.ident.as_ref().is_some_and(|i| i == field))
        {
            return Err(syn::Error::new_spanned(
                ast,
                format!("ignored field {} not found in struct", field),
            ));
        }
    }

    let stored: Vec<_> = named
        .iter()
        .filter_map(|f| f.ident.as_ref().map(|i| (i, &f.ty)))
        .filter(|(ident, _)| !ignored.contains(&ident.to_string()))
        .collect();

    let save_stmts = stored.iter().map(|(ident, _)| {
        let property = ident.to_string();
        quote! {
            properties.put(#property, ::dskit::common::Convertible::to_value(&self.#ident)?, true);
        }
    });

    let load_stmts = stored.iter().map(|(ident, ty)| {
        let property = ident.to_string();
        quote! {
            if let Some(value) = properties.value(#property) {
                result.#ident = <#ty as ::dskit::common::Convertible>::from_value(value)?;
            }
        }
    });

    let type_name = name.to_string();

    let gen = quote! {
        impl #impl_generics ::dskit::common::Convertible for #name #ty_generics #where_clause {
            fn to_value(&self) -> ::dskit::errors::DsResult<::dskit::common::Value> {
                let mut properties = ::dskit::common::PropertyMap::new();
                #(#save_stmts)*
                Ok(::dskit::common::Value::Entity(properties))
            }

            fn from_value(value: &::dskit::common::Value) -> ::dskit::errors::DsResult<Self> {
                let properties = value.as_entity().ok_or_else(|| {
                    ::dskit::errors::DsError::new(
                        &format!("expected entity for {} but found {}", #type_name, value.type_name()),
                        ::dskit::errors::ErrorKind::InvalidDataType,
                    )
                })?;
                let mut result = <Self as Default>::default();
                #(#load_stmts)*
                Ok(result)
            }
        }
    };

    Ok(TokenStream::from(gen))
}

pub(crate) fn generate_convertible_for_enum(
    ast: &DeriveInput,
    data: &DataEnum,
) -> Result<TokenStream> {
    let name = &ast.ident;
    let (impl_generics, ty_generics, where_clause) = ast.generics.split_for_impl();

    for variant in &data.variants {
        if !matches!(variant.fields, Fields::Unit) {
            return Err(syn::Error::new_spanned(
                variant,
                "Convertible can only be derived for enums with unit variants",
            ));
        }
    }

    let idents: Vec<_> = data.variants.iter().map(|v| &v.ident).collect();
    let names: Vec<String> = idents.iter().map(|i| i.to_string()).collect();
    let type_name = name.to_string();

    let gen = quote! {
        impl #impl_generics ::dskit::common::Convertible for #name #ty_generics #where_clause {
            fn to_value(&self) -> ::dskit::errors::DsResult<::dskit::common::Value> {
                let variant = match self {
                    #(Self::#idents => #names,)*
                };
                Ok(::dskit::common::Value::String(variant.to_string()))
            }

            fn from_value(value: &::dskit::common::Value) -> ::dskit::errors::DsResult<Self> {
                match value.as_string() {
                    #(Some(#names) => Ok(Self::#idents),)*
                    _ => Err(::dskit::errors::DsError::new(
                        &format!("{} is not a variant of {}", value, #type_name),
                        ::dskit::errors::ErrorKind::InvalidDataType,
                    )),
                }
            }
        }
    };

    Ok(TokenStream::from(gen))
}
