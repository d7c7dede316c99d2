use proc_macro::TokenStream;
use proc_macro2::Ident;
use quote::quote;
use syn::{DataStruct, DeriveInput, Field, Fields, Result, Type};

use crate::attributes::{parse_container, parse_field, FieldRole};

struct StoredField<'a> {
    ident: &'a Ident,
    ty: &'a Type,
    property: String,
    indexed: bool,
}

pub(crate) fn generate_entity_for_struct(
    ast: &DeriveInput,
    data: &DataStruct,
) -> Result<TokenStream> {
    let name = &ast.ident;
    let (impl_generics, ty_generics, where_clause) = ast.generics.split_for_impl();
    let container = parse_container(&ast.attrs)?;
    let kind = container.kind.unwrap_or_else(|| name.to_string());

    let fields: Vec<&Field> = match &data.fields {
        Fields::Named(named) => named.named.iter().collect(),
        _ => {
            return Err(syn::Error::new_spanned(
                ast,
                "Entity can only be derived for structs with named fields",
            ))
        }
    };

    let mut stored = Vec::with_capacity(fields.len());
    let mut key_field: Option<&Ident> = None;
    let mut parent_field: Option<&Ident> = None;
    let mut meta_field: Option<&Ident> = None;

    for field in &fields {
        let attrs = parse_field(field)?;
        let Some(ident) = field.ident.as_ref() else {
            continue;
        };
        let slot = match attrs.role {
            FieldRole::Property => {
                stored.push(StoredField {
                    ident,
                    ty: &field.ty,
                    property: attrs.rename.unwrap_or_else(|| ident.to_string()),
                    indexed: !attrs.no_index,
                });
                continue;
            }
            FieldRole::Ignored => continue,
            FieldRole::Key => &mut key_field,
            FieldRole::Parent => &mut parent_field,
            FieldRole::Meta => &mut meta_field,
        };
        if slot.is_some() {
            return Err(syn::Error::new_spanned(
                field,
                "Only one key, parent or meta field is allowed",
            ));
        }
        *slot = Some(ident);
    }

    for (i, a) in stored.iter().enumerate() {
        if a.property.starts_with("__") && a.property.ends_with("__") {
            return Err(syn::Error::new_spanned(
                a.ident,
                format!("property name {:?} is reserved", a.property),
            ));
        }
        if stored[..i].iter().any(|b| b.property == a.property) {
            return Err(syn::Error::new_spanned(
                a.ident,
                format!("duplicate property name {:?}", a.property),
            ));
        }
    }

    let type_name = name.to_string();

    let load_arms = stored.iter().map(|f| {
        let ident = f.ident;
        let ty = f.ty;
        let property = &f.property;
        quote! {
            #property => match <#ty as ::dskit::common::Convertible>::from_value(property.value()) {
                Ok(value) => {
                    self.#ident = value;
                    true
                }
                Err(_) => false,
            },
        }
    });

    let meta_load_arm = meta_field.map(|meta| {
        quote! {
            name if ::dskit::entity::EntityMeta::accepts(name) => {
                self.#meta.load_property(property);
                true
            }
        }
    });

    let save_stmts = stored.iter().map(|f| {
        let ident = f.ident;
        let property = &f.property;
        let indexed = f.indexed;
        quote! {
            properties.put(
                #property,
                ::dskit::common::Convertible::to_value(&self.#ident)?,
                #indexed,
            );
        }
    });

    let meta_save = meta_field.map(|meta| {
        quote! {
            self.#meta.save_into(&mut properties, &::dskit::entity::Entity::options(self));
        }
    });

    let key_load = key_field.map(|key| quote! { self.#key = Some(key.clone()); });
    let meta_key_load = meta_field.map(|meta| quote! { self.#meta.set_key(key.clone()); });
    let parent_load = parent_field.map(|parent| quote! { self.#parent = key.parent().cloned(); });

    let key_fn = match (key_field, meta_field) {
        (Some(key), _) => quote! { self.#key.clone() },
        (None, Some(meta)) => quote! { self.#meta.key().cloned() },
        (None, None) => quote! { None },
    };

    let new_key_fn = parent_field.map(|parent| {
        quote! {
            fn new_key(&self) -> ::dskit::store::Key {
                ::dskit::store::Key::incomplete(#kind, self.#parent.as_ref())
            }
        }
    });

    let options_fn = if meta_field.is_some() {
        let created_enabled = container.created.enabled;
        let created_indexed = container.created.indexed;
        let updated_enabled = container.updated.enabled;
        let updated_indexed = container.updated.indexed;
        quote! {
            fn options(&self) -> ::dskit::entity::EntityOptions {
                ::dskit::entity::EntityOptions::disabled()
                    .with_created(#created_enabled, #created_indexed)
                    .with_updated(#updated_enabled, #updated_indexed)
            }
        }
    } else {
        quote! {
            fn options(&self) -> ::dskit::entity::EntityOptions {
                ::dskit::entity::EntityOptions::disabled()
            }
        }
    };

    let lifecycle_fn = meta_field.map(|meta| {
        quote! {
            fn lifecycle(&mut self) -> Option<&mut dyn ::dskit::entity::LifecycleHooks> {
                Some(&mut self.#meta)
            }
        }
    });

    let gen = quote! {
        impl #impl_generics ::dskit::entity::PropertyLoadSaver for #name #ty_generics #where_clause {
            fn load(
                &mut self,
                properties: &::dskit::common::PropertyMap,
            ) -> ::dskit::errors::DsResult<()> {
                let mut mismatched: Vec<String> = Vec::new();
                for property in properties.iter() {
                    let loaded = match property.name() {
                        #(#load_arms)*
                        #meta_load_arm
                        _ => false,
                    };
                    if !loaded {
                        mismatched.push(property.name().to_string());
                    }
                }
                if mismatched.is_empty() {
                    Ok(())
                } else {
                    Err(::dskit::errors::DsError::field_mismatch(#type_name, &mismatched))
                }
            }

            fn save(&self) -> ::dskit::errors::DsResult<::dskit::common::PropertyMap> {
                let mut properties = ::dskit::common::PropertyMap::new();
                #meta_save
                #(#save_stmts)*
                Ok(properties)
            }

            fn load_key(&mut self, key: &::dskit::store::Key) {
                #key_load
                #meta_key_load
                #parent_load
                let _ = key;
            }
        }

        impl #impl_generics ::dskit::entity::Entity for #name #ty_generics #where_clause {
            fn kind(&self) -> String {
                #kind.to_string()
            }

            fn key(&self) -> Option<::dskit::store::Key> {
                #key_fn
            }

            #new_key_fn

            #options_fn

            #lifecycle_fn

            fn new_instance(&self) -> Box<dyn ::dskit::entity::Entity> {
                Box::new(<Self as Default>::default())
            }

            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }

            fn as_any_mut(&mut self) -> &mut dyn ::std::any::Any {
                self
            }
        }
    };

    Ok(TokenStream::from(gen))
}
