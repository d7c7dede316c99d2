use syn::meta::ParseNestedMeta;
use syn::{Attribute, Field, LitBool, LitStr, Result};

/// A `created(...)` or `updated(...)` switch.
#[derive(Clone, Copy)]
pub(crate) struct TimestampAttr {
    pub(crate) enabled: bool,
    pub(crate) indexed: bool,
}

/// `#[entity(...)]` on the struct.
pub(crate) struct ContainerAttrs {
    pub(crate) kind: Option<String>,
    pub(crate) created: TimestampAttr,
    pub(crate) updated: TimestampAttr,
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum FieldRole {
    Property,
    Key,
    Parent,
    Meta,
    Ignored,
}

/// `#[entity(...)]` on a field.
pub(crate) struct FieldAttrs {
    pub(crate) role: FieldRole,
    pub(crate) no_index: bool,
    pub(crate) rename: Option<String>,
}

pub(crate) fn parse_container(attrs: &[Attribute]) -> Result<ContainerAttrs> {
    let mut parsed = ContainerAttrs {
        kind: None,
        created: TimestampAttr {
            enabled: true,
            indexed: false,
        },
        updated: TimestampAttr {
            enabled: false,
            indexed: false,
        },
    };

    for attr in attrs {
        if !attr.path().is_ident("entity") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("kind") {
                let s: LitStr = meta.value()?.parse()?;
                if s.value().is_empty() {
                    return Err(meta.error("kind cannot be empty"));
                }
                parsed.kind = Some(s.value());
                Ok(())
            } else if meta.path.is_ident("created") {
                parse_timestamp(&meta, &mut parsed.created)
            } else if meta.path.is_ident("updated") {
                parse_timestamp(&meta, &mut parsed.updated)
            } else {
                Err(meta.error("Unknown entity attribute"))
            }
        })?;
    }
    Ok(parsed)
}

// A bare `created` enables the timestamp; `created(...)` sets the switches given.
fn parse_timestamp(meta: &ParseNestedMeta, target: &mut TimestampAttr) -> Result<()> {
    if meta.input.is_empty() || meta.input.peek(syn::Token![,]) {
        target.enabled = true;
        return Ok(());
    }
    meta.parse_nested_meta(|nested| {
        let flag: LitBool = nested.value()?.parse()?;
        if nested.path.is_ident("enabled") {
            target.enabled = flag.value;
            Ok(())
        } else if nested.path.is_ident("indexed") {
            target.indexed = flag.value;
            Ok(())
        } else {
            Err(nested.error("Unknown timestamp attribute, expected `enabled` or `indexed`"))
        }
    })
}

pub(crate) fn parse_field(field: &Field) -> Result<FieldAttrs> {
    let mut parsed = FieldAttrs {
        role: FieldRole::Property,
        no_index: false,
        rename: None,
    };

    for attr in &field.attrs {
        if !attr.path().is_ident("entity") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            let role = if meta.path.is_ident("key") {
                FieldRole::Key
            } else if meta.path.is_ident("parent") {
                FieldRole::Parent
            } else if meta.path.is_ident("meta") {
                FieldRole::Meta
            } else if meta.path.is_ident("ignore") {
                FieldRole::Ignored
            } else if meta.path.is_ident("no_index") {
                parsed.no_index = true;
                return Ok(());
            } else if meta.path.is_ident("rename") {
                let s: LitStr = meta.value()?.parse()?;
                if s.value().is_empty() {
                    return Err(meta.error("rename cannot be empty"));
                }
                parsed.rename = Some(s.value());
                return Ok(());
            } else {
                return Err(meta.error("Unknown entity field attribute"));
            };

            if parsed.role != FieldRole::Property {
                return Err(meta.error("A field can have only one of key, parent, meta or ignore"));
            }
            parsed.role = role;
            Ok(())
        })?;
    }
    Ok(parsed)
}

/// Parses `#[converter(ignored = "a, b")]` into field names.
pub(crate) fn parse_ignored(attrs: &[Attribute]) -> Result<Vec<String>> {
    let mut ignored = Vec::new();
    for attr in attrs {
        if !attr.path().is_ident("converter") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("ignored") {
                let s: LitStr = meta.value()?.parse()?;
                ignored.extend(
                    s.value()
                        .split(',')
                        .map(str::trim)
                        .filter(|f| !f.is_empty())
                        .map(str::to_string),
                );
                Ok(())
            } else {
                Err(meta.error("Unknown converter attribute"))
            }
        })?;
    }
    Ok(ignored)
}
