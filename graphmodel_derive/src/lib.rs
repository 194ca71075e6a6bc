use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Data, DeriveInput, Fields, Ident, LitStr, Type, parse_macro_input, spanned::Spanned};

/// Derives `GraphEntity` and `GraphSchema`, plus `GraphType` for structs
/// marked `#[graph(node)]` or `#[graph(relationship_properties)]`.
#[proc_macro_derive(GraphEntity, attributes(graph))]
pub fn derive_graph_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand_graph_entity(input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

enum TypeKind {
    Node { label: Option<String> },
    RelationshipProperties,
}

enum FieldRole {
    Property,
    Id { generated: bool },
    Version,
    Relationship { edge_type: Option<String> },
    TargetNode,
    Flatten,
    Skip,
}

struct GraphField {
    ident: Ident,
    ty: Type,
    name: String,
    role: FieldRole,
}

impl GraphField {
    fn is_property(&self) -> bool {
        matches!(
            self.role,
            FieldRole::Property | FieldRole::Id { .. } | FieldRole::Version
        )
    }

    fn is_relationship(&self) -> bool {
        matches!(
            self.role,
            FieldRole::Relationship { .. } | FieldRole::TargetNode
        )
    }
}

fn expand_graph_entity(input: DeriveInput) -> syn::Result<TokenStream2> {
    let struct_name = input.ident;

    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            input.generics,
            "GraphEntity does not support generic structs",
        ));
    }

    let kind = parse_type_options(&input.attrs)?;

    let Data::Struct(data_struct) = input.data else {
        return Err(syn::Error::new(
            struct_name.span(),
            "GraphEntity can only be derived for structs",
        ));
    };
    let Fields::Named(named_fields) = data_struct.fields else {
        return Err(syn::Error::new(
            struct_name.span(),
            "GraphEntity requires named fields",
        ));
    };

    let mut fields = Vec::new();
    for field in named_fields.named {
        let ident = field
            .ident
            .clone()
            .ok_or_else(|| syn::Error::new(field.span(), "GraphEntity requires named fields"))?;
        let (role, rename) = parse_field_options(&field.attrs)?;
        let name = rename.unwrap_or_else(|| ident.to_string().trim_start_matches("r#").to_string());
        fields.push(GraphField {
            ident,
            ty: field.ty,
            name,
            role,
        });
    }

    let type_name = struct_name.to_string();
    let entity_impl = expand_entity_impl(&struct_name, &type_name, &fields);
    let schema_impl = expand_schema_impl(&struct_name, &fields);
    let type_impl = match kind {
        Some(kind) => expand_type_impl(&struct_name, &type_name, kind),
        None => quote!(),
    };

    Ok(quote! {
        #entity_impl
        #schema_impl
        #type_impl
    })
}

fn expand_entity_impl(struct_name: &Ident, type_name: &str, fields: &[GraphField]) -> TokenStream2 {
    let properties = fields.iter().filter(|field| field.is_property()).collect::<Vec<_>>();
    let relationships = fields
        .iter()
        .filter(|field| field.is_relationship())
        .collect::<Vec<_>>();
    let flattened = fields
        .iter()
        .filter(|field| matches!(field.role, FieldRole::Flatten))
        .map(|field| &field.ident)
        .collect::<Vec<_>>();

    let property_get_arms = properties.iter().map(|field| {
        let ident = &field.ident;
        let name = &field.name;
        quote! {
            #name => ::core::option::Option::Some(
                ::graphmodel::PropertyValue::to_value(&self.#ident)
            ),
        }
    });

    let property_set_arms = properties.iter().map(|field| {
        let ident = &field.ident;
        let ty = &field.ty;
        let name = &field.name;
        quote! {
            #name => {
                self.#ident = <#ty as ::graphmodel::PropertyValue>::from_value(value)
                    .map_err(|err| ::graphmodel::mapping::in_field(#type_name, #name, err))?;
                ::core::result::Result::Ok(true)
            }
        }
    });

    let relationship_get_arms = relationships.iter().map(|field| {
        let ident = &field.ident;
        let name = &field.name;
        quote! {
            #name => ::core::option::Option::Some(
                ::graphmodel::RelationshipField::to_relationship(&self.#ident)
            ),
        }
    });

    let relationship_set_arms = relationships.iter().map(|field| {
        let ident = &field.ident;
        let ty = &field.ty;
        let name = &field.name;
        quote! {
            #name => {
                self.#ident = <#ty as ::graphmodel::RelationshipField>::from_relationship(value)
                    .map_err(|err| ::graphmodel::mapping::in_field(#type_name, #name, err))?;
                ::core::result::Result::Ok(true)
            }
        }
    });

    quote! {
        impl ::graphmodel::GraphEntity for #struct_name {
            fn property(&self, name: &str) -> ::core::option::Option<::graphmodel::Value> {
                match name {
                    #(#property_get_arms)*
                    _ => {
                        #(
                            if let ::core::option::Option::Some(value) =
                                ::graphmodel::GraphEntity::property(&self.#flattened, name)
                            {
                                return ::core::option::Option::Some(value);
                            }
                        )*
                        ::core::option::Option::None
                    }
                }
            }

            #[allow(unused_variables)]
            fn set_property(
                &mut self,
                name: &str,
                value: ::graphmodel::Value,
            ) -> ::graphmodel::Result<bool> {
                match name {
                    #(#property_set_arms)*
                    _ => {
                        #(
                            if ::graphmodel::GraphEntity::property(&self.#flattened, name).is_some() {
                                return ::graphmodel::GraphEntity::set_property(
                                    &mut self.#flattened,
                                    name,
                                    value,
                                );
                            }
                        )*
                        ::core::result::Result::Ok(false)
                    }
                }
            }

            fn relationship(
                &self,
                name: &str,
            ) -> ::core::option::Option<::graphmodel::RelationshipValue> {
                match name {
                    #(#relationship_get_arms)*
                    _ => {
                        #(
                            if let ::core::option::Option::Some(value) =
                                ::graphmodel::GraphEntity::relationship(&self.#flattened, name)
                            {
                                return ::core::option::Option::Some(value);
                            }
                        )*
                        ::core::option::Option::None
                    }
                }
            }

            #[allow(unused_variables)]
            fn set_relationship(
                &mut self,
                name: &str,
                value: ::graphmodel::RelationshipValue,
            ) -> ::graphmodel::Result<bool> {
                match name {
                    #(#relationship_set_arms)*
                    _ => {
                        #(
                            if ::graphmodel::GraphEntity::relationship(&self.#flattened, name).is_some() {
                                return ::graphmodel::GraphEntity::set_relationship(
                                    &mut self.#flattened,
                                    name,
                                    value,
                                );
                            }
                        )*
                        ::core::result::Result::Ok(false)
                    }
                }
            }
        }
    }
}

fn expand_schema_impl(struct_name: &Ident, fields: &[GraphField]) -> TokenStream2 {
    let mut declarations = Vec::new();
    for field in fields {
        let ty = &field.ty;
        let name = &field.name;
        let declaration = match &field.role {
            FieldRole::Property => quote!(schema.property::<#ty>(#name);),
            FieldRole::Id { generated: false } => quote!(schema.assigned_id::<#ty>(#name);),
            FieldRole::Id { generated: true } => quote!(schema.generated_id::<#ty>(#name);),
            FieldRole::Version => quote!(schema.version::<#ty>(#name);),
            FieldRole::Relationship {
                edge_type: Some(edge_type),
            } => quote!(schema.relationship::<#ty>(#name, ::core::option::Option::Some(#edge_type));),
            FieldRole::Relationship { edge_type: None } => {
                quote!(schema.relationship::<#ty>(#name, ::core::option::Option::None);)
            }
            FieldRole::TargetNode => quote!(schema.target_node::<#ty>(#name);),
            FieldRole::Flatten => quote!(schema.flatten::<#ty>();),
            FieldRole::Skip => continue,
        };
        declarations.push(declaration);
    }

    quote! {
        impl ::graphmodel::GraphSchema for #struct_name {
            #[allow(unused_variables)]
            fn declare(schema: &mut ::graphmodel::SchemaBuilder) {
                #(#declarations)*
            }
        }
    }
}

fn expand_type_impl(struct_name: &Ident, type_name: &str, kind: TypeKind) -> TokenStream2 {
    let (kind_tokens, label) = match kind {
        TypeKind::Node { label } => (
            quote!(::graphmodel::EntityKind::Node),
            label.unwrap_or_else(|| type_name.to_string()),
        ),
        TypeKind::RelationshipProperties => (
            quote!(::graphmodel::EntityKind::RelationshipProperties),
            type_name.to_string(),
        ),
    };

    quote! {
        impl ::graphmodel::GraphType for #struct_name {
            const NAME: &'static str = #type_name;
            const KIND: ::graphmodel::EntityKind = #kind_tokens;
            const LABEL: &'static str = #label;
        }
    }
}

fn parse_type_options(attrs: &[syn::Attribute]) -> syn::Result<Option<TypeKind>> {
    let mut kind = None;

    for attr in attrs {
        if !attr.path().is_ident("graph") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if kind.is_some() {
                return Err(meta.error("a graph type is either a node or relationship properties"));
            }

            if meta.path.is_ident("node") {
                let mut label = None;
                if meta.input.peek(syn::token::Paren) {
                    meta.parse_nested_meta(|inner| {
                        if inner.path.is_ident("label") {
                            let lit: LitStr = inner.value()?.parse()?;
                            label = Some(lit.value());
                            return Ok(());
                        }
                        Err(inner.error("Unsupported #[graph(node(...))] option. Supported: label = \"...\""))
                    })?;
                }
                kind = Some(TypeKind::Node { label });
                return Ok(());
            }

            if meta.path.is_ident("relationship_properties") {
                kind = Some(TypeKind::RelationshipProperties);
                return Ok(());
            }

            Err(meta.error(
                "Unsupported #[graph(...)] type option. Supported: node, node(label = \"...\"), relationship_properties",
            ))
        })?;
    }

    Ok(kind)
}

fn parse_field_options(attrs: &[syn::Attribute]) -> syn::Result<(FieldRole, Option<String>)> {
    let mut role: Option<FieldRole> = None;
    let mut rename = None;

    for attr in attrs {
        if !attr.path().is_ident("graph") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                let lit: LitStr = meta.value()?.parse()?;
                rename = Some(lit.value());
                return Ok(());
            }

            let parsed = if meta.path.is_ident("id") {
                let mut generated = false;
                if meta.input.peek(syn::token::Paren) {
                    meta.parse_nested_meta(|inner| {
                        if inner.path.is_ident("generated") {
                            generated = true;
                            return Ok(());
                        }
                        Err(inner.error("Unsupported #[graph(id(...))] option. Supported: generated"))
                    })?;
                }
                FieldRole::Id { generated }
            } else if meta.path.is_ident("version") {
                FieldRole::Version
            } else if meta.path.is_ident("relationship") {
                let mut edge_type = None;
                if meta.input.peek(syn::token::Paren) {
                    meta.parse_nested_meta(|inner| {
                        if inner.path.is_ident("type") {
                            let lit: LitStr = inner.value()?.parse()?;
                            edge_type = Some(lit.value());
                            return Ok(());
                        }
                        Err(inner.error(
                            "Unsupported #[graph(relationship(...))] option. Supported: type = \"...\"",
                        ))
                    })?;
                }
                FieldRole::Relationship { edge_type }
            } else if meta.path.is_ident("target_node") {
                FieldRole::TargetNode
            } else if meta.path.is_ident("flatten") {
                FieldRole::Flatten
            } else if meta.path.is_ident("skip") {
                FieldRole::Skip
            } else {
                return Err(meta.error(
                    "Unsupported #[graph(...)] field option. Supported: id, id(generated), version, name = \"...\", relationship, relationship(type = \"...\"), target_node, flatten, skip",
                ));
            };

            if role.is_some() {
                return Err(meta.error("a field can only have one graph role"));
            }
            role = Some(parsed);
            Ok(())
        })?;
    }

    let role = role.unwrap_or(FieldRole::Property);
    if rename.is_some() && matches!(role, FieldRole::Flatten | FieldRole::Skip) {
        return Err(syn::Error::new(
            proc_macro2::Span::call_site(),
            "#[graph(name = ...)] cannot be combined with flatten or skip",
        ));
    }
    Ok((role, rename))
}
