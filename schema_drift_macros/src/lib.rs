//! Procedural macros for schema_drift
//!
//! `#[derive(Entity)]` turns a struct with named fields into an entity
//! mapping that the model registry can register.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{quote, ToTokens};
use syn::meta::ParseNestedMeta;
use syn::{parse_macro_input, Data, DeriveInput, Fields, LitBool, LitStr, Token};

/// Derive `schema_drift::models::Entity`
///
/// Struct attribute: `#[entity(table = "...")]`.
///
/// Field attribute: `#[column(name = "...", db_type = "...", primary_key,
/// unique, nullable, auto_increment, default = "...", references =
/// "table.column", comment = "...")]`. `Option<T>` fields are nullable.
#[proc_macro_derive(Entity, attributes(entity, column))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match expand_entity(&input) {
        Ok(expanded) => expanded.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

#[derive(Default)]
struct ColumnAttrs {
    name: Option<String>,
    db_type: Option<String>,
    primary_key: bool,
    unique: bool,
    nullable: Option<bool>,
    auto_increment: bool,
    default: Option<String>,
    references: Option<(String, String)>,
    comment: Option<String>,
}

fn flag(meta: &ParseNestedMeta<'_>) -> syn::Result<bool> {
    if meta.input.peek(Token![=]) {
        let value: LitBool = meta.value()?.parse()?;
        Ok(value.value)
    } else {
        Ok(true)
    }
}

fn string(meta: &ParseNestedMeta<'_>) -> syn::Result<String> {
    let value: LitStr = meta.value()?.parse()?;
    Ok(value.value())
}

fn optional(value: &Option<String>) -> TokenStream2 {
    match value {
        Some(value) => quote! { ::std::option::Option::Some(::std::string::String::from(#value)) },
        None => quote! { ::std::option::Option::None },
    }
}

fn expand_entity(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let name_str = name.to_string();
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let mut table = None;
    for attr in input.attrs.iter().filter(|attr| attr.path().is_ident("entity")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                table = Some(string(&meta)?);
                Ok(())
            } else {
                Err(meta.error("unsupported entity attribute"))
            }
        })?;
    }

    let named = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    name,
                    "Entity can only be derived for structs with named fields",
                ))
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                name,
                "Entity can only be derived for structs",
            ))
        }
    };

    let mut fields = Vec::with_capacity(named.len());
    for field in named {
        let Some(ident) = &field.ident else { continue };
        let field_name = ident.to_string();
        let rust_type: String = field
            .ty
            .to_token_stream()
            .to_string()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();

        let mut attrs = ColumnAttrs::default();
        for attr in field.attrs.iter().filter(|attr| attr.path().is_ident("column")) {
            attr.parse_nested_meta(|meta| {
                let key = meta
                    .path
                    .get_ident()
                    .map(|ident| ident.to_string())
                    .unwrap_or_default();
                match key.as_str() {
                    "name" => attrs.name = Some(string(&meta)?),
                    "db_type" => attrs.db_type = Some(string(&meta)?),
                    "primary_key" => attrs.primary_key = flag(&meta)?,
                    "unique" => attrs.unique = flag(&meta)?,
                    "nullable" => attrs.nullable = Some(flag(&meta)?),
                    "auto_increment" => attrs.auto_increment = flag(&meta)?,
                    "default" => attrs.default = Some(string(&meta)?),
                    "comment" => attrs.comment = Some(string(&meta)?),
                    "references" => {
                        let reference = string(&meta)?;
                        let (table, column) = reference
                            .split_once('.')
                            .filter(|(t, c)| !t.is_empty() && !c.is_empty())
                            .ok_or_else(|| meta.error("expected `table.column`"))?;
                        attrs.references = Some((table.to_string(), column.to_string()));
                    }
                    _ => return Err(meta.error("unsupported column attribute")),
                }
                Ok(())
            })?;
        }

        let nullable = attrs.nullable.unwrap_or_else(|| rust_type.starts_with("Option<"));
        let column_name = optional(&attrs.name);
        let db_type = optional(&attrs.db_type);
        let default = optional(&attrs.default);
        let comment = optional(&attrs.comment);
        let primary_key = attrs.primary_key;
        let unique = attrs.unique;
        let auto_increment = attrs.auto_increment;
        let foreign_key = match &attrs.references {
            Some((ref_table, ref_column)) => quote! {
                ::std::option::Option::Some(::schema_drift::schema::ForeignKeyDefinition {
                    ref_table: ::std::string::String::from(#ref_table),
                    ref_column: ::std::string::String::from(#ref_column),
                    on_delete: ::std::option::Option::None,
                    on_update: ::std::option::Option::None,
                })
            },
            None => quote! { ::std::option::Option::None },
        };

        fields.push(quote! {
            ::schema_drift::schema::FieldDefinition {
                name: ::std::string::String::from(#field_name),
                column_name: #column_name,
                rust_type: ::std::string::String::from(#rust_type),
                db_type: #db_type,
                nullable: #nullable,
                primary_key: #primary_key,
                unique: #unique,
                auto_increment: #auto_increment,
                default: #default,
                foreign_key: #foreign_key,
                comment: #comment,
            }
        });
    }

    let table = optional(&table);

    Ok(quote! {
        #[automatically_derived]
        impl #impl_generics ::schema_drift::models::Entity for #name #ty_generics #where_clause {
            fn descriptor() -> ::schema_drift::models::EntityDescriptor {
                ::schema_drift::models::EntityDescriptor {
                    name: ::std::string::String::from(#name_str),
                    table: #table,
                    fields: ::std::vec![#(#fields),*],
                }
            }
        }
    })
}
