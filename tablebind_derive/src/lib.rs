use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{Data, DeriveInput, Fields, Ident, LitStr, Type, parse_macro_input, spanned::Spanned};

/// Implements `tablebind::Entity` and `tablebind::FromRecord` for a struct
/// with named fields.
///
/// Struct attribute: `#[entity(table = "...")]` (defaults to the snake_case
/// struct name plus `s`).
///
/// Field attribute: `#[column(primary_key, unique, enumeration, name = "...")]`.
#[proc_macro_derive(Entity, attributes(entity, column))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand_entity(input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

#[derive(Default)]
struct EntityOptions {
    table_name: Option<String>,
}

#[derive(Default)]
struct ColumnOptions {
    primary_key: bool,
    unique: bool,
    enumeration: bool,
    column_name: Option<String>,
}

struct EntityField {
    ident: Ident,
    column_name: String,
    semantic_type: Ident,
    primary_key: bool,
    unique: bool,
}

fn expand_entity(input: DeriveInput) -> syn::Result<TokenStream2> {
    let struct_name = input.ident;

    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            input.generics,
            "Entity does not support generic structs",
        ));
    }

    let options = parse_entity_options(&input.attrs)?;

    let data_struct = match input.data {
        Data::Struct(data) => data,
        _ => {
            return Err(syn::Error::new(
                struct_name.span(),
                "Entity can only be derived for structs",
            ));
        }
    };

    let named_fields = match data_struct.fields {
        Fields::Named(fields) => fields,
        _ => {
            return Err(syn::Error::new(
                struct_name.span(),
                "Entity requires named fields",
            ));
        }
    };

    let mut fields = Vec::<EntityField>::new();
    for field in named_fields.named {
        let ident = field
            .ident
            .clone()
            .ok_or_else(|| syn::Error::new(field.span(), "Entity requires named fields"))?;
        let column = parse_column_options(&field.attrs)?;

        let semantic_type = if column.enumeration {
            format_ident!("Enumeration")
        } else {
            semantic_type_of(&field.ty).ok_or_else(|| {
                syn::Error::new(
                    field.ty.span(),
                    "Unsupported field type. Supported: String, i8..i64, u8..u32, \
                     chrono::NaiveDateTime and Option of these; mark text-backed enums \
                     with #[column(enumeration)]",
                )
            })?
        };

        let column_name = column
            .column_name
            .unwrap_or_else(|| ident.to_string().trim_start_matches("r#").to_string());

        fields.push(EntityField {
            ident,
            column_name,
            semantic_type,
            primary_key: column.primary_key,
            unique: column.unique,
        });
    }

    if fields.is_empty() {
        return Err(syn::Error::new(
            struct_name.span(),
            "Entity requires at least one field",
        ));
    }

    let table_name = options
        .table_name
        .unwrap_or_else(|| default_table_name(&struct_name.to_string()));

    let descriptors = fields.iter().map(|field| {
        let EntityField {
            column_name,
            semantic_type,
            primary_key,
            unique,
            ..
        } = field;
        quote! {
            ::tablebind::ColumnDescriptor {
                name: #column_name.to_string(),
                semantic_type: ::tablebind::SemanticType::#semantic_type,
                primary_key: #primary_key,
                unique: #unique,
            }
        }
    });

    let row_values = fields.iter().map(|field| {
        let ident = &field.ident;
        quote! {
            ::tablebind::Value::from(::std::clone::Clone::clone(&self.#ident))
        }
    });

    let record_fields = fields.iter().map(|field| {
        let ident = &field.ident;
        let column_name = &field.column_name;
        quote! {
            #ident: record.get_as(#column_name)?
        }
    });

    Ok(quote! {
        impl ::tablebind::schema::Entity for #struct_name {
            fn table_name() -> &'static str {
                #table_name
            }

            fn definition() -> ::tablebind::EntityDefinition {
                ::tablebind::EntityDefinition::new(#table_name)
                    #( .field(#descriptors) )*
            }

            fn to_row(&self) -> ::tablebind::Row {
                vec![ #( #row_values ),* ]
            }
        }

        impl ::tablebind::FromRecord for #struct_name {
            fn from_record(
                record: &::tablebind::Record,
            ) -> ::std::result::Result<Self, ::tablebind::ExecutionError> {
                Ok(Self {
                    #( #record_fields ),*
                })
            }
        }
    })
}

fn semantic_type_of(ty: &Type) -> Option<Ident> {
    let Type::Path(path) = ty else {
        return None;
    };
    let segment = path.path.segments.last()?;

    match segment.ident.to_string().as_str() {
        "String" => Some(format_ident!("Text")),
        "i8" | "i16" | "i32" | "i64" | "u8" | "u16" | "u32" => Some(format_ident!("Integer")),
        "NaiveDateTime" => Some(format_ident!("Timestamp")),
        "Option" => semantic_type_of(&first_generic_type(segment)?),
        _ => None,
    }
}

fn first_generic_type(segment: &syn::PathSegment) -> Option<Type> {
    let syn::PathArguments::AngleBracketed(arguments) = &segment.arguments else {
        return None;
    };

    for arg in &arguments.args {
        if let syn::GenericArgument::Type(ty) = arg {
            return Some(ty.clone());
        }
    }
    None
}

fn default_table_name(struct_name: &str) -> String {
    let mut out = String::new();
    for (idx, ch) in struct_name.chars().enumerate() {
        if ch.is_uppercase() {
            if idx > 0 {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }
    out.push('s');
    out
}

fn parse_entity_options(attrs: &[syn::Attribute]) -> syn::Result<EntityOptions> {
    let mut options = EntityOptions::default();

    for attr in attrs {
        if !attr.path().is_ident("entity") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                let value = meta.value()?;
                let lit: LitStr = value.parse()?;
                options.table_name = Some(lit.value());
                return Ok(());
            }

            Err(meta.error("Unsupported entity attribute. Supported: table = \"...\""))
        })?;
    }

    Ok(options)
}

fn parse_column_options(attrs: &[syn::Attribute]) -> syn::Result<ColumnOptions> {
    let mut options = ColumnOptions::default();

    for attr in attrs {
        if !attr.path().is_ident("column") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("primary_key") {
                options.primary_key = true;
                return Ok(());
            }

            if meta.path.is_ident("unique") {
                options.unique = true;
                return Ok(());
            }

            if meta.path.is_ident("enumeration") {
                options.enumeration = true;
                return Ok(());
            }

            if meta.path.is_ident("name") {
                let value = meta.value()?;
                let lit: LitStr = value.parse()?;
                options.column_name = Some(lit.value());
                return Ok(());
            }

            Err(meta.error(
                "Unsupported #[column(...)] option. Supported: primary_key, unique, enumeration, name = \"...\"",
            ))
        })?;
    }

    Ok(options)
}
