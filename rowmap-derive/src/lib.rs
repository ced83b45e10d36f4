#![forbid(unsafe_code)]
use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, spanned::Spanned, Attribute, Data, DeriveInput, Fields, Index, LitStr, Member};

#[proc_macro_derive(Object, attributes(table_name, column_name, column_alias_prefix, orm_constructor))]
pub fn derive_object(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

struct Column {
    member: Member,
    field_name: String,
    column_name: String,
    ty: syn::Type,
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let data = match &input.data {
        Data::Struct(data) => data,
        _ => {
            return Err(syn::Error::new(
                input.ident.span(),
                "Only structs can derive `Object`",
            ))
        }
    };

    let type_name = &input.ident;
    let table_name = string_attr(&input.attrs, "table_name")?.unwrap_or_else(|| type_name.to_string());
    let alias_prefix = match string_attr(&input.attrs, "column_alias_prefix")? {
        Some(prefix) => quote! { Some(#prefix) },
        None => quote! { None },
    };
    let with_constructor = input.attrs.iter().any(|attr| attr.path().is_ident("orm_constructor"));

    let columns = data
        .fields
        .iter()
        .enumerate()
        .map(|(i, field)| {
            let member = match &field.ident {
                Some(ident) => Member::Named(ident.clone()),
                None => Member::Unnamed(Index::from(i)),
            };
            let field_name = field
                .ident
                .as_ref()
                .map_or_else(|| i.to_string(), |ident| ident.to_string());
            let column_name = match (string_attr(&field.attrs, "column_name")?, &field.ident) {
                (Some(name), _) => name,
                (None, Some(ident)) => ident.to_string(),
                (None, None) => {
                    return Err(syn::Error::new(
                        field.span(),
                        "Fields of tuple structs should be marked with `column_name` attribute",
                    ))
                }
            };
            Ok(Column {
                member,
                field_name,
                column_name,
                ty: field.ty.clone(),
            })
        })
        .collect::<syn::Result<Vec<_>>>()?;

    let accessors = columns.iter().map(|column| {
        let Column {
            member,
            field_name,
            column_name,
            ty,
        } = column;
        quote! {
            (
                #column_name,
                rowmap::Accessor::field(
                    #field_name,
                    <#ty as rowmap::SqlValue>::DATA_TYPE,
                    |object: &Self| rowmap::SqlValue::to_value(&object.#member),
                    |object: &mut Self, value: rowmap::Value| {
                        object.#member = <#ty as rowmap::SqlValue>::from_value(value)
                            .map_err(|err| err.for_field(#field_name))?;
                        Ok(())
                    },
                ),
            ),
        }
    });

    let construction = if with_constructor {
        let parameters = columns.iter().map(|Column { column_name, ty, .. }| {
            quote! {
                rowmap::ConstructorParameter::new(#column_name, <#ty as rowmap::SqlValue>::DATA_TYPE),
            }
        });
        let arguments = columns.iter().map(|Column { column_name, ty, .. }| {
            quote! {
                <#ty as rowmap::SqlValue>::from_value(args.next().unwrap_or(rowmap::Value::Null))
                    .map_err(|err| err.for_field(#column_name))?
            }
        });
        let build = match &data.fields {
            Fields::Named(_) => {
                let members = columns.iter().map(|column| &column.member);
                quote! { Self { #(#members: #arguments,)* } }
            }
            Fields::Unnamed(_) => quote! { Self(#(#arguments,)*) },
            Fields::Unit => quote! { Self },
        };

        quote! {
            fn constructors() -> Vec<rowmap::Constructor<Self>> {
                vec![rowmap::Constructor::new(
                    vec![#(#parameters)*],
                    |args: Vec<rowmap::Value>| {
                        #[allow(unused_mut, unused_variables)]
                        let mut args = args.into_iter();
                        Ok(#build)
                    },
                )]
            }
        }
    } else {
        quote! {
            fn instantiate() -> Option<Self> {
                Some(<Self as Default>::default())
            }
        }
    };

    Ok(quote! {
        impl rowmap::Object for #type_name {
            const TYPE_NAME: &'static str = stringify!(#type_name);
            const TABLE_NAME: &'static str = #table_name;
            const COLUMN_ALIAS_PREFIX: Option<&'static str> = #alias_prefix;

            fn accessors() -> Vec<(&'static str, rowmap::Accessor<Self>)> {
                vec![#(#accessors)*]
            }

            #construction
        }
    })
}

/// Value of `#[name("..")]`, if present. Other attributes are left alone.
fn string_attr(attrs: &[Attribute], name: &str) -> syn::Result<Option<String>> {
    let mut value = None;
    for attr in attrs {
        if !attr.path().is_ident(name) {
            continue;
        }
        match &attr.meta {
            syn::Meta::List(list) => {
                let lit = list.parse_args::<LitStr>().map_err(|_| {
                    syn::Error::new(list.span(), "Attribute argument should be a single string literal")
                })?;
                value = Some(lit.value());
            }
            _ => {
                return Err(syn::Error::new(
                    attr.span(),
                    format!(
                        "Incorrect format for using `{0}` attribute. Usage: `#[{0}(\"value\")]`",
                        name
                    ),
                ));
            }
        }
    }
    Ok(value)
}
