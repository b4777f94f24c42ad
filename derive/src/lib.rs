extern crate proc_macro;

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::parse::ParseStream;
use syn::{
    parse_macro_input, Attribute, Data, DataEnum, DataStruct, DeriveInput, Fields, Ident, LitInt,
    LitStr, Path, Type,
};

/// Type-level serialization annotation: `#[graphpack(serialize)]` or
/// `#[graphpack(serialize(include_all))]`.
#[derive(Clone, Copy)]
struct Annotation {
    include_all: bool,
}

/// A property declared with `#[graphpack(property(...))]`.
struct Property {
    name: LitStr,
    ty: Type,
    get: Option<Path>,
    set: Option<Path>,
    index: Option<u16>,
    ignore: bool,
}

/// Attributes of a single field.
#[derive(Default)]
struct FieldAttributes {
    index: Option<u16>,
    ignore: bool,
    opaque: bool,
}

fn parse_index(input: ParseStream) -> syn::Result<u16> {
    input.parse::<syn::Token![=]>()?;
    let lit = input.parse::<LitInt>()?;
    lit.base10_parse::<u16>()
        .map_err(|_| syn::Error::new(lit.span(), "index must fit in u16"))
}

fn eat_comma(input: ParseStream) -> syn::Result<()> {
    if input.peek(syn::Token![,]) {
        input.parse::<syn::Token![,]>()?;
    }
    Ok(())
}

fn parse_property(input: ParseStream) -> syn::Result<Property> {
    let span = input.span();
    let mut name = None;
    let mut ty = None;
    let mut get = None;
    let mut set = None;
    let mut index = None;
    let mut ignore = false;

    while !input.is_empty() {
        let ident = input.parse::<Ident>()?;
        if ident == "name" {
            input.parse::<syn::Token![=]>()?;
            name = Some(input.parse::<LitStr>()?);
        } else if ident == "ty" {
            input.parse::<syn::Token![=]>()?;
            ty = Some(input.parse::<Type>()?);
        } else if ident == "get" {
            input.parse::<syn::Token![=]>()?;
            get = Some(input.parse::<Path>()?);
        } else if ident == "set" {
            input.parse::<syn::Token![=]>()?;
            set = Some(input.parse::<Path>()?);
        } else if ident == "index" {
            index = Some(parse_index(input)?);
        } else if ident == "ignore" {
            ignore = true;
        } else {
            return Err(syn::Error::new(
                ident.span(),
                format!("Unknown property attribute: {}", ident),
            ));
        }
        eat_comma(input)?;
    }

    Ok(Property {
        name: name.ok_or_else(|| syn::Error::new(span, "property requires `name = \"..\"`"))?,
        ty: ty.ok_or_else(|| syn::Error::new(span, "property requires `ty = Type`"))?,
        get,
        set,
        index,
        ignore,
    })
}

/// Parses every `#[graphpack(...)]` on the type itself.
fn get_type_attributes(attrs: &[Attribute]) -> syn::Result<(Option<Annotation>, Vec<Property>)> {
    let mut annotation = None;
    let mut properties = Vec::new();

    for attr in attrs {
        if !attr.path().is_ident("graphpack") {
            continue;
        }
        attr.parse_args_with(|input: ParseStream| {
            while !input.is_empty() {
                let ident = input.parse::<Ident>()?;
                if ident == "serialize" {
                    let mut include_all = false;
                    if input.peek(syn::token::Paren) {
                        let content;
                        syn::parenthesized!(content in input);
                        let mode = content.parse::<Ident>()?;
                        if mode != "include_all" {
                            return Err(syn::Error::new(
                                mode.span(),
                                format!("Unknown serialize mode: {}", mode),
                            ));
                        }
                        include_all = true;
                    }
                    annotation = Some(Annotation { include_all });
                } else if ident == "property" {
                    let content;
                    syn::parenthesized!(content in input);
                    properties.push(parse_property(&content)?);
                } else {
                    return Err(syn::Error::new(
                        ident.span(),
                        format!("Unknown type attribute: {}", ident),
                    ));
                }
                eat_comma(input)?;
            }
            Ok(())
        })?;
    }

    Ok((annotation, properties))
}

/// Parses `#[graphpack(index = N, ignore, opaque)]` on a field.
fn get_field_attributes(attrs: &[Attribute]) -> syn::Result<FieldAttributes> {
    let mut parsed = FieldAttributes::default();
    for attr in attrs {
        if !attr.path().is_ident("graphpack") {
            continue;
        }
        attr.parse_args_with(|input: ParseStream| {
            while !input.is_empty() {
                let ident = input.parse::<Ident>()?;
                if ident == "index" {
                    parsed.index = Some(parse_index(input)?);
                } else if ident == "ignore" {
                    parsed.ignore = true;
                } else if ident == "opaque" {
                    parsed.opaque = true;
                } else {
                    return Err(syn::Error::new(
                        ident.span(),
                        format!("Unknown field attribute: {}", ident),
                    ));
                }
                eat_comma(input)?;
            }
            Ok(())
        })?;
    }
    Ok(parsed)
}

/// Derives the accessor table and descriptors for a struct or fieldless enum.
///
/// Structs implement `graphpack::Model` and must also implement `Default` and
/// `Clone`. Fieldless enums travel as their `#[repr]` integer (`i32` by default).
#[proc_macro_derive(Reflect, attributes(graphpack))]
pub fn derive_reflect(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let expanded = if !input.generics.params.is_empty() {
        Err(syn::Error::new_spanned(
            &input.generics,
            "Reflect cannot be derived for generic types",
        ))
    } else {
        match &input.data {
            Data::Struct(data) => derive_struct(&input, data),
            Data::Enum(data) => derive_enum(&input, data),
            Data::Union(_) => Err(syn::Error::new_spanned(
                &input.ident,
                "Reflect cannot be derived for unions",
            )),
        }
    };
    expanded
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn derive_struct(input: &DeriveInput, data: &DataStruct) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let (annotation, properties) = get_type_attributes(&input.attrs)?;
    let include_all = annotation.map_or(false, |a| a.include_all);

    let annotation_tokens = match annotation {
        Some(Annotation { include_all }) => quote! {
            ::core::option::Option::Some(::graphpack::schema::Annotation { include_all: #include_all })
        },
        None => quote! { ::core::option::Option::None },
    };

    let mut members = Vec::new();
    let fields: Vec<_> = match &data.fields {
        Fields::Named(named) => named.named.iter().collect(),
        Fields::Unnamed(unnamed) => unnamed.unnamed.iter().collect(),
        Fields::Unit => Vec::new(),
    };
    for (position, field) in fields.into_iter().enumerate() {
        let attrs = get_field_attributes(&field.attrs)?;
        let declared = if include_all {
            !attrs.ignore
        } else {
            attrs.index.is_some()
        };
        if !declared {
            continue;
        }

        let (member_name, access) = match &field.ident {
            Some(ident) => (ident.to_string(), quote! { #ident }),
            None => {
                let index = syn::Index::from(position);
                (position.to_string(), quote! { #index })
            }
        };
        let ty = &field.ty;
        let (desc, get, set) = if attrs.opaque {
            (
                quote! {
                    ::graphpack::TypeDesc::Object(::graphpack::ObjectDesc::opaque::<#ty>())
                },
                quote! { ::graphpack::value::object_to_value(&instance.#access) },
                quote! { ::graphpack::value::object_from_value::<#ty>(value)? },
            )
        } else {
            (
                quote! { <#ty as ::graphpack::Describe>::type_desc() },
                quote! { ::graphpack::ToValue::to_value(&instance.#access) },
                quote! { <#ty as ::graphpack::FromValue>::from_value(value)? },
            )
        };
        let index = attrs.index.map(|index| quote! { .index(#index) });

        members.push(quote! {
            .member(
                ::graphpack::schema::DeclaredMember::<Self>::field(
                    #member_name,
                    #desc,
                    |instance: &Self| -> ::graphpack::Value { #get },
                    |instance: &mut Self, value: ::graphpack::Value| -> ::graphpack::Result<()> {
                        instance.#access = #set;
                        ::core::result::Result::Ok(())
                    },
                )
                #index
            )
        });
    }

    for property in &properties {
        let Property {
            name: prop_name,
            ty,
            get,
            set,
            index,
            ignore,
        } = property;
        let get = match get {
            Some(path) => quote! {
                ::core::option::Option::Some(|instance: &Self| -> ::graphpack::Value {
                    let got = #path(instance);
                    ::graphpack::ToValue::to_value(::core::borrow::Borrow::<#ty>::borrow(&got))
                })
            },
            None => quote! { ::core::option::Option::None },
        };
        let set = match set {
            Some(path) => quote! {
                ::core::option::Option::Some(
                    |instance: &mut Self, value: ::graphpack::Value| -> ::graphpack::Result<()> {
                        #path(instance, <#ty as ::graphpack::FromValue>::from_value(value)?);
                        ::core::result::Result::Ok(())
                    },
                )
            },
            None => quote! { ::core::option::Option::None },
        };
        let index = index.map(|index| quote! { .index(#index) });
        let ignore = ignore.then(|| quote! { .ignore() });

        members.push(quote! {
            .member(
                ::graphpack::schema::DeclaredMember::<Self>::property(
                    #prop_name,
                    <#ty as ::graphpack::Describe>::type_desc(),
                    #get,
                    #set,
                )
                #index
                #ignore
            )
        });
    }

    let linked = link_named_type(name);
    Ok(quote! {
        impl ::graphpack::Describe for #name {
            fn type_desc() -> ::graphpack::TypeDesc {
                ::graphpack::TypeDesc::Object(::graphpack::ObjectDesc::model::<Self>())
            }
        }

        #linked

        impl ::graphpack::ToValue for #name {
            fn to_value(&self) -> ::graphpack::Value {
                ::graphpack::value::object_to_value(self)
            }
        }

        impl ::graphpack::FromValue for #name {
            fn from_value(value: ::graphpack::Value) -> ::graphpack::Result<Self> {
                ::graphpack::value::object_from_value(value)
            }
        }

        impl ::graphpack::Model for #name {
            fn declaration() -> ::graphpack::schema::Declaration<Self> {
                ::graphpack::schema::Declaration::new(#annotation_tokens)
                    #(#members)*
            }
        }
    })
}

/// Submits the type's descriptor to the link-time table of named types, so
/// include-all type names resolve before any schema mentioning the type is built.
fn link_named_type(name: &Ident) -> TokenStream2 {
    quote! {
        const _: () = {
            ::graphpack::__private::inventory::submit! {
                ::graphpack::__private::LinkedType(<#name as ::graphpack::Describe>::type_desc)
            }
        };
    }
}

/// Reads `#[repr(..)]`; fieldless enums default to `i32`.
fn enum_repr(attrs: &[Attribute]) -> syn::Result<(Ident, TokenStream2)> {
    let mut repr = None;
    for attr in attrs {
        if !attr.path().is_ident("repr") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if let Some(ident) = meta.path.get_ident() {
                let kind = match ident.to_string().as_str() {
                    "u8" => Some("U8"),
                    "i8" => Some("I8"),
                    "i16" => Some("I16"),
                    "u16" => Some("U16"),
                    "i32" => Some("I32"),
                    "u32" => Some("U32"),
                    "i64" => Some("I64"),
                    "u64" => Some("U64"),
                    "C" => None,
                    other => {
                        return Err(meta.error(format!("Unsupported enum repr: {}", other)));
                    }
                };
                if let Some(kind) = kind {
                    repr = Some((ident.clone(), kind));
                }
            }
            Ok(())
        })?;
    }
    let (ty, kind) = repr.unwrap_or_else(|| (Ident::new("i32", proc_macro2::Span::call_site()), "I32"));
    let kind = Ident::new(kind, proc_macro2::Span::call_site());
    Ok((ty, quote! { #kind }))
}

fn derive_enum(input: &DeriveInput, data: &DataEnum) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    if data.variants.is_empty() {
        return Err(syn::Error::new_spanned(name, "Reflect needs at least one variant"));
    }
    if let Some(variant) = data.variants.iter().find(|v| !matches!(v.fields, Fields::Unit)) {
        return Err(syn::Error::new_spanned(
            variant,
            "Reflect supports only fieldless enums",
        ));
    }
    let (repr_ty, kind) = enum_repr(&input.attrs)?;
    let variants: Vec<_> = data.variants.iter().map(|v| &v.ident).collect();

    let linked = link_named_type(name);
    Ok(quote! {
        #linked

        impl ::graphpack::Describe for #name {
            fn type_desc() -> ::graphpack::TypeDesc {
                ::graphpack::TypeDesc::Enum(::graphpack::EnumDesc::of::<Self>(
                    ::graphpack::IntKind::#kind,
                ))
            }
        }

        impl ::graphpack::ToValue for #name {
            fn to_value(&self) -> ::graphpack::Value {
                match self {
                    #(Self::#variants => ::graphpack::Value::#kind(Self::#variants as #repr_ty),)*
                }
            }
        }

        impl ::graphpack::FromValue for #name {
            fn from_value(value: ::graphpack::Value) -> ::graphpack::Result<Self> {
                let discriminant =
                    ::graphpack::value::enum_discriminant(value, ::graphpack::IntKind::#kind)?;
                #(
                    if discriminant == Self::#variants as i128 {
                        return ::core::result::Result::Ok(Self::#variants);
                    }
                )*
                ::core::result::Result::Err(::graphpack::value::unknown_discriminant::<Self>(discriminant))
            }
        }
    })
}
