#![allow(non_snake_case)]

use proc_macro::TokenStream;
use quote::{quote, ToTokens};
use syn::{
    parse_macro_input, spanned::Spanned, Data, DeriveInput, Fields, Lit, Meta, PathArguments, Type,
    TypeArray, TypePath,
};

/// Inject `pub(crate) device: ash::Device` into a Vulkan backend object and implement the
/// crate private `DeviceObject` trait for it.
#[proc_macro_attribute]
#[allow(non_snake_case)]
pub fn DeviceObject(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as syn::ItemStruct);
    let ident = input.ident.clone();
    let generics = input.generics.clone();
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let mut output_struct = input.clone();

    let syn::Fields::Named(fields_named) = &mut output_struct.fields else {
        return syn::Error::new(
            output_struct.span(),
            "DeviceObject only supports structs with named fields",
        )
        .to_compile_error()
        .into();
    };

    if fields_named.named.iter().any(|f| f.ident.as_ref().is_some_and(|id| id == "device")) {
        return syn::Error::new(
            fields_named.span(),
            "DeviceObject: struct already has a `device` field; remove it and let the macro inject `pub(crate) device: ash::Device`",
        )
        .to_compile_error()
        .into();
    }

    let device_field: syn::Field = syn::parse_quote! {
        pub(crate) device: ::ash::Device
    };
    fields_named.named.push(device_field);

    let expanded = quote! {
        #output_struct

        impl #impl_generics crate::vulkan::device::sealed::Sealed for #ident #ty_generics #where_clause {}

        impl #impl_generics crate::vulkan::device::DeviceObject for #ident #ty_generics #where_clause {
            #[inline]
            fn device(&self) -> &::ash::Device { &self.device }
        }
    };

    expanded.into()
}

/// Describe a `#[repr(C)]` vertex struct as a list of `prism_rhi::InputElement`.
///
/// The HLSL semantic of every field is its upper cased name, `#[semantic = "TEXCOORD"]`
/// overrides it. Fields are read from vertex buffer slot 0.
#[proc_macro_derive(VertexLayout, attributes(semantic))]
pub fn derive_vertex_layout(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    let ident = input.ident.clone();
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    if !has_repr_c(&input.attrs) {
        return syn::Error::new(
            input.span(),
            "VertexLayout requires #[repr(C)] on the vertex struct to ensure stable field offsets",
        )
        .to_compile_error()
        .into();
    }

    let fields = match input.data {
        Data::Struct(s) => match s.fields {
            Fields::Named(named) => named.named,
            Fields::Unnamed(_) | Fields::Unit => {
                return syn::Error::new(
                    ident.span(),
                    "VertexLayout only supports structs with named fields",
                )
                .to_compile_error()
                .into();
            }
        },
        _ => {
            return syn::Error::new(ident.span(), "VertexLayout only supports structs")
                .to_compile_error()
                .into();
        }
    };

    let mut element_inits = Vec::new();
    for (i, field) in fields.iter().enumerate() {
        let field_ident = match &field.ident {
            Some(id) => id,
            None => {
                return syn::Error::new(field.span(), "expected named field")
                    .to_compile_error()
                    .into();
            }
        };

        let semantic = match semantic_override(&field.attrs) {
            Ok(Some(name)) => name,
            Ok(None) => field_ident.to_string().to_uppercase(),
            Err(e) => return e.to_compile_error().into(),
        };

        let fmt = match format_for_type(&field.ty) {
            Ok(ts) => ts,
            Err(e) => return e.to_compile_error().into(),
        };

        let location = i as u32;
        let init = quote! {
            ::prism_rhi::InputElement {
                semantic_name: #semantic,
                semantic_index: 0u32,
                format: #fmt,
                input_slot: 0u32,
                location: #location,
                offset: ::prism_rhi::memoffset::offset_of!(Self, #field_ident) as u32,
            }
        };
        element_inits.push(init);
    }

    let expanded = quote! {
        impl #impl_generics ::prism_rhi::VertexLayout for #ident #ty_generics #where_clause {
            fn stride() -> u32 {
                ::core::mem::size_of::<Self>() as u32
            }

            fn input_elements() -> ::std::vec::Vec<::prism_rhi::InputElement> {
                ::std::vec![#(#element_inits),*]
            }
        }
    };

    expanded.into()
}

fn has_repr_c(attrs: &[syn::Attribute]) -> bool {
    for attr in attrs {
        if !attr.path().is_ident("repr") {
            continue;
        }
        let Ok(meta) = attr.parse_args_with(syn::punctuated::Punctuated::<Meta, syn::Token![,]>::parse_terminated) else {
            continue;
        };
        for m in meta {
            match m {
                Meta::Path(p) if p.is_ident("C") => return true,
                _ => {}
            }
        }
    }
    false
}

fn semantic_override(attrs: &[syn::Attribute]) -> Result<Option<String>, syn::Error> {
    for attr in attrs {
        if !attr.path().is_ident("semantic") {
            continue;
        }
        let Meta::NameValue(name_value) = &attr.meta else {
            return Err(syn::Error::new(attr.span(), "expected #[semantic = \"NAME\"]"));
        };
        if let syn::Expr::Lit(syn::ExprLit { lit: Lit::Str(s), .. }) = &name_value.value {
            return Ok(Some(s.value()));
        }
        return Err(syn::Error::new(name_value.value.span(), "semantic must be a string literal"));
    }
    Ok(None)
}

fn format_for_type(ty: &Type) -> Result<proc_macro2::TokenStream, syn::Error> {
    if let Type::Array(TypeArray { elem, len, .. }) = ty {
        let n = match len {
            syn::Expr::Lit(expr_lit) => match &expr_lit.lit {
                Lit::Int(li) => li.base10_parse::<usize>().ok(),
                _ => None,
            },
            _ => None,
        }
        .ok_or_else(|| syn::Error::new(ty.span(), "array length must be an integer literal"))?;

        let elem = elem.as_ref();
        return format_for_scalar_array(elem, n);
    }

    if let Type::Path(TypePath { path, .. }) = ty {
        if let Some(ident) = path.get_ident() {
            return match ident.to_string().as_str() {
                "f32" => Ok(quote!(::prism_rhi::PixelFormat::R32Float)),
                "u32" => Ok(quote!(::prism_rhi::PixelFormat::R32Uint)),
                "i32" => Ok(quote!(::prism_rhi::PixelFormat::R32Sint)),
                _ => Err(syn::Error::new(
                    ty.span(),
                    format!("unsupported vertex field type `{}`", ident),
                )),
            };
        }

        if let Some(seg) = path.segments.last() {
            if matches!(seg.arguments, PathArguments::AngleBracketed(_)) {
                return Err(syn::Error::new(
                    ty.span(),
                    "unsupported generic vertex field type; use primitives or arrays like [f32; N]",
                ));
            }
        }
    }

    Err(syn::Error::new(
        ty.span(),
        format!("unsupported vertex field type `{}`", ty.to_token_stream()),
    ))
}

fn format_for_scalar_array(elem: &Type, n: usize) -> Result<proc_macro2::TokenStream, syn::Error> {
    let scalar = if let Type::Path(TypePath { path, .. }) = elem {
        path.get_ident().map(|i| i.to_string())
    } else {
        None
    }
    .ok_or_else(|| syn::Error::new(elem.span(), "array element type must be a primitive"))?;

    match (scalar.as_str(), n) {
        ("f32", 2) => Ok(quote!(::prism_rhi::PixelFormat::R32G32Float)),
        ("f32", 3) => Ok(quote!(::prism_rhi::PixelFormat::R32G32B32Float)),
        ("f32", 4) => Ok(quote!(::prism_rhi::PixelFormat::R32G32B32A32Float)),

        ("u32", 2) => Ok(quote!(::prism_rhi::PixelFormat::R32G32Uint)),
        ("u32", 3) => Ok(quote!(::prism_rhi::PixelFormat::R32G32B32Uint)),
        ("u32", 4) => Ok(quote!(::prism_rhi::PixelFormat::R32G32B32A32Uint)),

        ("i32", 2) => Ok(quote!(::prism_rhi::PixelFormat::R32G32Sint)),
        ("i32", 3) => Ok(quote!(::prism_rhi::PixelFormat::R32G32B32Sint)),
        ("i32", 4) => Ok(quote!(::prism_rhi::PixelFormat::R32G32B32A32Sint)),

        _ => Err(syn::Error::new(
            elem.span(),
            format!("unsupported vertex array type `[{scalar}; {n}]` (supported: f32/u32/i32 with N=2..4)"),
        )),
    }
}
