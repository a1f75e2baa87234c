use crate::route_validation::validate_controller_path;
use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::parse::{Parse, ParseStream};
use syn::{
    Attribute, Field, Fields, GenericArgument, Ident, ItemStruct, LitStr, PathArguments, Token,
    Type, parse_macro_input,
};

/// `#[controller]`, `#[controller("/p")]` or `#[controller(path = "/p")]`
struct ControllerArgs {
    path: Option<LitStr>,
}

impl Parse for ControllerArgs {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        if input.is_empty() {
            return Ok(Self { path: None });
        }

        if input.peek(LitStr) {
            return Ok(Self {
                path: Some(input.parse()?),
            });
        }

        let key: Ident = input.parse()?;
        if key != "path" {
            return Err(syn::Error::new(
                key.span(),
                format!("unknown controller argument `{key}`; expected `path`"),
            ));
        }
        input.parse::<Token![=]>()?;
        Ok(Self {
            path: Some(input.parse()?),
        })
    }
}

pub fn service_impl(attr: TokenStream, item: TokenStream) -> TokenStream {
    if !attr.is_empty() {
        return syn::Error::new(
            proc_macro2::Span::call_site(),
            "#[service] takes no arguments",
        )
        .to_compile_error()
        .into();
    }

    let mut input = parse_macro_input!(item as ItemStruct);
    match injectable_tokens(&mut input) {
        Ok(injectable) => quote! {
            #input
            #injectable
        }
        .into(),
        Err(err) => err.to_compile_error().into(),
    }
}

pub fn controller_impl(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = parse_macro_input!(attr as ControllerArgs);
    let mut input = parse_macro_input!(item as ItemStruct);

    let path = args
        .path
        .unwrap_or_else(|| LitStr::new("", proc_macro2::Span::call_site()));
    if let Err(err) = validate_controller_path(&path.value(), path.span()) {
        return err.to_compile_error().into();
    }

    let injectable = match injectable_tokens(&mut input) {
        Ok(tokens) => tokens,
        Err(err) => return err.to_compile_error().into(),
    };

    let struct_name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    quote! {
        #input
        #injectable

        impl #impl_generics ::girder::Controller for #struct_name #ty_generics #where_clause {
            fn path() -> &'static str {
                #path
            }
        }
    }
    .into()
}

/// The `Injectable` impl for a struct. Strips `#[inject(..)]` field
/// attributes from `input`.
fn injectable_tokens(input: &mut ItemStruct) -> syn::Result<TokenStream2> {
    let mut dependencies = Vec::new();
    let mut values = Vec::new();

    for field in input.fields.iter_mut() {
        let use_default = take_inject_attr(&mut field.attrs)?;
        match dependency_type(field).filter(|_| !use_default) {
            Some(ty) => {
                dependencies.push(quote! { ::girder::Dependency::on::<#ty>() });
                values.push(quote! { deps.next::<#ty>()? });
            }
            None => values.push(quote! { ::std::default::Default::default() }),
        }
    }

    let body = match &input.fields {
        Fields::Named(named) => {
            let names = named.named.iter().map(|f| &f.ident);
            quote! { Self { #(#names: #values),* } }
        }
        Fields::Unnamed(_) => quote! { Self(#(#values),*) },
        Fields::Unit => quote! { Self },
    };

    let deps_ident = if dependencies.is_empty() {
        quote! { _deps }
    } else {
        quote! { deps }
    };

    let struct_name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        #[::girder::async_trait]
        impl #impl_generics ::girder::Injectable for #struct_name #ty_generics #where_clause {
            async fn register() -> ::girder::Result<::std::vec::Vec<::girder::Dependency>> {
                ::std::result::Result::Ok(::std::vec![#(#dependencies),*])
            }

            fn construct(#deps_ident: &mut ::girder::Dependencies) -> ::girder::Result<Self> {
                ::std::result::Result::Ok(#body)
            }
        }
    })
}

/// `T` for an `Arc<T>` field.
fn dependency_type(field: &Field) -> Option<&Type> {
    let Type::Path(path) = &field.ty else {
        return None;
    };
    let segment = path.path.segments.last()?;
    if segment.ident != "Arc" {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    match args.args.first()? {
        GenericArgument::Type(ty) if args.args.len() == 1 => Some(ty),
        _ => None,
    }
}

/// Remove `#[inject(default)]`; true if it was present.
fn take_inject_attr(attrs: &mut Vec<Attribute>) -> syn::Result<bool> {
    let mut use_default = false;
    let mut result = Ok(());

    attrs.retain(|attr| {
        if !attr.path().is_ident("inject") {
            return true;
        }
        let parsed = attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("default") {
                use_default = true;
                Ok(())
            } else {
                Err(meta.error("unknown inject option; expected `default`"))
            }
        });
        if let Err(err) = parsed {
            result = Err(err);
        }
        false
    });

    result.map(|()| use_default)
}
