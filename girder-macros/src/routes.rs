use crate::route_validation::validate_route_path;
use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::{format_ident, quote};
use syn::parse::{Parse, ParseStream};
use syn::{
    Attribute, FnArg, Ident, ImplItem, ImplItemFn, ItemImpl, LitStr, Meta, Token, Type,
    parse_macro_input,
};

const ROUTE_ATTRIBUTES: [&str; 5] = ["get", "post", "put", "patch", "delete"];

/// Arguments of a route attribute:
/// `#[get]`, `#[get("/p")]`, `#[post("/p", body = T)]`, `#[post(path = "/p", body = T)]`
#[derive(Default)]
struct RouteArgs {
    path: Option<LitStr>,
    body: Option<Type>,
}

impl Parse for RouteArgs {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let mut args = RouteArgs::default();

        if input.peek(LitStr) {
            args.path = Some(input.parse()?);
            if !input.is_empty() {
                input.parse::<Token![,]>()?;
            }
        }

        while !input.is_empty() {
            let key: Ident = input.parse()?;
            input.parse::<Token![=]>()?;
            match key.to_string().as_str() {
                "path" => args.path = Some(input.parse()?),
                "body" => args.body = Some(input.parse()?),
                other => {
                    return Err(syn::Error::new(
                        key.span(),
                        format!("unknown route argument `{other}`; expected `path` or `body`"),
                    ));
                }
            }
            if !input.is_empty() {
                input.parse::<Token![,]>()?;
            }
        }

        Ok(args)
    }
}

/// One route method found in a `#[routes]` block.
struct RouteMethod {
    http_method: Ident,
    path: LitStr,
    body: Option<Type>,
    name: Ident,
    arity: usize,
    is_async: bool,
}

pub fn routes_impl(attr: TokenStream, item: TokenStream) -> TokenStream {
    if !attr.is_empty() {
        return syn::Error::new(Span::call_site(), "#[routes] takes no arguments")
            .to_compile_error()
            .into();
    }

    let mut input = parse_macro_input!(item as ItemImpl);

    if input.trait_.is_some() {
        return syn::Error::new(
            Span::call_site(),
            "#[routes] must be placed on an inherent impl block",
        )
        .to_compile_error()
        .into();
    }

    let mut routes = Vec::new();
    for item in input.items.iter_mut() {
        let ImplItem::Fn(method) = item else { continue };
        match take_route(method) {
            Ok(Some(route)) => routes.push(route),
            Ok(None) => {}
            Err(err) => return err.to_compile_error().into(),
        }
    }

    let definitions = routes.iter().map(route_definition);
    let arms = routes.iter().map(bind_arm);

    let self_ty = &input.self_ty;
    let (impl_generics, _, where_clause) = input.generics.split_for_impl();

    quote! {
        #input

        impl #impl_generics ::girder::Routes for #self_ty #where_clause {
            fn routes() -> ::std::vec::Vec<::girder::RouteDefinition> {
                ::std::vec![#(#definitions),*]
            }

            fn bind(
                self: ::std::sync::Arc<Self>,
                method: &str,
            ) -> ::std::option::Option<::girder::BoundMethod> {
                match method {
                    #(#arms)*
                    _ => ::std::option::Option::None,
                }
            }
        }
    }
    .into()
}

/// Route attributes are consumed by `#[routes]`; on their own they are an error.
pub fn detached_route(_attr: TokenStream, item: TokenStream, name: &str) -> TokenStream {
    let item = TokenStream2::from(item);
    let message = format!("#[{name}] must be used on a method inside a #[routes] impl block");
    quote! {
        ::std::compile_error!(#message);
        #item
    }
    .into()
}

/// Strip the route attribute from `method` and describe the route.
fn take_route(method: &mut ImplItemFn) -> syn::Result<Option<RouteMethod>> {
    let mut found: Option<(Ident, RouteArgs)> = None;
    let mut error: Option<syn::Error> = None;

    method.attrs.retain(|attr| {
        let Some(http_method) = route_attribute(attr) else {
            return true;
        };
        if found.is_some() {
            error.get_or_insert_with(|| {
                syn::Error::new_spanned(attr, "only one route attribute is allowed per method")
            });
            return false;
        }
        match parse_route_args(attr) {
            Ok(args) => found = Some((http_method, args)),
            Err(err) => {
                error.get_or_insert(err);
            }
        }
        false
    });

    if let Some(err) = error {
        return Err(err);
    }
    let Some((http_method, args)) = found else {
        return Ok(None);
    };

    let sig = &method.sig;
    let name = sig.ident.clone();

    match sig.inputs.first() {
        Some(FnArg::Receiver(receiver))
            if receiver.reference.is_some() && receiver.mutability.is_none() => {}
        _ => {
            return Err(syn::Error::new_spanned(
                &sig.ident,
                format!("route method `{name}` must take `&self`"),
            ));
        }
    }

    let arity = sig.inputs.len() - 1;
    if arity > 3 {
        return Err(syn::Error::new_spanned(
            &sig.inputs,
            format!(
                "route method `{name}` takes too many parameters\n\
                 hint: route methods accept (Context, PathParams, Option<Body>) in that order"
            ),
        ));
    }

    let path = args
        .path
        .unwrap_or_else(|| LitStr::new("", Span::call_site()));
    validate_route_path(&path.value(), path.span())?;

    Ok(Some(RouteMethod {
        http_method,
        path,
        body: args.body,
        name,
        arity,
        is_async: sig.asyncness.is_some(),
    }))
}

/// `GET`, `POST`, ... if `attr` is a route attribute.
fn route_attribute(attr: &Attribute) -> Option<Ident> {
    let segment = attr.path().segments.last()?;
    let name = segment.ident.to_string();
    ROUTE_ATTRIBUTES
        .contains(&name.as_str())
        .then(|| format_ident!("{}", name.to_uppercase()))
}

fn parse_route_args(attr: &Attribute) -> syn::Result<RouteArgs> {
    match &attr.meta {
        Meta::Path(_) => Ok(RouteArgs::default()),
        _ => attr.parse_args_with(RouteArgs::parse),
    }
}

fn route_definition(route: &RouteMethod) -> TokenStream2 {
    let RouteMethod {
        http_method,
        path,
        name,
        ..
    } = route;
    let handler_name = name.to_string();

    let body = route.body.as_ref().map(|ty| quote! { .with_body::<#ty>() });

    quote! {
        ::girder::RouteDefinition::new(::girder::HttpMethod::#http_method, #path, #handler_name)
            #body
    }
}

fn bind_arm(route: &RouteMethod) -> TokenStream2 {
    let name = &route.name;
    let handler_name = name.to_string();

    let decode = match &route.body {
        Some(ty) if route.arity == 3 => quote! {
            let __body = ::girder::__private::downcast_body::<#ty>(__body)?;
        },
        _ => quote! {
            let _ = __body;
        },
    };

    let args = [
        quote! { __ctx },
        quote! { __params },
        match route.body {
            Some(_) => quote! { __body },
            None => quote! { ::std::option::Option::None },
        },
    ];
    let args = &args[..route.arity];

    let call = if route.is_async {
        quote! { this.#name(#(#args),*).await }
    } else {
        quote! { this.#name(#(#args),*) }
    };

    quote! {
        #handler_name => {
            let this = self;
            ::std::option::Option::Some(::girder::BoundMethod::new(
                #handler_name,
                move |__ctx, __params, __body| {
                    let this = ::std::sync::Arc::clone(&this);
                    ::girder::__private::FutureExt::boxed(async move {
                        #decode
                        let __reply = #call;
                        ::girder::IntoReply::into_reply(__reply)
                    })
                },
            ))
        }
    }
}
