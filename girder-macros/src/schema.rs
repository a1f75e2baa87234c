use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{
    Attribute, Data, DeriveInput, Fields, GenericArgument, LitStr, PathArguments, Type,
    parse_macro_input,
};

#[derive(Clone, Copy)]
pub enum ModelKind {
    Object,
    Input,
}

impl ModelKind {
    fn attribute(self) -> &'static str {
        match self {
            ModelKind::Object => "object_type",
            ModelKind::Input => "input_type",
        }
    }
}

#[derive(Default)]
struct ModelArgs {
    name: Option<LitStr>,
    description: Option<LitStr>,
}

#[derive(Default)]
struct FieldArgs {
    description: Option<LitStr>,
    ty: Option<LitStr>,
    optional: Option<bool>,
    skip: bool,
}

const FIELD_TYPES: [&str; 6] = ["string", "integer", "number", "boolean", "array", "object"];

pub fn derive_schema(input: TokenStream, kind: ModelKind) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(&input, kind) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand(input: &DeriveInput, kind: ModelKind) -> syn::Result<TokenStream2> {
    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new_spanned(
            &input.ident,
            format!("#[derive] of a schema model is only supported on structs (`{}`)", input.ident),
        ));
    };

    let model = parse_model_args(&input.attrs, kind)?;
    let name = model
        .name
        .map(|lit| lit.value())
        .unwrap_or_else(|| input.ident.to_string());
    let description = model.description.map(|lit| lit.value()).unwrap_or_default();

    let fields = match &data.fields {
        Fields::Named(named) => named.named.iter().collect::<Vec<_>>(),
        Fields::Unit => Vec::new(),
        Fields::Unnamed(_) => {
            return Err(syn::Error::new_spanned(
                &input.ident,
                "schema models need named fields",
            ));
        }
    };

    let mut entries = Vec::new();
    for field in fields {
        let args = parse_field_args(&field.attrs)?;
        if args.skip {
            continue;
        }

        let Some(ident) = &field.ident else { continue };
        let field_name = ident.to_string();
        let (inferred, is_option) = infer_field_type(&field.ty);

        let field_type = match &args.ty {
            Some(lit) => {
                let value = lit.value();
                if !FIELD_TYPES.contains(&value.as_str()) {
                    return Err(syn::Error::new(
                        lit.span(),
                        format!(
                            "unknown field type \"{value}\"\n\
                             hint: expected one of string, integer, number, boolean, array, object"
                        ),
                    ));
                }
                value
            }
            None => inferred.to_string(),
        };
        let variant = field_type_variant(&field_type);
        let optional = args.optional.unwrap_or(is_option);
        let field_description = args.description.map(|lit| lit.value()).unwrap_or_default();

        entries.push(quote! {
            .field(
                ::girder::FieldSchema::new(#field_name, ::girder::FieldType::#variant)
                    .description(#field_description)
                    .optional(#optional)
            )
        });
    }

    let struct_name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let (trait_name, constructor) = match kind {
        ModelKind::Object => (quote! { ObjectType }, quote! { object }),
        ModelKind::Input => (quote! { InputType }, quote! { input }),
    };

    Ok(quote! {
        impl #impl_generics ::girder::#trait_name for #struct_name #ty_generics #where_clause {
            fn schema() -> ::girder::TypeSchema {
                ::girder::TypeSchema::#constructor(#name, #description)
                    #(#entries)*
            }
        }
    })
}

fn parse_model_args(attrs: &[Attribute], kind: ModelKind) -> syn::Result<ModelArgs> {
    let mut args = ModelArgs::default();
    for attr in attrs.iter().filter(|a| a.path().is_ident(kind.attribute())) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                args.name = Some(meta.value()?.parse()?);
            } else if meta.path.is_ident("description") {
                args.description = Some(meta.value()?.parse()?);
            } else {
                return Err(meta.error("unknown option; expected `name` or `description`"));
            }
            Ok(())
        })?;
    }
    Ok(args)
}

fn parse_field_args(attrs: &[Attribute]) -> syn::Result<FieldArgs> {
    let mut args = FieldArgs::default();
    for attr in attrs.iter().filter(|a| a.path().is_ident("field")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("description") {
                args.description = Some(meta.value()?.parse()?);
            } else if meta.path.is_ident("ty") {
                args.ty = Some(meta.value()?.parse()?);
            } else if meta.path.is_ident("optional") {
                let value: syn::LitBool = meta.value()?.parse()?;
                args.optional = Some(value.value);
            } else if meta.path.is_ident("skip") {
                args.skip = true;
            } else {
                return Err(meta.error(
                    "unknown field option; expected `description`, `ty`, `optional` or `skip`",
                ));
            }
            Ok(())
        })?;
    }
    Ok(args)
}

/// Field category from the Rust type; `Option<T>` is optional `T`.
fn infer_field_type(ty: &Type) -> (&'static str, bool) {
    match ty {
        Type::Reference(reference) => infer_field_type(&reference.elem),
        Type::Array(_) | Type::Slice(_) | Type::Tuple(_) => ("array", false),
        Type::Path(path) => {
            let Some(segment) = path.path.segments.last() else {
                return ("object", false);
            };
            let ident = segment.ident.to_string();

            if ident == "Option" {
                let inner = match &segment.arguments {
                    PathArguments::AngleBracketed(args) => args.args.first(),
                    _ => None,
                };
                return match inner {
                    Some(GenericArgument::Type(inner)) => (infer_field_type(inner).0, true),
                    _ => ("object", true),
                };
            }

            let category = match ident.as_str() {
                "String" | "str" | "char" | "Uuid" | "PathBuf" => "string",
                "i8" | "i16" | "i32" | "i64" | "i128" | "isize" | "u8" | "u16" | "u32" | "u64"
                | "u128" | "usize" => "integer",
                "f32" | "f64" => "number",
                "bool" => "boolean",
                "Vec" | "VecDeque" | "HashSet" | "BTreeSet" => "array",
                "Box" | "Arc" | "Rc" | "Cow" => match &segment.arguments {
                    PathArguments::AngleBracketed(args) => match args.args.last() {
                        Some(GenericArgument::Type(inner)) => infer_field_type(inner).0,
                        _ => "object",
                    },
                    _ => "object",
                },
                _ => "object",
            };
            (category, false)
        }
        _ => ("object", false),
    }
}

fn field_type_variant(name: &str) -> proc_macro2::Ident {
    let variant = match name {
        "string" => "String",
        "integer" => "Integer",
        "number" => "Number",
        "boolean" => "Boolean",
        "array" => "Array",
        _ => "Object",
    };
    proc_macro2::Ident::new(variant, proc_macro2::Span::call_site())
}
