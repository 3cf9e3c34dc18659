//! `#[receiver]`: declare relay receivers from ordinary functions.
//!
//! The attribute reads the function's parameter list at compile time and
//! generates the capability descriptor (`Signature`) plus the glue that
//! pulls each parameter out of the dispatch arguments by name.

use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::{format_ident, quote};
use syn::ext::IdentExt;
use syn::spanned::Spanned;
use syn::{
    FnArg, GenericArgument, Ident, ItemFn, Pat, PathArguments, PathSegment, ReturnType, Type,
    parse_macro_input,
};

/// Turns a function into a relay receiver.
///
/// On a free function, the item is replaced by a constructor with the same
/// name returning a `relay::Function`. Every call returns the same function,
/// so it can be passed to both `connect` and `disconnect`.
///
/// On a `&self` method inside an `impl` block, the method is kept and a
/// `<name>_receiver(this: &Tracked<Self>) -> relay::Method` constructor is
/// added next to it.
///
/// Parameter types decide how each argument is read:
///
/// - `T`: required, cloned out of the arguments
/// - `Option<T>`: optional
/// - `Value` / `Option<Value>`: untyped
/// - `&Args`: the full argument set; also makes the receiver accept any
///   named argument
///
/// The return type may be `()`, `Value`, `Outcome`, `Result<T, E>` with
/// `E: Into<BoxError>`, or any other `T: Any + Send + Sync`.
///
/// ```ignore
/// use relay::prelude::*;
///
/// #[receiver]
/// fn on_saved(path: String, size: Option<u64>) -> usize {
///     path.len() + size.unwrap_or(0) as usize
/// }
///
/// let registry = Registry::new();
/// registry.connect(on_saved(), "saved", ANY_SENDER)?;
/// ```
#[proc_macro_attribute]
pub fn receiver(attr: TokenStream, item: TokenStream) -> TokenStream {
    if !attr.is_empty() {
        let attr = TokenStream2::from(attr);
        return syn::Error::new(attr.span(), "#[receiver] takes no arguments")
            .to_compile_error()
            .into();
    }

    let input = parse_macro_input!(item as ItemFn);
    match expand(input) {
        Ok(tokens) => tokens.into(),
        Err(error) => error.to_compile_error().into(),
    }
}

enum ParamKind {
    Required(Type),
    Optional(Type),
    Value,
    OptionalValue,
    AllArgs,
}

struct Param {
    ident: Ident,
    name: String,
    kind: ParamKind,
}

enum ReturnKind {
    Unit,
    Value,
    Outcome,
    Result(Option<Type>),
    Other,
}

fn expand(input: ItemFn) -> syn::Result<TokenStream2> {
    let sig = &input.sig;
    if let Some(asyncness) = &sig.asyncness {
        return Err(syn::Error::new(
            asyncness.span(),
            "#[receiver] does not support async functions",
        ));
    }
    if !sig.generics.params.is_empty() || sig.generics.where_clause.is_some() {
        return Err(syn::Error::new(
            sig.generics.span(),
            "#[receiver] does not support generic functions",
        ));
    }
    if let Some(variadic) = &sig.variadic {
        return Err(syn::Error::new(variadic.span(), "#[receiver] does not support C variadics"));
    }

    let is_method = match sig.receiver() {
        None => false,
        Some(receiver)
            if receiver.reference.is_some()
                && receiver.mutability.is_none()
                && receiver.colon_token.is_none() =>
        {
            true
        }
        Some(receiver) => {
            return Err(syn::Error::new(
                receiver.span(),
                "#[receiver] methods must take `&self`",
            ));
        }
    };

    let params = parse_params(sig.inputs.iter().filter(|arg| matches!(arg, FnArg::Typed(_))))?;
    let returns = classify_return(&sig.output);

    if is_method {
        expand_method(&input, &params, &returns)
    } else {
        expand_function(&input, &params, &returns)
    }
}

fn parse_params<'a>(inputs: impl Iterator<Item = &'a FnArg>) -> syn::Result<Vec<Param>> {
    let mut params = Vec::new();
    let mut seen_all_args = false;

    for arg in inputs {
        let FnArg::Typed(typed) = arg else { continue };
        let Pat::Ident(pat) = &*typed.pat else {
            return Err(syn::Error::new(
                typed.pat.span(),
                "#[receiver] parameters must be plain identifiers",
            ));
        };
        if pat.by_ref.is_some() || pat.subpat.is_some() {
            return Err(syn::Error::new(
                pat.span(),
                "#[receiver] parameters must be plain identifiers",
            ));
        }

        let kind = classify_param(&typed.ty)?;
        if matches!(kind, ParamKind::AllArgs) {
            if seen_all_args {
                return Err(syn::Error::new(
                    typed.ty.span(),
                    "#[receiver] accepts at most one `&Args` parameter",
                ));
            }
            seen_all_args = true;
        }

        params.push(Param {
            ident: pat.ident.clone(),
            name: pat.ident.unraw().to_string(),
            kind,
        });
    }
    Ok(params)
}

fn last_segment(ty: &Type) -> Option<&PathSegment> {
    match ty {
        Type::Path(path) if path.qself.is_none() => path.path.segments.last(),
        Type::Group(group) => last_segment(&group.elem),
        Type::Paren(paren) => last_segment(&paren.elem),
        _ => None,
    }
}

fn generic_args(segment: &PathSegment) -> Vec<&Type> {
    match &segment.arguments {
        PathArguments::AngleBracketed(args) => args
            .args
            .iter()
            .filter_map(|arg| match arg {
                GenericArgument::Type(ty) => Some(ty),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn is_named(ty: &Type, name: &str) -> bool {
    last_segment(ty).is_some_and(|segment| {
        segment.ident == name && matches!(segment.arguments, PathArguments::None)
    })
}

fn classify_param(ty: &Type) -> syn::Result<ParamKind> {
    if let Type::Reference(reference) = ty {
        if reference.mutability.is_none() && is_named(&reference.elem, "Args") {
            return Ok(ParamKind::AllArgs);
        }
        return Err(syn::Error::new(
            ty.span(),
            "#[receiver] parameters must be owned values or `&Args`",
        ));
    }

    if is_named(ty, "Value") {
        return Ok(ParamKind::Value);
    }
    if let Some(segment) = last_segment(ty)
        && segment.ident == "Option"
        && let [inner] = generic_args(segment).as_slice()
    {
        if is_named(inner, "Value") {
            return Ok(ParamKind::OptionalValue);
        }
        return Ok(ParamKind::Optional((*inner).clone()));
    }
    Ok(ParamKind::Required(ty.clone()))
}

fn classify_return(output: &ReturnType) -> ReturnKind {
    let ReturnType::Type(_, ty) = output else {
        return ReturnKind::Unit;
    };
    if let Type::Tuple(tuple) = &**ty
        && tuple.elems.is_empty()
    {
        return ReturnKind::Unit;
    }
    if is_named(ty, "Value") {
        return ReturnKind::Value;
    }
    if is_named(ty, "Outcome") {
        return ReturnKind::Outcome;
    }
    if let Some(segment) = last_segment(ty)
        && segment.ident == "Result"
    {
        let ok = generic_args(segment).first().map(|ok| (*ok).clone());
        return ReturnKind::Result(ok);
    }
    ReturnKind::Other
}

/// Statements binding each parameter from `__args`, and the call arguments.
fn bindings(params: &[Param]) -> (Vec<TokenStream2>, Vec<TokenStream2>) {
    let mut lets = Vec::new();
    let mut call_args = Vec::new();

    for param in params {
        let ident = &param.ident;
        let name = &param.name;
        let binding = match &param.kind {
            ParamKind::Required(ty) => quote! {
                let #ident: #ty = __args.get::<#ty>(#name)?;
            },
            ParamKind::Optional(ty) => quote! {
                let #ident: ::core::option::Option<#ty> = __args.get_opt::<#ty>(#name)?;
            },
            ParamKind::Value => quote! {
                let #ident: ::relay::Value = ::core::clone::Clone::clone(__args.value(#name)?);
            },
            ParamKind::OptionalValue => quote! {
                let #ident: ::core::option::Option<::relay::Value> =
                    __args.get_named(#name).cloned();
            },
            ParamKind::AllArgs => quote! {
                let #ident: &::relay::Args = __args;
            },
        };
        lets.push(binding);
        call_args.push(quote! { #ident });
    }
    (lets, call_args)
}

fn signature_tokens(params: &[Param]) -> TokenStream2 {
    let names: Vec<&str> = params
        .iter()
        .filter(|param| !matches!(param.kind, ParamKind::AllArgs))
        .map(|param| param.name.as_str())
        .collect();
    let variadic = params
        .iter()
        .any(|param| matches!(param.kind, ParamKind::AllArgs));

    if variadic {
        quote! { ::relay::Signature::from_static(&[#(#names),*]).with_variadic_named() }
    } else {
        quote! { ::relay::Signature::from_static(&[#(#names),*]) }
    }
}

fn convert_output(returns: &ReturnKind, call: TokenStream2) -> TokenStream2 {
    match returns {
        ReturnKind::Unit => quote! {
            #call;
            ::core::result::Result::Ok(::relay::Value::unit())
        },
        ReturnKind::Value => quote! {
            ::core::result::Result::Ok(#call)
        },
        ReturnKind::Outcome => quote! { #call },
        ReturnKind::Result(ok) => {
            let wrap = match ok {
                Some(ok) if is_named(ok, "Value") => quote! { __value },
                _ => quote! { ::relay::Value::new(__value) },
            };
            quote! {
                match #call {
                    ::core::result::Result::Ok(__value) => ::core::result::Result::Ok(#wrap),
                    ::core::result::Result::Err(__error) => {
                        ::core::result::Result::Err(::relay::ReceiverError::failed(__error))
                    }
                }
            }
        }
        ReturnKind::Other => quote! {
            ::core::result::Result::Ok(::relay::Value::new(#call))
        },
    }
}

fn expand_function(
    input: &ItemFn,
    params: &[Param],
    returns: &ReturnKind,
) -> syn::Result<TokenStream2> {
    let ItemFn {
        attrs, vis, sig, block,
    } = input;
    let name = &sig.ident;
    let display_name = name.unraw().to_string();
    let inputs = &sig.inputs;
    let output = &sig.output;

    let (lets, call_args) = bindings(params);
    let signature = signature_tokens(params);
    let body = convert_output(returns, quote! { __relay_body(#(#call_args),*) });

    Ok(quote! {
        #(#attrs)*
        #vis fn #name() -> ::relay::Function {
            fn __relay_body(#inputs) #output #block

            static __RELAY_FUNCTION: ::std::sync::OnceLock<::relay::Function> =
                ::std::sync::OnceLock::new();

            ::core::clone::Clone::clone(__RELAY_FUNCTION.get_or_init(|| {
                ::relay::Function::new(
                    #display_name,
                    #signature,
                    |__args: &::relay::Args| -> ::relay::Outcome {
                        #(#lets)*
                        #body
                    },
                )
            }))
        }
    })
}

fn expand_method(
    input: &ItemFn,
    params: &[Param],
    returns: &ReturnKind,
) -> syn::Result<TokenStream2> {
    let ItemFn { vis, sig, .. } = input;
    let name = &sig.ident;
    let display_name = name.unraw().to_string();
    let thunk = format_ident!("__relay_{}", name.unraw());
    let constructor = Ident::new(&format!("{}_receiver", name.unraw()), Span::call_site());

    let (lets, call_args) = bindings(params);
    let signature = signature_tokens(params);
    let body = convert_output(returns, quote! { Self::#name(self, #(#call_args),*) });
    let doc = format!("Receiver for [`Self::{display_name}`] bound to `this`.");

    Ok(quote! {
        #input

        #[doc(hidden)]
        fn #thunk(&self, __args: &::relay::Args) -> ::relay::Outcome {
            #(#lets)*
            #body
        }

        #[doc = #doc]
        #vis fn #constructor(this: &::relay::Tracked<Self>) -> ::relay::Method {
            ::relay::Method::new(this, #display_name, Self::#thunk, #signature)
        }
    })
}
