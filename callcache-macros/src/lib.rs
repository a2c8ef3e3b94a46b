use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::{format_ident, quote};
use syn::{parse_macro_input, FnArg, ItemFn};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Declared {
    Default,
    ClassMethod,
}

fn parse_declared(attr: TokenStream) -> syn::Result<Declared> {
    if attr.is_empty() {
        return Ok(Declared::Default);
    }
    let ident: syn::Ident = syn::parse(attr)?;
    if ident == "classmethod" {
        Ok(Declared::ClassMethod)
    } else {
        Err(syn::Error::new(
            ident.span(),
            "expected `classmethod` or no argument",
        ))
    }
}

/// Emits `<name>_identity()` returning the `CallableIdentity` of the
/// annotated function. See `callcache::cache_identity`.
#[proc_macro_attribute]
pub fn cache_identity(attr: TokenStream, item: TokenStream) -> TokenStream {
    let declared = match parse_declared(attr) {
        Ok(declared) => declared,
        Err(e) => return e.to_compile_error().into(),
    };

    let input_fn = parse_macro_input!(item as ItemFn);

    let vis = &input_fn.vis;
    let fn_name = &input_fn.sig.ident;
    let name_str = fn_name.to_string();
    let identity_fn = format_ident!("{}_identity", fn_name);

    let has_receiver = input_fn
        .sig
        .inputs
        .iter()
        .any(|arg| matches!(arg, FnArg::Receiver(_)));

    let constructor = match (has_receiver, declared) {
        (true, Declared::ClassMethod) => {
            return syn::Error::new(
                Span::call_site(),
                "`classmethod` functions cannot take `self`",
            )
            .to_compile_error()
            .into();
        }
        (true, Declared::Default) => quote! {
            ::callcache::CallableIdentity::method(::core::any::type_name::<Self>(), #name_str)
        },
        (false, Declared::ClassMethod) => quote! {
            ::callcache::CallableIdentity::class_method(::core::any::type_name::<Self>(), #name_str)
        },
        (false, Declared::Default) => quote! {
            ::callcache::CallableIdentity::function(::core::module_path!(), #name_str)
        },
    };

    let doc = format!("Cache identity of `{}`.", name_str);

    let expanded = quote! {
        #input_fn

        #[doc = #doc]
        #[allow(dead_code)]
        #vis fn #identity_fn() -> ::callcache::Result<::callcache::CallableIdentity> {
            #constructor
        }
    };

    expanded.into()
}
