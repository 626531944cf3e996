// This software is licensed under a dual license model:
//
// GNU Affero General Public License v3 (AGPLv3): You may use, modify, and
// distribute this software under the terms of the AGPLv3.
//
// Elastic License v2 (ELv2): You may also use, modify, and distribute this
// software under the Elastic License v2, which has specific restrictions.
//
// We welcome any commercial collaboration or support. For inquiries
// regarding the licenses, please contact us at:
// vectorchord-inquiry@tensorchord.ai
//
// Copyright (c) 2025 TensorChord Inc.

mod target;

use proc_macro2::{Span, TokenStream};
use quote::quote;
use target::TargetCpu;

/// One entry of `#[multiversion(...)]`.
///
/// `"v3"` asks the macro to compile the function body once more for `v3`.
/// `@"v3"` refers to a hand-written `{name}_v3` next to the function.
/// Extra target features follow the cpu name, separated by colons: `"v2:fma"`.
struct Version {
    target: String,
    import: bool,
}

impl syn::parse::Parse for Version {
    fn parse(input: syn::parse::ParseStream) -> syn::Result<Self> {
        let import = if input.peek(syn::Token![@]) {
            let _: syn::Token![@] = input.parse()?;
            true
        } else {
            false
        };
        let target: syn::LitStr = input.parse()?;
        Ok(Self {
            target: target.value(),
            import,
        })
    }
}

impl Version {
    fn ident(&self, name: &syn::Ident) -> syn::Ident {
        let suffix = self.target.replace([':', '.'], "_");
        syn::Ident::new(&format!("{name}_{suffix}"), Span::mixed_site())
    }

    fn split(&self) -> (&'static TargetCpu, Vec<&str>) {
        let mut parts = self.target.split(':');
        let cpu = TargetCpu::lookup(parts.next().unwrap_or_default());
        (cpu, parts.collect())
    }
}

struct Versions(syn::punctuated::Punctuated<Version, syn::Token![,]>);

impl syn::parse::Parse for Versions {
    fn parse(input: syn::parse::ParseStream) -> syn::Result<Self> {
        Ok(Self(syn::punctuated::Punctuated::parse_terminated(input)?))
    }
}

fn check_signature(sig: &syn::Signature) -> syn::Result<Vec<syn::Ident>> {
    let unsupported =
        |what: &str| Err(syn::Error::new_spanned(sig, format!("{what} are not supported")));
    if sig.constness.is_some() {
        return unsupported("const functions");
    }
    if sig.asyncness.is_some() {
        return unsupported("async functions");
    }
    if sig.variadic.is_some() {
        return unsupported("variadic parameters");
    }
    if sig
        .generics
        .params
        .iter()
        .any(|param| !matches!(param, syn::GenericParam::Lifetime(_)))
    {
        return unsupported("type and const generic parameters");
    }
    let mut arguments = Vec::new();
    for input in sig.inputs.iter() {
        let syn::FnArg::Typed(typed) = input else {
            return unsupported("receiver parameters");
        };
        let syn::Pat::Ident(pat) = typed.pat.as_ref() else {
            return unsupported("patterns on parameters");
        };
        arguments.push(pat.ident.clone());
    }
    Ok(arguments)
}

/// Compiles a function for several target cpus and dispatches at runtime.
///
/// The first call probes the cpu in the listed order and caches the chosen
/// function pointer; later calls jump through the cache. The undecorated body
/// is kept as `fallback` for cpus matching none of the versions.
#[proc_macro_attribute]
pub fn multiversion(
    attr: proc_macro::TokenStream,
    item: proc_macro::TokenStream,
) -> proc_macro::TokenStream {
    let versions = syn::parse_macro_input!(attr as Versions);
    let item_fn = syn::parse_macro_input!(item as syn::ItemFn);
    let syn::ItemFn {
        attrs,
        vis,
        sig,
        block,
    } = item_fn;
    let arguments = match check_signature(&sig) {
        Ok(arguments) => arguments,
        Err(e) => return e.to_compile_error().into(),
    };
    let generics_params = &sig.generics.params;
    let generics_where = &sig.generics.where_clause;
    let inputs = &sig.inputs;
    let output = &sig.output;
    let mut specialized = TokenStream::new();
    let mut branches = TokenStream::new();
    for version in versions.0.iter() {
        let ident = version.ident(&sig.ident);
        let (cpu, extra_features) = version.split();
        let target_arch = cpu.target_arch;
        let target_cpu = cpu.target_cpu;
        if !version.import {
            specialized.extend(quote! {
                #[inline]
                #[cfg(target_arch = #target_arch)]
                #[crate::target_cpu(enable = #target_cpu)]
                #(#[target_feature(enable = #extra_features)])*
                fn #ident < #generics_params > (#inputs) #output #generics_where #block
            });
        }
        branches.extend(quote! {
            #[cfg(target_arch = #target_arch)]
            if crate::is_cpu_detected!(#target_cpu) #(&& crate::is_feature_detected!(#extra_features))* {
                let selected: unsafe fn(#inputs) #output = #ident;
                CACHE.store(selected as *mut (), core::sync::atomic::Ordering::Relaxed);
                return unsafe { selected(#(#arguments,)*) };
            }
        });
    }
    quote! {
        #specialized
        fn fallback < #generics_params > (#inputs) #output #generics_where #block
        #[inline(always)]
        #(#attrs)* #vis #sig {
            static CACHE: core::sync::atomic::AtomicPtr<()> = core::sync::atomic::AtomicPtr::new(core::ptr::null_mut());
            let cached = CACHE.load(core::sync::atomic::Ordering::Relaxed);
            if !cached.is_null() {
                let f = unsafe { core::mem::transmute::<*mut (), unsafe fn(#inputs) #output>(cached) };
                return unsafe { f(#(#arguments,)*) };
            }
            #branches
            let selected: unsafe fn(#inputs) #output = fallback;
            CACHE.store(selected as *mut (), core::sync::atomic::Ordering::Relaxed);
            unsafe { selected(#(#arguments,)*) }
        }
    }
    .into()
}

struct Enable(String);

impl syn::parse::Parse for Enable {
    fn parse(input: syn::parse::ParseStream) -> syn::Result<Self> {
        let key: syn::Ident = input.parse()?;
        if key != "enable" {
            return Err(syn::Error::new(key.span(), "expected `enable`"));
        }
        let _: syn::Token![=] = input.parse()?;
        let value: syn::LitStr = input.parse()?;
        Ok(Self(value.value()))
    }
}

/// Expands `#[target_cpu(enable = "v3")]` into the cpu's target features.
#[proc_macro_attribute]
pub fn target_cpu(
    attr: proc_macro::TokenStream,
    item: proc_macro::TokenStream,
) -> proc_macro::TokenStream {
    let Enable(enable) = syn::parse_macro_input!(attr as Enable);
    let mut result = TokenStream::new();
    for name in enable.split(',') {
        let target_features = TargetCpu::lookup(name).target_features;
        result.extend(quote! {
            #(#[target_feature(enable = #target_features)])*
        });
    }
    result.extend(TokenStream::from(item));
    result.into()
}

/// Defines `is_{arch}_cpu_detected!("cpu")`, forwarding to
/// `$crate::internal::is_{cpu}_detected()`.
#[proc_macro]
pub fn define_is_cpu_detected(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let target_arch = syn::parse_macro_input!(input as syn::LitStr).value();
    let arms = TargetCpu::of_arch(&target_arch).map(|cpu| {
        let target_cpu = cpu.target_cpu;
        let probe = syn::Ident::new(
            &format!("is_{}_detected", target_cpu.replace('.', "_")),
            Span::mixed_site(),
        );
        quote! {
            (#target_cpu) => { $crate::internal::#probe() };
        }
    });
    let ident = syn::Ident::new(
        &format!("is_{target_arch}_cpu_detected"),
        Span::mixed_site(),
    );
    quote! {
        #[macro_export]
        macro_rules! #ident {
            #(#arms)*
        }
    }
    .into()
}
