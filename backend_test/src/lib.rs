use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::{format_ident, quote};
use syn::{parse_macro_input, spanned::Spanned, FnArg, Ident, ItemFn, Pat, Signature, Type};

/// Transform an asynchronous test into a synchronous one running on a
/// multi-threaded runtime, with logging enabled and dependencies injected.
///
/// The argument names the role whose routes the client talks to:
/// `auth`, `intermediary` or `backend`.
///
/// Injectable dependencies are [`rocket::local::asynchronous::Client`] and
/// `crate::testing::Services`, the in-memory services behind every role.
#[proc_macro_attribute]
pub fn backend_test(args: TokenStream, input: TokenStream) -> TokenStream {
    let mut item_fn = parse_macro_input!(input as ItemFn);
    let role = parse_macro_input!(args as Option<Ident>);

    let role = match role_variant(role) {
        Ok(role) => role,
        Err(err) => return err.into_compile_error().into(),
    };

    // Extract type information and reject invalid function signatures.
    let test_args = match check_sig(item_fn.sig.clone()) {
        Ok(args) => args,
        Err(err) => return err.into_compile_error().into(),
    };

    // Rename the future so the test can have its original name.
    let name = item_fn.sig.ident.clone();
    let new_name = format_ident!("{}_fut", name);
    item_fn.sig.ident = new_name.clone();

    quote! {
        #[test]
        fn #name() {
            /// The test itself.
            #item_fn

            crate::testing::init_logging();

            let runtime = rocket::tokio::runtime::Builder::new_multi_thread()
                .thread_name("rocket-worker-test-thread")
                .worker_threads(2)
                .enable_all()
                .build()
                .unwrap();

            runtime.block_on(async {
                let services = crate::testing::Services::new();
                let rocket_client = services.client(crate::config::Role::#role).await;
                #new_name(#(#test_args),*).await;
            });
        }
    }
    .into()
}

/// Map the attribute argument onto a `Role` variant.
fn role_variant(role: Option<Ident>) -> Result<Ident, syn::Error> {
    let Some(role) = role else {
        return Err(syn::Error::new(
            Span::call_site(),
            "Expected a role: `auth`, `intermediary` or `backend`",
        ));
    };
    let variant = match role.to_string().as_str() {
        "auth" => "Auth",
        "intermediary" => "Intermediary",
        "backend" => "Backend",
        _ => {
            return Err(syn::Error::new(
                role.span(),
                "Unknown role, expected `auth`, `intermediary` or `backend`",
            ))
        }
    };
    Ok(Ident::new(variant, role.span()))
}

/// Ensure the wrapped test is async, extract parameters to inject, and reject unknown parameters.
fn check_sig(sig: Signature) -> Result<Vec<TokenStream2>, syn::Error> {
    if sig.asyncness.is_none() {
        return Err(syn::Error::new(sig.span(), "Test must be marked `async`"));
    }

    let mut has_client = false;
    let mut has_services = false;
    let mut args = vec![];

    for input in &sig.inputs {
        if let FnArg::Typed(pat_type) = input {
            if let (Pat::Ident(_), Type::Path(type_path)) = (&*pat_type.pat, &*pat_type.ty) {
                if let Some(segment) = type_path.path.segments.last() {
                    if segment.ident == "Client" {
                        if has_client {
                            return Err(syn::Error::new(
                                input.span(),
                                "Test cannot accept more than one `rocket::local::asynchronous::Client`",
                            ));
                        }
                        has_client = true;
                        args.push(quote! { rocket_client });
                        continue;
                    } else if segment.ident == "Services" {
                        if has_services {
                            return Err(syn::Error::new(
                                input.span(),
                                "Test cannot accept more than one `Services`",
                            ));
                        }
                        has_services = true;
                        args.push(quote! { services });
                        continue;
                    }
                }
            }
        }

        return Err(syn::Error::new(
            input.span(),
            "Expected one of `client_ident: Client` or `services_ident: Services`",
        ));
    }

    Ok(args)
}
