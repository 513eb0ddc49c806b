//! Procedural macros for testkit-dispatch
//!
//! This crate provides the `#[testkit_dispatch::test]` attribute macro, which
//! runs an async test body to completion on a fresh single-threaded executor.
//!
//! # Example
//!
//! ```rust,ignore
//! use testkit_dispatch::prelude::*;
//!
//! #[testkit_dispatch::test(timeout_ms = 500)]
//! async fn my_test(executor: ExecutorHandle) {
//!     executor.post_fn(|| println!("runs on the test thread")).unwrap();
//! }
//! ```

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{
    parse::{Parse, ParseStream},
    parse_macro_input, FnArg, Ident, ItemFn, Lit, Pat, Token, Type,
};

/// Matches `DEFAULT_SHUTDOWN_TIMEOUT` in the main crate.
const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Configuration options for the test macro.
#[derive(Default)]
struct TestConfig {
    /// Shutdown timeout in milliseconds
    timeout_ms: Option<u64>,
    /// "drain" (default) or "linger"
    idle: Option<String>,
    /// Executor name shown in logs; defaults to the test name
    name: Option<String>,
}

impl Parse for TestConfig {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let mut config = TestConfig::default();

        while !input.is_empty() {
            let ident: Ident = input.parse()?;
            input.parse::<Token![=]>()?;
            let lit: Lit = input.parse()?;

            match (ident.to_string().as_str(), lit) {
                ("timeout_ms", Lit::Int(i)) => config.timeout_ms = Some(i.base10_parse()?),
                ("idle", Lit::Str(s)) => config.idle = Some(s.value()),
                ("name", Lit::Str(s)) => config.name = Some(s.value()),
                ("timeout_ms" | "idle" | "name", lit) => {
                    return Err(syn::Error::new_spanned(
                        lit,
                        format!("unexpected value for `{ident}`"),
                    ));
                }
                _ => {
                    return Err(syn::Error::new(
                        ident.span(),
                        format!("unknown attribute: {ident}"),
                    ));
                }
            }

            if input.peek(Token![,]) {
                input.parse::<Token![,]>()?;
            }
        }

        Ok(config)
    }
}

/// Determines if a function parameter is requesting an `ExecutorHandle`.
fn is_handle_param(arg: &FnArg) -> bool {
    if let FnArg::Typed(pat_type) = arg {
        if let Type::Path(type_path) = &*pat_type.ty {
            if let Some(segment) = type_path.path.segments.last() {
                return segment.ident == "ExecutorHandle";
            }
        }
    }
    false
}

fn param_pattern(arg: &FnArg) -> Option<&Pat> {
    if let FnArg::Typed(pat_type) = arg {
        Some(&pat_type.pat)
    } else {
        None
    }
}

/// Runs an async test on a single-threaded executor.
///
/// The test body is driven by `SingleThreadedExecutor::block_on` on the test
/// thread. Any executor failure, such as the shutdown deadline expiring,
/// fails the test.
///
/// # Handle Injection
///
/// Add an `ExecutorHandle` parameter to receive the executor running the
/// test:
///
/// ```rust,ignore
/// #[testkit_dispatch::test]
/// async fn posts_work(executor: ExecutorHandle) {
///     executor.post_fn(|| {}).unwrap();
/// }
/// ```
///
/// # Configuration Options
///
/// - `timeout_ms = 500` - shutdown timeout (default: 10 seconds)
/// - `idle = "drain"` or `idle = "linger"` - idle policy after the body
///   completes (default: `"drain"`)
/// - `name = "fixture"` - executor name used in logs (default: the test name)
#[proc_macro_attribute]
pub fn test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let config = parse_macro_input!(attr as TestConfig);
    let input = parse_macro_input!(item as ItemFn);

    expand_test(config, input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn expand_test(config: TestConfig, input: ItemFn) -> syn::Result<TokenStream2> {
    let name = &input.sig.ident;
    let output = &input.sig.output;
    let body = &input.block;
    let attrs = &input.attrs;
    let vis = &input.vis;

    if input.sig.asyncness.is_none() {
        return Err(syn::Error::new_spanned(
            &input.sig,
            "test function must be async",
        ));
    }

    let mut handle_name = None;
    for arg in &input.sig.inputs {
        match param_pattern(arg) {
            Some(pat) if is_handle_param(arg) && handle_name.is_none() => handle_name = Some(pat),
            _ => {
                return Err(syn::Error::new_spanned(
                    arg,
                    "only a single `ExecutorHandle` parameter is supported",
                ));
            }
        }
    }

    let idle_policy = match config.idle.as_deref().unwrap_or("drain") {
        "drain" => quote! { ::testkit_dispatch::executor::IdlePolicy::StopWhenDrained },
        "linger" => quote! { ::testkit_dispatch::executor::IdlePolicy::LingerUntilDeadline },
        other => {
            return Err(syn::Error::new(
                proc_macro2::Span::call_site(),
                format!("unsupported idle policy: {other}. Use \"drain\" or \"linger\""),
            ));
        }
    };
    let timeout_ms = config.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS);
    let executor_name = config.name.unwrap_or_else(|| name.to_string());

    let handle_init = handle_name.map(|pat| {
        quote! {
            let #pat: ::testkit_dispatch::executor::ExecutorHandle = __testkit_executor.handle();
        }
    });

    Ok(quote! {
        #[::core::prelude::v1::test]
        #(#attrs)*
        #vis fn #name() #output {
            let __testkit_executor = ::testkit_dispatch::executor::SingleThreadedExecutor::builder()
                .shutdown_timeout(::std::time::Duration::from_millis(#timeout_ms))
                .idle_policy(#idle_policy)
                .name(#executor_name)
                .build();
            #handle_init
            match __testkit_executor.block_on(async move #body) {
                ::core::result::Result::Ok(output) => output,
                ::core::result::Result::Err(error) => {
                    ::core::panic!("single-threaded executor failed: {}", error)
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::{expand_test, TestConfig};

    #[::core::prelude::v1::test]
    fn test_config_parse_empty() {
        let config: TestConfig = syn::parse_str("").unwrap();
        assert!(config.timeout_ms.is_none());
        assert!(config.idle.is_none());
        assert!(config.name.is_none());
    }

    #[::core::prelude::v1::test]
    fn test_config_parse_multiple() {
        let config: TestConfig =
            syn::parse_str("timeout_ms = 250, idle = \"linger\", name = \"fixture\"").unwrap();
        assert_eq!(config.timeout_ms, Some(250));
        assert_eq!(config.idle.as_deref(), Some("linger"));
        assert_eq!(config.name.as_deref(), Some("fixture"));
    }

    #[::core::prelude::v1::test]
    fn test_config_rejects_unknown_key() {
        assert!(syn::parse_str::<TestConfig>("flavor = \"multi_thread\"").is_err());
    }

    #[::core::prelude::v1::test]
    fn test_config_rejects_wrong_literal() {
        assert!(syn::parse_str::<TestConfig>("timeout_ms = \"fast\"").is_err());
    }

    #[::core::prelude::v1::test]
    fn test_expand_requires_async() {
        let item = syn::parse_str("fn not_async() {}").unwrap();
        assert!(expand_test(TestConfig::default(), item).is_err());
    }

    #[::core::prelude::v1::test]
    fn test_expand_rejects_other_params() {
        let item = syn::parse_str("async fn takes_int(value: u32) {}").unwrap();
        assert!(expand_test(TestConfig::default(), item).is_err());
    }

    #[::core::prelude::v1::test]
    fn test_expand_injects_handle() {
        let item = syn::parse_str("async fn with_handle(executor: ExecutorHandle) {}").unwrap();
        let tokens = expand_test(TestConfig::default(), item).unwrap().to_string();
        assert!(tokens.contains("block_on"));
        assert!(tokens.contains("StopWhenDrained"));
        assert!(tokens.contains("let executor"));
    }
}
