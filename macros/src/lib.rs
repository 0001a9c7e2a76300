//! Augment the development of conduit primitives with procedural macros.

use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::quote;
use syn::{parse_macro_input, Ident, ItemFn, LitStr};

/// Log levels accepted by [`macro@test_traced`].
const LEVELS: [&str; 5] = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR"];

/// Run a test function with a [`tracing`](https://docs.rs/tracing) subscriber that writes to
/// the test harness (captured unless `--nocapture` is passed).
///
/// The optional argument selects the maximum log level (defaults to `DEBUG`).
///
/// The crate using this attribute must depend on `tracing` and `tracing-subscriber`.
///
/// # Example
///
/// ```ignore
/// use conduit_macros::test_traced;
///
/// #[test_traced("TRACE")]
/// fn test_with_logs() {
///     tracing::trace!("visible");
/// }
/// ```
#[proc_macro_attribute]
pub fn test_traced(attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as ItemFn);

    // Parse the (optional) level
    let level = if attr.is_empty() {
        "DEBUG".to_string()
    } else {
        let literal = parse_macro_input!(attr as LitStr);
        let value = literal.value().to_uppercase();
        if !LEVELS.contains(&value.as_str()) {
            return syn::Error::new(
                literal.span(),
                format!("unknown level `{}`; expected one of {:?}", value, LEVELS),
            )
            .to_compile_error()
            .into();
        }
        value
    };
    let level = Ident::new(&level, Span::call_site());

    let attrs = &input.attrs;
    let vis = &input.vis;
    let sig = &input.sig;
    let block = &input.block;

    let expanded = quote! {
        #[test]
        #(#attrs)*
        #vis #sig {
            let subscriber = ::tracing_subscriber::fmt()
                .with_test_writer()
                .with_max_level(::tracing::Level::#level)
                .with_line_number(true)
                .finish();
            let dispatcher = ::tracing::Dispatch::new(subscriber);
            ::tracing::dispatcher::with_default(&dispatcher, || #block)
        }
    };
    TokenStream::from(expanded)
}
