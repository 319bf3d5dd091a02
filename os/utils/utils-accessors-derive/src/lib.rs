//! # Accessor Derive
//!
//! Generates `const` accessors for plain configuration structs so that values
//! like the kernel memory layout can be read and tweaked in `const` context.

use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::{Data, DeriveInput, Fields, LitBool, parse_macro_input, spanned::Spanned};

/// Derive `const fn <field>(&self) -> Ty` and
/// `const fn with_<field>(self, value: Ty) -> Self` for each **named** field.
///
/// Field types must be `Copy`. Skip a field with `#[accessors(skip)]`; skip
/// just the builder with `#[accessors(readonly)]`.
///
/// # Example
///
/// ```
/// use utils_accessors_derive::Accessors;
///
/// #[derive(Clone, Copy, Accessors)]
/// struct Window {
///     start: u32,
///     #[accessors(readonly)]
///     len: u32,
///     #[accessors(skip)]
///     _reserved: u8,
/// }
///
/// const W: Window = Window { start: 0x1000, len: 0x100, _reserved: 0 }.with_start(0x2000);
/// assert_eq!(W.start(), 0x2000);
/// assert_eq!(W.len(), 0x100);
/// ```
#[proc_macro_derive(Accessors, attributes(accessors))]
pub fn derive_accessors(input: TokenStream) -> TokenStream {
    let DeriveInput {
        ident,
        generics,
        data,
        ..
    } = parse_macro_input!(input as DeriveInput);

    let fields = match data {
        Data::Struct(s) => match s.fields {
            Fields::Named(n) => n.named,
            Fields::Unnamed(u) => {
                return syn::Error::new(u.span(), "Accessors only supports named fields")
                    .to_compile_error()
                    .into();
            }
            Fields::Unit => {
                return syn::Error::new(ident.span(), "Accessors does not apply to unit structs")
                    .to_compile_error()
                    .into();
            }
        },
        _ => {
            return syn::Error::new(ident.span(), "Accessors can only be derived for structs")
                .to_compile_error()
                .into();
        }
    };

    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let mut methods = Vec::new();

    for field in fields {
        let Some(fname) = &field.ident else { continue };
        let mode = field_mode(&field.attrs);
        if mode == Mode::Skip {
            continue;
        }

        let ty = &field.ty;
        let docs = field.attrs.iter().filter(|a| a.path().is_ident("doc"));

        methods.push(quote! {
            #(#docs)*
            #[inline]
            #[must_use]
            pub const fn #fname(&self) -> #ty {
                self.#fname
            }
        });

        if mode == Mode::ReadWrite {
            let with_name = format_ident!("with_{}", fname);
            methods.push(quote! {
                #[inline]
                #[must_use]
                pub const fn #with_name(mut self, value: #ty) -> Self {
                    self.#fname = value;
                    self
                }
            });
        }
    }

    let expanded = quote! {
        impl #impl_generics #ident #ty_generics #where_clause {
            #(#methods)*
        }
    };

    TokenStream::from(expanded)
}

#[derive(Copy, Clone, Eq, PartialEq)]
enum Mode {
    ReadWrite,
    ReadOnly,
    Skip,
}

/// Accepts `#[accessors(skip)]`, `#[accessors(skip = true)]` and `#[accessors(readonly)]`.
fn field_mode(attrs: &[syn::Attribute]) -> Mode {
    let mut mode = Mode::ReadWrite;
    for attr in attrs {
        if !attr.path().is_ident("accessors") {
            continue;
        }

        let _ = attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("skip") {
                if meta.input.is_empty() {
                    mode = Mode::Skip;
                } else if let Ok(v) = meta.value()?.parse::<LitBool>()
                    && v.value
                {
                    mode = Mode::Skip;
                }
            } else if meta.path.is_ident("readonly") && mode != Mode::Skip {
                mode = Mode::ReadOnly;
            }
            Ok(())
        });
    }
    mode
}
