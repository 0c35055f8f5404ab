use proc_macro::TokenStream;
use proc_macro2::{Ident, Span, TokenStream as TokenStream2};
use proc_macro_crate::{FoundCrate, crate_name};
use quote::{format_ident, quote};
use syn::{Data, DeriveInput, Field, Fields, LitStr, parse_macro_input};

/// Derives `formflow::form::FormModel` for a struct with named fields.
///
/// Each field maps to the form key of the same name. `#[form(rename = "...")]`
/// picks another key; `#[form(skip)]` leaves the field out of the form and
/// fills it with `Default::default()` when reading values back.
#[proc_macro_derive(FormModel, attributes(form))]
pub fn derive_form_model(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(input) {
        Ok(tokens) => tokens.into(),
        Err(error) => error.to_compile_error().into(),
    }
}

struct FieldOptions {
    key: Option<String>,
    skip: bool,
}

fn expand(input: DeriveInput) -> syn::Result<TokenStream2> {
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            input.ident,
            "FormModel derive currently supports only non-generic structs",
        ));
    }

    let model_ident = input.ident;
    let fields_struct_ident = format_ident!("{model_ident}Fields");

    let named_fields = match input.data {
        Data::Struct(data) => match data.fields {
            Fields::Named(fields) => fields.named,
            _ => {
                return Err(syn::Error::new(
                    Span::call_site(),
                    "FormModel derive requires a struct with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new(
                Span::call_site(),
                "FormModel derive is only supported on structs",
            ));
        }
    };

    let formflow = formflow_path();
    let mut key_methods = Vec::new();
    let mut inserts = Vec::new();
    let mut extracts = Vec::new();

    for field in named_fields {
        let options = field_options(&field)?;
        let Some(field_ident) = field.ident else {
            continue;
        };
        let field_ty = field.ty;

        if options.skip {
            extracts.push(quote! {
                #field_ident: ::core::default::Default::default()
            });
            continue;
        }

        let key = options.key.unwrap_or_else(|| field_ident.to_string());
        key_methods.push(quote! {
            pub const fn #field_ident(&self) -> #formflow::value::FieldKey {
                #formflow::value::FieldKey::from_static(#key)
            }
        });
        inserts.push(quote! {
            values.insert(
                #formflow::value::FieldKey::from_static(#key),
                #formflow::value::FieldValue::from(::core::clone::Clone::clone(&self.#field_ident)),
            );
        });
        extracts.push(quote! {
            #field_ident: <#field_ty as #formflow::value::FromFieldValue>::extract(values, #key)?
        });
    }

    Ok(quote! {
        #[derive(Clone, Copy, Debug, Default)]
        pub struct #fields_struct_ident;

        impl #fields_struct_ident {
            #(#key_methods)*
        }

        impl #formflow::form::FormModel for #model_ident {
            type Fields = #fields_struct_ident;

            fn fields() -> Self::Fields {
                #fields_struct_ident
            }

            fn to_values(&self) -> #formflow::value::FormValues {
                let mut values = #formflow::value::FormValues::new();
                #(#inserts)*
                values
            }

            fn from_values(
                values: &#formflow::value::FormValues,
            ) -> ::core::result::Result<Self, #formflow::value::FieldValueError> {
                ::core::result::Result::Ok(Self {
                    #(#extracts),*
                })
            }
        }
    })
}

fn field_options(field: &Field) -> syn::Result<FieldOptions> {
    let mut options = FieldOptions {
        key: None,
        skip: false,
    };
    for attr in &field.attrs {
        if !attr.path().is_ident("form") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename") {
                let value: LitStr = meta.value()?.parse()?;
                options.key = Some(value.value());
                Ok(())
            } else if meta.path.is_ident("skip") {
                options.skip = true;
                Ok(())
            } else {
                Err(meta.error("expected `rename = \"...\"` or `skip`"))
            }
        })?;
    }
    Ok(options)
}

fn formflow_path() -> TokenStream2 {
    match crate_name("formflow") {
        Ok(FoundCrate::Name(name)) => {
            let ident = Ident::new(&name, Span::call_site());
            quote!(::#ident)
        }
        Ok(FoundCrate::Itself) => quote!(crate),
        Err(_) => quote!(::formflow),
    }
}
