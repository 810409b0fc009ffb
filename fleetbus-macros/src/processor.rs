use crate::field_utils::ensure_required_fields;
use proc_macro::TokenStream;
use quote::quote;
use syn::punctuated::Punctuated;
use syn::spanned::Spanned;
use syn::{
    Ident, Item, Lit, Result, Token, Type, parse::Parse, parse::ParseStream, parse_macro_input,
};

const MESSAGE_FIELD: &str = "message";

/// #[processor] 宏实现
/// - 追加字段：`message: ::fleetbus::InboundMessage`（若缺失）并置于字段最前
/// - 为目标结构体实现 `::fleetbus::eventing::ProcessorSpec`
/// - 其余字段在每条消息构造实例时取 `Default::default()`
pub(crate) fn expand(attr: TokenStream, item: TokenStream) -> TokenStream {
    let cfg = parse_macro_input!(attr as ProcessorAttrConfig);
    let input = parse_macro_input!(item as Item);

    let mut st = match input {
        Item::Struct(s) => s,
        other => {
            return syn::Error::new(other.span(), "#[processor] only on struct")
                .to_compile_error()
                .into();
        }
    };

    // 单元结构体视为无字段的具名结构体
    if matches!(st.fields, syn::Fields::Unit) {
        st.fields = syn::Fields::Named(syn::parse_quote!({}));
        st.semi_token = None;
    }

    let fields_named = match &mut st.fields {
        syn::Fields::Named(f) => f,
        _ => {
            return syn::Error::new(st.span(), "#[processor] only supports named-field struct")
                .to_compile_error()
                .into();
        }
    };

    let message_ty: Type = syn::parse_quote! { ::fleetbus::InboundMessage };
    ensure_required_fields(fields_named, &[(MESSAGE_FIELD, &message_ty)]);

    let other_fields: Vec<Ident> = fields_named
        .named
        .iter()
        .filter_map(|f| f.ident.clone())
        .filter(|i| i != MESSAGE_FIELD)
        .collect();

    let ident = &st.ident;
    let (impl_generics, ty_generics, where_clause) = st.generics.split_for_impl();

    let event_type = match (&cfg.event_type, &cfg.namespace) {
        (Some(lit), _) => quote! { ::std::string::String::from(#lit) },
        (None, Some(ns)) => {
            let path = format!("{}::{}", ns.value(), ident);
            quote! { ::fleetbus::naming::event_type_name(#path) }
        }
        (None, None) => {
            let path = ident.to_string();
            quote! { ::fleetbus::naming::event_type_name(#path) }
        }
    };

    // 仅覆写显式给出的选项，其余沿用 ProcessorOptions::default()
    let mut option_fields = Vec::new();
    if let Some(retry) = cfg.retry {
        option_fields.push(quote! { retry: #retry, });
    }
    if let Some(max_attempts) = cfg.max_attempts {
        option_fields.push(quote! { max_attempts: #max_attempts, });
    }
    if let Some(ms) = cfg.retry_delay_ms {
        option_fields.push(quote! { retry_delay: ::std::time::Duration::from_millis(#ms), });
    }

    let expanded = quote! {
        #st

        impl #impl_generics ::fleetbus::eventing::ProcessorSpec for #ident #ty_generics #where_clause {
            fn event_type() -> ::std::string::String {
                #event_type
            }

            fn options() -> ::fleetbus::eventing::ProcessorOptions {
                ::fleetbus::eventing::ProcessorOptions {
                    #(#option_fields)*
                    ..::core::default::Default::default()
                }
            }

            fn from_message(message: ::fleetbus::InboundMessage) -> Self {
                Self {
                    message,
                    #(#other_fields: ::core::default::Default::default(),)*
                }
            }

            fn message(&self) -> &::fleetbus::InboundMessage {
                &self.message
            }
        }
    };

    TokenStream::from(expanded)
}

// -------- parsing --------

// 解析 processor 宏参数：
// event_type = "..."、namespace = "..."、retry[ = bool]、max_attempts = N、retry_delay_ms = N
#[derive(Default)]
struct ProcessorAttrConfig {
    event_type: Option<syn::LitStr>,
    namespace: Option<syn::LitStr>,
    retry: Option<bool>,
    max_attempts: Option<u32>,
    retry_delay_ms: Option<u64>,
}

impl Parse for ProcessorAttrConfig {
    fn parse(input: ParseStream) -> Result<Self> {
        let mut cfg = Self::default();

        if input.is_empty() {
            return Ok(cfg);
        }

        let elems: Punctuated<ProcessorAttrElem, Token![,]> =
            Punctuated::parse_terminated(input)?;

        for elem in elems {
            let key = elem.key.to_string();
            let duplicate = || {
                syn::Error::new(
                    elem.key.span(),
                    format!("duplicate key '{key}' in attribute"),
                )
            };

            match key.as_str() {
                "event_type" => {
                    if cfg.event_type.is_some() {
                        return Err(duplicate());
                    }
                    cfg.event_type = Some(elem.expect_str()?);
                }
                "namespace" => {
                    if cfg.namespace.is_some() {
                        return Err(duplicate());
                    }
                    cfg.namespace = Some(elem.expect_str()?);
                }
                "retry" => {
                    if cfg.retry.is_some() {
                        return Err(duplicate());
                    }
                    cfg.retry = Some(match &elem.value {
                        None => true,
                        Some(Lit::Bool(b)) => b.value,
                        Some(other) => {
                            return Err(syn::Error::new(
                                other.span(),
                                "expected boolean literal for 'retry'",
                            ));
                        }
                    });
                }
                "max_attempts" => {
                    if cfg.max_attempts.is_some() {
                        return Err(duplicate());
                    }
                    cfg.max_attempts = Some(elem.expect_int::<u32>()?);
                }
                "retry_delay_ms" => {
                    if cfg.retry_delay_ms.is_some() {
                        return Err(duplicate());
                    }
                    cfg.retry_delay_ms = Some(elem.expect_int::<u64>()?);
                }
                _ => {
                    return Err(syn::Error::new(
                        elem.key.span(),
                        "unknown key; expected 'event_type' | 'namespace' | 'retry' | 'max_attempts' | 'retry_delay_ms'",
                    ));
                }
            }
        }

        if cfg.event_type.is_some() && cfg.namespace.is_some() {
            return Err(syn::Error::new(
                proc_macro2::Span::call_site(),
                "'event_type' and 'namespace' are mutually exclusive",
            ));
        }

        Ok(cfg)
    }
}

// `key` 或 `key = <literal>`
struct ProcessorAttrElem {
    key: Ident,
    value: Option<Lit>,
}

impl ProcessorAttrElem {
    fn expect_str(&self) -> Result<syn::LitStr> {
        match &self.value {
            Some(Lit::Str(s)) => Ok(s.clone()),
            _ => Err(syn::Error::new(
                self.key.span(),
                format!("expected string literal for '{}'", self.key),
            )),
        }
    }

    fn expect_int<N>(&self) -> Result<N>
    where
        N: std::str::FromStr,
        N::Err: std::fmt::Display,
    {
        match &self.value {
            Some(Lit::Int(i)) => i.base10_parse::<N>(),
            _ => Err(syn::Error::new(
                self.key.span(),
                format!("expected integer literal for '{}'", self.key),
            )),
        }
    }
}

impl Parse for ProcessorAttrElem {
    fn parse(input: ParseStream) -> Result<Self> {
        let key: Ident = input.parse()?;
        let value = if input.peek(Token![=]) {
            let _eq: Token![=] = input.parse()?;
            Some(input.parse()?)
        } else {
            None
        };
        Ok(Self { key, value })
    }
}
