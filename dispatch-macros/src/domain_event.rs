use crate::derives::apply_derives;
use proc_macro::TokenStream;
use quote::quote;
use syn::punctuated::Punctuated;
use syn::spanned::Spanned;
use syn::{
    Expr, ExprLit, Item, ItemEnum, ItemStruct, Lit, LitInt, LitStr, MetaNameValue, Result, Token,
    parse::Parse, parse::ParseStream, parse_macro_input,
};

/// #[domain_event] 宏实现
/// - 枚举：每个变体一个事件种类，默认 `Enum.Variant`，可用 `#[event(kind = "...")]` 覆写；
///   变体形态不限（单元/元组/具名字段）
/// - 结构体：事件种类默认取类型名，可用 `#[domain_event(kind = "...")]` 覆写
/// - `version = N` 指定载荷版本（默认 1），枚举可在变体级覆写
/// - 追加派生：Debug, Clone, serde::Serialize, serde::Deserialize
pub(crate) fn expand(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = parse_macro_input!(attr as EventArgs);
    let mut input = parse_macro_input!(item as Item);

    let generated = match &mut input {
        Item::Enum(e) => expand_enum(&args, e),
        Item::Struct(s) => expand_struct(&args, s),
        other => Err(syn::Error::new(
            other.span(),
            "#[domain_event] can only be used on enums or structs",
        )),
    };

    match generated {
        Ok(impl_block) => TokenStream::from(quote! {
            #input
            #impl_block
        }),
        Err(err) => err.to_compile_error().into(),
    }
}

fn required_derives() -> Vec<syn::Path> {
    vec![
        syn::parse_quote!(Debug),
        syn::parse_quote!(Clone),
        syn::parse_quote!(::serde::Serialize),
        syn::parse_quote!(::serde::Deserialize),
    ]
}

fn expand_enum(args: &EventArgs, item: &mut ItemEnum) -> Result<proc_macro2::TokenStream> {
    if let Some(kind) = &args.kind {
        return Err(syn::Error::new(
            kind.span(),
            "enum-level `kind` is not supported; use #[event(kind = \"...\")] on variants",
        ));
    }
    if item.variants.is_empty() {
        return Err(syn::Error::new(
            item.ident.span(),
            "#[domain_event] requires at least one variant",
        ));
    }

    apply_derives(&mut item.attrs, required_derives());

    let default_version = version_tokens(args.version.as_ref());
    let enum_name = item.ident.to_string();
    let mut kind_arms = Vec::new();
    let mut version_arms = Vec::new();

    for variant in &mut item.variants {
        let mut overrides = EventArgs::default();
        let mut retained = Vec::new();
        for attr in variant.attrs.drain(..) {
            if attr.path().is_ident("event") {
                let pairs = attr
                    .parse_args_with(Punctuated::<MetaNameValue, Token![,]>::parse_terminated)?;
                overrides.merge(EventArgs::from_pairs(pairs)?, attr.span())?;
            } else {
                retained.push(attr);
            }
        }
        variant.attrs = retained;

        let v_ident = &variant.ident;
        let kind = overrides.kind.unwrap_or_else(|| {
            LitStr::new(&format!("{enum_name}.{v_ident}"), v_ident.span())
        });
        let version = match overrides.version {
            Some(lit) => quote! { #lit },
            None => default_version.clone(),
        };

        kind_arms.push(quote! { Self::#v_ident { .. } => #kind });
        version_arms.push(quote! { Self::#v_ident { .. } => #version });
    }

    let ident = &item.ident;
    let (impl_generics, ty_generics, where_clause) = item.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics ::dispatch_domain::domain_event::DomainEvent for #ident #ty_generics #where_clause {
            fn event_kind(&self) -> &str {
                match self { #( #kind_arms, )* }
            }
            fn event_version(&self) -> usize {
                match self { #( #version_arms, )* }
            }
        }
    })
}

fn expand_struct(args: &EventArgs, item: &mut ItemStruct) -> Result<proc_macro2::TokenStream> {
    apply_derives(&mut item.attrs, required_derives());

    let ident = &item.ident;
    let kind = args
        .kind
        .clone()
        .unwrap_or_else(|| LitStr::new(&ident.to_string(), ident.span()));
    let version = version_tokens(args.version.as_ref());
    let (impl_generics, ty_generics, where_clause) = item.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics ::dispatch_domain::domain_event::DomainEvent for #ident #ty_generics #where_clause {
            fn event_kind(&self) -> &str { #kind }
            fn event_version(&self) -> usize { #version }
        }
    })
}

fn version_tokens(version: Option<&LitInt>) -> proc_macro2::TokenStream {
    match version {
        Some(lit) => quote! { #lit },
        None => quote! { 1 },
    }
}

// -------- parsing --------

#[derive(Default)]
struct EventArgs {
    kind: Option<LitStr>,
    version: Option<LitInt>,
}

impl Parse for EventArgs {
    fn parse(input: ParseStream) -> Result<Self> {
        let pairs = Punctuated::<MetaNameValue, Token![,]>::parse_terminated(input)?;
        EventArgs::from_pairs(pairs)
    }
}

impl EventArgs {
    fn from_pairs(pairs: Punctuated<MetaNameValue, Token![,]>) -> Result<Self> {
        let mut args = EventArgs::default();
        for nv in pairs {
            let span = nv.path.span();
            let key = nv
                .path
                .get_ident()
                .map(|i| i.to_string())
                .unwrap_or_default();
            match key.as_str() {
                "kind" => {
                    if args.kind.is_some() {
                        return Err(syn::Error::new(span, "duplicate key 'kind' in attribute"));
                    }
                    args.kind = Some(expect_kind(&nv.value)?);
                }
                "version" => {
                    if args.version.is_some() {
                        return Err(syn::Error::new(
                            span,
                            "duplicate key 'version' in attribute",
                        ));
                    }
                    args.version = Some(expect_version(&nv.value)?);
                }
                _ => {
                    return Err(syn::Error::new(
                        span,
                        "unknown key; expected `kind` or `version`",
                    ));
                }
            }
        }
        Ok(args)
    }

    fn merge(&mut self, other: EventArgs, span: proc_macro2::Span) -> Result<()> {
        if let Some(kind) = other.kind {
            if self.kind.replace(kind).is_some() {
                return Err(syn::Error::new(span, "duplicate 'kind' specified for this variant"));
            }
        }
        if let Some(version) = other.version {
            if self.version.replace(version).is_some() {
                return Err(syn::Error::new(
                    span,
                    "duplicate 'version' specified for this variant",
                ));
            }
        }
        Ok(())
    }
}

fn expect_kind(expr: &Expr) -> Result<LitStr> {
    match expr {
        Expr::Lit(ExprLit {
            lit: Lit::Str(lit), ..
        }) => {
            if lit.value().trim().is_empty() {
                return Err(syn::Error::new(lit.span(), "event kind must not be empty"));
            }
            Ok(lit.clone())
        }
        other => Err(syn::Error::new(
            other.span(),
            "`kind` expects a string literal",
        )),
    }
}

fn expect_version(expr: &Expr) -> Result<LitInt> {
    match expr {
        Expr::Lit(ExprLit {
            lit: Lit::Int(lit), ..
        }) => {
            let value: usize = lit.base10_parse()?;
            if value == 0 {
                return Err(syn::Error::new(lit.span(), "`version` must be >= 1"));
            }
            Ok(LitInt::new(&value.to_string(), lit.span()))
        }
        other => Err(syn::Error::new(
            other.span(),
            "`version` expects an integer literal",
        )),
    }
}
