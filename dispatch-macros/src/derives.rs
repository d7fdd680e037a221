use quote::ToTokens;
use syn::punctuated::Punctuated;
use syn::{Attribute, Path, Token};

/// 将 `required` 合并进已有的 `#[derive(...)]`，去重后置于属性列表最前
///
/// `Serialize` 与 `serde::Serialize`、`::serde::Serialize` 视为同一项。
pub(crate) fn apply_derives(attrs: &mut Vec<Attribute>, required: Vec<Path>) {
    let mut existing: Vec<Path> = Vec::new();
    let mut retained: Vec<Attribute> = Vec::new();

    for attr in attrs.drain(..) {
        if attr.path().is_ident("derive") {
            if let Ok(list) = attr.parse_args_with(Punctuated::<Path, Token![,]>::parse_terminated)
            {
                existing.extend(list);
                continue;
            }
        }
        retained.push(attr);
    }

    let mut seen = std::collections::HashSet::new();
    let merged: Vec<Path> = required
        .into_iter()
        .chain(existing)
        .filter(|p| seen.insert(derive_key(p)))
        .collect();

    let derive: Attribute = syn::parse_quote!(#[derive(#(#merged),*)]);
    *attrs = std::iter::once(derive).chain(retained).collect();
}

fn derive_key(p: &Path) -> String {
    match p.segments.last() {
        Some(last) => last.ident.to_string(),
        None => p.to_token_stream().to_string(),
    }
}
