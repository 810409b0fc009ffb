use syn::{Field, FieldsNamed, Token, Type, punctuated::Punctuated};

/// 确保具名字段结构体包含所需字段
/// - required: (字段名, 字段类型) 列表，缺失的字段按给定顺序插入到最前
/// - 已存在的同名字段保持原位置与原类型
pub(crate) fn ensure_required_fields(fields_named: &mut FieldsNamed, required: &[(&str, &Type)]) {
    let mut new_named: Punctuated<Field, Token![,]> = Punctuated::new();

    for (name, ty) in required.iter() {
        let exists = fields_named
            .named
            .iter()
            .any(|f| f.ident.as_ref().map(|i| i == *name).unwrap_or(false));

        if !exists {
            let ident = syn::Ident::new(name, proc_macro2::Span::call_site());
            let field: Field = syn::parse_quote! { #ident: #ty };
            new_named.push(field);
        }
    }

    new_named.extend(std::mem::take(&mut fields_named.named));
    fields_named.named = new_named;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(fields: &FieldsNamed) -> Vec<String> {
        fields
            .named
            .iter()
            .filter_map(|f| f.ident.as_ref().map(|i| i.to_string()))
            .collect()
    }

    #[test]
    fn inserts_missing_field_first() {
        let mut fields: FieldsNamed = syn::parse_quote!({ seen: u32, other: bool });
        let ty: Type = syn::parse_quote!(String);
        ensure_required_fields(&mut fields, &[("message", &ty)]);

        assert_eq!(names(&fields), ["message", "seen", "other"]);
    }

    #[test]
    fn keeps_existing_field_in_place() {
        let mut fields: FieldsNamed = syn::parse_quote!({ seen: u32, message: Custom });
        let ty: Type = syn::parse_quote!(String);
        ensure_required_fields(&mut fields, &[("message", &ty)]);

        assert_eq!(names(&fields), ["seen", "message"]);
    }
}
