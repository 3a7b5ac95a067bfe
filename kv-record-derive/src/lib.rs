use proc_macro::TokenStream;
use quote::quote;
use syn::{Attribute, Data, DeriveInput, Fields, LitStr, Type, parse_macro_input};

#[proc_macro_derive(RecordSchema, attributes(record, unindexed, text))]
pub fn derive_record_schema(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    let struct_name = &input.ident;

    // kind 默认取结构体名，可用 #[record(kind = "...")] 覆盖
    let kind = match parse_kind(&input.attrs) {
        Ok(Some(kind)) => kind,
        Ok(None) => struct_name.to_string(),
        Err(err) => return err.to_compile_error().into(),
    };

    let named = match &input.data {
        Data::Struct(data_struct) => match &data_struct.fields {
            Fields::Named(fields) => fields.named.iter().collect::<Vec<_>>(),
            _ => vec![],
        },
        _ => {
            return syn::Error::new_spanned(struct_name, "RecordSchema only supports structs")
                .to_compile_error()
                .into();
        }
    };

    // 为每个字段生成元信息
    let field_metas = named
        .iter()
        .filter_map(|field| {
            let field_name = field.ident.as_ref()?.to_string();
            let unindexed = has_attr(&field.attrs, "unindexed");
            let type_name = if has_attr(&field.attrs, "text") {
                "Text".to_string()
            } else {
                type_name(&field.ty)
            };
            Some(quote! {
                kv_record::FieldMeta {
                    name: #field_name,
                    type_name: #type_name,
                    unindexed: #unindexed,
                }
            })
        })
        .collect::<Vec<_>>();

    let expanded = quote! {
        impl kv_record::RecordKind for #struct_name {
            fn kind() -> &'static str {
                #kind
            }

            fn field_schemas() -> Vec<kv_record::FieldMeta> {
                vec![#(#field_metas),*]
            }
        }

        kv_record::inventory::submit! {
            kv_record::KindMeta {
                kind: #kind,
                fields: || vec![#(#field_metas),*],
            }
        }
    };

    TokenStream::from(expanded)
}

fn parse_kind(attrs: &[Attribute]) -> syn::Result<Option<String>> {
    let mut kind = None;
    for attr in attrs.iter().filter(|attr| attr.path().is_ident("record")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("kind") {
                let value: LitStr = meta.value()?.parse()?;
                kind = Some(value.value());
                Ok(())
            } else {
                Err(meta.error("unsupported record attribute, expected `kind`"))
            }
        })?;
    }
    Ok(kind)
}

fn has_attr(attrs: &[Attribute], name: &str) -> bool {
    attrs.iter().any(|attr| attr.path().is_ident(name))
}

// 取类型路径的最后一段作为逻辑类型名，如 kv_record::Text -> "Text"
fn type_name(ty: &Type) -> String {
    match ty {
        Type::Path(path) => match path.path.segments.last() {
            Some(segment) => segment.ident.to_string(),
            None => quote!(#ty).to_string(),
        },
        _ => quote!(#ty).to_string().replace(' ', ""),
    }
}
