use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::ext::IdentExt;
use syn::{parse_macro_input, Data, DeriveInput, Fields, Lit, LitInt, LitStr};

/// 为配置结构体生成字段描述表和访问器，实现 `cfgmerge::Configurable`
///
/// 字段注解统一写在 `#[config(...)]` 中：
/// - `<tag> = "VAR"`: 绑定注解，如 `env = "PORT"`、`file = "server.port"`
/// - `required`: 加载完成后必须为非零值
/// - `default = "literal"`: 字段仍为零值时使用的默认值
/// - `show_last_symbols = N`: 展示时只保留末尾 N 个字符
/// - `skip`: 不参与绑定和展示
///
/// 嵌套的结构体字段只要同样派生了 `Configurable`，就会被自动递归访问
///
/// # 示例
/// ```ignore
/// use cfgmerge::Configurable;
///
/// #[derive(Debug, Default, Configurable)]
/// struct ServerConfig {
///     #[config(env = "PORT", required, default = "8080")]
///     port: i64,
///     #[config(env = "DB_PASSWORD", show_last_symbols = 2)]
///     password: String,
///     database: DatabaseConfig,
/// }
/// ```
#[proc_macro_derive(Configurable, attributes(config))]
pub fn configurable_derive(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(&input) {
        Ok(expanded) => TokenStream::from(expanded),
        Err(err) => TokenStream::from(err.to_compile_error()),
    }
}

#[derive(Default)]
struct FieldAttrs {
    skip: bool,
    required: bool,
    default: Option<String>,
    show_last_symbols: Option<usize>,
    tags: Vec<(String, String)>,
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let struct_name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => &named.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    struct_name,
                    "Configurable can only be derived for structs with named fields",
                ))
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                struct_name,
                "Configurable can only be derived for structs",
            ))
        }
    };

    let mut metas = Vec::new();
    let mut walks = Vec::new();
    let mut walks_mut = Vec::new();

    for field in fields {
        let attrs = parse_field_attrs(field)?;
        if attrs.skip {
            continue;
        }
        let Some(ident) = field.ident.as_ref() else {
            continue;
        };

        let index = metas.len();
        let field_name = ident.unraw().to_string();
        let tags = attrs.tags.iter().map(|(key, var)| quote!((#key, #var)));
        let required = attrs.required;
        let default = match &attrs.default {
            Some(value) => quote!(::core::option::Option::Some(#value)),
            None => quote!(::core::option::Option::None),
        };
        let show_last_symbols = match attrs.show_last_symbols {
            Some(n) => quote!(::core::option::Option::Some(#n)),
            None => quote!(::core::option::Option::None),
        };

        metas.push(quote! {
            ::cfgmerge::schema::FieldMeta {
                name: #field_name,
                tags: &[#(#tags),*],
                required: #required,
                default: #default,
                show_last_symbols: #show_last_symbols,
            }
        });
        walks.push(quote! {
            ::cfgmerge::schema::Field::accept(
                &self.#ident,
                &<Self as ::cfgmerge::schema::Configurable>::FIELDS[#index],
                visitor,
            );
        });
        walks_mut.push(quote! {
            ::cfgmerge::schema::Field::accept_mut(
                &mut self.#ident,
                &<Self as ::cfgmerge::schema::Configurable>::FIELDS[#index],
                visitor,
            )?;
        });
    }

    Ok(quote! {
        impl #impl_generics ::cfgmerge::schema::Configurable for #struct_name #ty_generics #where_clause {
            const FIELDS: &'static [::cfgmerge::schema::FieldMeta] = &[#(#metas),*];

            #[allow(unused_variables)]
            fn walk(&self, visitor: &mut dyn ::cfgmerge::schema::Visitor) {
                #(#walks)*
            }

            #[allow(unused_variables)]
            fn walk_mut(
                &mut self,
                visitor: &mut dyn ::cfgmerge::schema::VisitorMut,
            ) -> ::core::result::Result<(), ::cfgmerge::BindError> {
                #(#walks_mut)*
                ::core::result::Result::Ok(())
            }
        }

        impl #impl_generics ::cfgmerge::schema::Field for #struct_name #ty_generics #where_clause {
            fn accept(
                &self,
                meta: &::cfgmerge::schema::FieldMeta,
                visitor: &mut dyn ::cfgmerge::schema::Visitor,
            ) {
                visitor.enter(meta);
                <Self as ::cfgmerge::schema::Configurable>::walk(self, visitor);
                visitor.leave(meta);
            }

            fn accept_mut(
                &mut self,
                meta: &::cfgmerge::schema::FieldMeta,
                visitor: &mut dyn ::cfgmerge::schema::VisitorMut,
            ) -> ::core::result::Result<(), ::cfgmerge::BindError> {
                visitor.enter(meta);
                let result = <Self as ::cfgmerge::schema::Configurable>::walk_mut(self, visitor);
                visitor.leave(meta);
                result
            }
        }
    })
}

fn parse_field_attrs(field: &syn::Field) -> syn::Result<FieldAttrs> {
    let mut attrs = FieldAttrs::default();

    for attr in &field.attrs {
        if !attr.path().is_ident("config") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("skip") {
                attrs.skip = true;
                return Ok(());
            }
            if meta.path.is_ident("required") {
                attrs.required = true;
                return Ok(());
            }
            if meta.path.is_ident("default") {
                let lit: Lit = meta.value()?.parse()?;
                attrs.default = Some(lit_to_string(&lit)?);
                return Ok(());
            }
            if meta.path.is_ident("show_last_symbols") {
                let lit: LitInt = meta.value()?.parse()?;
                attrs.show_last_symbols = Some(lit.base10_parse()?);
                return Ok(());
            }

            // 其余的 `key = "VAR"` 都视为绑定注解
            let key = meta
                .path
                .get_ident()
                .ok_or_else(|| meta.error("expected `tag = \"VARIABLE\"`"))?
                .unraw()
                .to_string();
            let var: LitStr = meta.value()?.parse()?;
            if attrs.tags.iter().any(|(k, _)| *k == key) {
                return Err(meta.error(format!("duplicate `{}` binding", key)));
            }
            attrs.tags.push((key, var.value()));
            Ok(())
        })?;
    }

    Ok(attrs)
}

fn lit_to_string(lit: &Lit) -> syn::Result<String> {
    match lit {
        Lit::Str(s) => Ok(s.value()),
        Lit::Int(i) => Ok(i.base10_digits().to_string()),
        Lit::Bool(b) => Ok(b.value.to_string()),
        other => Err(syn::Error::new_spanned(
            other,
            "default must be a string, integer or bool literal",
        )),
    }
}
