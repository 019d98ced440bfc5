//! 配置结构描述
//!
//! 每个配置类型通过 `#[derive(Configurable)]` 生成一张静态字段描述表，
//! 以及只读 / 可写两种访问器。绑定、默认值、必填校验和展示都基于访问器实现，
//! 不依赖运行时反射。

use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashMap};

use crate::error::{BindError, ValueError};

/// 字段描述，由派生宏生成
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldMeta {
    /// 字段名
    pub name: &'static str,
    /// 绑定注解：(标签, 变量名)，如 ("env", "PORT")
    pub tags: &'static [(&'static str, &'static str)],
    /// 是否必填
    pub required: bool,
    /// 默认值字面量
    pub default: Option<&'static str>,
    /// 展示时保留的末尾字符数
    pub show_last_symbols: Option<usize>,
}

impl FieldMeta {
    /// 获取指定标签绑定的变量名
    pub fn tag(&self, key: &str) -> Option<&'static str> {
        self.tags
            .iter()
            .find(|(tag, _)| *tag == key)
            .map(|(_, var)| *var)
    }

    /// 字段是否携带任何注解
    pub fn is_annotated(&self) -> bool {
        !self.tags.is_empty()
            || self.required
            || self.default.is_some()
            || self.show_last_symbols.is_some()
    }
}

/// 叶子字段的值类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Int,
    Bool,
    /// 不支持从字符串绑定（如浮点数），绑定时跳过
    Unsupported,
}

/// 叶子字段的值
pub trait FieldValue {
    fn kind(&self) -> FieldKind;

    /// 从字符串解析并赋值
    fn set_from_str(&mut self, raw: &str) -> Result<(), ValueError>;

    /// 只校验字符串能否解析，不赋值
    fn check(&self, raw: &str) -> Result<(), ValueError>;

    /// 是否为零值（空字符串、0、false）
    fn is_zero(&self) -> bool;

    fn to_json(&self) -> JsonValue;

    fn to_display(&self) -> String;
}

/// 只读访问器
pub trait Visitor {
    /// 进入嵌套结构体
    fn enter(&mut self, _field: &FieldMeta) {}

    /// 离开嵌套结构体
    fn leave(&mut self, _field: &FieldMeta) {}

    fn visit(&mut self, field: &FieldMeta, value: &dyn FieldValue);
}

/// 可写访问器，返回错误时中止本次遍历
pub trait VisitorMut {
    fn enter(&mut self, _field: &FieldMeta) {}

    fn leave(&mut self, _field: &FieldMeta) {}

    fn visit(&mut self, field: &FieldMeta, value: &mut dyn FieldValue) -> Result<(), BindError>;
}

/// 可以作为配置字段出现的类型
///
/// 叶子类型把自己交给访问器；派生了 `Configurable` 的结构体则递归访问自己的字段
pub trait Field {
    fn accept(&self, meta: &FieldMeta, visitor: &mut dyn Visitor);

    fn accept_mut(&mut self, meta: &FieldMeta, visitor: &mut dyn VisitorMut)
        -> Result<(), BindError>;
}

/// 配置结构体，由 `#[derive(Configurable)]` 实现
pub trait Configurable: Field + Send + Sync + 'static {
    /// 字段描述表（不含 `skip` 字段）
    const FIELDS: &'static [FieldMeta];

    fn walk(&self, visitor: &mut dyn Visitor);

    fn walk_mut(&mut self, visitor: &mut dyn VisitorMut) -> Result<(), BindError>;
}

/// 遍历过程中的字段路径，如 `database.port`
#[derive(Debug, Default, Clone)]
pub struct FieldPath {
    segments: Vec<&'static str>,
}

impl FieldPath {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, segment: &'static str) {
        self.segments.push(segment);
    }

    pub fn pop(&mut self) {
        self.segments.pop();
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// 拼接叶子字段名得到完整路径
    pub fn join(&self, leaf: &str) -> String {
        if self.segments.is_empty() {
            return leaf.to_string();
        }
        format!("{}.{}", self.segments.join("."), leaf)
    }
}

/// 按 Go strconv.ParseBool 的规则解析布尔值
pub fn parse_bool(raw: &str) -> Result<bool, ValueError> {
    match raw {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Ok(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Ok(false),
        _ => Err(ValueError::Invalid {
            kind: "bool",
            raw: raw.to_string(),
            reason: "expected one of 1, t, true, 0, f, false".to_string(),
        }),
    }
}

macro_rules! impl_leaf_field {
    ($($ty:ty),*) => {
        $(
            impl Field for $ty {
                fn accept(&self, meta: &FieldMeta, visitor: &mut dyn Visitor) {
                    visitor.visit(meta, self);
                }

                fn accept_mut(
                    &mut self,
                    meta: &FieldMeta,
                    visitor: &mut dyn VisitorMut,
                ) -> Result<(), BindError> {
                    visitor.visit(meta, self)
                }
            }
        )*
    };
}

macro_rules! impl_int_value {
    ($($ty:ty),*) => {
        $(
            impl FieldValue for $ty {
                fn kind(&self) -> FieldKind {
                    FieldKind::Int
                }

                fn set_from_str(&mut self, raw: &str) -> Result<(), ValueError> {
                    *self = raw.parse::<$ty>().map_err(|e| ValueError::Invalid {
                        kind: stringify!($ty),
                        raw: raw.to_string(),
                        reason: e.to_string(),
                    })?;
                    Ok(())
                }

                fn check(&self, raw: &str) -> Result<(), ValueError> {
                    let mut probe: $ty = 0;
                    probe.set_from_str(raw)
                }

                fn is_zero(&self) -> bool {
                    *self == 0
                }

                fn to_json(&self) -> JsonValue {
                    JsonValue::from(*self)
                }

                fn to_display(&self) -> String {
                    self.to_string()
                }
            }

            impl_leaf_field!($ty);
        )*
    };
}

impl_int_value!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

macro_rules! impl_float_value {
    ($($ty:ty),*) => {
        $(
            impl FieldValue for $ty {
                fn kind(&self) -> FieldKind {
                    FieldKind::Unsupported
                }

                fn set_from_str(&mut self, _raw: &str) -> Result<(), ValueError> {
                    Err(ValueError::Unsupported { kind: stringify!($ty) })
                }

                fn check(&self, _raw: &str) -> Result<(), ValueError> {
                    Err(ValueError::Unsupported { kind: stringify!($ty) })
                }

                fn is_zero(&self) -> bool {
                    *self == 0.0
                }

                fn to_json(&self) -> JsonValue {
                    JsonValue::from(*self)
                }

                fn to_display(&self) -> String {
                    self.to_string()
                }
            }

            impl_leaf_field!($ty);
        )*
    };
}

// TODO: bind floats once a parse policy for NaN/inf literals is settled
impl_float_value!(f32, f64);

impl FieldValue for String {
    fn kind(&self) -> FieldKind {
        FieldKind::String
    }

    fn set_from_str(&mut self, raw: &str) -> Result<(), ValueError> {
        raw.clone_into(self);
        Ok(())
    }

    fn check(&self, _raw: &str) -> Result<(), ValueError> {
        Ok(())
    }

    fn is_zero(&self) -> bool {
        self.is_empty()
    }

    fn to_json(&self) -> JsonValue {
        JsonValue::String(self.clone())
    }

    fn to_display(&self) -> String {
        self.clone()
    }
}

impl FieldValue for bool {
    fn kind(&self) -> FieldKind {
        FieldKind::Bool
    }

    fn set_from_str(&mut self, raw: &str) -> Result<(), ValueError> {
        *self = parse_bool(raw)?;
        Ok(())
    }

    fn check(&self, raw: &str) -> Result<(), ValueError> {
        parse_bool(raw).map(|_| ())
    }

    fn is_zero(&self) -> bool {
        !*self
    }

    fn to_json(&self) -> JsonValue {
        JsonValue::Bool(*self)
    }

    fn to_display(&self) -> String {
        self.to_string()
    }
}

impl_leaf_field!(String, bool);

/// 容器类型不能从单个字符串绑定，但仍然出现在快照和展示中
macro_rules! impl_serialized_value {
    ($kind:literal, [$($generics:tt)*] $ty:ty, $zero:ident) => {
        impl<$($generics)*> FieldValue for $ty {
            fn kind(&self) -> FieldKind {
                FieldKind::Unsupported
            }

            fn set_from_str(&mut self, _raw: &str) -> Result<(), ValueError> {
                Err(ValueError::Unsupported { kind: $kind })
            }

            fn check(&self, _raw: &str) -> Result<(), ValueError> {
                Err(ValueError::Unsupported { kind: $kind })
            }

            fn is_zero(&self) -> bool {
                self.$zero()
            }

            fn to_json(&self) -> JsonValue {
                serde_json::to_value(self).unwrap_or(JsonValue::Null)
            }

            fn to_display(&self) -> String {
                serde_json::to_string(self).unwrap_or_default()
            }
        }

        impl<$($generics)*> Field for $ty {
            fn accept(&self, meta: &FieldMeta, visitor: &mut dyn Visitor) {
                visitor.visit(meta, self);
            }

            fn accept_mut(
                &mut self,
                meta: &FieldMeta,
                visitor: &mut dyn VisitorMut,
            ) -> Result<(), BindError> {
                visitor.visit(meta, self)
            }
        }
    };
}

impl_serialized_value!("Option", [T: Serialize] Option<T>, is_none);
impl_serialized_value!("Vec", [T: Serialize] Vec<T>, is_empty);
impl_serialized_value!("HashMap", [K: Serialize, V: Serialize] HashMap<K, V>, is_empty);
impl_serialized_value!("BTreeMap", [K: Serialize, V: Serialize] BTreeMap<K, V>, is_empty);
