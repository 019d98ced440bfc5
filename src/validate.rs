//! 注解校验、默认值和必填检查

use crate::error::{BindError, MergeError};
use crate::schema::{Configurable, FieldKind, FieldMeta, FieldPath, FieldValue, Visitor, VisitorMut};

/// 检查配置结构体的注解是否合法
///
/// - `default` 必须能转换为字段类型
/// - 不支持绑定的字段（如浮点数）不能声明 `required` 或 `default`
/// - `show_last_symbols` 只能用于字符串字段
/// - 嵌套结构体字段本身不能带注解
pub fn check_schema<T: Configurable>(target: &T) -> Result<(), MergeError> {
    let mut checker = SchemaChecker::default();
    target.walk(&mut checker);
    match checker.error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[derive(Default)]
struct SchemaChecker {
    path: FieldPath,
    error: Option<MergeError>,
}

impl SchemaChecker {
    fn fail(&mut self, field: String, reason: impl Into<String>) {
        if self.error.is_none() {
            self.error = Some(MergeError::InvalidSchema {
                field,
                reason: reason.into(),
            });
        }
    }
}

impl Visitor for SchemaChecker {
    fn enter(&mut self, field: &FieldMeta) {
        if field.is_annotated() {
            let path = self.path.join(field.name);
            self.fail(path, "annotations on a nested record are not supported");
        }
        self.path.push(field.name);
    }

    fn leave(&mut self, _field: &FieldMeta) {
        self.path.pop();
    }

    fn visit(&mut self, field: &FieldMeta, value: &dyn FieldValue) {
        let unsupported = value.kind() == FieldKind::Unsupported;
        if unsupported && field.required {
            self.fail(self.path.join(field.name), "required on a field that cannot be bound");
        }
        if field.show_last_symbols.is_some() && value.kind() != FieldKind::String {
            self.fail(self.path.join(field.name), "show_last_symbols on a non-string field");
        }
        if let Some(default) = field.default {
            if let Err(err) = value.check(default) {
                self.fail(self.path.join(field.name), format!("bad default: {}", err));
            }
        }
    }
}

/// 对仍为零值且声明了默认值的字段赋默认值，返回赋值的字段数
pub fn apply_defaults<T: Configurable>(target: &mut T) -> Result<usize, BindError> {
    let mut applier = DefaultApplier::default();
    target.walk_mut(&mut applier)?;
    Ok(applier.applied)
}

#[derive(Default)]
struct DefaultApplier {
    path: FieldPath,
    applied: usize,
}

impl VisitorMut for DefaultApplier {
    fn enter(&mut self, field: &FieldMeta) {
        self.path.push(field.name);
    }

    fn leave(&mut self, _field: &FieldMeta) {
        self.path.pop();
    }

    fn visit(&mut self, field: &FieldMeta, value: &mut dyn FieldValue) -> Result<(), BindError> {
        let Some(default) = field.default else {
            return Ok(());
        };
        if !value.is_zero() {
            return Ok(());
        }
        value
            .set_from_str(default)
            .map_err(|error| BindError::InvalidDefault {
                field: self.path.join(field.name),
                value: default.to_string(),
                error,
            })?;
        self.applied += 1;
        Ok(())
    }
}

/// 检查所有 `required` 字段都不是零值，返回缺失的字段路径
pub fn missing_required<T: Configurable>(target: &T) -> Vec<String> {
    let mut checker = RequiredChecker::default();
    target.walk(&mut checker);
    checker.missing
}

/// 必填检查，有缺失时返回 `MergeError::RequiredMissing`
pub fn check_required<T: Configurable>(target: &T) -> Result<(), MergeError> {
    let missing = missing_required(target);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(MergeError::RequiredMissing { fields: missing })
    }
}

#[derive(Default)]
struct RequiredChecker {
    path: FieldPath,
    missing: Vec<String>,
}

impl Visitor for RequiredChecker {
    fn enter(&mut self, field: &FieldMeta) {
        self.path.push(field.name);
    }

    fn leave(&mut self, _field: &FieldMeta) {
        self.path.pop();
    }

    fn visit(&mut self, field: &FieldMeta, value: &dyn FieldValue) {
        if field.required && value.is_zero() {
            self.missing.push(self.path.join(field.name));
        }
    }
}
