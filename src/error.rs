//! 错误类型

use std::fmt;

use thiserror::Error;

/// 字符串转换为字段值失败
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValueError {
    #[error("invalid {kind} value {raw:?}: {reason}")]
    Invalid {
        kind: &'static str,
        raw: String,
        reason: String,
    },
    #[error("{kind} fields cannot be bound from a string")]
    Unsupported { kind: &'static str },
}

/// 字段绑定错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BindError {
    #[error("field `{field}`: cannot bind `{variable}`: {error}")]
    Parse {
        field: String,
        variable: String,
        error: ValueError,
    },
    #[error("field `{field}`: invalid default {value:?}: {error}")]
    InvalidDefault {
        field: String,
        value: String,
        error: ValueError,
    },
}

impl BindError {
    /// 出错字段的完整路径
    pub fn field(&self) -> &str {
        match self {
            BindError::Parse { field, .. } | BindError::InvalidDefault { field, .. } => field,
        }
    }
}

/// 多个错误的聚合，一次加载过程中所有 source 的错误都会收集到这里
#[derive(Debug, Default)]
pub struct AggregateError {
    errors: Vec<anyhow::Error>,
}

impl AggregateError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: anyhow::Error) {
        self.errors.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> &[anyhow::Error] {
        &self.errors
    }

    /// 为空时返回 Ok
    pub fn into_result(self) -> Result<(), AggregateError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let plural = if self.errors.len() == 1 { "" } else { "s" };
        write!(f, "{} error{} occurred:", self.errors.len(), plural)?;
        for error in &self.errors {
            write!(f, "\n\t* {:#}", error)?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {}

/// Merger 相关错误
#[derive(Error, Debug)]
pub enum MergeError {
    /// 配置结构体的注解不合法，在构造 Merger 时发现
    #[error("invalid schema at field `{field}`: {reason}")]
    InvalidSchema { field: String, reason: String },
    /// 加载阶段的错误（所有 source 的错误汇总）
    #[error("load failed: {0}")]
    Load(#[from] AggregateError),
    #[error("required fields not set: {}", fields.join(", "))]
    RequiredMissing { fields: Vec<String> },
    #[error(transparent)]
    Bind(#[from] BindError),
    #[error("source `{source_name}` has no target, add it to a merger before loading")]
    TargetNotSet { source_name: String },
    #[error("no active watch session")]
    NotWatching,
    #[error("a watch session is already running")]
    AlreadyWatching,
    #[error("watch of source `{source_name}` failed: {error:#}")]
    Watch {
        source_name: String,
        error: anyhow::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_aggregate_error_display() {
        let mut errors = AggregateError::new();
        assert!(errors.is_empty());
        errors.push(anyhow!("first"));
        errors.push(anyhow!("second").context("source `file`"));

        assert_eq!(errors.len(), 2);
        let message = errors.to_string();
        assert!(message.starts_with("2 errors occurred:"));
        assert!(message.contains("* first"));
        assert!(message.contains("source `file`: second"));
    }

    #[test]
    fn test_aggregate_error_into_result() {
        assert!(AggregateError::new().into_result().is_ok());

        let mut errors = AggregateError::new();
        errors.push(anyhow!("boom"));
        let err = errors.into_result().unwrap_err();
        assert_eq!(err.to_string(), "1 error occurred:\n\t* boom");
    }

    #[test]
    fn test_bind_error_names_field() {
        let err = BindError::Parse {
            field: "server.port".to_string(),
            variable: "PORT".to_string(),
            error: ValueError::Invalid {
                kind: "i64",
                raw: "http".to_string(),
                reason: "invalid digit found in string".to_string(),
            },
        };
        assert_eq!(err.field(), "server.port");
        assert!(err.to_string().contains("server.port"));
        assert!(err.to_string().contains("\"http\""));
    }

    #[test]
    fn test_required_missing_display() {
        let err = MergeError::RequiredMissing {
            fields: vec!["name".to_string(), "database.host".to_string()],
        };
        assert_eq!(err.to_string(), "required fields not set: name, database.host");
    }
}
