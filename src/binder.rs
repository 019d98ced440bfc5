//! 标签绑定
//!
//! 遍历配置结构体（包含嵌套结构体），对于绑定注解命中授权变量集合的叶子字段，
//! 取出变量的字符串值并按字段类型转换后赋值

use std::collections::HashSet;

use tracing::debug;

use crate::error::BindError;
use crate::schema::{Configurable, FieldKind, FieldMeta, FieldPath, FieldValue, VisitorMut};

/// 绑定访问器
///
/// - 嵌套结构体无条件递归
/// - 没有当前标签的注解，或变量不在授权集合中的字段直接跳过
/// - 变量取不到值时保持字段原值
/// - 解析失败立即返回，之前已赋值的字段不回滚
pub struct Binder<'a, F> {
    tag: &'a str,
    authorized: &'a HashSet<String>,
    lookup: F,
    path: FieldPath,
    bound: usize,
}

impl<'a, F> Binder<'a, F>
where
    F: Fn(&str) -> Option<String>,
{
    pub fn new(tag: &'a str, authorized: &'a HashSet<String>, lookup: F) -> Self {
        Self {
            tag,
            authorized,
            lookup,
            path: FieldPath::new(),
            bound: 0,
        }
    }

    /// 已成功赋值的字段数
    pub fn bound(&self) -> usize {
        self.bound
    }
}

impl<F> VisitorMut for Binder<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn enter(&mut self, field: &FieldMeta) {
        self.path.push(field.name);
    }

    fn leave(&mut self, _field: &FieldMeta) {
        self.path.pop();
    }

    fn visit(&mut self, field: &FieldMeta, value: &mut dyn FieldValue) -> Result<(), BindError> {
        let Some(variable) = field.tag(self.tag) else {
            return Ok(());
        };
        if !self.authorized.contains(variable) {
            return Ok(());
        }
        if value.kind() == FieldKind::Unsupported {
            debug!(
                field = %self.path.join(field.name),
                variable,
                "field kind cannot be bound from a string, skipped"
            );
            return Ok(());
        }
        let Some(raw) = (self.lookup)(variable) else {
            return Ok(());
        };

        value
            .set_from_str(&raw)
            .map_err(|error| BindError::Parse {
                field: self.path.join(field.name),
                variable: variable.to_string(),
                error,
            })?;
        self.bound += 1;
        Ok(())
    }
}

/// 将 `lookup` 提供的值绑定到 `target` 上
///
/// # 参数
/// - `tag`: 注解标签，如 "env"
/// - `authorized`: 本次允许绑定的变量名集合
/// - `lookup`: 根据变量名取值
///
/// # 返回
/// - 成功返回赋值的字段数
pub fn bind<T, F>(
    target: &mut T,
    tag: &str,
    authorized: &HashSet<String>,
    lookup: F,
) -> Result<usize, BindError>
where
    T: Configurable,
    F: Fn(&str) -> Option<String>,
{
    let mut binder = Binder::new(tag, authorized, lookup);
    target.walk_mut(&mut binder)?;
    Ok(binder.bound())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Configurable;
    use std::collections::HashMap;

    #[derive(Debug, Default, Configurable)]
    struct TlsConfig {
        #[config(env = "TLS_ENABLED")]
        enabled: bool,
        #[config(env = "TLS_CERT")]
        cert: String,
    }

    #[derive(Debug, Default, Configurable)]
    struct ServerConfig {
        #[config(env = "HOST")]
        host: String,
        #[config(env = "PORT")]
        port: i64,
        tls: TlsConfig,
    }

    #[derive(Debug, Default, Configurable)]
    struct AppConfig {
        #[config(env = "APP_NAME")]
        name: String,
        #[config(env = "RATIO")]
        ratio: f64,
        untagged: String,
        server: ServerConfig,
    }

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn authorized(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_bind_reaches_every_nested_leaf() {
        let values = vars(&[
            ("APP_NAME", "demo"),
            ("HOST", "0.0.0.0"),
            ("PORT", "8080"),
            ("TLS_ENABLED", "true"),
            ("TLS_CERT", "/etc/cert.pem"),
        ]);
        let names = authorized(&["APP_NAME", "HOST", "PORT", "TLS_ENABLED", "TLS_CERT"]);

        let mut config = AppConfig::default();
        let bound = bind(&mut config, "env", &names, |k| values.get(k).cloned()).unwrap();

        assert_eq!(bound, 5);
        assert_eq!(config.name, "demo");
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert!(config.server.tls.enabled);
        assert_eq!(config.server.tls.cert, "/etc/cert.pem");
    }

    #[test]
    fn test_bind_skips_unauthorized_fields() {
        let values = vars(&[("APP_NAME", "demo"), ("PORT", "9000")]);
        let names = authorized(&["PORT"]);

        let mut config = AppConfig {
            name: "keep".to_string(),
            ..Default::default()
        };
        bind(&mut config, "env", &names, |k| values.get(k).cloned()).unwrap();

        assert_eq!(config.name, "keep");
        assert_eq!(config.server.port, 9000);
    }

    #[test]
    fn test_bind_ignores_other_tags() {
        let values = vars(&[("PORT", "9000")]);
        let names = authorized(&["PORT"]);

        let mut config = AppConfig::default();
        let bound = bind(&mut config, "file", &names, |k| values.get(k).cloned()).unwrap();

        assert_eq!(bound, 0);
        assert_eq!(config.server.port, 0);
    }

    #[test]
    fn test_bind_missing_value_leaves_field() {
        let names = authorized(&["HOST"]);
        let mut config = AppConfig::default();
        config.server.host = "localhost".to_string();

        bind(&mut config, "env", &names, |_| None).unwrap();
        assert_eq!(config.server.host, "localhost");
    }

    #[test]
    fn test_bind_parse_error_names_field() {
        let values = vars(&[("APP_NAME", "demo"), ("PORT", "eighty"), ("TLS_CERT", "c")]);
        let names = authorized(&["APP_NAME", "PORT", "TLS_CERT"]);

        let mut config = AppConfig::default();
        let err = bind(&mut config, "env", &names, |k| values.get(k).cloned()).unwrap_err();

        assert_eq!(err.field(), "server.port");
        assert!(err.to_string().contains("PORT"));
        assert!(err.to_string().contains("eighty"));
        // 出错之前的字段已赋值，之后的字段不再处理
        assert_eq!(config.name, "demo");
        assert_eq!(config.server.tls.cert, "");
    }

    #[test]
    fn test_bind_bool_parse_error() {
        let values = vars(&[("TLS_ENABLED", "yes")]);
        let names = authorized(&["TLS_ENABLED"]);

        let mut config = AppConfig::default();
        let err = bind(&mut config, "env", &names, |k| values.get(k).cloned()).unwrap_err();
        assert_eq!(err.field(), "server.tls.enabled");
    }

    #[test]
    fn test_bind_float_is_noop() {
        let values = vars(&[("RATIO", "0.75")]);
        let names = authorized(&["RATIO"]);

        let mut config = AppConfig {
            ratio: 0.5,
            ..Default::default()
        };
        let bound = bind(&mut config, "env", &names, |k| values.get(k).cloned()).unwrap();

        assert_eq!(bound, 0);
        assert_eq!(config.ratio, 0.5);
    }
}
