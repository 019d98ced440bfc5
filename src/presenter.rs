//! 配置展示
//!
//! 把合并后的配置渲染成缩进文本或 JSON 对象，支持按 `show_last_symbols` 掩码

use serde_json::{Map, Value as JsonValue};

use crate::schema::{Configurable, FieldKind, FieldMeta, FieldValue, Visitor};

/// 掩码字符串，只保留末尾 `show_last` 个字符
///
/// 字符串不长于 `show_last` 时整体掩码，避免短密码原样输出
pub fn mask_string(value: &str, show_last: usize) -> String {
    let len = value.chars().count();
    if len <= show_last {
        return "*".repeat(len);
    }
    let visible: String = value.chars().skip(len - show_last).collect();
    format!("{}{}", "*".repeat(len - show_last), visible)
}

/// 渲染为缩进文本
///
/// ```text
/// AppConfig
///   name: demo
///   database:
///     password: ******rd
/// ```
pub fn render<T: Configurable>(target: &T) -> String {
    let mut renderer = TextRenderer {
        lines: vec![short_type_name::<T>().to_string()],
        indent: 1,
    };
    target.walk(&mut renderer);
    renderer.lines.join("\n")
}

fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    // 去掉泛型参数后取最后一段
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

struct TextRenderer {
    lines: Vec<String>,
    indent: usize,
}

impl TextRenderer {
    fn prefix(&self) -> String {
        "  ".repeat(self.indent)
    }
}

impl Visitor for TextRenderer {
    fn enter(&mut self, field: &FieldMeta) {
        self.lines.push(format!("{}{}:", self.prefix(), field.name));
        self.indent += 1;
    }

    fn leave(&mut self, _field: &FieldMeta) {
        self.indent -= 1;
    }

    fn visit(&mut self, field: &FieldMeta, value: &dyn FieldValue) {
        let display = match field.show_last_symbols {
            Some(n) if value.kind() == FieldKind::String => mask_string(&value.to_display(), n),
            _ => value.to_display(),
        };
        self.lines
            .push(format!("{}{}: {}", self.prefix(), field.name, display));
    }
}

/// 生成以字段名为键的嵌套 JSON 对象，不做掩码
pub fn snapshot<T: Configurable>(target: &T) -> Map<String, JsonValue> {
    let mut builder = SnapshotBuilder {
        stack: vec![Map::new()],
    };
    target.walk(&mut builder);
    builder.stack.pop().unwrap_or_default()
}

struct SnapshotBuilder {
    stack: Vec<Map<String, JsonValue>>,
}

impl Visitor for SnapshotBuilder {
    fn enter(&mut self, _field: &FieldMeta) {
        self.stack.push(Map::new());
    }

    fn leave(&mut self, field: &FieldMeta) {
        let Some(child) = self.stack.pop() else {
            return;
        };
        if let Some(parent) = self.stack.last_mut() {
            parent.insert(field.name.to_string(), JsonValue::Object(child));
        }
    }

    fn visit(&mut self, field: &FieldMeta, value: &dyn FieldValue) {
        if let Some(current) = self.stack.last_mut() {
            current.insert(field.name.to_string(), value.to_json());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Configurable;
    use serde_json::json;

    #[derive(Debug, Default, Configurable)]
    struct Credentials {
        #[config(env = "DB_USER")]
        user: String,
        #[config(env = "DB_PASSWORD", show_last_symbols = 2)]
        password: String,
    }

    #[derive(Debug, Default, Configurable)]
    struct AppConfig {
        #[config(env = "NAME")]
        name: String,
        #[config(env = "PORT")]
        port: i64,
        #[config(env = "DEBUG")]
        debug: bool,
        #[config(skip)]
        #[allow(dead_code)]
        internal: Vec<String>,
        credentials: Credentials,
    }

    #[derive(Debug, Default, Configurable)]
    struct ClusterConfig {
        #[config(env = "PIN", show_last_symbols = 1)]
        pin: i64,
        #[config(env = "HOSTS")]
        hosts: Vec<String>,
        alias: Option<String>,
    }

    fn sample() -> AppConfig {
        AppConfig {
            name: "demo".to_string(),
            port: 8080,
            debug: true,
            internal: vec!["hidden".to_string()],
            credentials: Credentials {
                user: "admin".to_string(),
                password: "s3cret-pw".to_string(),
            },
        }
    }

    #[test]
    fn test_mask_string() {
        assert_eq!(mask_string("password", 3), "*****ord");
        assert_eq!(mask_string("password", 0), "********");
        assert_eq!(mask_string("abc", 3), "***");
        assert_eq!(mask_string("", 4), "");
        assert_eq!(mask_string("密码很长", 1), "***长");
    }

    #[test]
    fn test_render() {
        let text = render(&sample());
        let expected = [
            "AppConfig",
            "  name: demo",
            "  port: 8080",
            "  debug: true",
            "  credentials:",
            "    user: admin",
            "    password: *******pw",
        ]
        .join("\n");
        assert_eq!(text, expected);
        assert!(!text.contains("hidden"));
    }

    #[test]
    fn test_snapshot() {
        let map = snapshot(&sample());
        assert_eq!(
            JsonValue::Object(map),
            json!({
                "name": "demo",
                "port": 8080,
                "debug": true,
                "credentials": {
                    "user": "admin",
                    "password": "s3cret-pw"
                }
            })
        );
    }

    #[test]
    fn test_mask_only_applies_to_strings() {
        let config = ClusterConfig {
            pin: 1234,
            hosts: vec!["a".to_string(), "b".to_string()],
            alias: None,
        };
        assert_eq!(
            render(&config),
            "ClusterConfig\n  pin: 1234\n  hosts: [\"a\",\"b\"]\n  alias: null"
        );
        assert_eq!(
            JsonValue::Object(snapshot(&config)),
            json!({"pin": 1234, "hosts": ["a", "b"], "alias": null})
        );
    }
}
