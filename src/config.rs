//! 合并器的声明式配置
//!
//! 以 `{ "type": ..., "options": ... }` 的形式描述 source 列表，
//! 可以从 JSON5 / YAML / TOML 读取

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::probe::ProbeConfig;
use crate::schema::Configurable;
use crate::source::{Source, SourceOptions};

/// 合并器配置
///
/// # 示例
/// ```
/// use cfgmerge::MergerConfig;
///
/// let config = MergerConfig::from_yaml(r#"
/// sources:
///   - type: FileSource
///     options:
///       path: config/app.yaml
///       variables: [server.port]
///   - type: EnvSource
///     options:
///       variables: [PORT]
/// "#).unwrap();
/// assert_eq!(config.sources.len(), 2);
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct MergerConfig {
    /// 按优先级从低到高排列的 source
    #[serde(default)]
    pub sources: Vec<SourceOptions>,
    /// 可选的连通性探测
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe: Option<ProbeConfig>,
}

impl MergerConfig {
    /// 从 JSON 字符串创建（支持 JSON5 格式）
    pub fn from_json(json_str: &str) -> Result<Self> {
        Ok(json5::from_str(json_str)?)
    }

    pub fn from_yaml(yaml_str: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml_str)?)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// 按声明顺序创建所有 source
    pub fn build_sources<T: Configurable>(&self) -> Vec<Box<dyn Source<T>>> {
        self.sources
            .iter()
            .cloned()
            .map(SourceOptions::build::<T>)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{EnvSourceConfig, StaticSourceConfig};
    use crate::Configurable;
    use std::time::Duration;

    #[derive(Debug, Default, Configurable)]
    struct AppConfig {
        #[config(env = "PORT", file = "server.port")]
        port: i64,
    }

    #[test]
    fn test_from_json5() {
        let config = MergerConfig::from_json(
            r#"{
                // 先读文件，再用环境变量覆盖
                sources: [
                    { type: "FileSource", options: { path: "app.json", variables: ["server.port"] } },
                    { type: "EnvSource", options: { variables: ["PORT"] } },
                ],
                probe: { address: "127.0.0.1:6379", interval: "2s" },
            }"#,
        )
        .unwrap();

        assert_eq!(config.sources.len(), 2);
        assert_eq!(
            config.sources[1],
            SourceOptions::EnvSource(EnvSourceConfig {
                variables: vec!["PORT".to_string()]
            })
        );
        let probe = config.probe.unwrap();
        assert_eq!(probe.interval, Duration::from_secs(2));
        assert_eq!(probe.connect_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_from_toml() {
        let config = MergerConfig::from_toml(
            r#"
[[sources]]
type = "StaticSource"

[sources.options]
tag = "env"

[sources.options.values]
PORT = "8080"
"#,
        )
        .unwrap();

        match &config.sources[0] {
            SourceOptions::StaticSource(StaticSourceConfig { tag, values }) => {
                assert_eq!(tag, "env");
                assert_eq!(values["PORT"], "8080");
            }
            other => panic!("unexpected source: {:?}", other),
        }
    }

    #[test]
    fn test_build_sources_keeps_order() {
        let config = MergerConfig::from_yaml(
            r#"
sources:
  - type: FileSource
    options:
      path: app.yaml
  - type: EnvSource
    options:
      variables: [PORT]
"#,
        )
        .unwrap();

        let sources = config.build_sources::<AppConfig>();
        let names: Vec<_> = sources.iter().map(|s| s.name().to_string()).collect();
        assert_eq!(names, vec!["file", "env"]);
    }

    #[test]
    fn test_to_json_round_trip() {
        let config = MergerConfig {
            sources: vec![SourceOptions::EnvSource(EnvSourceConfig {
                variables: vec!["PORT".to_string()],
            })],
            probe: None,
        };
        let json = config.to_json().unwrap();
        assert!(!json.contains("probe"));
        assert_eq!(MergerConfig::from_json(&json).unwrap(), config);
    }
}
