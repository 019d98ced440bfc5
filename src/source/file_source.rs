//! 文件配置源
//!
//! 支持 JSON/YAML/TOML 格式，文件内容展开为 `server.port` 形式的键后按
//! `#[config(file = "server.port")]` 注解绑定。支持监听文件变化并自动重新绑定

use anyhow::{anyhow, Context, Result};
use crossbeam::channel::unbounded;
use crossbeam::sync::WaitGroup;
use notify::{recommended_watcher, Event, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{Source, SourceBase, WatchHandler};
use crate::binder::bind;
use crate::cancel::CancelToken;
use crate::schema::Configurable;
use crate::target::SharedTarget;
use crate::{impl_box_from, impl_from};

/// 文件源读取的注解标签
pub const FILE_TAG: &str = "file";

/// 文件配置源的配置
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct FileSourceConfig {
    /// 配置文件路径，扩展名决定解析格式
    pub path: String,
    /// 允许绑定的键，如 "server.port"
    #[serde(default)]
    pub variables: Vec<String>,
    /// 事件防抖延迟，单位：毫秒
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_debounce_ms() -> u64 {
    100
}

/// 文件配置源
///
/// # 示例
/// ```no_run
/// use cfgmerge::{Configurable, FileSource, FileSourceConfig, Merger};
///
/// #[derive(Debug, Default, Configurable)]
/// struct AppConfig {
///     #[config(file = "server.port")]
///     port: i64,
/// }
///
/// let mut merger = Merger::new(AppConfig::default()).unwrap();
/// merger.add_source(FileSource::new(FileSourceConfig {
///     path: "config/app.yaml".to_string(),
///     variables: vec!["server.port".to_string()],
///     debounce_ms: 100,
/// }));
/// merger.run().unwrap();
/// ```
pub struct FileSource<T> {
    path: PathBuf,
    debounce: Duration,
    base: SourceBase<T>,
}

impl<T: Configurable> FileSource<T> {
    pub fn new(config: FileSourceConfig) -> Self {
        Self {
            path: config.path.into(),
            debounce: Duration::from_millis(config.debounce_ms),
            base: SourceBase::new(config.variables),
        }
    }

    pub fn with_watch_handler(mut self, handler: WatchHandler) -> Self {
        self.base.set_watch_handler(handler);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取并展开配置文件
    fn read_values(&self) -> Result<HashMap<String, String>> {
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        let ext = self
            .path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default();
        let value = parse_config(&content, ext)
            .with_context(|| format!("failed to parse {}", self.path.display()))?;

        let mut values = HashMap::new();
        flatten("", &value, &mut values);
        Ok(values)
    }

    /// 文件被修改后重新绑定
    fn reload(&self) {
        match self.load() {
            Ok(()) => {
                info!(source = self.name(), path = %self.path.display(), "config file reloaded");
                self.base.notify_changed();
            }
            Err(err) => {
                warn!(source = self.name(), path = %self.path.display(), error = %format!("{:#}", err), "reload failed");
            }
        }
    }

    /// 事件是否与当前文件相关
    fn is_own_event(&self, event: &Event) -> bool {
        let Some(file_name) = self.path.file_name() else {
            return false;
        };
        event
            .paths
            .iter()
            .any(|p| p.file_name() == Some(file_name))
    }
}

impl_from!(<T: Configurable> FileSourceConfig => FileSource<T>);
impl_box_from!(<T: Configurable> FileSource<T> => dyn Source<T>);

/// 根据扩展名解析配置
fn parse_config(content: &str, ext: &str) -> Result<JsonValue> {
    match ext {
        "json" => Ok(serde_json::from_str(content)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(content)?),
        "toml" => Ok(toml::from_str(content)?),
        _ => Err(anyhow!("unsupported config format: {:?}", ext)),
    }
}

/// 把嵌套对象展开为点分隔的键，标量转换为字符串，null 跳过
fn flatten(prefix: &str, value: &JsonValue, out: &mut HashMap<String, String>) {
    match value {
        JsonValue::Object(map) => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten(&path, child, out);
            }
        }
        JsonValue::Null => {}
        JsonValue::String(s) => {
            out.insert(prefix.to_string(), s.clone());
        }
        JsonValue::Bool(b) => {
            out.insert(prefix.to_string(), b.to_string());
        }
        JsonValue::Number(n) => {
            out.insert(prefix.to_string(), n.to_string());
        }
        JsonValue::Array(_) => {
            out.insert(prefix.to_string(), value.to_string());
        }
    }
}

impl<T: Configurable> Source<T> for FileSource<T> {
    fn name(&self) -> &str {
        "file"
    }

    fn tag(&self) -> &str {
        FILE_TAG
    }

    fn load(&self) -> Result<()> {
        let target = self.base.target(self.name())?;
        let values = self.read_values()?;
        let bound = bind(
            &mut *target.write(),
            FILE_TAG,
            self.base.tag_ids(),
            |key| values.get(key).cloned(),
        )?;
        debug!(source = self.name(), path = %self.path.display(), bound, "config file bound");
        Ok(())
    }

    fn set_target(&mut self, target: SharedTarget<T>) {
        self.base.set_target(target);
    }

    fn tag_ids(&self) -> &HashSet<String> {
        self.base.tag_ids()
    }

    fn watch(&self, cancel: CancelToken, done: WaitGroup) -> Result<()> {
        let _done = done;

        // 监听父目录，编辑器通过重命名替换文件时也能收到事件
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let (event_tx, event_rx) = unbounded();
        let mut watcher = recommended_watcher(move |res: notify::Result<Event>| {
            if let Ok(event) = res {
                let _ = event_tx.send(event);
            }
        })
        .context("failed to create file watcher")?;
        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("failed to watch {}", dir.display()))?;
        debug!(source = self.name(), path = %self.path.display(), "watching config file");

        loop {
            crossbeam::select! {
                recv(cancel.receiver()) -> _ => break,
                recv(event_rx) -> event => {
                    let Ok(event) = event else {
                        break;
                    };
                    if !self.is_own_event(&event) {
                        continue;
                    }
                    if event.kind.is_remove() {
                        warn!(source = self.name(), path = %self.path.display(), "config file removed, keeping current values");
                        continue;
                    }
                    if !(event.kind.is_modify() || event.kind.is_create()) {
                        continue;
                    }

                    // 防抖：等待期间被取消则直接退出
                    if cancel.wait_timeout(self.debounce) {
                        break;
                    }
                    while event_rx.try_recv().is_ok() {}

                    if self.path.exists() {
                        self.reload();
                    }
                }
            }
        }

        drop(watcher);
        Ok(())
    }
}
