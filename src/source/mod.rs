//! 配置源抽象
//!
//! 每个 source 负责目标配置对象中的一部分字段：
//! - `load` 同步地把自己负责的字段绑定到共享的目标对象上
//! - `watch` 监听输入变化并重新绑定，直到收到取消信号

pub mod env_source;
pub mod file_source;
pub mod static_source;

pub use env_source::{EnvSource, EnvSourceConfig, ENV_TAG};
pub use file_source::{FileSource, FileSourceConfig, FILE_TAG};
pub use static_source::{StaticHandle, StaticSource, StaticSourceConfig};

use anyhow::Result;
use crossbeam::sync::WaitGroup;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::cancel::CancelToken;
use crate::error::MergeError;
use crate::schema::Configurable;
use crate::target::SharedTarget;

/// 重新加载成功后的回调
pub type WatchHandler = Box<dyn Fn() + Send + Sync>;

/// 配置源
///
/// # 生命周期
/// 1. 调用方构造 source
/// 2. `Merger::add_source` 调用 `set_target` 注入共享目标对象
/// 3. Merger 按注册顺序调用 `load`
/// 4. `Merger::run_watch` 在独立线程中调用 `watch`，取消后返回
pub trait Source<T: Configurable>: Send + Sync {
    /// 用于日志和错误信息的名称
    fn name(&self) -> &str;

    /// 读取的注解标签，如 "env"
    fn tag(&self) -> &str;

    /// 绑定自己负责的字段，多次调用结果一致
    fn load(&self) -> Result<()>;

    /// 注入共享的目标对象，在 `load` / `watch` 之前调用
    fn set_target(&mut self, target: SharedTarget<T>);

    /// 声明负责的变量名
    fn tag_ids(&self) -> &HashSet<String>;

    /// 监听变化直到 `cancel` 被触发
    ///
    /// `done` 在返回时释放，Merger 据此确认所有监听都已退出。
    /// 默认实现没有需要监听的内容，直接等待取消
    fn watch(&self, cancel: CancelToken, done: WaitGroup) -> Result<()> {
        let _done = done;
        cancel.cancelled();
        Ok(())
    }
}

/// source 的公共状态：负责的变量、共享目标对象、回调
pub struct SourceBase<T> {
    tag_ids: HashSet<String>,
    target: Option<SharedTarget<T>>,
    watch_handler: Option<WatchHandler>,
}

impl<T> SourceBase<T> {
    pub fn new<I, S>(tag_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tag_ids: tag_ids.into_iter().map(Into::into).collect(),
            target: None,
            watch_handler: None,
        }
    }

    pub fn tag_ids(&self) -> &HashSet<String> {
        &self.tag_ids
    }

    pub fn set_target(&mut self, target: SharedTarget<T>) {
        self.target = Some(target);
    }

    /// 获取目标对象，未注入时返回 `MergeError::TargetNotSet`
    pub fn target(&self, source_name: &str) -> Result<&SharedTarget<T>, MergeError> {
        self.target.as_ref().ok_or_else(|| MergeError::TargetNotSet {
            source_name: source_name.to_string(),
        })
    }

    pub fn set_watch_handler(&mut self, handler: WatchHandler) {
        self.watch_handler = Some(handler);
    }

    /// 通知配置已重新加载
    pub fn notify_changed(&self) {
        if let Some(handler) = &self.watch_handler {
            handler();
        }
    }
}

/// 以 `{ "type": ..., "options": ... }` 形式描述的 source
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "type", content = "options")]
pub enum SourceOptions {
    EnvSource(EnvSourceConfig),
    FileSource(FileSourceConfig),
    StaticSource(StaticSourceConfig),
}

impl SourceOptions {
    /// 根据描述创建 source
    pub fn build<T: Configurable>(self) -> Box<dyn Source<T>> {
        match self {
            SourceOptions::EnvSource(config) => Box::new(EnvSource::<T>::from(config)).into(),
            SourceOptions::FileSource(config) => Box::new(FileSource::<T>::from(config)).into(),
            SourceOptions::StaticSource(config) => {
                Box::new(StaticSource::<T>::from(config)).into()
            }
        }
    }
}
