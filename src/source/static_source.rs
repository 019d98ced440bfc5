//! 内存配置源
//!
//! 以固定的键值表作为输入，标签由调用方指定。通过 `StaticHandle::set` 更新值后，
//! 监听中的 source 会立即重新绑定。适合作为覆盖层或测试替身

use anyhow::{anyhow, Result};
use crossbeam::channel::{bounded, Receiver, Sender};
use crossbeam::sync::WaitGroup;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, warn};

use super::{Source, SourceBase, WatchHandler};
use crate::binder::bind;
use crate::cancel::CancelToken;
use crate::schema::Configurable;
use crate::target::SharedTarget;
use crate::{impl_box_from, impl_from};

/// 内存配置源的配置
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct StaticSourceConfig {
    /// 读取的注解标签
    #[serde(default = "default_tag")]
    pub tag: String,
    /// 变量名到值的映射，键即为该 source 负责的变量
    #[serde(default)]
    pub values: HashMap<String, String>,
}

fn default_tag() -> String {
    "static".to_string()
}

struct Shared {
    values: RwLock<HashMap<String, String>>,
    updates: Sender<()>,
}

/// 更新内存配置源的句柄
#[derive(Clone)]
pub struct StaticHandle {
    shared: Arc<Shared>,
}

impl StaticHandle {
    /// 更新变量的值，只允许更新 source 负责的变量
    pub fn set(&self, key: &str, value: impl Into<String>) -> Result<()> {
        {
            let mut values = self
                .shared
                .values
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let slot = values
                .get_mut(key)
                .ok_or_else(|| anyhow!("variable `{}` is not claimed by this source", key))?;
            *slot = value.into();
        }
        // 已有未处理的通知时，监听循环重新加载会读到最新的值
        let _ = self.shared.updates.try_send(());
        Ok(())
    }
}

/// 内存配置源
pub struct StaticSource<T> {
    tag: String,
    shared: Arc<Shared>,
    updates: Receiver<()>,
    base: SourceBase<T>,
}

impl<T: Configurable> StaticSource<T> {
    pub fn new(config: StaticSourceConfig) -> Self {
        let (tx, rx) = bounded(1);
        let base = SourceBase::new(config.values.keys().cloned());
        Self {
            tag: config.tag,
            shared: Arc::new(Shared {
                values: RwLock::new(config.values),
                updates: tx,
            }),
            updates: rx,
            base,
        }
    }

    /// 使用指定标签和键值对创建
    pub fn with_values<I, K, V>(tag: &str, values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::new(StaticSourceConfig {
            tag: tag.to_string(),
            values: values
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        })
    }

    pub fn with_watch_handler(mut self, handler: WatchHandler) -> Self {
        self.base.set_watch_handler(handler);
        self
    }

    pub fn handle(&self) -> StaticHandle {
        StaticHandle {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl_from!(<T: Configurable> StaticSourceConfig => StaticSource<T>);
impl_box_from!(<T: Configurable> StaticSource<T> => dyn Source<T>);

impl<T: Configurable> Source<T> for StaticSource<T> {
    fn name(&self) -> &str {
        "static"
    }

    fn tag(&self) -> &str {
        &self.tag
    }

    fn load(&self) -> Result<()> {
        let target = self.base.target(self.name())?;
        let values = self
            .shared
            .values
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let bound = bind(
            &mut *target.write(),
            &self.tag,
            self.base.tag_ids(),
            |key| values.get(key).cloned(),
        )?;
        debug!(source = self.name(), tag = %self.tag, bound, "static values bound");
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
        loop {
            crossbeam::select! {
                recv(cancel.receiver()) -> _ => break,
                recv(self.updates) -> update => {
                    if update.is_err() {
                        break;
                    }
                    // 合并排队中的更新
                    while self.updates.try_recv().is_ok() {}
                    match self.load() {
                        Ok(()) => self.base.notify_changed(),
                        Err(err) => {
                            warn!(source = self.name(), error = %format!("{:#}", err), "reload failed");
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::cancel_pair;
    use crate::Configurable;
    use crossbeam::channel::bounded;
    use std::thread;

    #[derive(Debug, Default, Configurable)]
    struct FeatureFlags {
        #[config(flag = "beta")]
        beta: bool,
        #[config(flag = "limit")]
        limit: u32,
    }

    #[test]
    fn test_static_source_load() -> Result<()> {
        let target = SharedTarget::new(FeatureFlags::default());
        let mut source = StaticSource::with_values("flag", [("beta", "true"), ("limit", "10")]);
        source.set_target(target.clone());
        source.load()?;

        assert!(target.read().beta);
        assert_eq!(target.read().limit, 10);
        assert_eq!(source.tag(), "flag");
        assert_eq!(source.tag_ids().len(), 2);
        Ok(())
    }

    #[test]
    fn test_handle_rejects_unclaimed_variable() {
        let source: StaticSource<FeatureFlags> = StaticSource::with_values("flag", [("beta", "true")]);
        let handle = source.handle();
        assert!(handle.set("beta", "false").is_ok());
        assert!(handle.set("limit", "1").is_err());
    }

    #[test]
    fn test_updates_coalesce_without_watch() {
        let source: StaticSource<FeatureFlags> =
            StaticSource::with_values("flag", [("beta", "false"), ("limit", "1")]);
        let handle = source.handle();
        for i in 0..100 {
            handle.set("limit", i.to_string()).unwrap();
        }
        assert_eq!(source.updates.len(), 1);
    }

    #[test]
    fn test_static_source_watch_rebinds_on_set() -> Result<()> {
        let target = SharedTarget::new(FeatureFlags::default());
        let (changed_tx, changed_rx) = bounded(16);
        let mut source = StaticSource::with_values("flag", [("beta", "false"), ("limit", "1")])
            .with_watch_handler(Box::new(move || {
                let _ = changed_tx.send(());
            }));
        source.set_target(target.clone());
        source.load()?;
        let handle = source.handle();

        let (cancel, token) = cancel_pair();
        let wait_group = WaitGroup::new();
        let done = wait_group.clone();

        thread::scope(|scope| {
            let watcher = scope.spawn(|| source.watch(token, done));

            handle.set("limit", "42").unwrap();
            changed_rx.recv().unwrap();
            assert_eq!(target.read().limit, 42);

            cancel.cancel();
            wait_group.wait();
            assert!(watcher.join().unwrap().is_ok());
        });
        Ok(())
    }
}
