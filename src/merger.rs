//! 配置合并器
//!
//! 持有目标配置对象和有序的 source 列表：
//! - 按注册顺序依次加载，后注册的 source 覆盖先注册的
//! - 所有 source 的错误汇总后一起返回，不会因为某一个失败而中断
//! - 加载成功后填充默认值并检查必填字段
//! - 监听阶段每个 source 在独立线程中运行，`stop_watch` 后等待全部退出

use crossbeam::channel::{bounded, Receiver, Sender};
use crossbeam::sync::WaitGroup;
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use tracing::{debug, info, warn};

use crate::cancel::cancel_pair;
use crate::config::MergerConfig;
use crate::error::{AggregateError, MergeError};
use crate::presenter;
use crate::schema::Configurable;
use crate::source::Source;
use crate::target::SharedTarget;
use crate::validate;

/// 合并器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergerState {
    Created,
    Loading,
    Validating,
    Ready,
    Failed,
}

/// 配置合并器
///
/// # 示例
/// ```no_run
/// use cfgmerge::{Configurable, EnvSource, Merger};
/// use std::sync::Arc;
///
/// #[derive(Debug, Default, Configurable)]
/// struct AppConfig {
///     #[config(env = "PORT", required, default = "8080")]
///     port: i64,
/// }
///
/// let mut merger = Merger::new(AppConfig::default()).unwrap();
/// merger.add_source(EnvSource::with_variables(["PORT"]));
///
/// let merger = Arc::new(merger);
/// let watching = merger.clone();
/// let handle = std::thread::spawn(move || watching.run_watch());
///
/// // ... 之后在其他线程中停止监听
/// merger.stop_watch().unwrap();
/// handle.join().unwrap().unwrap();
/// ```
pub struct Merger<T: Configurable> {
    target: SharedTarget<T>,
    sources: Vec<Box<dyn Source<T>>>,
    state: Mutex<MergerState>,
    /// 当前监听会话，只由开启它的 `run_watch` 清理
    session: Mutex<Option<Session>>,
}

/// 监听会话
struct Session {
    /// 停止请求
    stop: Sender<()>,
    /// 会话结束时发送端被 drop，`stop_watch` 据此等待
    finished: Receiver<()>,
}

/// 会话所有权，drop 时先清理会话再释放 `finished` 的发送端
struct SessionGuard<'a> {
    session: &'a Mutex<Option<Session>>,
    _finished: Sender<()>,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        lock(self.session).take();
    }
}

fn lock<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T: Configurable> Merger<T> {
    /// 创建合并器，注解不合法时返回 `MergeError::InvalidSchema`
    pub fn new(target: T) -> Result<Self, MergeError> {
        validate::check_schema(&target)?;
        Ok(Self {
            target: SharedTarget::new(target),
            sources: Vec::new(),
            state: Mutex::new(MergerState::Created),
            session: Mutex::new(None),
        })
    }

    /// 根据配置创建合并器并注册其中描述的所有 source
    pub fn with_config(target: T, config: MergerConfig) -> Result<Self, MergeError> {
        let mut merger = Self::new(target)?;
        for source in config.build_sources::<T>() {
            merger.add_boxed_source(source);
        }
        Ok(merger)
    }

    /// 注册 source，并注入共享的目标对象
    pub fn add_source<S: Source<T> + 'static>(&mut self, source: S) -> &mut Self {
        self.add_boxed_source(Box::new(source))
    }

    pub fn add_boxed_source(&mut self, mut source: Box<dyn Source<T>>) -> &mut Self {
        source.set_target(self.target.clone());
        for (tag, variable, earlier) in self.overlaps(source.as_ref()) {
            debug!(
                source = source.name(),
                earlier = %earlier,
                tag = %tag,
                variable = %variable,
                "variable already claimed, the later source wins"
            );
        }
        self.sources.push(source);
        self
    }

    /// 与已注册 source 重叠的 (标签, 变量, 已注册 source) 列表
    fn overlaps(&self, source: &dyn Source<T>) -> Vec<(String, String, String)> {
        let mut result = Vec::new();
        for existing in &self.sources {
            if existing.tag() != source.tag() {
                continue;
            }
            for variable in source.tag_ids().intersection(existing.tag_ids()) {
                result.push((
                    source.tag().to_string(),
                    variable.clone(),
                    existing.name().to_string(),
                ));
            }
        }
        result
    }

    /// 被多个 source 声明的变量：(标签, 变量) -> 按注册顺序排列的 source 名称
    pub fn claimed_by_many(&self) -> HashMap<(String, String), Vec<String>> {
        let mut claims: HashMap<(String, String), Vec<String>> = HashMap::new();
        for source in &self.sources {
            for variable in source.tag_ids() {
                claims
                    .entry((source.tag().to_string(), variable.clone()))
                    .or_default()
                    .push(source.name().to_string());
            }
        }
        claims.retain(|_, names| names.len() > 1);
        claims
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn state(&self) -> MergerState {
        *lock(&self.state)
    }

    fn set_state(&self, state: MergerState) {
        *lock(&self.state) = state;
    }

    /// 共享目标对象的句柄
    pub fn target(&self) -> SharedTarget<T> {
        self.target.clone()
    }

    /// 复制当前配置
    pub fn snapshot(&self) -> T
    where
        T: Clone,
    {
        self.target.read().clone()
    }

    /// 依次加载所有 source，然后填充默认值并检查必填字段
    pub fn run(&self) -> Result<(), MergeError> {
        self.load_all()?;
        self.validate()
    }

    fn load_all(&self) -> Result<(), MergeError> {
        self.set_state(MergerState::Loading);

        let mut errors = AggregateError::new();
        for source in &self.sources {
            info!(source = source.name(), "loading source");
            if let Err(err) = source.load() {
                warn!(source = source.name(), error = %format!("{:#}", err), "failed to load source");
                errors.push(err.context(format!("source `{}`", source.name())));
            }
        }

        if let Err(errors) = errors.into_result() {
            self.set_state(MergerState::Failed);
            return Err(MergeError::Load(errors));
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), MergeError> {
        self.set_state(MergerState::Validating);

        let result = {
            let mut target = self.target.write();
            validate::apply_defaults(&mut *target)
                .map_err(MergeError::from)
                .and_then(|applied| {
                    debug!(applied, "defaults applied");
                    validate::check_required(&*target)
                })
        };

        match result {
            Ok(()) => {
                self.set_state(MergerState::Ready);
                Ok(())
            }
            Err(err) => {
                self.set_state(MergerState::Failed);
                Err(err)
            }
        }
    }

    /// 以字段名为键的配置快照
    pub fn final_config(&self) -> Map<String, JsonValue> {
        presenter::snapshot(&*self.target.read())
    }

    /// 渲染为带掩码的缩进文本
    pub fn render(&self) -> String {
        presenter::render(&*self.target.read())
    }

    /// 打印配置到标准输出
    pub fn print_config(&self) {
        println!("{}", self.render());
    }

    pub fn is_watching(&self) -> bool {
        lock(&self.session).is_some()
    }

    /// 开启监听会话，返回停止信号的接收端和会话所有权
    fn begin_session(&self) -> Result<(Receiver<()>, SessionGuard<'_>), MergeError> {
        let mut session = lock(&self.session);
        if session.is_some() {
            return Err(MergeError::AlreadyWatching);
        }
        let (stop_tx, stop_rx) = bounded(1);
        let (finished_tx, finished_rx) = bounded(0);
        *session = Some(Session {
            stop: stop_tx,
            finished: finished_rx,
        });
        Ok((
            stop_rx,
            SessionGuard {
                session: &self.session,
                _finished: finished_tx,
            },
        ))
    }

    /// 加载配置后启动所有 source 的监听，阻塞直到 `stop_watch` 被调用
    ///
    /// 加载或校验失败时直接返回错误，不启动任何监听。
    /// 停止时向每个 source 发送取消信号，等待全部退出后才返回。
    /// 会话在退出前一直有效，期间再次调用返回 `MergeError::AlreadyWatching`
    pub fn run_watch(&self) -> Result<(), MergeError> {
        let (stop_rx, guard) = self.begin_session()?;
        self.run()?;

        let result = thread::scope(|scope| {
            let wait_group = WaitGroup::new();
            let mut cancels = Vec::with_capacity(self.sources.len());
            let mut watchers = Vec::with_capacity(self.sources.len());

            for source in &self.sources {
                let source = source.as_ref();
                let (cancel, token) = cancel_pair();
                let done = wait_group.clone();
                cancels.push(cancel);
                watchers.push(scope.spawn(move || {
                    debug!(source = source.name(), "watch started");
                    let result = source.watch(token, done);
                    debug!(source = source.name(), "watch exited");
                    result.map_err(|error| MergeError::Watch {
                        source_name: source.name().to_string(),
                        error,
                    })
                }));
            }
            info!(sources = self.sources.len(), "watching sources");

            // 会话期间发送端一直保存在 session 中，recv 只会被 stop_watch 唤醒
            let _ = stop_rx.recv();
            info!("stop requested, cancelling watches");

            for cancel in cancels {
                cancel.cancel();
            }
            wait_group.wait();

            let mut first_error = None;
            for (watcher, source) in watchers.into_iter().zip(&self.sources) {
                let outcome = watcher.join().unwrap_or_else(|_| {
                    Err(MergeError::Watch {
                        source_name: source.name().to_string(),
                        error: anyhow::anyhow!("watch panicked"),
                    })
                });
                if let Err(err) = outcome {
                    warn!(error = %err, "watch ended with error");
                    first_error.get_or_insert(err);
                }
            }
            first_error.map_or(Ok(()), Err)
        });

        info!("all watches exited");
        drop(guard);
        result
    }

    /// 停止当前的监听会话，阻塞直到所有 source 的监听都已退出
    ///
    /// 没有活跃会话时返回 `MergeError::NotWatching`。
    /// 不能在 source 的 `watch` 内部调用，否则会等待自己退出
    pub fn stop_watch(&self) -> Result<(), MergeError> {
        let finished = {
            let session = lock(&self.session);
            let session = session.as_ref().ok_or(MergeError::NotWatching)?;
            // 已有未处理的停止请求时忽略
            let _ = session.stop.try_send(());
            session.finished.clone()
        };
        let _ = finished.recv();
        Ok(())
    }
}
