//! cfgmerge - 多来源配置合并
//!
//! 把环境变量、配置文件、内存键值等多个来源的配置合并到同一个强类型配置对象中，
//! 由字段注解决定每个字段从哪个来源读取。
//!
//! ## 模块
//!
//! - **schema**: 派生宏生成的字段描述表和访问器
//! - **binder**: 按注解把字符串值绑定到字段
//! - **source**: 配置源抽象及 EnvSource / FileSource / StaticSource
//! - **merger**: 顺序加载、默认值、必填校验和监听生命周期
//! - **presenter**: 带掩码的配置展示
//! - **probe**: 连通性探测，断开时停止监听
//!
//! ## 示例
//!
//! ```no_run
//! use cfgmerge::{Configurable, EnvSource, Merger};
//!
//! #[derive(Debug, Default, Configurable)]
//! struct DatabaseConfig {
//!     #[config(env = "DB_HOST", required)]
//!     host: String,
//!     #[config(env = "DB_PASSWORD", show_last_symbols = 2)]
//!     password: String,
//! }
//!
//! #[derive(Debug, Default, Configurable)]
//! struct AppConfig {
//!     #[config(env = "PORT", default = "8080")]
//!     port: i64,
//!     database: DatabaseConfig,
//! }
//!
//! let mut merger = Merger::new(AppConfig::default()).unwrap();
//! merger.add_source(EnvSource::with_variables(["PORT", "DB_HOST", "DB_PASSWORD"]));
//! merger.run().unwrap();
//! merger.print_config();
//! ```

extern crate self as cfgmerge;

pub mod binder;
pub mod cancel;
pub mod config;
pub mod error;
pub mod macros;
pub mod merger;
pub mod presenter;
pub mod probe;
pub mod schema;
pub mod serde_duration;
pub mod source;
pub mod target;
pub mod validate;

// 重新导出主要的公共 API
pub use binder::bind;
pub use cancel::{cancel_pair, CancelHandle, CancelToken};
pub use config::MergerConfig;
pub use error::{AggregateError, BindError, MergeError, ValueError};
pub use merger::{Merger, MergerState};
pub use presenter::mask_string;
pub use probe::{spawn_disconnect_probe, Probe, ProbeConfig};
pub use schema::{Configurable, Field, FieldKind, FieldMeta, FieldValue};
pub use source::{
    EnvSource, EnvSourceConfig, FileSource, FileSourceConfig, Source, SourceBase, SourceOptions,
    StaticHandle, StaticSource, StaticSourceConfig, WatchHandler,
};
pub use target::SharedTarget;

// 重新导出派生宏
pub use cfgmerge_macros::Configurable;
pub use crossbeam::sync::WaitGroup;
