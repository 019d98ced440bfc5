//! 环境变量配置源
//!
//! 只绑定同时出现在变量列表和进程环境中的变量

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

use super::{Source, SourceBase, WatchHandler};
use crate::binder::bind;
use crate::schema::Configurable;
use crate::target::SharedTarget;
use crate::{impl_box_from, impl_from};

/// 环境变量源读取的注解标签
pub const ENV_TAG: &str = "env";

/// 环境变量源的配置
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct EnvSourceConfig {
    /// 允许绑定的环境变量名
    #[serde(default)]
    pub variables: Vec<String>,
}

/// 环境变量配置源
///
/// 字段通过 `#[config(env = "NAME")]` 声明绑定的环境变量。
/// 环境变量没有变化通知，`watch` 直接等待取消
///
/// # 示例
/// ```no_run
/// use cfgmerge::{Configurable, EnvSource, EnvSourceConfig, Merger};
///
/// #[derive(Debug, Default, Configurable)]
/// struct AppConfig {
///     #[config(env = "PORT", default = "8080")]
///     port: i64,
/// }
///
/// let mut merger = Merger::new(AppConfig::default()).unwrap();
/// merger.add_source(EnvSource::new(EnvSourceConfig {
///     variables: vec!["PORT".to_string()],
/// }));
/// merger.run().unwrap();
/// ```
pub struct EnvSource<T> {
    base: SourceBase<T>,
}

impl<T: Configurable> EnvSource<T> {
    pub fn new(config: EnvSourceConfig) -> Self {
        Self {
            base: SourceBase::new(config.variables),
        }
    }

    pub fn with_variables<I, S>(variables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            base: SourceBase::new(variables),
        }
    }

    pub fn with_watch_handler(mut self, handler: WatchHandler) -> Self {
        self.base.set_watch_handler(handler);
        self
    }
}

impl_from!(<T: Configurable> EnvSourceConfig => EnvSource<T>);
impl_box_from!(<T: Configurable> EnvSource<T> => dyn Source<T>);

impl<T: Configurable> Source<T> for EnvSource<T> {
    fn name(&self) -> &str {
        "env"
    }

    fn tag(&self) -> &str {
        ENV_TAG
    }

    fn load(&self) -> Result<()> {
        let target = self.base.target(self.name())?;
        let bound = bind(
            &mut *target.write(),
            ENV_TAG,
            self.base.tag_ids(),
            |name| std::env::var(name).ok(),
        )?;
        debug!(source = self.name(), bound, "environment variables bound");
        Ok(())
    }

    fn set_target(&mut self, target: SharedTarget<T>) {
        self.base.set_target(target);
    }

    fn tag_ids(&self) -> &HashSet<String> {
        self.base.tag_ids()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Configurable;
    use serial_test::serial;

    #[derive(Debug, Default, Configurable)]
    struct ServiceConfig {
        #[config(env = "CFGMERGE_ENV_TEST_HOST")]
        host: String,
        #[config(env = "CFGMERGE_ENV_TEST_PORT")]
        port: i64,
        #[config(env = "CFGMERGE_ENV_TEST_VERBOSE")]
        verbose: bool,
    }

    fn source_for(
        variables: &[&str],
    ) -> (EnvSource<ServiceConfig>, SharedTarget<ServiceConfig>) {
        let target = SharedTarget::new(ServiceConfig::default());
        let mut source = EnvSource::with_variables(variables.iter().copied());
        source.set_target(target.clone());
        (source, target)
    }

    #[test]
    #[serial]
    fn test_env_source_load() -> Result<()> {
        std::env::set_var("CFGMERGE_ENV_TEST_HOST", "db.internal");
        std::env::set_var("CFGMERGE_ENV_TEST_PORT", "5432");
        std::env::set_var("CFGMERGE_ENV_TEST_VERBOSE", "1");

        let (source, target) = source_for(&[
            "CFGMERGE_ENV_TEST_HOST",
            "CFGMERGE_ENV_TEST_PORT",
            "CFGMERGE_ENV_TEST_VERBOSE",
        ]);
        source.load()?;
        // 重复加载结果一致
        source.load()?;

        let config = target.read();
        assert_eq!(config.host, "db.internal");
        assert_eq!(config.port, 5432);
        assert!(config.verbose);

        std::env::remove_var("CFGMERGE_ENV_TEST_HOST");
        std::env::remove_var("CFGMERGE_ENV_TEST_PORT");
        std::env::remove_var("CFGMERGE_ENV_TEST_VERBOSE");
        Ok(())
    }

    #[test]
    #[serial]
    fn test_env_source_only_binds_listed_variables() -> Result<()> {
        std::env::set_var("CFGMERGE_ENV_TEST_HOST", "db.internal");
        std::env::set_var("CFGMERGE_ENV_TEST_PORT", "5432");

        let (source, target) = source_for(&["CFGMERGE_ENV_TEST_PORT"]);
        source.load()?;

        let config = target.read();
        assert_eq!(config.host, "");
        assert_eq!(config.port, 5432);

        std::env::remove_var("CFGMERGE_ENV_TEST_HOST");
        std::env::remove_var("CFGMERGE_ENV_TEST_PORT");
        Ok(())
    }

    #[test]
    #[serial]
    fn test_env_source_unset_variable_is_skipped() -> Result<()> {
        std::env::remove_var("CFGMERGE_ENV_TEST_PORT");

        let (source, target) = source_for(&["CFGMERGE_ENV_TEST_PORT"]);
        target.update(|c| c.port = 7);
        source.load()?;

        assert_eq!(target.read().port, 7);
        Ok(())
    }

    #[test]
    #[serial]
    fn test_env_source_parse_error() {
        std::env::set_var("CFGMERGE_ENV_TEST_PORT", "not-a-port");

        let (source, _target) = source_for(&["CFGMERGE_ENV_TEST_PORT"]);
        let err = source.load().unwrap_err();
        assert!(err.to_string().contains("port"));
        assert!(err.to_string().contains("not-a-port"));

        std::env::remove_var("CFGMERGE_ENV_TEST_PORT");
    }
}
