//! 连通性探测
//!
//! 周期性地尝试建立 TCP 连接，连接失败时停止合并器的监听会话

use anyhow::{anyhow, Context, Result};
use garde::Validate;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cancel::{cancel_pair, CancelHandle, CancelToken};
use crate::error::MergeError;
use crate::merger::Merger;
use crate::schema::Configurable;
use crate::serde_duration::{serde_as, HumanDur};

/// 探测配置
#[serde_as]
#[derive(Debug, Clone, Deserialize, Serialize, SmartDefault, Validate, PartialEq)]
#[serde(default)]
pub struct ProbeConfig {
    /// 探测地址，如 "127.0.0.1:6379"
    #[garde(length(min = 1))]
    pub address: String,

    /// 探测间隔
    #[serde_as(as = "HumanDur")]
    #[default(_code = "Duration::from_secs(5)")]
    #[garde(custom(non_zero_duration))]
    pub interval: Duration,

    /// 单次连接超时
    #[serde_as(as = "HumanDur")]
    #[default(_code = "Duration::from_secs(1)")]
    #[garde(custom(non_zero_duration))]
    pub connect_timeout: Duration,
}

fn non_zero_duration(value: &Duration, _ctx: &()) -> garde::Result {
    if value.is_zero() {
        return Err(garde::Error::new("duration must be greater than zero"));
    }
    Ok(())
}

/// 正在运行的探测线程，drop 时自动停止
pub struct Probe {
    cancel: Option<CancelHandle>,
    thread: Option<JoinHandle<()>>,
}

impl Probe {
    /// 停止探测并等待线程退出
    pub fn stop(mut self) {
        self.shutdown();
    }

    /// 探测线程是否已经退出
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }

    fn shutdown(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for Probe {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// 尝试连接一次
pub fn check_reachable(address: &str, timeout: Duration) -> Result<()> {
    let addrs: Vec<_> = address
        .to_socket_addrs()
        .with_context(|| format!("failed to resolve {}", address))?
        .collect();

    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(_) => return Ok(()),
            Err(err) => last_err = Some(err),
        }
    }
    match last_err {
        Some(err) => Err(anyhow!(err).context(format!("failed to connect to {}", address))),
        None => Err(anyhow!("{} resolved to no addresses", address)),
    }
}

/// 启动探测线程
///
/// 地址不可达时调用 `merger.stop_watch()` 后退出；
/// 合并器尚未进入监听状态时继续探测
pub fn spawn_disconnect_probe<T: Configurable>(
    merger: Arc<Merger<T>>,
    config: ProbeConfig,
) -> Result<Probe> {
    config
        .validate()
        .map_err(|report| anyhow!("invalid probe config: {}", report))?;

    let (cancel, token) = cancel_pair();
    let thread = thread::Builder::new()
        .name("cfgmerge-probe".to_string())
        .spawn(move || probe_loop(merger, config, token))
        .context("failed to spawn probe thread")?;

    Ok(Probe {
        cancel: Some(cancel),
        thread: Some(thread),
    })
}

fn probe_loop<T: Configurable>(merger: Arc<Merger<T>>, config: ProbeConfig, token: CancelToken) {
    loop {
        match check_reachable(&config.address, config.connect_timeout) {
            Ok(()) => debug!(address = %config.address, "probe succeeded"),
            Err(err) => {
                warn!(address = %config.address, error = %format!("{:#}", err), "can not reach server");
                match merger.stop_watch() {
                    Ok(()) => {
                        info!(address = %config.address, "watch stopped after lost connection");
                        return;
                    }
                    Err(MergeError::NotWatching) => {
                        debug!("merger is not watching, keep probing");
                    }
                    Err(err) => {
                        warn!(error = %err, "failed to stop watch");
                    }
                }
            }
        }

        if token.wait_timeout(config.interval) {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::StaticSource;
    use crate::Configurable;
    use std::net::TcpListener;

    #[derive(Debug, Default, Configurable)]
    struct PingConfig {
        #[config(cfg = "HOST")]
        host: String,
    }

    fn closed_address() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);
        address
    }

    #[test]
    fn test_probe_config_defaults() {
        let config: ProbeConfig = serde_json::from_str(r#"{"address": "localhost:80"}"#).unwrap();
        assert_eq!(config.interval, Duration::from_secs(5));
        assert_eq!(config.connect_timeout, Duration::from_secs(1));

        let config: ProbeConfig =
            serde_yaml::from_str("address: localhost:80\ninterval: 100ms\n").unwrap();
        assert_eq!(config.interval, Duration::from_millis(100));
    }

    #[test]
    fn test_probe_config_validation() {
        assert!(ProbeConfig::default().validate().is_err());

        let config = ProbeConfig {
            address: "localhost:80".to_string(),
            interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_check_reachable() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        assert!(check_reachable(&address, Duration::from_secs(1)).is_ok());

        assert!(check_reachable(&closed_address(), Duration::from_secs(1)).is_err());
    }

    #[test]
    fn test_probe_stops_watch_on_disconnect() {
        let mut merger = Merger::new(PingConfig::default()).unwrap();
        merger.add_source(StaticSource::with_values("cfg", [("HOST", "db")]));
        let merger = Arc::new(merger);

        let watching = merger.clone();
        let runner = thread::spawn(move || watching.run_watch());

        let probe = spawn_disconnect_probe(
            merger.clone(),
            ProbeConfig {
                address: closed_address(),
                interval: Duration::from_millis(10),
                connect_timeout: Duration::from_millis(200),
            },
        )
        .unwrap();

        assert!(runner.join().unwrap().is_ok());
        assert_eq!(merger.target().read().host, "db");
        probe.stop();
    }
}
