//! 多来源合并与热更新示例
//!
//! 从 YAML 文件读取基础配置，再用环境变量覆盖。修改文件后配置会自动重新绑定，
//! 探测地址不可达时停止监听
//!
//! 运行：
//! ```text
//! RUST_LOG=debug APP_PORT=9090 cargo run --example env_watch -- config/app.yaml 127.0.0.1:6379
//! ```

use anyhow::Result;
use cfgmerge::{
    spawn_disconnect_probe, Configurable, EnvSource, FileSource, FileSourceConfig, Merger,
    ProbeConfig,
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Default, Clone, Configurable)]
struct DatabaseConfig {
    #[config(file = "database.host", env = "APP_DB_HOST", required)]
    host: String,
    #[config(file = "database.port", default = "5432")]
    port: u16,
    #[config(env = "APP_DB_PASSWORD", show_last_symbols = 2)]
    password: String,
}

#[derive(Debug, Default, Clone, Configurable)]
struct AppConfig {
    #[config(file = "name", default = "demo")]
    name: String,
    #[config(file = "server.port", env = "APP_PORT", required, default = "8080")]
    port: i64,
    #[config(file = "debug", env = "APP_DEBUG")]
    debug: bool,
    database: DatabaseConfig,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args().skip(1);
    let path = args.next().unwrap_or_else(|| "config/app.yaml".to_string());
    let probe_address = args.next();

    let mut merger = Merger::new(AppConfig::default())?;
    merger.add_source(
        FileSource::new(FileSourceConfig {
            path,
            variables: vec![
                "name".to_string(),
                "server.port".to_string(),
                "debug".to_string(),
                "database.host".to_string(),
                "database.port".to_string(),
            ],
            debounce_ms: 200,
        })
        .with_watch_handler(Box::new(|| println!("配置文件已重新加载"))),
    );
    merger.add_source(EnvSource::with_variables([
        "APP_PORT",
        "APP_DEBUG",
        "APP_DB_HOST",
        "APP_DB_PASSWORD",
    ]));
    let merger = Arc::new(merger);

    let _probe = match probe_address {
        Some(address) => Some(spawn_disconnect_probe(
            merger.clone(),
            ProbeConfig {
                address,
                interval: Duration::from_secs(2),
                ..Default::default()
            },
        )?),
        None => None,
    };

    // 按回车停止监听
    let stopper = merger.clone();
    std::thread::spawn(move || {
        let mut line = String::new();
        let _ = std::io::stdin().read_line(&mut line);
        if let Err(err) = stopper.stop_watch() {
            println!("停止监听失败: {}", err);
        }
    });

    println!("开始监听，按回车退出");
    merger.run_watch()?;

    merger.print_config();
    println!("{}", serde_json::to_string_pretty(&merger.final_config())?);
    Ok(())
}
