use anyhow::Result;
use sip::dispatcher::Dispatcher;
use vega_config::{defaults_snapshot, App, Checker, LiveEnv, ReloadMode, Value};

/// A freshly booting process has no live values to compare against.
struct BootEnv;

impl LiveEnv for BootEnv {
    fn get(&self, _key: &str) -> Option<Value> {
        None
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    vega_log::init();

    let checker = Checker::new(Box::new(BootEnv));
    let snapshot = defaults_snapshot(App::Proxy);
    let snapshot = checker.check(&snapshot, App::Proxy, ReloadMode::Hard)?;
    tracing::info!(parameters = snapshot.len(), "configuration validated");

    let dispatcher = Dispatcher::start();
    tracing::info!("proxy running");
    tokio::signal::ctrl_c().await?;
    tracing::info!(state = dispatcher.debug_format().await, "shutting down");
    Ok(())
}
