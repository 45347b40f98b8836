use anyhow::Result;
use log::LevelFilter;

pub mod api_status;
pub mod config;
pub mod darksky;
pub mod dynamo;
pub mod events;
pub mod handlers;
pub mod models;
pub mod response;
pub mod store;
pub mod strava;
#[cfg(test)]
pub(crate) mod test_server;
pub mod units;
pub mod weather;

pub const APP_NAME: &str = "stravaweather";

/// Installs the process logger. The app and `calling_module` log at DEBUG when `verbose` is set,
/// INFO otherwise; everything else is held to WARN. `RUST_LOG` is applied on top.
pub fn set_up_logger(calling_module: &str, verbose: bool) -> Result<()> {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::new()
        .filter_level(LevelFilter::Warn)
        .filter_module(APP_NAME, level)
        .filter_module(calling_module, level)
        .parse_default_env()
        .format_timestamp(None)
        .try_init()?;

    Ok(())
}
