//! Configuration command.

use tokio::runtime::Runtime;

use crate::config::{self, Config};

/// Print the effective configuration, optionally writing it to disk
pub fn cmd_config(rt: &Runtime, config: &Config, init: bool) -> anyhow::Result<()> {
    match config::config_path() {
        Some(path) => println!("# {}", path.display()),
        None => println!("# no config directory on this system"),
    }
    println!("{}", toml::to_string_pretty(config)?);

    if init {
        let path = rt.block_on(config::save_async(config.clone()))?;
        println!("Wrote {}", path.display());
    }
    Ok(())
}
