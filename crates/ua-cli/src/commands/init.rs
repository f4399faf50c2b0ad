//! Init command: establish this IDE instance's identity.

use anyhow::Result;

use crate::config::Config;
use crate::instance::init_instance;

pub fn run(config: &Config, label: Option<&str>) -> Result<()> {
    let identity = init_instance(&config.data_dir, label)?;
    println!("instance {} ({})", identity.instance_id, identity.label);
    Ok(())
}
