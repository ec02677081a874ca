// eb/src/cli/bootstrap.rs
use std::path::Path;

use colored::Colorize;
use eb_common::config::Config;
use eb_common::error::Result;
use eb_core::bootstrap::{verify_bootstrap, BootstrapPin};

pub fn run(config: &Config, script: &Path, expected: &str) -> Result<()> {
    let expected = BootstrapPin::parse(expected)?;
    let found = verify_bootstrap(config, script, &expected)?;
    println!(
        "{} bootstrap script {} ({})",
        "Verified".green().bold(),
        script.display(),
        found
    );
    Ok(())
}
