//! Interface address and link configuration through `ip(8)`

use crate::{Error, Result};
use std::process::Command;
use tracing::info;

/// Assign `cidr` to `name`, set its MTU and bring it up.
pub fn configure(name: &str, cidr: &str, mtu: u16) -> Result<()> {
    let mtu = mtu.to_string();
    run_ip(name, &["addr", "add", cidr, "dev", name])?;
    run_ip(name, &["link", "set", "dev", name, "mtu", &mtu])?;
    run_ip(name, &["link", "set", "dev", name, "up"])?;
    Ok(())
}

fn run_ip(name: &str, args: &[&str]) -> Result<()> {
    let command = format!("ip {}", args.join(" "));
    info!("Executing: {}", command);

    let output = Command::new("ip").args(args).output()?;
    if output.status.success() {
        return Ok(());
    }

    let mut text = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if text.is_empty() {
        text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    }
    Err(command_error(name, command, text))
}

fn command_error(name: &str, command: String, output: String) -> Error {
    if output.contains("Cannot find device") {
        return Error::InterfaceNotFound {
            name: name.to_string(),
        };
    }
    Error::Command { command, output }
}
