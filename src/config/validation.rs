//! Configuration validation

use super::{Config, ForwardingMode};
use crate::device::BATCH_SIZE;
use crate::telemetry::is_known_level;
use std::net::IpAddr;

/// Smallest MTU an IPv4 interface may carry
const MIN_MTU: u16 = 68;

/// Longest interface name the kernel accepts (IFNAMSIZ - 1)
const MAX_INTERFACE_NAME: usize = 15;

#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn print_diagnostics(&self) {
        for warning in &self.warnings {
            println!("[WARN] {}", warning);
        }
        for error in &self.errors {
            println!("[ERROR] {}", error);
        }
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate configuration and return warnings/errors
pub fn validate(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();

    validate_log(config, &mut result);
    validate_forwarding(config, &mut result);
    validate_interfaces(config, &mut result);

    result
}

fn validate_log(config: &Config, result: &mut ValidationResult) {
    if !is_known_level(&config.log.level) {
        result.warn(format!(
            "log.level: unknown level '{}', using info",
            config.log.level
        ));
    }
    if !matches!(config.log.format.as_str(), "pretty" | "compact" | "json") {
        result.warn(format!(
            "log.format: unknown format '{}', using pretty",
            config.log.format
        ));
    }
}

fn validate_forwarding(config: &Config, result: &mut ValidationResult) {
    let fwd = &config.forwarding;

    if fwd.batch_size == 0 || fwd.batch_size > BATCH_SIZE {
        result.error(format!(
            "forwarding.batch_size: {} out of range (1-{})",
            fwd.batch_size, BATCH_SIZE
        ));
    }

    if fwd.mode == ForwardingMode::Queued && fwd.queue_capacity == 0 {
        result.error("forwarding.queue_capacity: must be at least 1");
    }

    if fwd.pooled && fwd.mode != ForwardingMode::Queued {
        result.warn("forwarding.pooled: has no effect unless mode = \"queued\"");
    }
}

fn validate_interfaces(config: &Config, result: &mut ValidationResult) {
    if config.interfaces.len() != 2 {
        result.error(format!(
            "interfaces: exactly 2 interfaces required, found {}",
            config.interfaces.len()
        ));
    }

    for (name, iface) in &config.interfaces {
        if name.is_empty() || name.len() > MAX_INTERFACE_NAME {
            result.error(format!(
                "interfaces.{}: name must be 1-{} bytes",
                name, MAX_INTERFACE_NAME
            ));
        }

        if let Err(msg) = check_cidr(&iface.address) {
            result.error(format!("interfaces.{}: {}", name, msg));
        }

        match iface.mtu {
            None => result.warn(format!(
                "interfaces.{}: mtu not specified, using default 1500",
                name
            )),
            Some(mtu) if mtu < MIN_MTU => result.error(format!(
                "interfaces.{}: mtu {} below minimum {}",
                name, mtu, MIN_MTU
            )),
            Some(_) => {}
        }
    }
}

fn check_cidr(cidr: &str) -> Result<(), String> {
    let (addr, prefix) = cidr
        .split_once('/')
        .ok_or_else(|| format!("invalid CIDR '{}': missing prefix length", cidr))?;

    let addr: IpAddr = addr
        .parse()
        .map_err(|_| format!("invalid CIDR '{}': bad address", cidr))?;
    let prefix: u8 = prefix
        .parse()
        .map_err(|_| format!("invalid CIDR '{}': bad prefix length", cidr))?;

    let max = if addr.is_ipv4() { 32 } else { 128 };
    if prefix > max {
        return Err(format!(
            "invalid CIDR '{}': prefix length exceeds {}",
            cidr, max
        ));
    }

    Ok(())
}
