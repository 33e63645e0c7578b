//! Local packet filter control
//!
//! Some modules answer for a router that the host kernel does not know about.
//! While they run, the kernel must not see (and reply to) the same traffic.

use std::process::Command;

use tracing::{debug, info};

use crate::{Error, Result};

/// Handle through which a module drops/restores inbound traffic locally
pub trait Firewall: Send + Sync {
    /// Drop inbound packets of `ip_protocol` arriving on `interface`
    fn drop_inbound(&self, interface: &str, ip_protocol: u8) -> Result<()>;

    /// Remove a rule previously added by `drop_inbound`
    fn restore_inbound(&self, interface: &str, ip_protocol: u8) -> Result<()>;
}

/// Firewall backed by the `iptables` command
#[derive(Debug, Clone)]
pub struct IptablesFirewall {
    binary: String,
}

impl IptablesFirewall {
    pub fn new() -> Self {
        Self {
            binary: "iptables".to_string(),
        }
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn rule_args(action: &str, interface: &str, ip_protocol: u8) -> Vec<String> {
        vec![
            action.to_string(),
            "INPUT".to_string(),
            "-i".to_string(),
            interface.to_string(),
            "-p".to_string(),
            ip_protocol.to_string(),
            "-j".to_string(),
            "DROP".to_string(),
        ]
    }

    fn run(&self, args: Vec<String>) -> Result<()> {
        debug!(binary = %self.binary, args = ?args, "running firewall command");
        let status = Command::new(&self.binary).args(&args).status()?;
        if status.success() {
            Ok(())
        } else {
            Err(Error::Interface(format!(
                "{} {} exited with {}",
                self.binary,
                args.join(" "),
                status
            )))
        }
    }
}

impl Default for IptablesFirewall {
    fn default() -> Self {
        Self::new()
    }
}

impl Firewall for IptablesFirewall {
    fn drop_inbound(&self, interface: &str, ip_protocol: u8) -> Result<()> {
        info!(interface, ip_protocol, "dropping inbound traffic");
        self.run(Self::rule_args("-A", interface, ip_protocol))
    }

    fn restore_inbound(&self, interface: &str, ip_protocol: u8) -> Result<()> {
        info!(interface, ip_protocol, "restoring inbound traffic");
        self.run(Self::rule_args("-D", interface, ip_protocol))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_args() {
        let args = IptablesFirewall::rule_args("-A", "eth0", 89);
        assert_eq!(args.join(" "), "-A INPUT -i eth0 -p 89 -j DROP");
    }

    #[test]
    fn test_missing_binary_is_an_error() {
        let fw = IptablesFirewall::with_binary("/nonexistent/loki-iptables");
        assert!(fw.drop_inbound("eth0", 89).is_err());
    }
}
