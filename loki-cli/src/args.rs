//! CLI argument parsing

use clap::{Parser, Subcommand, ValueEnum};
use std::fmt;
use std::net::Ipv4Addr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "loki")]
#[command(version, about = "Link-layer and routing protocol attack toolkit", long_about = None)]
pub struct Cli {
    /// Network interface to capture on and inject into
    #[arg(short = 'I', long)]
    pub interface: Option<String>,

    /// Replay a pcap file instead of capturing live (no injection)
    #[arg(short = 'r', long = "read", value_name = "PCAP")]
    pub read: Option<PathBuf>,

    /// Local IPv4 address handed to the modules
    #[arg(short = 'a', long, requires = "mask")]
    pub address: Option<Ipv4Addr>,

    /// Netmask for --address
    #[arg(short = 'm', long, requires = "address")]
    pub mask: Option<Ipv4Addr>,

    /// Modules to start (all when omitted)
    #[arg(long, value_enum, value_delimiter = ',')]
    pub modules: Vec<ModuleName>,

    /// BPF expression applied to the capture
    #[arg(short = 'f', long, value_name = "BPF", conflicts_with = "narrow")]
    pub filter: Option<String>,

    /// Only capture traffic the selected modules read
    #[arg(long)]
    pub narrow: bool,

    /// Never install local firewall rules
    #[arg(long)]
    pub no_firewall: bool,

    /// Verbose output (-v, -vv for increasing verbosity)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// List available network interfaces
    Interfaces,
}

/// Protocol modules the session can run
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleName {
    Arp,
    Dot1q,
    Dtp,
    Eigrp,
    Isis,
    Mpls,
    Ospf,
}

impl ModuleName {
    pub const ALL: [ModuleName; 7] = [
        ModuleName::Arp,
        ModuleName::Dot1q,
        ModuleName::Dtp,
        ModuleName::Eigrp,
        ModuleName::Isis,
        ModuleName::Mpls,
        ModuleName::Ospf,
    ];
}

impl fmt::Display for ModuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModuleName::Arp => "arp",
            ModuleName::Dot1q => "dot1q",
            ModuleName::Dtp => "dtp",
            ModuleName::Eigrp => "eigrp",
            ModuleName::Isis => "isis",
            ModuleName::Mpls => "mpls",
            ModuleName::Ospf => "ospf",
        };
        f.write_str(name)
    }
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Requested modules in start order, duplicates removed
    pub fn selected_modules(&self) -> Vec<ModuleName> {
        if self.modules.is_empty() {
            return ModuleName::ALL.to_vec();
        }
        let mut selected = Vec::new();
        for name in &self.modules {
            if !selected.contains(name) {
                selected.push(*name);
            }
        }
        selected
    }

    /// Max tracing level for the `-v` count
    pub fn log_level(&self) -> tracing::Level {
        match self.verbose {
            0 => tracing::Level::INFO,
            1 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    }

    /// Live capture is requested when no pcap file is given
    pub fn is_live(&self) -> bool {
        self.read.is_none()
    }
}
