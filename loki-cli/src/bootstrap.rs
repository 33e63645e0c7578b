//! Turns parsed arguments into a running session

use loki_capture::{filters, open, CaptureConfig, CaptureTarget, FrameSource};
use loki_core::{
    Error, Firewall, Interface, IptablesFirewall, ModuleContext, PnetLink, ProtocolModule, Result,
};
use loki_engine::{InjectionConfig, InjectionQueue, Session, SessionConfig};
use loki_protocols::{
    ArpConfig, ArpModule, Dot1qModule, DtpConfig, DtpModule, EigrpConfig, EigrpModule, IsisConfig,
    IsisModule, MplsModule, OspfConfig, OspfModule,
};
use std::sync::Arc;
use tracing::{info, warn};

use crate::args::{Cli, ModuleName};

/// Session settings for the given arguments; resolves the interface by name
pub fn session_config(cli: &Cli) -> Result<SessionConfig> {
    if cli.interface.is_none() && cli.read.is_none() {
        return Err(Error::invalid_parameter(
            "interface",
            "either --interface or --read is required",
        ));
    }
    let interface = cli.interface.as_deref().map(Interface::by_name).transpose()?;
    let address = cli.address.zip(cli.mask);
    let firewall: Option<Arc<dyn Firewall>> = match (&interface, cli.no_firewall, cli.is_live()) {
        (Some(_), false, true) => Some(Arc::new(IptablesFirewall::new())),
        _ => None,
    };
    Ok(SessionConfig {
        interface,
        address,
        firewall,
    })
}

/// Capture settings; `--narrow` derives the filter from the selected modules
pub fn capture_config(cli: &Cli) -> CaptureConfig {
    let filter = if cli.narrow {
        let names: Vec<String> = cli.selected_modules().iter().map(|m| m.to_string()).collect();
        filters::modules_filter(&names)
    } else {
        cli.filter.clone()
    };
    CaptureConfig {
        filter,
        ..CaptureConfig::default()
    }
}

/// Capture source: the pcap file when given, the interface otherwise
pub fn capture_source(cli: &Cli, config: &CaptureConfig) -> Result<Box<dyn FrameSource>> {
    let target = match (&cli.read, &cli.interface) {
        (Some(path), _) => CaptureTarget::Offline(path.clone()),
        (None, Some(name)) => CaptureTarget::Live(name.clone()),
        (None, None) => {
            return Err(Error::invalid_parameter(
                "interface",
                "nothing to capture from",
            ))
        }
    };
    open(&target, config)
}

/// Writer thread over the live interface; replayed captures never inject
pub fn injection_queue(cli: &Cli) -> Result<Option<InjectionQueue>> {
    match (&cli.interface, cli.is_live()) {
        (Some(name), true) => {
            let link = PnetLink::open(name)?;
            InjectionQueue::start(Box::new(link), &InjectionConfig::default()).map(Some)
        }
        _ => Ok(None),
    }
}

/// One module instance per requested name, with default configuration
pub fn build_module(name: ModuleName, context: &ModuleContext) -> Arc<dyn ProtocolModule> {
    let context = context.clone();
    match name {
        ModuleName::Arp => Arc::new(ArpModule::new(ArpConfig::default(), context)),
        ModuleName::Dot1q => Arc::new(Dot1qModule::new(context)),
        ModuleName::Dtp => Arc::new(DtpModule::new(DtpConfig::default(), context)),
        ModuleName::Eigrp => Arc::new(EigrpModule::new(EigrpConfig::default(), context)),
        ModuleName::Isis => Arc::new(IsisModule::new(IsisConfig::default(), context)),
        ModuleName::Mpls => Arc::new(MplsModule::new(context)),
        ModuleName::Ospf => Arc::new(OspfModule::new(OspfConfig::default(), context)),
    }
}

/// Start every selected module; a module that fails is skipped
pub async fn start_modules(session: &Session, cli: &Cli, context: &ModuleContext) -> usize {
    let mut started = 0;
    for name in cli.selected_modules() {
        match session.start_module(build_module(name, context)).await {
            Ok(id) => {
                info!(module = %name, id = %id, "Module running");
                started += 1;
            }
            Err(e) => warn!(module = %name, error = %e, "Module failed to start"),
        }
    }
    started
}
