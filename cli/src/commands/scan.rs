use vmnet_network::{LinkDriver, SysfsLinkDriver, attached_tap_devices, reconcile};

use crate::utils::Context;

pub fn scan(ctx: &Context) -> Result<(), Box<dyn std::error::Error>> {
    let registry = ctx.open_registry()?;
    tracing::debug!(root = %ctx.sysfs_root.display(), "Scanning links");
    let links = SysfsLinkDriver::new(&ctx.sysfs_root).list_links()?;
    let report = reconcile(&registry.view(), &links);

    println!(
        "{} links, {} attached VM taps",
        links.len(),
        attached_tap_devices(&links).len()
    );

    if report.is_clean() {
        println!("Registry and host agree");
        return Ok(());
    }

    for (tenant, network, bridge) in &report.missing_bridges {
        println!("missing bridge:      {} ({} of {})", bridge, network, tenant);
    }
    for bridge in &report.unregistered_vpc_bridges {
        println!("unregistered bridge: {}", bridge);
    }
    for tap in &report.detached_taps {
        println!("detached tap:        {}", tap);
    }

    Ok(())
}
