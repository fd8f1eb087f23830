//! Read-only comparison of live links against the registry, run after a
//! restart to find what the kernel and the registry disagree on.

use crate::driver::LinkInfo;
use ipnet::Ipv4Net;
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;
use vmnet_naming::{NamingConvention, VPC_BRIDGE_ROLE};
use vmnet_vpc::TenantNetworks;

/// Taps named for `vm` under the naming convention.
pub fn tap_devices_for<'a>(links: &'a [LinkInfo], vm: &str) -> Vec<&'a LinkInfo> {
    links
        .iter()
        .filter(|link| vm_tap(link).is_some_and(|name| name.owner == vm))
        .collect()
}

/// VM taps enslaved to an existing link whose name is itself decodable.
pub fn attached_tap_devices(links: &[LinkInfo]) -> Vec<&LinkInfo> {
    let by_index: HashMap<u32, &LinkInfo> = links.iter().map(|l| (l.index, l)).collect();

    links
        .iter()
        .filter(|link| vm_tap(link).is_some())
        .filter(|link| {
            link.master
                .and_then(|index| by_index.get(&index))
                .is_some_and(|master| NamingConvention::parse(&master.name).is_ok())
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Registry bindings whose bridge is not present on the host.
    pub missing_bridges: Vec<(Uuid, Ipv4Net, String)>,
    /// Live VPC bridges whose decoded tenant and network are not bound.
    pub unregistered_vpc_bridges: Vec<String>,
    /// VM taps with no master, or whose master is not a live bridge.
    pub detached_taps: Vec<String>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.missing_bridges.is_empty()
            && self.unregistered_vpc_bridges.is_empty()
            && self.detached_taps.is_empty()
    }
}

/// Compare a registry view with the links currently on the host. Never
/// changes either side.
pub fn reconcile(view: &TenantNetworks, links: &[LinkInfo]) -> ReconcileReport {
    let bridges: BTreeSet<&str> = links
        .iter()
        .filter(|l| l.is_bridge())
        .map(|l| l.name.as_str())
        .collect();
    let bridge_indexes: BTreeSet<u32> = links
        .iter()
        .filter(|l| l.is_bridge())
        .map(|l| l.index)
        .collect();

    let mut report = ReconcileReport::default();

    for (tenant, nets) in view {
        for (network, bridge) in nets {
            if !bridges.contains(bridge.as_str()) {
                tracing::warn!(%tenant, %network, %bridge, "Registered bridge not present");
                report
                    .missing_bridges
                    .push((*tenant, *network, bridge.clone()));
            }
        }
    }

    for link in links.iter().filter(|l| l.is_bridge()) {
        let Ok(name) = NamingConvention::parse(&link.name) else {
            continue;
        };
        if !name.is(VPC_BRIDGE_ROLE) {
            continue;
        }
        let bound = Uuid::parse_str(&name.owner)
            .ok()
            .and_then(|tenant| view.get(&tenant))
            .is_some_and(|nets| nets.contains_key(&name.network()));
        if !bound {
            tracing::warn!(bridge = %link.name, "VPC bridge has no registry binding");
            report.unregistered_vpc_bridges.push(link.name.clone());
        }
    }

    for link in links.iter().filter(|l| vm_tap(l).is_some()) {
        let attached = link
            .master
            .is_some_and(|index| bridge_indexes.contains(&index));
        if !attached {
            tracing::warn!(tap = %link.name, master = ?link.master, "Tap not attached to a bridge");
            report.detached_taps.push(link.name.clone());
        }
    }

    report
}

fn vm_tap(link: &LinkInfo) -> Option<NamingConvention> {
    if !link.is_tap() {
        return None;
    }
    NamingConvention::parse(&link.name)
        .ok()
        .filter(NamingConvention::is_virtual_machine_tap)
}
