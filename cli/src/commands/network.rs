use clap::Subcommand;
use ipnet::Ipv4Net;
use uuid::Uuid;
use vmnet_vpc::{RegistrySnapshot, TenantNetworks};

use crate::utils::{Context, print_networks};

#[derive(Subcommand)]
pub enum NetworkCommands {
    /// Bind a tenant network to a bridge
    Add {
        #[arg(long)]
        tenant: Uuid,

        /// Network in CIDR form, host bits are ignored
        #[arg(long)]
        network: Ipv4Net,

        /// Bridge interface name
        #[arg(long)]
        bridge: String,
    },
    /// Remove one tenant network binding
    #[command(name = "delete", visible_alias = "rm")]
    Delete {
        #[arg(long)]
        tenant: Uuid,

        #[arg(long)]
        network: Ipv4Net,
    },
    /// List bindings
    #[command(name = "list", visible_alias = "ls")]
    List {
        /// Only show this tenant
        #[arg(long)]
        tenant: Option<Uuid>,

        /// Print the snapshot document instead of a table
        #[arg(long)]
        json: bool,
    },
}

pub fn handle_network_command(
    ctx: &Context,
    cmd: NetworkCommands,
) -> Result<(), Box<dyn std::error::Error>> {
    let registry = ctx.open_registry()?;

    match cmd {
        NetworkCommands::Add {
            tenant,
            network,
            bridge,
        } => {
            if registry.add_network(tenant, network, &bridge)? {
                println!("Bound {} of {} to {}", network.trunc(), tenant, bridge);
            } else {
                println!("{} of {} already bound to {}", network.trunc(), tenant, bridge);
            }
        }
        NetworkCommands::Delete { tenant, network } => {
            if registry.delete_network(tenant, network)? {
                println!("Deleted {} of {}", network.trunc(), tenant);
            } else {
                println!("{} of {} was not bound", network.trunc(), tenant);
            }
        }
        NetworkCommands::List { tenant, json } => {
            let networks: TenantNetworks = match tenant {
                Some(tenant) => {
                    let nets = registry.networks_of(tenant);
                    if nets.is_empty() {
                        TenantNetworks::new()
                    } else {
                        TenantNetworks::from([(tenant, nets)])
                    }
                }
                None => registry.view(),
            };

            if json {
                let snapshot = RegistrySnapshot::from_networks(&networks);
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                print_networks(&networks);
            }
        }
    }

    Ok(())
}

pub fn provision(
    ctx: &Context,
    tenant: Uuid,
    network: Ipv4Net,
) -> Result<(), Box<dyn std::error::Error>> {
    let allocator = ctx.open_allocator()?;
    let interface = allocator.provision(tenant, network)?;

    println!("tap:    {}", interface.tap);
    println!(
        "bridge: {}{}",
        interface.bridge,
        if interface.new_bridge { " (new)" } else { "" }
    );
    Ok(())
}

pub fn compact(ctx: &Context) -> Result<(), Box<dyn std::error::Error>> {
    // opening already replays and compacts
    let registry = ctx.open_registry()?;
    let view = registry.view();
    println!(
        "Compacted {} tenants, {} networks",
        view.len(),
        view.values().map(|nets| nets.len()).sum::<usize>()
    );
    Ok(())
}
