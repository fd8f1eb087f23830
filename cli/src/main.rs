mod commands;
mod utils;

use clap::{Parser, Subcommand};
use commands::{
    NameCommands, NetworkCommands, TenantCommands, compact, handle_name_command,
    handle_network_command, handle_tenant_command, provision, scan,
};
use ipnet::Ipv4Net;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use utils::Context;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "vmnet")]
#[command(about = "Inspect and operate the VM network registry")]
struct Cli {
    /// Directory holding the registry snapshot, log and enumerator state
    #[arg(long, global = true, default_value = "/var/lib/vmnet")]
    data_dir: PathBuf,

    /// Buffer size used when replaying the log
    #[arg(long, global = true, default_value_t = vmnet_vpc::DEFAULT_PAGE_SIZE)]
    page_size: usize,

    /// Where network interfaces are listed
    #[arg(long, global = true, default_value = vmnet_network::DEFAULT_SYSFS_ROOT)]
    sysfs_root: PathBuf,

    /// Network of the host default bridge
    #[arg(long, global = true, default_value = "192.168.0.0/24")]
    default_network: Ipv4Net,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage tenant network bindings
    #[command(subcommand)]
    Network(NetworkCommands),
    /// Manage tenants
    #[command(subcommand)]
    Tenant(TenantCommands),
    /// Allocate a tap and resolve the tenant bridge for a network
    Provision {
        #[arg(long)]
        tenant: Uuid,

        #[arg(long)]
        network: Ipv4Net,
    },
    /// Fold the log into a fresh snapshot
    Compact,
    /// Allocate, decode and generate device names
    #[command(subcommand)]
    Name(NameCommands),
    /// Compare live links with the registry
    Scan,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let ctx = Context {
        data_dir: cli.data_dir,
        page_size: cli.page_size,
        sysfs_root: cli.sysfs_root,
        default_network: cli.default_network,
    };

    match cli.command {
        Commands::Network(cmd) => handle_network_command(&ctx, cmd)?,
        Commands::Tenant(cmd) => handle_tenant_command(&ctx, cmd)?,
        Commands::Provision { tenant, network } => provision(&ctx, tenant, network)?,
        Commands::Compact => compact(&ctx)?,
        Commands::Name(cmd) => handle_name_command(&ctx, cmd)?,
        Commands::Scan => scan(&ctx)?,
    }

    Ok(())
}
