use clap::Subcommand;
use vmnet_naming::{DeviceNameGenerator, NamingConvention, NetworkIdentifier, parse_cidr4};

use crate::utils::Context;

#[derive(Subcommand)]
pub enum NameCommands {
    /// Allocate the next tap name
    Tap,
    /// Allocate the next bridge name
    Bridge,
    /// Decode a device name
    Parse {
        /// Device name, e.g. chtap-web-1-192-168-0-4-24
        device: String,
    },
    /// Derive bridge and tap names for a VM interface
    Generate {
        #[arg(long)]
        ip: String,

        /// Dotted-quad netmask
        #[arg(long)]
        mask: String,

        #[arg(long)]
        tenant: String,

        #[arg(long)]
        guest: String,
    },
}

pub fn handle_name_command(
    ctx: &Context,
    cmd: NameCommands,
) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        NameCommands::Tap => {
            println!("{}", ctx.open_enumerator()?.new_tap_name()?);
        }
        NameCommands::Bridge => {
            println!("{}", ctx.open_enumerator()?.new_bridge_name()?);
        }
        NameCommands::Parse { device } => {
            let name = NamingConvention::parse(&device)?;
            println!("role:    {}", name.role);
            println!("owner:   {}", name.owner);
            println!("address: {}/{}", name.ip, name.prefix_len);
            println!("network: {}", name.network());
            println!("netmask: {}", name.netmask());
        }
        NameCommands::Generate {
            ip,
            mask,
            tenant,
            guest,
        } => {
            let (ip, network) = parse_cidr4(&ip, &mask)?;
            let generator = DeviceNameGenerator::new(ctx.default_network);
            let names = generator.generate(&NetworkIdentifier {
                ip,
                prefix_len: network.prefix_len(),
                tenant,
                guest_name: guest,
            })?;
            println!("bridge: {}", names.bridge);
            println!("tap:    {}", names.tap);
        }
    }

    Ok(())
}
