use clap::Subcommand;
use uuid::Uuid;

use crate::utils::Context;

#[derive(Subcommand)]
pub enum TenantCommands {
    /// Remove every network of a tenant
    #[command(name = "delete", visible_alias = "rm")]
    Delete {
        #[arg(long)]
        tenant: Uuid,
    },
}

pub fn handle_tenant_command(
    ctx: &Context,
    cmd: TenantCommands,
) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        TenantCommands::Delete { tenant } => {
            let removed = ctx.open_allocator()?.release_tenant(tenant)?;
            println!("Deleted {} networks of {}", removed, tenant);
        }
    }

    Ok(())
}
