pub mod name;
pub mod network;
pub mod scan;
pub mod tenant;

pub use name::{NameCommands, handle_name_command};
pub use network::{NetworkCommands, compact, handle_network_command, provision};
pub use scan::scan;
pub use tenant::{TenantCommands, handle_tenant_command};
