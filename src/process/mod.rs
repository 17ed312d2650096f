//! Process-level plumbing: running the external tool and picking ports.

mod executor;
mod ports;

pub use executor::{redact_args, redact_output, CommandExecutor, CommandOutput, ToolRunner};
pub use ports::{find_available_port, PortAllocator, PortReservation};
