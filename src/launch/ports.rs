//! Port selection and launch-argument injection

use crate::error::{DepotError, DepotResult};
use crate::launch::process::LaunchSpec;
use std::net::TcpListener;
use tracing::debug;

/// First free port in `[start, end]`, probed in order
///
/// Probing binds a throwaway listener on each candidate; the first
/// successful bind wins and is released immediately. Exhausting the
/// range is terminal.
pub fn find_available_port(host: &str, start: u16, end: u16) -> DepotResult<u16> {
    for port in start..=end {
        match TcpListener::bind((host, port)) {
            Ok(listener) => {
                drop(listener);
                debug!("Selected port {port}");
                return Ok(port);
            }
            Err(_) => continue,
        }
    }
    Err(DepotError::PortRangeExhausted { start, end })
}

/// Inject the resolved port into a launch spec
///
/// Replaces the value after an existing `--port`, else appends the pair.
pub fn set_port_arg(spec: &mut LaunchSpec, port: u16) {
    let value = port.to_string();
    if let Some(flag_pos) = spec.args.iter().position(|a| a == "--port") {
        if flag_pos + 1 < spec.args.len() {
            spec.args[flag_pos + 1] = value;
        } else {
            spec.args.push(value);
        }
    } else {
        spec.args.push("--port".to_string());
        spec.args.push(value);
    }
}
