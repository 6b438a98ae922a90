//! Process launch and cross-instance port coordination

pub mod launcher;
pub mod lock;
pub mod platform;
pub mod ports;
pub mod process;

pub use launcher::{LaunchPhase, Launcher};
pub use lock::{read_port_lock, remove_port_lock, write_port_lock, PortLock};
pub use platform::{create_platform_ops, Platform, PlatformOps};
pub use ports::{find_available_port, set_port_arg};
pub use process::{spawn_detached, wait_for_reachable, LaunchSpec, ReadinessOptions};
