//! Host probes: free disk, available memory and port occupancy.

use std::path::{Path, PathBuf};

use sysinfo::{Disks, System};

/// Free bytes on the volume holding `path`, or `None` when no mounted disk
/// contains it.
pub fn free_disk_bytes(path: &Path) -> Option<u64> {
    let target = path
        .canonicalize()
        .unwrap_or_else(|_| PathBuf::from(path));
    let disks = Disks::new_with_refreshed_list();
    disks
        .list()
        .iter()
        .filter(|d| target.starts_with(d.mount_point()))
        .max_by_key(|d| d.mount_point().as_os_str().len())
        .map(|d| d.available_space())
}

/// Memory available to new processes, in bytes.
pub fn available_memory_bytes() -> u64 {
    let mut sys = System::new();
    sys.refresh_memory();
    sys.available_memory()
}

/// Whether something already listens on `port`.
pub async fn port_in_use(port: u16) -> bool {
    match tokio::net::TcpListener::bind(("0.0.0.0", port)).await {
        Ok(_) => false,
        Err(e) => e.kind() == std::io::ErrorKind::AddrInUse,
    }
}

/// Subset of `ports` that are already taken.
pub async fn port_conflicts(ports: &[u16]) -> Vec<u16> {
    let mut taken = Vec::new();
    for &port in ports {
        if port_in_use(port).await {
            taken.push(port);
        }
    }
    taken
}

/// Render a byte count with binary units, e.g. `1.5 GiB`.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
