//! NUMA topology queries.
//!
//! The region cache keeps one pool of free regions per NUMA node so that
//! regions stay local to the socket that touched them. Only two questions are
//! asked of the OS: how many nodes are configured, and which node the current
//! thread is running on.

use std::sync::OnceLock;

static NODE_COUNT: OnceLock<usize> = OnceLock::new();

/// Number of configured NUMA nodes, discovered once from
/// `/sys/devices/system/node`. Falls back to 1 on machines (or platforms)
/// without the sysfs node directory.
pub fn configured_node_count() -> usize {
    *NODE_COUNT.get_or_init(detect_node_count)
}

#[cfg(target_os = "linux")]
fn detect_node_count() -> usize {
    let mut max_node = None;
    if let Ok(entries) = std::fs::read_dir("/sys/devices/system/node/") {
        for entry in entries.flatten() {
            let name = entry.file_name();
            let id = name
                .to_str()
                .and_then(|n| n.strip_prefix("node"))
                .and_then(|n| n.parse::<usize>().ok());
            if let Some(id) = id {
                max_node = Some(max_node.map_or(id, |m: usize| m.max(id)));
            }
        }
    }
    max_node.map_or(1, |m| m + 1)
}

#[cfg(not(target_os = "linux"))]
fn detect_node_count() -> usize {
    1
}

/// NUMA node the current thread is running on, clamped to the configured
/// node count. Returns 0 when the OS cannot say.
#[cfg(target_os = "linux")]
pub fn current_node_index() -> usize {
    let mut cpu: libc::c_uint = 0;
    let mut node: libc::c_uint = 0;
    let rc = unsafe {
        libc::syscall(
            libc::SYS_getcpu,
            &mut cpu as *mut libc::c_uint,
            &mut node as *mut libc::c_uint,
            core::ptr::null_mut::<libc::c_void>(),
        )
    };
    if rc != 0 {
        return 0;
    }
    (node as usize).min(configured_node_count() - 1)
}

#[cfg(not(target_os = "linux"))]
pub fn current_node_index() -> usize {
    0
}
