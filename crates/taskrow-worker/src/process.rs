//! Process-table helpers shared by the monitor and the executor.
//!
//! Liveness-by-pid is best-effort: a pid recycled between two sweeps would
//! read as alive. Sweeps run every poll cycle, so the window is small.

use sysinfo::{Pid, ProcessesToUpdate, Signal, System};

/// Check whether a process with the given pid exists in the process table
pub fn alive(pid: u32) -> bool {
    let target = Pid::from_u32(pid);
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::Some(&[target]));
    sys.process(target).is_some()
}

/// Ask a process to terminate (SIGTERM). Returns false if the process is
/// gone already or the signal could not be delivered.
pub fn terminate(pid: u32) -> bool {
    let target = Pid::from_u32(pid);
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::Some(&[target]));
    match sys.process(target) {
        Some(process) => process.kill_with(Signal::Term).unwrap_or(false),
        None => false,
    }
}

/// Resident memory of the current process in MiB, for the heartbeat line
pub fn resident_memory_mb() -> u64 {
    let own = Pid::from_u32(std::process::id());
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::Some(&[own]));
    sys.process(own).map_or(0, |p| p.memory() / (1024 * 1024))
}
