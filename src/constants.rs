/// FunctionFS mount directory holding the gadget endpoint files (ep0/ep1/ep2).
/// The ConfigFS composition that exposes it is set up outside the daemon.
pub const GADGET_FFS_DIR: &str = "/dev/ffs-ps3";

/// Path of the lightbar IPC record written by the control panel.
pub const LIGHTBAR_IPC_PATH: &str = "/run/padbridge/lightbar";

/// Path where the paired PS3 host address is remembered between runs.
pub const PAIRED_HOST_PATH: &str = "/run/padbridge/paired-host";

/// Optional profile consumed from the control panel.
pub const PROFILE_PATH: &str = "/etc/padbridge/profile.json";

/// Environment variable overriding the wake target address.
pub const PS3_MAC_ENV: &str = "PADBRIDGE_PS3_MAC";

/// Environment variable carrying the debug spec when --debug is not given.
pub const DEBUG_ENV: &str = "PADBRIDGE_DEBUG";

/// Minimum time between accepted system state transitions.
pub const STANDBY_DEBOUNCE_MS: u64 = 2000;

/// PS button hold time that requests standby while active.
pub const PS_HOLD_STANDBY_MS: u64 = 1500;

/// Wall-clock budget for a wake attempt.
pub const WAKE_BUDGET_MS: u64 = 3000;

/// Wall-clock budget for a graceful link disconnect.
pub const DISCONNECT_BUDGET_MS: u64 = 1000;

/// How long threads get to exit after shutdown is requested.
pub const SHUTDOWN_GRACE_MS: u64 = 500;

/// Lightbar shown while the bridge is in standby.
pub const STANDBY_LIGHTBAR: (u8, u8, u8) = (30, 15, 0);

/// Lightbar shown while waking and after wake, until the panel overrides it.
pub const ACTIVE_LIGHTBAR: (u8, u8, u8) = (64, 0, 0);
