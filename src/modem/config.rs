//! Driver timing and retry configuration

/// Timeouts, retry budgets and module settings.
///
/// The defaults match the response times the SARA-G/U/R families document,
/// with longer budgets where deployments showed slow networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Plain `AT` liveness check
    pub at_timeout_ms: u32,
    /// Commands without a documented response time
    pub default_timeout_ms: u32,
    /// Registration queries (`+CREG?`, `+CGREG?`, `+CEREG?`) and `+CSQ`
    pub query_timeout_ms: u32,
    /// `+USOCR` and `+USOCTL`
    pub socket_create_timeout_ms: u32,
    /// `+USOCO`
    pub socket_connect_timeout_ms: u32,
    /// `+USOCL`
    pub socket_close_timeout_ms: u32,
    /// `+USOWR`
    pub socket_write_timeout_ms: u32,
    /// `+USOST`
    pub socket_send_to_timeout_ms: u32,
    /// `+USORD` and `+USORF`
    pub socket_read_timeout_ms: u32,
    /// `+UPSD` and `+UPSND`
    pub profile_timeout_ms: u32,
    /// `+UPSDA` activation and deactivation
    pub activate_timeout_ms: u32,
    /// `+COPS`
    pub cops_timeout_ms: u32,
    /// `+CGATT`
    pub attach_timeout_ms: u32,
    /// `+UDNSRN`
    pub dns_timeout_ms: u32,
    /// `+CPWROFF`
    pub power_off_timeout_ms: u32,

    /// Power key sequences per batch before a hardware reset
    pub power_on_attempts: u8,
    /// `+CPIN?` polls before the reset-and-retry
    pub sim_attempts: u8,
    /// `+CPWROFF` attempts
    pub power_off_attempts: u8,

    /// Interval between registration checks while waiting for the network
    pub registration_poll_ms: u32,
    /// Default budget of [`Modem::register_network`](super::Modem::register_network)
    pub registration_timeout_ms: u32,
    /// How long GPRS may stay detached before a disconnect is reported
    pub gprs_watchdog_ms: u32,

    /// Largest chunk written with one `+USOWR` / `+USOST`
    pub max_write: usize,
    /// Largest chunk read with one `+USORD` / `+USORF`
    pub max_read: usize,
    /// Receive timeout given to new sockets; `u32::MAX` blocks
    pub socket_timeout_ms: u32,

    /// `+UPSV` mode applied by `init_device_info`
    pub power_save_mode: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            at_timeout_ms: 1_000,
            default_timeout_ms: 5_000,
            query_timeout_ms: 1_000,
            socket_create_timeout_ms: 1_000,
            socket_connect_timeout_ms: 10_000,
            socket_close_timeout_ms: 10_000,
            socket_write_timeout_ms: 10_000,
            socket_send_to_timeout_ms: 40_000,
            socket_read_timeout_ms: 10_000,
            profile_timeout_ms: 1_000,
            activate_timeout_ms: 180_000,
            cops_timeout_ms: 180_000,
            attach_timeout_ms: 180_000,
            dns_timeout_ms: 30_000,
            power_off_timeout_ms: 40_000,
            power_on_attempts: 10,
            sim_attempts: 5,
            power_off_attempts: 3,
            registration_poll_ms: 15_000,
            registration_timeout_ms: 300_000,
            gprs_watchdog_ms: 15_000,
            max_write: crate::at::MAX_PAYLOAD,
            max_read: crate::at::MAX_PAYLOAD,
            socket_timeout_ms: 0,
            power_save_mode: 1,
        }
    }
}
