// Radio defaults for long-range agricultural deployments (EU band).
const DEFAULT_FREQUENCY_HZ: u32 = 868_000_000;
const DEFAULT_SPREADING_FACTOR: u8 = 10;
const DEFAULT_BANDWIDTH_KHZ: u16 = 125;
const DEFAULT_CODING_RATE: u8 = 1; // 4/5
const DEFAULT_PREAMBLE: u8 = 12;
const DEFAULT_TX_POWER_DBM: u8 = 20;
const DEFAULT_NETWORK_ID: u8 = 7;
const DEFAULT_ADDRESS: u16 = 2;
const DEFAULT_PEER_ADDRESS: u16 = 1;
const DEFAULT_COMMAND_TIMEOUT_MS: u32 = 2000;
const DEFAULT_RECEIVE_WINDOW_MS: u32 = 1000;

/// Lowest supported spreading factor.
pub const MIN_SPREADING_FACTOR: u8 = 7;
/// Highest supported spreading factor.
pub const MAX_SPREADING_FACTOR: u8 = 12;

// Scheduling defaults.
const DEFAULT_TELEMETRY_INTERVAL_MS: u32 = 30 * 60 * 1000;
const DEFAULT_IDLE_DELAY_MS: u32 = 100;

/// Radio module configuration.
///
/// ## Parameters
///
/// - **`frequency_hz`**
///   Carrier frequency in Hz. Defaults to `868000000`.
///
/// - **`spreading_factor`**
///   LoRa spreading factor, from `7` to `12`. Defaults to `10`.
///
/// - **`bandwidth_khz`**
///   Channel bandwidth in kHz: `125`, `250` or `500`. Defaults to `125`.
///
/// - **`peer_address`**
///   The fixed address of the proof server radio. Defaults to `1`.
///
/// - **`command_timeout_ms`**
///   How long to wait for the module to answer a command.
///   Defaults to `2000`.
///
/// - **`receive_window_ms`**
///   How long to wait for a complete inbound frame line once its first
///   byte is pending. Defaults to `1000`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RadioConfig {
    /// Carrier frequency in Hz.
    pub frequency_hz: u32,
    /// LoRa spreading factor.
    pub spreading_factor: u8,
    /// Channel bandwidth in kHz.
    pub bandwidth_khz: u16,
    /// Coding rate code understood by the module (`1` is 4/5).
    pub coding_rate: u8,
    /// Preamble length.
    pub preamble: u8,
    /// Output power in dBm.
    pub tx_power_dbm: u8,
    /// Network identifier shared with the proof server.
    pub network_id: u8,
    /// Local radio address.
    pub address: u16,
    /// Proof server radio address.
    pub peer_address: u16,
    /// Command response timeout in milliseconds.
    pub command_timeout_ms: u32,
    /// Inbound frame read window in milliseconds.
    pub receive_window_ms: u32,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RadioConfig {
    /// Creates a [`RadioConfig`] with default values.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            frequency_hz: DEFAULT_FREQUENCY_HZ,
            spreading_factor: DEFAULT_SPREADING_FACTOR,
            bandwidth_khz: DEFAULT_BANDWIDTH_KHZ,
            coding_rate: DEFAULT_CODING_RATE,
            preamble: DEFAULT_PREAMBLE,
            tx_power_dbm: DEFAULT_TX_POWER_DBM,
            network_id: DEFAULT_NETWORK_ID,
            address: DEFAULT_ADDRESS,
            peer_address: DEFAULT_PEER_ADDRESS,
            command_timeout_ms: DEFAULT_COMMAND_TIMEOUT_MS,
            receive_window_ms: DEFAULT_RECEIVE_WINDOW_MS,
        }
    }

    /// Sets the carrier frequency in Hz.
    ///
    /// Use `915000000` for US deployments.
    #[must_use]
    pub const fn frequency_hz(mut self, frequency_hz: u32) -> Self {
        self.frequency_hz = frequency_hz;
        self
    }

    /// Sets the spreading factor.
    ///
    /// The value is clamped between `7` and `12`.
    #[must_use]
    pub const fn spreading_factor(mut self, spreading_factor: u8) -> Self {
        self.spreading_factor = if spreading_factor < MIN_SPREADING_FACTOR {
            MIN_SPREADING_FACTOR
        } else if spreading_factor > MAX_SPREADING_FACTOR {
            MAX_SPREADING_FACTOR
        } else {
            spreading_factor
        };
        self
    }

    /// Sets the channel bandwidth in kHz.
    #[must_use]
    pub const fn bandwidth_khz(mut self, bandwidth_khz: u16) -> Self {
        self.bandwidth_khz = bandwidth_khz;
        self
    }

    /// Sets the output power in dBm.
    #[must_use]
    pub const fn tx_power_dbm(mut self, tx_power_dbm: u8) -> Self {
        self.tx_power_dbm = tx_power_dbm;
        self
    }

    /// Sets the network identifier.
    #[must_use]
    pub const fn network_id(mut self, network_id: u8) -> Self {
        self.network_id = network_id;
        self
    }

    /// Sets the local radio address.
    #[must_use]
    pub const fn address(mut self, address: u16) -> Self {
        self.address = address;
        self
    }

    /// Sets the proof server radio address.
    #[must_use]
    pub const fn peer_address(mut self, peer_address: u16) -> Self {
        self.peer_address = peer_address;
        self
    }

    /// Sets the command response timeout in milliseconds.
    #[must_use]
    pub const fn command_timeout_ms(mut self, timeout_ms: u32) -> Self {
        self.command_timeout_ms = timeout_ms;
        self
    }

    /// Sets the inbound frame read window in milliseconds.
    #[must_use]
    pub const fn receive_window_ms(mut self, window_ms: u32) -> Self {
        self.receive_window_ms = window_ms;
        self
    }
}

/// Device scheduling configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Time between two scheduled cycles, in milliseconds.
    pub telemetry_interval_ms: u32,
    /// Idle time between two loop iterations, in milliseconds.
    ///
    /// The control loop waits at least 1 ms whatever the value.
    pub idle_delay_ms: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceConfig {
    /// Creates a [`DeviceConfig`] with a 30 minutes telemetry interval and
    /// a 100 ms idle delay.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            telemetry_interval_ms: DEFAULT_TELEMETRY_INTERVAL_MS,
            idle_delay_ms: DEFAULT_IDLE_DELAY_MS,
        }
    }

    /// Sets the telemetry interval in milliseconds.
    #[must_use]
    pub const fn telemetry_interval_ms(mut self, interval_ms: u32) -> Self {
        self.telemetry_interval_ms = interval_ms;
        self
    }

    /// Sets the idle delay between loop iterations in milliseconds.
    ///
    /// A zero delay is raised to 1 ms so the loop never busy-spins.
    #[must_use]
    pub const fn idle_delay_ms(mut self, delay_ms: u32) -> Self {
        self.idle_delay_ms = if delay_ms == 0 { 1 } else { delay_ms };
        self
    }
}
