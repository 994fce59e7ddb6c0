use crate::protocol;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

/// Runtime knobs for the bridge.
///
/// `Default` matches the stock camera; [`BridgeConfig::from_env`] layers
/// `SUEAR_*` environment overrides on top.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Camera address on its own Wi-Fi network.
    pub device: Ipv4Addr,
    pub command_port: u16,
    pub stream_init_port: u16,
    /// Candidate video receive ports, tried in order.
    pub recv_ports: Vec<u16>,
    pub http_addr: SocketAddr,
    /// Number of frames that may be in flight at once.
    pub pool_capacity: usize,
    pub frame_capacity: usize,
    pub command_timeout: Duration,
    /// How long a viewer sleeps when no new frame is available.
    pub poll_interval: Duration,
    /// Pause before the second pass over `recv_ports`.
    pub bind_retry_delay: Duration,
    /// Pause after teardown so the OS can release the UDP port.
    pub settle_delay: Duration,
    /// Upper bound on waiting for the reader thread during teardown.
    pub join_timeout: Duration,
    /// Socket read timeout the reader uses to notice the stop flag.
    pub reader_poll: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            device: Ipv4Addr::new(192, 168, 1, 1),
            command_port: protocol::COMMAND_PORT,
            stream_init_port: protocol::STREAM_INIT_PORT,
            recv_ports: protocol::STREAM_RECV_PORTS.to_vec(),
            http_addr: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 45100)),
            pool_capacity: 8,
            frame_capacity: protocol::FRAME_BUFFER_SIZE,
            command_timeout: Duration::from_secs(2),
            poll_interval: Duration::from_millis(10),
            bind_retry_delay: Duration::from_millis(500),
            settle_delay: Duration::from_millis(300),
            join_timeout: Duration::from_secs(2),
            reader_poll: Duration::from_millis(100),
        }
    }
}

impl BridgeConfig {
    /// Defaults overridden by any `SUEAR_*` variables that parse cleanly.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            device: read_env("SUEAR_DEVICE", defaults.device),
            command_port: read_env("SUEAR_COMMAND_PORT", defaults.command_port),
            stream_init_port: read_env("SUEAR_STREAM_INIT_PORT", defaults.stream_init_port),
            recv_ports: read_env_ports("SUEAR_RECV_PORTS", defaults.recv_ports.clone()),
            http_addr: read_env("SUEAR_HTTP_ADDR", defaults.http_addr),
            pool_capacity: read_env("SUEAR_POOL_CAPACITY", defaults.pool_capacity).max(1),
            command_timeout: Duration::from_millis(read_env(
                "SUEAR_COMMAND_TIMEOUT_MS",
                defaults.command_timeout.as_millis() as u64,
            )),
            ..defaults
        }
    }

    pub fn command_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.device, self.command_port))
    }

    pub fn stream_init_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.device, self.stream_init_port))
    }
}

fn read_env<T: std::str::FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(v) => match v.trim().parse::<T>() {
            Ok(parsed) => parsed,
            Err(_) => {
                log::warn!("Ignoring unparsable {}='{}'", name, v);
                default
            }
        },
        Err(_) => default,
    }
}

fn read_env_ports(name: &str, default: Vec<u16>) -> Vec<u16> {
    let Ok(v) = std::env::var(name) else {
        return default;
    };
    let ports: std::result::Result<Vec<u16>, _> = v
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse::<u16>)
        .collect();
    match ports {
        Ok(ports) if !ports.is_empty() => ports,
        _ => {
            log::warn!("Ignoring unparsable {}='{}'", name, v);
            default
        }
    }
}
