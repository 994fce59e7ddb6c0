//! suear-mirror: serve a Suear camera's video feed as an MJPEG stream.
//!
//! Usage:
//!   suear-mirror
//!   Open http://localhost:45100/stream
//!
//! Settings come from `SUEAR_*` environment variables (see `BridgeConfig`);
//! `RUST_LOG` controls verbosity.

use suear::{BridgeConfig, MirrorServer};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = BridgeConfig::from_env();
    log::info!("Camera at {}", config.device);

    let server = match MirrorServer::bind(config) {
        Ok(server) => server,
        Err(e) => {
            eprintln!("Failed to start HTTP server: {}", e);
            std::process::exit(1);
        }
    };

    match server.session().device_info() {
        Ok(info) => log::info!("Camera reachable ({} bytes of device info)", info.len()),
        Err(e) => log::warn!(
            "Camera not reachable yet ({}); is this host on its Wi-Fi network?",
            e
        ),
    }
    server.run();
}
