// region:    --- modules

use dotenv::dotenv;
use tracing_subscriber::EnvFilter;

use qr_fountain_stateless::config::{TransferConfig, TransferMode};
use qr_fountain_stateless::{Error, Result};

mod simulate;
mod udp;

// endregion: --- modules

#[async_std::main]
async fn main() -> Result<()> {
    // -- Loading dev env variables
    dotenv().ok();
    log_init();
    let config = TransferConfig::from_env()?;

    match config.mode {
        // -- Display loop stand-in
        TransferMode::Send => {
            let udp_service = udp::init_udp_service(&config.local_address, config.local_port)?;
            let foreign_address = config.foreign_address.as_deref().ok_or_else(|| Error::Config {
                var: "FOREIGN_ADDRESS".to_string(),
                reason: "not set".to_string(),
            })?;
            udp::connect_to_foreign_addr(&udp_service, foreign_address, config.foreign_port)?;
            udp::send_file(&udp_service, &config)?;
        }
        // -- Scan loop stand-in
        TransferMode::Recv => {
            let udp_service = udp::init_udp_service(&config.local_address, config.local_port)?;
            udp::receive_file(&udp_service, &config)?;
        }
        TransferMode::Simulate => simulate::run(&config).await?,
    }

    Ok(())
}

/// `RUST_LOG` wins, `info` otherwise.
fn log_init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
