// region:    --- Modules

use std::fs;
use std::net::UdpSocket;
use std::thread;

use tracing::{info, warn};

use qr_fountain_stateless::config::TransferConfig;
use qr_fountain_stateless::{Decoder, Encoder, Error, FrameOutcome, Result};

// endregion: --- Modules

/// Largest UDP payload, one frame per datagram.
const MAX_DATAGRAM: usize = 65_507;

pub fn init_udp_service(local_address: &str, port: u16) -> Result<UdpSocket> {
    let udp_addr = format!("{}:{}", local_address, port);
    let udp_service = UdpSocket::bind(&udp_addr)?;
    info!("UDP socket initialised at {}", udp_addr);
    Ok(udp_service)
}

pub fn connect_to_foreign_addr(
    udp_service: &UdpSocket,
    foreign_address: &str,
    foreign_port: u16,
) -> Result<()> {
    let foreign_addr = format!("{}:{}", foreign_address, foreign_port);
    udp_service.connect(&foreign_addr)?;
    info!("UDP socket connected to {}", foreign_addr);
    Ok(())
}

/// Stands in for the display loop: shows every frame of a cycle as one datagram,
/// `frame_interval` apart, for `send_cycles` cycles (0 = until killed).
pub fn send_file(udp_service: &UdpSocket, config: &TransferConfig) -> Result<()> {
    let path = config.sending_file.as_ref().ok_or_else(|| Error::Config {
        var: "SENDING_FILE".to_string(),
        reason: "not set".to_string(),
    })?;
    let file = fs::read(path)?;

    let mut encoder = Encoder::new(config.chunk_length)?;
    encoder.set_redundancy_factor(config.redundancy_factor)?;
    encoder.encode(&file)?;
    info!(
        "->> Sending {} ({} bytes) as {} chunks, {} frames per cycle",
        path.display(),
        file.len(),
        encoder.chunk_count(),
        encoder.frame_count()
    );

    check_datagram_size(&encoder)?;

    let limit = match config.send_cycles {
        0 => usize::MAX,
        cycles => encoder.frame_count().saturating_mul(cycles as usize),
    };
    for frame in encoder.frames().take(limit) {
        let frame = frame?;
        if let Err(err) = udp_service.send(frame.as_bytes()) {
            // -- a lost frame is what the redundancy is for
            warn!("send failed: {}", err);
        }
        thread::sleep(config.frame_interval);
    }
    Ok(())
}

/// Every frame of a cycle must fit one datagram, or no send would ever succeed.
fn check_datagram_size(encoder: &Encoder) -> Result<()> {
    let mut largest = 0;
    for frame in encoder.frames().take(encoder.frame_count()) {
        largest = largest.max(frame?.len());
    }
    if largest > MAX_DATAGRAM {
        return Err(Error::Config {
            var: "CHUNK_LENGTH".to_string(),
            reason: format!(
                "{} gives frames of up to {} bytes, a datagram holds {}",
                encoder.chunk_length(),
                largest,
                MAX_DATAGRAM
            ),
        });
    }
    Ok(())
}

/// Stands in for the scan loop: feeds datagrams to a decoder until the payload
/// is complete, then writes it to `received_file`.
pub fn receive_file(udp_service: &UdpSocket, config: &TransferConfig) -> Result<()> {
    let mut decoder = Decoder::new();
    let mut buffer = vec![0; MAX_DATAGRAM];
    let mut last_progress = 0;

    loop {
        let (bytes, _) = udp_service.recv_from(&mut buffer)?;
        match decoder.decode_bytes(&buffer[..bytes]) {
            Ok(FrameOutcome::Completed) => break,
            Ok(_) => {}
            // -- already logged by the decoder, keep scanning
            Err(_) => continue,
        }
        let progress = decoder.progress();
        if progress != last_progress {
            info!("->> Progress: {}% ({:.1} chunks/s)", progress, decoder.speed());
            last_progress = progress;
        }
    }

    let payload = decoder.data_bytes()?;
    fs::write(&config.received_file, payload)?;
    info!(
        "->> Received {} bytes in {:?} ({:.0} B/s), written to {}",
        payload.len(),
        decoder.total_time(),
        decoder.byte_rate(),
        config.received_file.display()
    );
    Ok(())
}
