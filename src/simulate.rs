//! In-process run of a whole transfer over a lossy channel.
//!
//! A sender task plays the display loop, a channel that drops frames at
//! `LOSS_RATE` plays the camera, a receiver task feeds a `SharedDecoder` and a
//! monitor task reads its progress concurrently, as a UI thread would.

// region:    --- Modules

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_std::channel;
use async_std::path::PathBuf;
use async_std::sync::Arc;
use async_std::{fs, task};
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{info, warn};

use qr_fountain_stateless::bridge::SharedDecoder;
use qr_fountain_stateless::config::TransferConfig;
use qr_fountain_stateless::{Encoder, Error, Result};

// endregion: --- Modules

const DEMO_PAYLOAD_LEN: usize = 4096;
const MONITOR_INTERVAL: Duration = Duration::from_millis(250);

pub async fn run(config: &TransferConfig) -> Result<()> {
    let mut rng = ChaCha8Rng::seed_from_u64(config.simulation_seed);
    let payload = match &config.sending_file {
        Some(path) => fs::read(PathBuf::from(path.clone())).await?,
        None => {
            let mut payload = vec![0u8; DEMO_PAYLOAD_LEN];
            rng.fill_bytes(&mut payload);
            payload
        }
    };

    let mut encoder = Encoder::new(config.chunk_length)?;
    encoder.set_redundancy_factor(config.redundancy_factor)?;
    encoder.encode(&payload)?;
    info!(
        "->> Simulating {} bytes, {} chunks, {} frames per cycle, loss rate {}",
        payload.len(),
        encoder.chunk_count(),
        encoder.frame_count(),
        config.loss_rate
    );

    let (tx, rx) = channel::bounded::<String>(64);
    let done = Arc::new(AtomicBool::new(false));
    let decoder = SharedDecoder::new();

    // -- Sender: cycles frames until the receiver is done, dropping some on the way
    let sender_done = Arc::clone(&done);
    let loss_rate = config.loss_rate;
    let frame_interval = config.frame_interval;
    let sender = task::spawn(async move {
        let (mut shown, mut dropped) = (0u64, 0u64);
        for frame in encoder.frames() {
            if sender_done.load(Ordering::Relaxed) {
                break;
            }
            let frame = frame?;
            shown += 1;
            if rng.gen::<f64>() < loss_rate {
                dropped += 1;
            } else if tx.send(frame).await.is_err() {
                break;
            }
            task::sleep(frame_interval).await;
        }
        Ok::<_, Error>((shown, dropped))
    });

    // -- Receiver: the scan loop
    let receiver_decoder = decoder.clone();
    let receiver_done = Arc::clone(&done);
    let receiver = task::spawn(async move {
        while let Ok(frame) = rx.recv().await {
            if let Some(err) = receiver_decoder.decode(&frame) {
                warn!("->> scan error: {}", err);
            }
            if receiver_decoder.is_completed() {
                break;
            }
        }
        receiver_done.store(true, Ordering::Relaxed);
    });

    // -- Monitor: reads progress while the receiver decodes
    let monitor_decoder = decoder.clone();
    let monitor_done = Arc::clone(&done);
    let monitor = task::spawn(async move {
        while !monitor_done.load(Ordering::Relaxed) {
            task::sleep(MONITOR_INTERVAL).await;
            info!(
                "->> Progress: {}% ({:.1} chunks/s)",
                monitor_decoder.progress(),
                monitor_decoder.speed()
            );
        }
    });

    receiver.await;
    let (shown, dropped) = sender.await?;
    monitor.await;

    let received = decoder.with(|d| d.data_bytes().map(<[u8]>::to_vec))?;
    if received != payload {
        warn!("->> Reconstructed payload differs from the original");
    }
    fs::write(PathBuf::from(config.received_file.clone()), &received).await?;
    info!(
        "->> Done: {} frames shown, {} dropped, {} ms, written to {}",
        shown,
        dropped,
        decoder.total_time_ms(),
        config.received_file.display()
    );
    Ok(())
}
