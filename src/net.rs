//! Serves host output as an endless WAV stream over TCP.

use std::net::SocketAddr;

use anyhow::Result;
use byteorder::{LittleEndian, WriteBytesExt};
use hound::{SampleFormat, WavSpec};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

use crate::constants::{BIT_DEPTH, CHANNELS, OUTPUT_SAMPLE_RATE};
use crate::host::{HostOutput, StereoSample};

pub fn init(listen_addr: String, source: HostOutput) {
    tokio::spawn(async move {
        let listener = match TcpListener::bind(&listen_addr).await {
            Ok(listener) => listener,
            Err(e) => {
                error!("Failed to listen on {listen_addr}: {e}");
                return;
            }
        };
        info!("Streaming speech as WAV on {listen_addr}");

        loop {
            let result = accept(&listener, &source).await;

            match result {
                Ok(addr) => info!("Accepted connection from {}", addr),
                Err(e) => warn!("Failed to accept connection: {}", e),
            }
        }
    });
}

/// Header for a 48 kHz 16-bit stereo stream of unknown length.
pub fn wav_header() -> Vec<u8> {
    let spec = WavSpec {
        channels: CHANNELS,
        sample_rate: OUTPUT_SAMPLE_RATE,
        bits_per_sample: BIT_DEPTH,
        sample_format: SampleFormat::Int,
    };

    spec.into_header_for_infinite_file()
}

/// Interleaved little-endian PCM for `samples`.
pub fn encode_samples(samples: &[StereoSample]) -> Vec<u8> {
    let mut wav_data: Vec<u8> = Vec::with_capacity(samples.len() * 4);

    for &(left, right) in samples {
        // Writing into a Vec cannot fail
        let _ = WriteBytesExt::write_i16::<LittleEndian>(&mut wav_data, left);
        let _ = WriteBytesExt::write_i16::<LittleEndian>(&mut wav_data, right);
    }

    wav_data
}

async fn accept(listener: &TcpListener, source: &HostOutput) -> Result<SocketAddr> {
    let (mut stream, addr) = listener.accept().await?;

    let mut source = source.clone();

    // Spawn a new task to handle the connection
    tokio::spawn(async move {
        // Players recognize the stream as a wav file from the header
        if let Err(e) = stream.write_all(&wav_header()).await {
            warn!("Failed to write wav header to {addr}: {e}");
            return;
        }

        loop {
            if source.changed().await.is_err() {
                debug!("Host output closed, dropping {addr}");
                break;
            }

            let wav_data = encode_samples(&source.borrow_and_update());

            if let Err(e) = stream.write_all(wav_data.as_slice()).await {
                info!("Connection from {addr} closed: {e}");
                break;
            }
        }
    });

    Ok(addr)
}
