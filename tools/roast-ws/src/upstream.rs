// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Sensor link - reads temperature readings from the roaster's WebSocket.
//!
//! The sensor pushes `{"temp": <number>, "unit": <string>?}` text frames.
//! Readings carry no clock; each one is stamped on arrival.

use async_trait::async_trait;
use futures::StreamExt;
use roast_relay::error::Result;
use roast_relay::{RelayError, Sample, SampleSource};
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

/// Reading as sent by the sensor
#[derive(Debug, Deserialize)]
struct SensorReading {
    temp: f64,
    #[serde(default)]
    unit: Option<String>,
}

/// Decode one sensor frame into a sample stamped `now`.
fn decode_reading(text: &str) -> Option<Sample> {
    let reading: SensorReading = serde_json::from_str(text).ok()?;
    let sample = Sample::now(reading.temp);
    Some(match reading.unit.filter(|u| !u.is_empty()) {
        Some(unit) => sample.with_unit(unit),
        None => sample,
    })
}

/// WebSocket client for the roaster's sensor
pub struct UpstreamSource {
    url: String,
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl UpstreamSource {
    /// Connect to `ws://<host>/`.
    pub async fn connect(host: &str) -> Result<Self> {
        let url = format!("ws://{}/", host);
        let (stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| RelayError::UpstreamDisconnected(format!("{}: {}", url, e)))?;
        info!("Connected to sensor at {}", url);
        Ok(Self { url, stream })
    }
}

#[async_trait]
impl SampleSource for UpstreamSource {
    async fn next_sample(&mut self) -> Result<Option<Sample>> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => match decode_reading(&text) {
                    Some(sample) => return Ok(Some(sample)),
                    None => warn!("Ignoring unreadable sensor frame: {}", text),
                },
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|f| f.reason.to_string())
                        .filter(|r| !r.is_empty())
                        .unwrap_or_else(|| "closed by sensor".to_string());
                    return Err(RelayError::UpstreamDisconnected(reason));
                }
                Some(Ok(other)) => debug!("Skipping non-text sensor frame ({} bytes)", other.len()),
                Some(Err(e)) => return Err(RelayError::UpstreamDisconnected(e.to_string())),
                None => {
                    return Err(RelayError::UpstreamDisconnected(
                        "sensor stream ended".to_string(),
                    ))
                }
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!("Sensor close failed: {}", e);
        }
    }

    fn describe(&self) -> String {
        format!("sensor {}", self.url)
    }
}
