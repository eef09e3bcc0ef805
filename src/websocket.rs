//! WebSocket transport for [`Channel`].

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::channel::{Channel, ChannelAddress};
use crate::error::{Error, Result};
use crate::observability::CHANNEL_ERRORS;

/// Time allowed for the WebSocket handshake when none is configured.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// A [`Channel`] over a WebSocket connection.
///
/// Only text frames carry chat traffic.  Binary frames are accepted if they
/// hold valid UTF-8; ping and pong frames are handled by the transport and
/// skipped here.
pub struct WebSocketChannel {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    address: ChannelAddress,
    open: bool,
}

impl WebSocketChannel {
    /// Connects to `address`, giving up after `timeout`.
    pub async fn connect(address: ChannelAddress, timeout: Duration) -> Result<Self> {
        tracing::debug!(%address, "connecting");
        let connecting = connect_async(address.as_str());
        let (stream, response) = match tokio::time::timeout(timeout, connecting).await {
            Ok(Ok(connected)) => connected,
            Ok(Err(err)) => {
                CHANNEL_ERRORS.click();
                return Err(Error::connection(
                    format!("failed to connect to {address}: {err}"),
                    Some(Box::new(err)),
                ));
            }
            Err(_) => {
                CHANNEL_ERRORS.click();
                return Err(Error::timeout(
                    format!("connecting to {address}"),
                    Some(timeout.as_secs_f64()),
                ));
            }
        };
        tracing::info!(%address, status = %response.status(), "channel open");
        Ok(Self {
            stream,
            address,
            open: true,
        })
    }

    /// Returns the address this channel is connected to.
    pub fn address(&self) -> &ChannelAddress {
        &self.address
    }
}

#[async_trait::async_trait]
impl Channel for WebSocketChannel {
    fn is_open(&self) -> bool {
        self.open
    }

    async fn send(&mut self, text: &str) -> Result<()> {
        if !self.open {
            return Err(Error::channel_closed(format!(
                "channel to {} is closed",
                self.address
            )));
        }
        if let Err(err) = self.stream.send(WsMessage::Text(text.to_string().into())).await {
            CHANNEL_ERRORS.click();
            self.open = false;
            return Err(err.into());
        }
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String>> {
        if !self.open {
            return None;
        }
        loop {
            match self.stream.next().await {
                Some(Ok(WsMessage::Text(text))) => return Some(Ok(text.as_str().to_owned())),
                Some(Ok(WsMessage::Binary(data))) => {
                    return Some(String::from_utf8(data.to_vec()).map_err(Error::from));
                }
                Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_))) => {
                    continue;
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    tracing::info!(address = %self.address, ?frame, "channel closed by peer");
                    self.open = false;
                    return None;
                }
                Some(Err(err)) => {
                    CHANNEL_ERRORS.click();
                    self.open = false;
                    let err = Error::from(err);
                    if err.is_channel_closed() {
                        return None;
                    }
                    return Some(Err(err));
                }
                None => {
                    self.open = false;
                    return None;
                }
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        match self.stream.close(None).await {
            Ok(()) => Ok(()),
            Err(err) => {
                let err = Error::from(err);
                if err.is_channel_closed() {
                    Ok(())
                } else {
                    Err(err)
                }
            }
        }
    }
}
