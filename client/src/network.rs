//! TCP connection to the kitchen server.
//!
//! The render loop is synchronous, so the socket lives on a background thread
//! running its own tokio runtime. Decoded frames come back over a std channel
//! that the render loop drains once per frame.

use log::{error, info, warn};
use shared::protocol::{
    decode_server_frame, encode_client_control, split_frame, ClientControl, ServerFrame, FRAME_HEADER_LEN,
};
use std::error::Error;
use std::sync::mpsc;
use std::thread;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc as async_mpsc;

#[derive(Debug)]
pub enum NetworkEvent {
    Connected,
    Frame(ServerFrame),
    Disconnected(String),
}

pub struct NetworkClient {
    outbox: async_mpsc::UnboundedSender<ClientControl>,
    events: mpsc::Receiver<NetworkEvent>,
    connected: bool,
}

impl NetworkClient {
    /// Starts connecting to `server_addr` in the background. Connection
    /// progress is reported through [`NetworkClient::poll`].
    pub fn connect(server_addr: &str) -> Result<Self, Box<dyn Error>> {
        let (event_tx, events) = mpsc::channel();
        let (outbox, outbox_rx) = async_mpsc::unbounded_channel();
        let addr = server_addr.to_string();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        thread::Builder::new()
            .name("network".to_string())
            .spawn(move || {
                runtime.block_on(run_connection(addr, outbox_rx, event_tx));
            })?;

        Ok(Self {
            outbox,
            events,
            connected: false,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Queues a control message. Returns false when the connection is gone.
    pub fn send(&self, message: ClientControl) -> bool {
        self.outbox.send(message).is_ok()
    }

    /// Drains every event received since the last call.
    pub fn poll(&mut self) -> Vec<NetworkEvent> {
        let events: Vec<NetworkEvent> = self.events.try_iter().collect();
        for event in &events {
            match event {
                NetworkEvent::Connected => self.connected = true,
                NetworkEvent::Disconnected(_) => self.connected = false,
                NetworkEvent::Frame(_) => {}
            }
        }
        events
    }
}

async fn run_connection(
    addr: String,
    outbox: async_mpsc::UnboundedReceiver<ClientControl>,
    events: mpsc::Sender<NetworkEvent>,
) {
    let stream = match TcpStream::connect(&addr).await {
        Ok(stream) => stream,
        Err(e) => {
            error!("Failed to connect to {}: {}", addr, e);
            let _ = events.send(NetworkEvent::Disconnected(e.to_string()));
            return;
        }
    };
    if let Err(e) = stream.set_nodelay(true) {
        warn!("Failed to set TCP_NODELAY: {}", e);
    }
    info!("Connected to {}", addr);
    let _ = events.send(NetworkEvent::Connected);

    let (reader, writer) = stream.into_split();
    let reason = tokio::select! {
        result = read_loop(reader, &events) => match result {
            Ok(()) => "Server closed the connection".to_string(),
            Err(e) => e.to_string(),
        },
        result = write_loop(writer, outbox) => match result {
            Ok(()) => "Client shut down".to_string(),
            Err(e) => e.to_string(),
        },
    };
    info!("Disconnected: {}", reason);
    let _ = events.send(NetworkEvent::Disconnected(reason));
}

async fn read_loop(
    mut reader: OwnedReadHalf,
    events: &mpsc::Sender<NetworkEvent>,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let mut buffer: Vec<u8> = Vec::with_capacity(64 * 1024);
    let mut chunk = [0u8; 16 * 1024];

    loop {
        let read = reader.read(&mut chunk).await?;
        if read == 0 {
            return Ok(());
        }
        buffer.extend_from_slice(&chunk[..read]);

        let mut consumed = 0;
        loop {
            match split_frame(&buffer[consumed..]) {
                Ok(Some((body, used))) => {
                    match decode_server_frame(body) {
                        Ok(frame) => {
                            if events.send(NetworkEvent::Frame(frame)).is_err() {
                                return Ok(());
                            }
                        }
                        Err(e) => warn!("Dropping malformed frame: {}", e),
                    }
                    consumed += used;
                }
                Ok(None) => break,
                Err(e) if e.is_recoverable() => {
                    warn!("Dropping malformed frame header: {}", e);
                    consumed += FRAME_HEADER_LEN;
                }
                // An oversized length prefix leaves the stream unrecoverable.
                Err(e) => return Err(e.into()),
            }
        }
        buffer.drain(..consumed);
    }
}

async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut outbox: async_mpsc::UnboundedReceiver<ClientControl>,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    while let Some(message) = outbox.recv().await {
        match encode_client_control(&message) {
            Ok(bytes) => writer.write_all(&bytes).await?,
            Err(e) => warn!("Failed to encode {:?}: {}", message, e),
        }
    }
    Ok(())
}
