use crate::audio::PlaybackFrame;
use crate::config::Config;
use futures_util::{SinkExt, StreamExt};
use mac_address::get_mac_address;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use url::Url;
use uuid::Uuid;

/// 音频发送超时，超时则丢弃该帧（不重发过期音频）
const SEND_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug)]
pub enum NetEvent {
    Text(String),
    Connected,
    Disconnected,
}

#[derive(Debug)]
pub enum NetCommand {
    SendText(String),
    SendBinary(Vec<u8>),
}

// 音频参数结构体
#[derive(Serialize)]
struct AudioParams {
    format: String,
    sample_rate: u32,
    channels: u8,
    frame_duration: u32,
}

// Hello Message，用于初始化连接
#[derive(Serialize)]
struct HelloMessage {
    #[serde(rename = "type")]
    msg_type: String,
    version: u8,
    transport: String,
    audio_params: AudioParams,
}

pub struct NetLink {
    config: Config,
    tx: mpsc::Sender<NetEvent>,
    rx_cmd: mpsc::Receiver<NetCommand>,
    /// 收到的二进制音频直接进播放队列（队列满则丢弃）
    playback_tx: mpsc::Sender<PlaybackFrame>,
    connected: Arc<AtomicBool>,
}

impl NetLink {
    pub fn new(
        config: Config,
        tx: mpsc::Sender<NetEvent>,
        rx_cmd: mpsc::Receiver<NetCommand>,
        playback_tx: mpsc::Sender<PlaybackFrame>,
        connected: Arc<AtomicBool>,
    ) -> Self {
        Self {
            config,
            tx,
            rx_cmd,
            playback_tx,
            connected,
        }
    }

    // 如果发生错误断开连接，指数退避后重连
    pub async fn run(mut self) {
        let mut retry_delay = 1;
        loop {
            if let Err(e) = self.connect_and_loop().await {
                log::warn!("Connection error: {}. Retrying in {}s...", e, retry_delay);
                self.connected.store(false, Ordering::Relaxed);
                let _ = self.tx.send(NetEvent::Disconnected).await;
                tokio::time::sleep(Duration::from_secs(retry_delay)).await;
                retry_delay = std::cmp::min(retry_delay * 2, 60);
            } else {
                // connect_and_loop returns Ok only when the command channel
                // closed, i.e. we are shutting down.
                self.connected.store(false, Ordering::Relaxed);
                break;
            }
        }
    }

    // 进入连接和主循环，处理WebSocket消息和发送命令
    async fn connect_and_loop(&mut self) -> anyhow::Result<()> {
        // 如果设备ID是unknown-device，则尝试获取MAC地址作为设备ID
        let device_id = if self.config.device_id == "unknown-device" {
            match get_mac_address() {
                Ok(Some(mac)) => mac.to_string().to_lowercase(),
                _ => Uuid::new_v4().to_string(),
            }
        } else {
            self.config.device_id.clone()
        };

        // 根据配置构建WebSocket请求
        let url = Url::parse(self.config.ws_url)?;
        let host = url.host_str().unwrap_or("localhost");

        let request = tokio_tungstenite::tungstenite::http::Request::builder()
            .method("GET")
            .uri(self.config.ws_url)
            .header("Host", host)
            .header("Connection", "Upgrade")
            .header("Upgrade", "websocket")
            .header("Sec-WebSocket-Version", "13")
            .header(
                "Sec-WebSocket-Key",
                tokio_tungstenite::tungstenite::handshake::client::generate_key(),
            )
            .header("Authorization", format!("Bearer {}", self.config.ws_token))
            .header("Device-Id", &device_id)
            .header("Client-Id", &self.config.client_id)
            .header("Protocol-Version", "1")
            .body(())?;

        log::info!("Connecting to {}...", self.config.ws_url);
        let (ws_stream, _) = connect_async(request).await?;
        log::info!("WebSocket connected");

        let (mut write, mut read) = ws_stream.split();

        self.connected.store(true, Ordering::Relaxed);
        self.tx.send(NetEvent::Connected).await?;

        // 发送Hello消息进行初始化链接
        let hello_msg = HelloMessage {
            msg_type: "hello".to_string(),
            version: 1,
            transport: "websocket".to_string(),
            audio_params: AudioParams {
                format: self.config.hello_format.to_string(),
                sample_rate: self.config.hello_sample_rate,
                channels: self.config.hello_channels,
                frame_duration: self.config.hello_frame_duration,
            },
        };
        let hello_json = serde_json::to_string(&hello_msg)?;

        log::info!("Sending Hello: {}", hello_json);
        write.send(Message::Text(hello_json.into())).await?;

        // 主循环，处理读取和写入
        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(msg)) => {
                            match msg {
                                Message::Text(text) => {
                                    // 信令通道，交给主循环处理
                                    self.tx.send(NetEvent::Text(text.to_string())).await?;
                                }
                                Message::Binary(data) => {
                                    // 接收回调上下文：拷走负载、非阻塞入队；
                                    // 队列满则丢弃（随 drop 释放）
                                    if data.is_empty() {
                                        continue;
                                    }
                                    if self.playback_tx.try_send(PlaybackFrame::Remote(data)).is_err() {
                                        log::warn!("Audio RX queue full, dropping data");
                                    }
                                }
                                Message::Close(frame) => {
                                    log::warn!("Server closed connection: {:?}", frame);
                                    return Err(anyhow::anyhow!("Connection closed"));
                                }
                                _ => {}
                            }
                        }
                        Some(Err(e)) => return Err(e.into()),
                        None => return Err(anyhow::anyhow!("Connection closed")),
                    }
                }
                cmd = self.rx_cmd.recv() => {
                    match cmd {
                        Some(NetCommand::SendText(text)) => {
                            write.send(Message::Text(text.into())).await?;
                        }
                        Some(NetCommand::SendBinary(data)) => {
                            // 有界超时发送；超时丢弃该帧，连接继续
                            match tokio::time::timeout(
                                SEND_TIMEOUT,
                                write.send(Message::Binary(data.into())),
                            )
                            .await
                            {
                                Ok(Ok(())) => {}
                                Ok(Err(e)) => return Err(e.into()),
                                Err(_) => {
                                    log::warn!("Send timed out after {:?}, frame dropped", SEND_TIMEOUT);
                                }
                            }
                        }
                        None => return Ok(()),
                    }
                }
            }
        }
    }
}
