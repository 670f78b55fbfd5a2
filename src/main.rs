use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tokio::sync::mpsc;
use uuid::Uuid;

use voicelink_linux_rs::audio::{relay, run_sender, AudioPipeline, PlaybackFrame};
use voicelink_linux_rs::config::Config;
use voicelink_linux_rs::net_link::{NetCommand, NetEvent, NetLink};
use voicelink_linux_rs::protocol::ServerMessage;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    env_logger::init();

    // 加载配置
    let mut config = Config::new().unwrap_or_default();

    log::info!("========================================");
    log::info!("  {} v{} — WebSocket audio bridge", env!("APP_NAME"), env!("APP_VERSION"));
    log::info!("========================================");

    // 设备端UUID，先从本地文件读取以保持重启间身份一致，如果不存在则生成新的并保存
    let uuid_file_path = "voicelink_uuid.txt";
    if config.client_id == "unknown-client" {
        if let Ok(content) = std::fs::read_to_string(uuid_file_path) {
            let trimmed = content.trim();
            if !trimmed.is_empty() {
                config.client_id = trimmed.to_string();
                log::info!("Loaded Client ID from file: {}", config.client_id);
            }
        }
    }

    // 生成新的UUID并保存
    if config.client_id == "unknown-client" {
        config.client_id = Uuid::new_v4().to_string();
        log::info!("Generated new Client ID: {}", config.client_id);
        if let Err(e) = std::fs::write(uuid_file_path, &config.client_id) {
            log::warn!("Failed to save Client ID to file: {}", e);
        }
    }

    // 创建通道，用于组件间通信
    // 网络事件通道
    let (tx_net_event, mut rx_net_event) = mpsc::channel::<NetEvent>(100);

    // 网络命令通道
    let (tx_net_cmd, rx_net_cmd) = mpsc::channel::<NetCommand>(100);

    // 音频发送中继队列（采集侧非阻塞入队，满则丢帧）
    let (relay_tx, relay_rx) = relay::channel(config.relay_queue_depth);

    // 播放队列（网络接收 + 本地回环）
    let (playback_tx, playback_rx) = mpsc::channel::<PlaybackFrame>(config.rx_queue_depth);

    // 连接状态标志：网络任务写，发送任务读
    let connected = Arc::new(AtomicBool::new(false));

    // 启动网络链接
    let net_link = NetLink::new(
        config.clone(),
        tx_net_event,
        rx_net_cmd,
        playback_tx.clone(),
        connected.clone(),
    );
    tokio::spawn(async move {
        net_link.run().await;
    });

    // 启动发送任务：中继队列 → WebSocket
    tokio::spawn(run_sender(relay_rx, tx_net_cmd, connected.clone()));

    // 启动音频管线（采集/增强 + 播放线程）
    let mut pipeline = AudioPipeline::start(config.clone(), relay_tx, playback_tx, playback_rx)?;
    let heartbeat = pipeline.heartbeat();
    let watch_feeder = pipeline.is_enhanced();

    log::info!("System up. Speak into the microphone.");

    // 看门狗节拍：增强管线的 feeder 停止推进时报警
    let mut watchdog = tokio::time::interval(Duration::from_secs(5));
    let mut last_heartbeat = 0u64;
    // 跳过 interval 的立即首拍
    watchdog.tick().await;

    // 主事件循环，处理各组件事件
    loop {
        tokio::select! {
            // 监听 Ctrl+C 信号
            _ = signal::ctrl_c() => {
                log::info!("Received Ctrl+C, shutting down...");
                break;
            }

            // 监听与服务器的网络事件
            Some(event) = rx_net_event.recv() => {
                match event {
                    // 文本帧仅作信息展示，不进入音频路径
                    NetEvent::Text(text) => {
                        match serde_json::from_str::<ServerMessage>(&text) {
                            Ok(msg) => {
                                log::info!(
                                    "Server message: type={} state={:?} text={:?} session={:?}",
                                    msg.msg_type,
                                    msg.state,
                                    msg.text,
                                    msg.session_id,
                                );
                            }
                            Err(_) => {
                                log::info!("Server text: {}", text);
                            }
                        }
                    }
                    NetEvent::Connected => {
                        log::info!("Link up, audio streaming enabled");
                    }
                    NetEvent::Disconnected => {
                        log::warn!("Link down, dropping outbound audio until reconnect");
                    }
                }
            }

            // 看门狗：feeder 必须持续推进
            _ = watchdog.tick(), if watch_feeder => {
                let current = heartbeat.load(Ordering::Relaxed);
                if current == last_heartbeat {
                    log::error!("Feeder heartbeat stalled at {} chunks", current);
                }
                last_heartbeat = current;
            }
        }
    }

    // 协作式关停：清标志、合流采集线程，队列关闭让阻塞消费者退出
    pipeline.stop();
    tokio::time::sleep(Duration::from_millis(200)).await;
    log::info!("Shutdown complete");

    Ok(())
}
