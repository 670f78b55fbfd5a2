use std::fs;
use std::path::Path;
use serde::Deserialize;

#[derive(Deserialize)]
struct Config {
    application: Application,
    audio: Audio,
    processing: Processing,
    enhancement: Enhancement,
    relay: Relay,
    network: Network,
    hello_message: HelloMessage,
}

#[derive(Deserialize)]
struct Application {
    name: String,
    version: String,
}

#[derive(Deserialize)]
struct Audio {
    capture_device: String,
    playback_device: String,
    sample_rate: u32,
    capture_channels: u32,
    playback_channels: u32,
    capture_period_size: usize,
    playback_period_size: usize,
    cycle_sleep_ms: u64,
    loopback: bool,
}

#[derive(Deserialize)]
struct Processing {
    gain: f32,
    compression_threshold: f32,
    compression_ratio: f32,
    enable_agc: bool,
    output_gain: f32,
    soft_limit: bool,
    soft_limit_threshold: i16,
}

#[derive(Deserialize)]
struct Enhancement {
    enabled: bool,
    aec: bool,
    se: bool,
    ns: bool,
    vad: bool,
    agc: bool,
    linear_gain: f32,
    agc_target_level: f32,
    noise_suppress_db: i32,
    vad_mode: u8,
    aec_filter_length: u32,
    vad_filter: bool,
    chunk_size: usize,
}

#[derive(Deserialize)]
struct Relay {
    queue_depth: usize,
    max_frame_bytes: usize,
    rx_queue_depth: usize,
}

#[derive(Deserialize)]
struct Network {
    ws_url: String,
    ws_token: String,
    device_id: String,
    client_id: String,
}

#[derive(Deserialize)]
struct HelloMessage {
    format: String,
    sample_rate: u32,
    channels: u8,
    frame_duration: u32,
}

// 在编译时读取 config.toml 并设置环境变量
fn main() {
    println!("cargo:rerun-if-changed=config.toml");

    let config_path = Path::new("config.toml");
    if !config_path.exists() {
        panic!("config.toml not found!");
    }

    let config_str = fs::read_to_string(config_path).expect("Failed to read config.toml");
    let config: Config = toml::from_str(&config_str).expect("Failed to parse config.toml");

    // 应用信息
    println!("cargo:rustc-env=APP_NAME={}", config.application.name);
    println!("cargo:rustc-env=APP_VERSION={}", config.application.version);

    // 音频设备配置
    println!("cargo:rustc-env=CAPTURE_DEVICE={}", config.audio.capture_device);
    println!("cargo:rustc-env=PLAYBACK_DEVICE={}", config.audio.playback_device);
    println!("cargo:rustc-env=SAMPLE_RATE={}", config.audio.sample_rate);
    println!("cargo:rustc-env=CAPTURE_CHANNELS={}", config.audio.capture_channels);
    println!("cargo:rustc-env=PLAYBACK_CHANNELS={}", config.audio.playback_channels);
    println!("cargo:rustc-env=CAPTURE_PERIOD_SIZE={}", config.audio.capture_period_size);
    println!("cargo:rustc-env=PLAYBACK_PERIOD_SIZE={}", config.audio.playback_period_size);
    println!("cargo:rustc-env=CYCLE_SLEEP_MS={}", config.audio.cycle_sleep_ms);
    println!("cargo:rustc-env=LOOPBACK={}", config.audio.loopback);

    // 音频处理配置
    println!("cargo:rustc-env=GAIN={}", config.processing.gain);
    println!("cargo:rustc-env=COMPRESSION_THRESHOLD={}", config.processing.compression_threshold);
    println!("cargo:rustc-env=COMPRESSION_RATIO={}", config.processing.compression_ratio);
    println!("cargo:rustc-env=ENABLE_AGC={}", config.processing.enable_agc);
    println!("cargo:rustc-env=OUTPUT_GAIN={}", config.processing.output_gain);
    println!("cargo:rustc-env=SOFT_LIMIT={}", config.processing.soft_limit);
    println!("cargo:rustc-env=SOFT_LIMIT_THRESHOLD={}", config.processing.soft_limit_threshold);

    // 增强算法配置
    println!("cargo:rustc-env=ENHANCE_ENABLED={}", config.enhancement.enabled);
    println!("cargo:rustc-env=ENHANCE_AEC={}", config.enhancement.aec);
    println!("cargo:rustc-env=ENHANCE_SE={}", config.enhancement.se);
    println!("cargo:rustc-env=ENHANCE_NS={}", config.enhancement.ns);
    println!("cargo:rustc-env=ENHANCE_VAD={}", config.enhancement.vad);
    println!("cargo:rustc-env=ENHANCE_AGC={}", config.enhancement.agc);
    println!("cargo:rustc-env=ENHANCE_LINEAR_GAIN={}", config.enhancement.linear_gain);
    println!("cargo:rustc-env=ENHANCE_AGC_TARGET_LEVEL={}", config.enhancement.agc_target_level);
    println!("cargo:rustc-env=ENHANCE_NOISE_SUPPRESS_DB={}", config.enhancement.noise_suppress_db);
    println!("cargo:rustc-env=ENHANCE_VAD_MODE={}", config.enhancement.vad_mode);
    println!("cargo:rustc-env=ENHANCE_AEC_FILTER_LENGTH={}", config.enhancement.aec_filter_length);
    println!("cargo:rustc-env=ENHANCE_VAD_FILTER={}", config.enhancement.vad_filter);
    println!("cargo:rustc-env=ENHANCE_CHUNK_SIZE={}", config.enhancement.chunk_size);

    // 队列配置
    println!("cargo:rustc-env=RELAY_QUEUE_DEPTH={}", config.relay.queue_depth);
    println!("cargo:rustc-env=RELAY_MAX_FRAME_BYTES={}", config.relay.max_frame_bytes);
    println!("cargo:rustc-env=RX_QUEUE_DEPTH={}", config.relay.rx_queue_depth);

    // 网络配置
    println!("cargo:rustc-env=WS_URL={}", config.network.ws_url);
    println!("cargo:rustc-env=WS_TOKEN={}", config.network.ws_token);
    println!("cargo:rustc-env=DEVICE_ID={}", config.network.device_id);
    println!("cargo:rustc-env=CLIENT_ID={}", config.network.client_id);

    // Hello 消息配置
    println!("cargo:rustc-env=HELLO_FORMAT={}", config.hello_message.format);
    println!("cargo:rustc-env=HELLO_SAMPLE_RATE={}", config.hello_message.sample_rate);
    println!("cargo:rustc-env=HELLO_CHANNELS={}", config.hello_message.channels);
    println!("cargo:rustc-env=HELLO_FRAME_DURATION={}", config.hello_message.frame_duration);

    link_speexdsp();
}

// 链接 libspeexdsp，增强算法（NS/AGC/VAD/AEC）依赖它
fn link_speexdsp() {
    let target = std::env::var("TARGET").unwrap_or_default();

    if target.contains("musl") {
        // musl 目标：使用手动编译的静态库，不依赖 pkg-config
        if let Ok(sysroot) = std::env::var("MUSL_SYSROOT") {
            println!("cargo:rustc-link-search=native={}/usr/lib", sysroot);
        }
        println!("cargo:rustc-link-lib=static=speexdsp");
        return;
    }

    // 其他目标：通过 pkg-config 查找 libspeexdsp
    pkg_config::Config::new()
        .probe("speexdsp")
        .expect("Failed to find speexdsp. Please install libspeexdsp-dev.");
}
