#[derive(Debug, Clone)]
pub struct Config {
    // 音频设备配置
    pub capture_device: &'static str,
    pub playback_device: &'static str,
    pub sample_rate: u32,
    pub capture_channels: u32,
    pub playback_channels: u32,
    pub capture_period_size: usize,
    pub playback_period_size: usize,
    pub cycle_sleep_ms: u64,
    pub loopback: bool,

    // 音频处理配置
    pub gain: f32,
    pub compression_threshold: f32,
    pub compression_ratio: f32,
    pub enable_agc: bool,
    pub output_gain: f32,
    pub soft_limit: bool,
    pub soft_limit_threshold: i16,

    // 增强算法配置
    pub enhance_enabled: bool,
    pub enhance_aec: bool,
    pub enhance_se: bool,
    pub enhance_ns: bool,
    pub enhance_vad: bool,
    pub enhance_agc: bool,
    pub enhance_linear_gain: f32,
    pub enhance_agc_target_level: f32,
    pub enhance_noise_suppress_db: i32,
    pub enhance_vad_mode: u8,
    pub enhance_aec_filter_length: u32,
    pub enhance_vad_filter: bool,
    pub enhance_chunk_size: usize,

    // 队列配置
    pub relay_queue_depth: usize,
    pub relay_max_frame_bytes: usize,
    pub rx_queue_depth: usize,

    // 网络配置（静态部分）
    pub ws_url: &'static str,
    pub ws_token: &'static str,

    // 设备标识（动态部分，可在运行时修改）
    pub device_id: String,
    pub client_id: String,

    // Hello消息参数
    pub hello_format: &'static str,
    pub hello_sample_rate: u32,
    pub hello_channels: u8,
    pub hello_frame_duration: u32,
}

impl Config {
    /// 从编译时设置的环境变量创建配置
    /// 所有参数都在编译时从 config.toml 中读取
    pub fn new() -> Result<Self, &'static str> {
        Ok(Self {
            // 音频设备配置
            capture_device: env!("CAPTURE_DEVICE"),
            playback_device: env!("PLAYBACK_DEVICE"),
            sample_rate: env!("SAMPLE_RATE").parse()
                .map_err(|_| "Failed to parse SAMPLE_RATE")?,
            capture_channels: env!("CAPTURE_CHANNELS").parse()
                .map_err(|_| "Failed to parse CAPTURE_CHANNELS")?,
            playback_channels: env!("PLAYBACK_CHANNELS").parse()
                .map_err(|_| "Failed to parse PLAYBACK_CHANNELS")?,
            capture_period_size: env!("CAPTURE_PERIOD_SIZE").parse()
                .map_err(|_| "Failed to parse CAPTURE_PERIOD_SIZE")?,
            playback_period_size: env!("PLAYBACK_PERIOD_SIZE").parse()
                .map_err(|_| "Failed to parse PLAYBACK_PERIOD_SIZE")?,
            cycle_sleep_ms: env!("CYCLE_SLEEP_MS").parse()
                .map_err(|_| "Failed to parse CYCLE_SLEEP_MS")?,
            loopback: env!("LOOPBACK").parse()
                .map_err(|_| "Failed to parse LOOPBACK")?,

            // 音频处理配置
            gain: env!("GAIN").parse()
                .map_err(|_| "Failed to parse GAIN")?,
            compression_threshold: env!("COMPRESSION_THRESHOLD").parse()
                .map_err(|_| "Failed to parse COMPRESSION_THRESHOLD")?,
            compression_ratio: env!("COMPRESSION_RATIO").parse()
                .map_err(|_| "Failed to parse COMPRESSION_RATIO")?,
            enable_agc: env!("ENABLE_AGC").parse()
                .map_err(|_| "Failed to parse ENABLE_AGC")?,
            output_gain: env!("OUTPUT_GAIN").parse()
                .map_err(|_| "Failed to parse OUTPUT_GAIN")?,
            soft_limit: env!("SOFT_LIMIT").parse()
                .map_err(|_| "Failed to parse SOFT_LIMIT")?,
            soft_limit_threshold: env!("SOFT_LIMIT_THRESHOLD").parse()
                .map_err(|_| "Failed to parse SOFT_LIMIT_THRESHOLD")?,

            // 增强算法配置
            enhance_enabled: env!("ENHANCE_ENABLED").parse()
                .map_err(|_| "Failed to parse ENHANCE_ENABLED")?,
            enhance_aec: env!("ENHANCE_AEC").parse()
                .map_err(|_| "Failed to parse ENHANCE_AEC")?,
            enhance_se: env!("ENHANCE_SE").parse()
                .map_err(|_| "Failed to parse ENHANCE_SE")?,
            enhance_ns: env!("ENHANCE_NS").parse()
                .map_err(|_| "Failed to parse ENHANCE_NS")?,
            enhance_vad: env!("ENHANCE_VAD").parse()
                .map_err(|_| "Failed to parse ENHANCE_VAD")?,
            enhance_agc: env!("ENHANCE_AGC").parse()
                .map_err(|_| "Failed to parse ENHANCE_AGC")?,
            enhance_linear_gain: env!("ENHANCE_LINEAR_GAIN").parse()
                .map_err(|_| "Failed to parse ENHANCE_LINEAR_GAIN")?,
            enhance_agc_target_level: env!("ENHANCE_AGC_TARGET_LEVEL").parse()
                .map_err(|_| "Failed to parse ENHANCE_AGC_TARGET_LEVEL")?,
            enhance_noise_suppress_db: env!("ENHANCE_NOISE_SUPPRESS_DB").parse()
                .map_err(|_| "Failed to parse ENHANCE_NOISE_SUPPRESS_DB")?,
            enhance_vad_mode: env!("ENHANCE_VAD_MODE").parse()
                .map_err(|_| "Failed to parse ENHANCE_VAD_MODE")?,
            enhance_aec_filter_length: env!("ENHANCE_AEC_FILTER_LENGTH").parse()
                .map_err(|_| "Failed to parse ENHANCE_AEC_FILTER_LENGTH")?,
            enhance_vad_filter: env!("ENHANCE_VAD_FILTER").parse()
                .map_err(|_| "Failed to parse ENHANCE_VAD_FILTER")?,
            enhance_chunk_size: env!("ENHANCE_CHUNK_SIZE").parse()
                .map_err(|_| "Failed to parse ENHANCE_CHUNK_SIZE")?,

            // 队列配置
            relay_queue_depth: env!("RELAY_QUEUE_DEPTH").parse()
                .map_err(|_| "Failed to parse RELAY_QUEUE_DEPTH")?,
            relay_max_frame_bytes: env!("RELAY_MAX_FRAME_BYTES").parse()
                .map_err(|_| "Failed to parse RELAY_MAX_FRAME_BYTES")?,
            rx_queue_depth: env!("RX_QUEUE_DEPTH").parse()
                .map_err(|_| "Failed to parse RX_QUEUE_DEPTH")?,

            // 网络配置
            ws_url: env!("WS_URL"),
            ws_token: env!("WS_TOKEN"),

            // 设备标识初始化为config.toml中的值
            device_id: env!("DEVICE_ID").to_string(),
            client_id: env!("CLIENT_ID").to_string(),

            // Hello消息参数
            hello_format: env!("HELLO_FORMAT"),
            hello_sample_rate: env!("HELLO_SAMPLE_RATE").parse()
                .map_err(|_| "Failed to parse HELLO_SAMPLE_RATE")?,
            hello_channels: env!("HELLO_CHANNELS").parse()
                .map_err(|_| "Failed to parse HELLO_CHANNELS")?,
            hello_frame_duration: env!("HELLO_FRAME_DURATION").parse()
                .map_err(|_| "Failed to parse HELLO_FRAME_DURATION")?,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new().expect("Failed to create default Config from build-time environment variables")
    }
}
