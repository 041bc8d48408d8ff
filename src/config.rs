//! CLI 参数与服务器配置默认值。

use clap::Parser;
use shadow_rs::formatcp;

use crate::build;

const VERSION_INFO: &str = formatcp!(
    "{}\ncommit_hash: {}\nbuild_time: {}\nbuild_env: {},{}",
    build::PKG_VERSION,
    build::SHORT_COMMIT,
    build::BUILD_TIME,
    build::RUST_VERSION,
    build::RUST_CHANNEL
);

/// 搜索词的最大长度（字符数）。浏览器表单有同样限制，但不可信任。
pub const MAX_SEARCH_TERM_CHARS: usize = 1000;
/// 引擎停止扫描前返回的匹配数上限。
pub const MAX_SEARCH_RESULTS: usize = 1000;
/// 超过该长度的匹配行在响应中被截断。
pub const MAX_RESULT_LINE_CHARS: usize = 300;
/// 单行参与匹配的字节上限，超长行的剩余部分直接丢弃。
pub const MAX_SCANNED_LINE_BYTES: usize = 64 * 1024;
/// 单次搜索请求的墙钟时间上限。
pub const SEARCH_TIMEOUT_SECS: u64 = 30;

/// 用户提供的相对路径的边界。
pub const MAX_PATH_CHARS: usize = 4096;
pub const MAX_PATH_SEGMENTS: usize = 64;

/// 剪贴板 POST 限流：每客户端 IP 每窗口的请求数。
pub const CLIPBOARD_RATE_LIMIT: usize = 20;
pub const CLIPBOARD_RATE_WINDOW_SECS: u64 = 60;

/// custom path 不得遮蔽的路由名。
pub const RESERVED_CUSTOM_PATHS: &[&str] = &[
    "raw",
    "download",
    "delete",
    "list",
    "search-file",
    "clipboard",
    "custom-path",
    "showhiddenfiles",
    "version",
    "static",
    "favicon.ico",
];

pub const DEFAULT_STORAGE_DIR: &str = ".updrop/storage";
pub const DEFAULT_ALIAS_FILE: &str = ".updrop/aliases.json";
pub const DEFAULT_UPLOAD_MAX_SIZE: u64 = 100 * 1024 * 1024 * 1024;
pub const DEFAULT_TEMP_TTL_SECS: u64 = 24 * 60 * 60;
pub const RATE_PRUNE_INTERVAL_SECS: u64 = 300;
pub const TEMP_SWEEP_INTERVAL_SECS: u64 = 900;

/// 运行期模式开关，通过 Extension 注入给各处理器。
#[derive(Debug)]
pub struct ServerMode {
    pub read_only: bool,
}

/// 服务器的 CLI 参数与环境变量配置。
#[derive(Parser, Debug)]
#[command(name = "updrop", version = VERSION_INFO, about = "updrop file sharing server")]
pub struct Args {
    #[arg(
        short = 's',
        long,
        env = "UPDROP_STORAGE_DIR",
        default_value = DEFAULT_STORAGE_DIR,
        help = "Storage directory for uploaded files"
    )]
    pub storage_dir: String,
    #[arg(
        long,
        env = "UPDROP_ALIAS_FILE",
        default_value = DEFAULT_ALIAS_FILE,
        help = "Path of the durable custom-path alias file"
    )]
    pub alias_file: String,
    #[arg(
        short = 'b',
        long,
        env = "UPDROP_BIND",
        default_value = "0.0.0.0",
        help = "Bind address for HTTP/HTTPS"
    )]
    pub host: String,
    #[arg(
        short = 'p',
        long,
        env = "UPDROP_HTTP_PORT",
        default_value_t = 9090,
        help = "HTTP port"
    )]
    pub http_port: u16,
    #[arg(
        short = 'P',
        long,
        env = "UPDROP_HTTPS_PORT",
        default_value_t = 9091,
        help = "HTTPS port"
    )]
    pub https_port: u16,
    #[arg(
        long,
        env = "UPDROP_AUTH_USER",
        help = "Basic auth username (auth disabled unless both user and pass are set)"
    )]
    pub auth_user: Option<String>,
    #[arg(long, env = "UPDROP_AUTH_PASS", help = "Basic auth password")]
    pub auth_pass: Option<String>,
    #[arg(short = 'c', long, env = "UPDROP_TLS_CERT", help = "TLS cert path")]
    pub tls_cert: Option<String>,
    #[arg(short = 'k', long, env = "UPDROP_TLS_KEY", help = "TLS key path")]
    pub tls_key: Option<String>,
    #[arg(long, env = "UPDROP_CORS_ORIGINS", help = "Comma separated CORS origins")]
    pub cors_origins: Option<String>,
    #[arg(
        long,
        env = "UPDROP_UPLOAD_MAX_SIZE",
        default_value_t = DEFAULT_UPLOAD_MAX_SIZE,
        help = "Max upload size in bytes (0 to disable)"
    )]
    pub upload_max_size: u64,
    #[arg(
        long,
        env = "UPDROP_TEMP_TTL_SECS",
        default_value_t = DEFAULT_TEMP_TTL_SECS,
        help = "Age threshold for sweeping abandoned upload temp files (0 to disable)"
    )]
    pub temp_ttl_secs: u64,
    #[arg(
        long,
        env = "UPDROP_DISABLE_HIDDEN_FILES",
        help = "Never show hidden files and lock the toggle"
    )]
    pub disable_hidden_files: bool,
    #[arg(
        long,
        env = "UPDROP_READ_ONLY",
        help = "Reject uploads, deletions and custom path changes"
    )]
    pub read_only: bool,
}
