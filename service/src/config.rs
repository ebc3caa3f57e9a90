use clap::builder::TypedValueParser as _;
use clap::Parser;
use dotenvy::dotenv;
use log::LevelFilter;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Default base URL of the CouchApp rewriter when `COUCH_URL` is not set.
pub const DEFAULT_COUCH_URL: &str = "http://localhost:5984/app/_design/app/_rewrite/";

/// Interval at which the server emits keep-alive newlines on the change feed.
pub const DEFAULT_HEARTBEAT_MS: u64 = 20 * 1000;

// Nine heartbeats without a single byte means the longpoll connection is dead.
pub const DEFAULT_WATCHDOG_SECS: u64 = 9 * DEFAULT_HEARTBEAT_MS / 1000;

/// Which transport a change feed starts on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeedTransport {
    /// Try server-sent events first, fall back to longpoll once if unsupported.
    Auto,
    /// Same as `Auto`; kept as an explicit spelling for deployments that know
    /// the server speaks eventsource.
    EventSource,
    /// Never attempt eventsource.
    LongPoll,
}

#[derive(Debug, PartialEq, Eq)]
pub struct FeedTransportParseError;

impl FromStr for FeedTransport {
    type Err = FeedTransportParseError;
    fn from_str(transport: &str) -> Result<FeedTransport, Self::Err> {
        match transport.to_lowercase().as_str() {
            "auto" => Ok(FeedTransport::Auto),
            "eventsource" => Ok(FeedTransport::EventSource),
            "longpoll" => Ok(FeedTransport::LongPoll),
            _ => Err(FeedTransportParseError),
        }
    }
}

impl fmt::Display for FeedTransport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FeedTransport::Auto => write!(f, "auto"),
            FeedTransport::EventSource => write!(f, "eventsource"),
            FeedTransport::LongPoll => write!(f, "longpoll"),
        }
    }
}

impl FeedTransport {
    /// Whether the push transport should be attempted at all.
    pub fn push_supported(&self) -> bool {
        !matches!(self, FeedTransport::LongPoll)
    }
}

#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Base URL of the CouchApp rewriter (the directory that serves `api/` and `ddoc/`)
    #[arg(short, long, env, default_value = DEFAULT_COUCH_URL)]
    couch_url: String,

    /// Try `_rewrite/api` when `api` is not found and rebase the client onto it
    #[arg(long, env)]
    pub auto_redirect: bool,

    /// Heartbeat interval in milliseconds requested from the change feed
    #[arg(long, env, default_value_t = DEFAULT_HEARTBEAT_MS)]
    pub heartbeat_ms: u64,

    /// Seconds a longpoll request may stay silent before it is torn down and re-issued
    #[arg(long, env, default_value_t = DEFAULT_WATCHDOG_SECS)]
    pub watchdog_secs: u64,

    /// Timeout in seconds for document and view requests (never applied to the change feed)
    #[arg(long, env, default_value_t = 30)]
    pub request_timeout_secs: u64,

    /// Timeout in seconds for establishing a TCP connection
    #[arg(long, env, default_value_t = 10)]
    pub connect_timeout_secs: u64,

    /// Transport the change feed starts on
    #[arg(
        long,
        env,
        default_value_t = FeedTransport::Auto,
        value_parser = clap::builder::PossibleValuesParser::new([
            "auto", "eventsource", "longpoll",
            "AUTO", "EVENTSOURCE", "LONGPOLL"
        ])
            .map(|s| s.parse::<FeedTransport>().unwrap()),
    )]
    pub feed_transport: FeedTransport,

    /// Reconnect attempts (with exponential backoff) after a change feed failure
    #[arg(long, env, default_value_t = 0)]
    pub feed_max_retries: u32,

    /// Sequence token the change feed resumes from
    #[arg(long, env, default_value = "now")]
    pub since: String,

    /// Set the log level verbosity threshold (level) to control what gets displayed on console output
    #[arg(
        short,
        long,
        env,
        default_value_t = LevelFilter::Info,
        value_parser = clap::builder::PossibleValuesParser::new(["OFF", "ERROR", "WARN", "INFO", "DEBUG", "TRACE"])
            .map(|s| s.parse::<LevelFilter>().unwrap()),
        )]
    pub log_level_filter: LevelFilter,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        // Load .env file first
        dotenv().ok();
        // Then parse the command line parameters and flags
        Config::parse()
    }

    pub fn set_couch_url(mut self, couch_url: String) -> Self {
        self.couch_url = couch_url;
        self
    }

    pub fn couch_url(&self) -> &str {
        &self.couch_url
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms)
    }

    pub fn watchdog(&self) -> Duration {
        Duration::from_secs(self.watchdog_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}
