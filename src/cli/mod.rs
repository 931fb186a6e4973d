use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Telegram Args ---
    /// Telegram bot token issued by @BotFather.
    #[arg(long, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true)]
    pub telegram_token: String,

    // --- Chat LLM Provider Args ---
    /// Full URL of the chat completions endpoint.
    #[arg(long, env = "CHAT_BASE_URL", default_value = "https://api.x.ai/v1/chat/completions")]
    pub chat_base_url: String,

    /// API Key for the chat completions endpoint (sent as a bearer token).
    #[arg(long, env = "CHAT_API_KEY", hide_env_values = true)]
    pub chat_api_key: String,

    /// Model name for chat completion.
    #[arg(long, env = "CHAT_MODEL", default_value = "grok-beta")]
    pub chat_model: String,

    /// Sampling temperature sent with every request.
    #[arg(long, env = "CHAT_TEMPERATURE", default_value = "0.7")]
    pub temperature: f32,

    /// Optional timeout in seconds for a single completion request. No timeout when unset.
    #[arg(long, env = "CHAT_REQUEST_TIMEOUT_SECS")]
    pub request_timeout_secs: Option<u64>,

    // --- History Args ---
    /// Maximum number of entries kept per conversation.
    #[arg(long, env = "MAX_HISTORY", default_value = "30", value_parser = clap::value_parser!(u64).range(1..))]
    pub max_history: u64,

    /// System entry every new or reset conversation starts with.
    #[arg(long, env = "SYSTEM_PROMPT", default_value = "You are a helpful assistant.")]
    pub system_prompt: String,

    /// How conversations are trimmed once full (window, pin-system).
    #[arg(long, env = "TRIM_POLICY", default_value = "window")]
    pub trim_policy: String,

    /// Path of the JSON file conversations are persisted to.
    #[arg(long, env = "CONVERSATIONS_PATH", default_value = "conversations.json")]
    pub conversations_path: String,

    /// How snapshots are written (overwrite, atomic, memory).
    #[arg(long, env = "PERSIST_STRATEGY", default_value = "overwrite")]
    pub persist_strategy: String,

    // --- General App Args ---
    /// Append log lines to this file instead of stderr.
    #[arg(long, env = "LOG_FILE")]
    pub log_file: Option<String>,
}
