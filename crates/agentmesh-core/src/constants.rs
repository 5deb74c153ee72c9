//! Centralized constants: limits, default names and endpoints.

// ─── Models ───────────────────────────────────────────────────────────────────

pub mod models {
    pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
    pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";
}

// ─── API Endpoints ────────────────────────────────────────────────────────────

pub mod endpoints {
    pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
    pub const OPENAI_BASE_URL: &str = "https://api.openai.com";
}

// ─── Request keys ─────────────────────────────────────────────────────────────

pub mod keys {
    pub const QUERY: &str = "query";
    /// Explicit target: a name or an array of names.
    pub const AGENT: &str = "agent";
    /// Explicit concurrent fan-out.
    pub const AGENTS: &str = "agents";
    /// Explicit sequential pipeline.
    pub const PIPELINE: &str = "pipeline";
    pub const CONTEXT: &str = "context";
}

// ─── Agent names ──────────────────────────────────────────────────────────────

pub mod agents {
    pub const ECHO: &str = "Echo";
    pub const CALCULATOR: &str = "Calculator";
    pub const ANSWER_SYNTHESISER: &str = "AnswerSynthesiser";
}

// ─── Default Settings ─────────────────────────────────────────────────────────

pub mod defaults {
    pub const API_KEY_ENV: &str = "GEMINI_API_KEY";
    pub const MAX_TOKENS: u32 = 8192;
    pub const LLM_TIMEOUT_SECS: u64 = 60;

    pub const AGENT_TIMEOUT_SECS: u64 = 60;
    pub const REQUEST_TIMEOUT_SECS: u64 = 120;
    pub const CANCEL_GRACE_MS: u64 = 500;
    pub const MAX_HANDOFFS: usize = 3;
    pub const HISTORY_LIMIT: usize = 100;

    pub const MIN_KEYWORD_SCORE: usize = 1;
    pub const MAX_SELECTED_AGENTS: usize = 3;
}
