use std::path::PathBuf;

#[derive(Clone)]
pub struct Config {
    pub data_dir: String,
    pub bind_addr: String,
    /// Maximum rows read per source file (truncation, not sampling).
    pub row_cap: usize,
    /// Maximum points drawn in the income/credit scatter.
    pub sample_cap: usize,
    /// Serve structurally-valid but data-free chart shells.
    pub placeholder_mode: bool,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            data_dir: std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string()),
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string()),
            row_cap: std::env::var("ROW_CAP").ok().and_then(|v| v.parse().ok()).unwrap_or(100_000),
            sample_cap: std::env::var("SAMPLE_CAP").ok().and_then(|v| v.parse().ok()).unwrap_or(2_000),
            placeholder_mode: std::env::var("PLACEHOLDER")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        }
    }

    pub fn data_path(&self, file_name: &str) -> PathBuf {
        PathBuf::from(&self.data_dir).join(file_name)
    }
}
