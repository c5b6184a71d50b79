use std::env;

/// Server configuration, sourced from the process environment
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on (default: 5000)
    pub port: u16,

    /// Serve the prebuilt frontend bundle (enabled when APP_ENV=production)
    pub serve_static: bool,

    /// Directory holding the prebuilt frontend bundle (default: "dist")
    pub static_dir: String,

    /// Staging directory for uploaded images (default: "uploads")
    pub upload_dir: String,

    /// Maximum upload size in bytes (default: 10 MiB)
    pub max_upload_bytes: u64,

    /// Analyzer invocation: program followed by fixed arguments.
    /// The staged image path is always appended as its own argv entry.
    pub analyzer_program: String,
    pub analyzer_args: Vec<String>,

    /// Wall-clock bound on one analyzer run, in seconds (default: 30)
    pub analyzer_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 5000,
            serve_static: false,
            static_dir: "dist".to_string(),
            upload_dir: "uploads".to_string(),
            max_upload_bytes: 10 * 1024 * 1024, // 10 MiB
            analyzer_program: "python3".to_string(),
            analyzer_args: vec!["detect_pcb_defects.py".to_string()],
            analyzer_timeout_secs: 30,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        let (analyzer_program, analyzer_args) = env::var("ANALYZER_CMD")
            .ok()
            .and_then(|v| parse_command(&v))
            .unwrap_or((default.analyzer_program, default.analyzer_args));

        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.port),

            serve_static: env::var("APP_ENV")
                .map(|v| v.eq_ignore_ascii_case("production"))
                .unwrap_or(default.serve_static),

            static_dir: env::var("STATIC_DIR").unwrap_or(default.static_dir),

            upload_dir: env::var("UPLOAD_DIR").unwrap_or(default.upload_dir),

            max_upload_bytes: env::var("MAX_UPLOAD_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_upload_bytes),

            analyzer_program,
            analyzer_args,

            analyzer_timeout_secs: env::var("ANALYZER_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.analyzer_timeout_secs),
        }
    }
}

/// Split an `ANALYZER_CMD` value into program + fixed arguments.
/// Whitespace-separated; the image path is never part of this string.
fn parse_command(raw: &str) -> Option<(String, Vec<String>)> {
    let mut parts = raw.split_whitespace().map(str::to_string);
    let program = parts.next()?;
    Some((program, parts.collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 5000);
        assert!(!config.serve_static);
        assert_eq!(config.upload_dir, "uploads");
        assert_eq!(config.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(config.analyzer_program, "python3");
        assert_eq!(config.analyzer_args, vec!["detect_pcb_defects.py"]);
        assert_eq!(config.analyzer_timeout_secs, 30);
    }

    #[test]
    fn test_parse_command() {
        let (program, args) = parse_command("python3 detect_pcb_defects.py").unwrap();
        assert_eq!(program, "python3");
        assert_eq!(args, vec!["detect_pcb_defects.py"]);

        let (program, args) = parse_command("/usr/local/bin/detector").unwrap();
        assert_eq!(program, "/usr/local/bin/detector");
        assert!(args.is_empty());

        assert!(parse_command("   ").is_none());
    }
}
