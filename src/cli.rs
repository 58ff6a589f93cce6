use clap::Parser;
use pingviz::config::{LOG_LEVELS, parse_log_level};
use std::path::PathBuf;

/// ICMP latency monitor reporting round-trip times to statsd
#[derive(Parser, Debug, Clone)]
#[command(name = "pingviz")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Config file (default: first pingviz.toml found in /etc, ~/.config, .)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Log level, overriding the config file (trace, debug, info, warn, error)
    #[arg(short = 'l', long = "log")]
    pub log: Option<String>,
}

impl Args {
    /// Validate arguments
    pub fn validate(&self) -> Result<(), String> {
        if let Some(ref level) = self.log
            && parse_log_level(level).is_none()
        {
            return Err(format!(
                "Unknown log level: {}. Use one of {}",
                level,
                LOG_LEVELS.join(", ")
            ));
        }
        Ok(())
    }

    /// Level given with `--log`, in `EnvFilter` form
    pub fn log_level(&self) -> Option<&'static str> {
        self.log.as_deref().and_then(parse_log_level)
    }
}
