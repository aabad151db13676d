use crate::error::AppError;
use crate::r#const::shutdown_timeout;
use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// Command line of the `tsgate` binary.
///
/// Everything about routing, resolution and policy lives in the YAML file;
/// the flags only pick that file and tune process-level behaviour.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "tsgate",
    version,
    about = "Reverse-proxy gateway for tailnet, DoH-resolved and directly reachable upstreams",
    long_about = "tsgate accepts HTTP requests, asks the configured decision engine whether \
                  to let them through, picks the first upstream whose host or path prefix \
                  matches and streams the upstream response back.\n\n\
                  Upstream hostnames are resolved against an ordered list of DNS servers. \
                  Entries marked `doh` are served by local DNS bridges that answer A queries \
                  from DNS-over-HTTPS JSON endpoints. Upstreams bound to a tailnet are dialed \
                  through that node's CONNECT proxy.",
    after_help = "Run with --test to check a configuration file without binding any port."
)]
pub struct Args {
    /// Gateway configuration file (YAML)
    #[arg(short, long, value_name = "FILE", default_value = "./config.yaml")]
    pub config: PathBuf,

    /// Load and validate the configuration, then exit
    #[arg(short = 't', long = "test", action = ArgAction::SetTrue)]
    pub test_config: bool,

    /// Log at debug level
    #[arg(short = 'd', long = "debug", action = ArgAction::SetTrue)]
    pub debug: bool,

    /// Seconds to let subsystems drain after SIGINT/SIGTERM
    #[arg(
        long = "shutdown-timeout",
        value_name = "SECONDS",
        default_value_t = shutdown_timeout::DEFAULT
    )]
    pub shutdown_timeout: u64,
}

impl Args {
    pub fn parse_args() -> Self {
        Args::parse()
    }

    // 关闭超时必须落在允许区间内
    pub fn validation(&self) -> Result<(), AppError> {
        if !(shutdown_timeout::MIN..=shutdown_timeout::MAX).contains(&self.shutdown_timeout) {
            return Err(AppError::InvalidShutdownTimeout(self.shutdown_timeout));
        }
        Ok(())
    }
}
