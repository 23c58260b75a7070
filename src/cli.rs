//! Command-line argument surface

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "s3scope",
    version,
    about = "An interactive terminal browser for S3-compatible object stores"
)]
pub struct Cli {
    /// Profile to start with; defaults to $AWS_PROFILE, then "default"
    #[arg(short, long)]
    pub profile: Option<String>,

    /// Initial location, e.g. s3://bucket/prefix/
    #[arg(long)]
    pub path: Option<String>,

    /// Worker threads per priority queue
    #[arg(long, default_value_t = crate::engine::DEFAULT_WORKERS)]
    pub workers: usize,

    /// Increase log verbosity (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "s3scope=warn",
            1 => "s3scope=info",
            _ => "s3scope=debug",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cli = Cli::parse_from(["s3scope"]);
        assert!(cli.profile.is_none());
        assert_eq!(cli.workers, crate::engine::DEFAULT_WORKERS);
        assert_eq!(cli.log_filter(), "s3scope=warn");
    }

    #[test]
    fn verbosity_levels() {
        let cli = Cli::parse_from(["s3scope", "-vv", "--path", "s3://b/p/"]);
        assert_eq!(cli.log_filter(), "s3scope=debug");
        assert_eq!(cli.path.as_deref(), Some("s3://b/p/"));
    }
}
