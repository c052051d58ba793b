use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "kubenexus",
    version,
    about = "Kubernetes workload dashboard with an embedded console and pod editor."
)]
pub struct CliArgs {
    /// Refresh interval in milliseconds
    #[arg(long, default_value_t = 1_500)]
    pub refresh_ms: u64,

    /// Start in a specific namespace
    #[arg(short, long)]
    pub namespace: Option<String>,

    /// Start with all namespaces selected
    #[arg(short = 'A', long)]
    pub all_namespaces: bool,

    /// kubeconfig context to use instead of the current one
    #[arg(long)]
    pub context: Option<String>,

    /// tracing filter (for example: info,debug,trace)
    #[arg(long, default_value = "info")]
    pub log_filter: String,

    /// Append logs to this file instead of discarding them
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::CliArgs;
    use clap::Parser;

    #[test]
    fn defaults_apply_without_flags() {
        let args = CliArgs::parse_from(["kubenexus"]);
        assert_eq!(args.refresh_ms, 1_500);
        assert_eq!(args.log_filter, "info");
        assert!(args.namespace.is_none());
        assert!(!args.all_namespaces);
        assert!(args.log_file.is_none());
    }

    #[test]
    fn short_flags_parse() {
        let args = CliArgs::parse_from(["kubenexus", "-n", "shop", "-A", "--context", "kind-dev"]);
        assert_eq!(args.namespace.as_deref(), Some("shop"));
        assert!(args.all_namespaces);
        assert_eq!(args.context.as_deref(), Some("kind-dev"));
    }
}
