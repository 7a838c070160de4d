use std::path::PathBuf;

use clap::Parser;
use tracing::level_filters::LevelFilter;

use crate::storage::StoreBackend;

#[derive(Parser, Debug)]
#[command(name = "mora-host", version)]
#[command(about = "Native messaging host for the Mora extension", long_about = None)]
pub struct HostArgs {
    /// Origin of the extension. Passed by the browser when it launches the host.
    pub origin: Option<String>,
    /// Passed by Chrome on Windows. Unused.
    #[arg(long = "parent-window", hide = true)]
    pub parent_window: Option<String>,
    #[arg(
        long,
        help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
    )]
    pub dir: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = StoreBackend::Fields)]
    pub backend: StoreBackend,
    /// Mirror logs to stderr. This option is for debugging purposes only.
    #[arg(long = "log-console")]
    pub log_console: bool,
    #[arg(long = "log-filter")]
    pub log: Option<LevelFilter>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_browser_launch_arguments() {
        let args = HostArgs::parse_from([
            "mora-host",
            "chrome-extension://abcdefghijklmnop/",
            "--parent-window=1234",
        ]);
        assert_eq!(args.origin.as_deref(), Some("chrome-extension://abcdefghijklmnop/"));
        assert_eq!(args.backend, StoreBackend::Fields);
        assert!(!args.log_console);
    }
}
