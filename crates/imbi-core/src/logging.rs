//! Process logging setup for Imbi services.

use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, EnvFilter};

/// Default filter when `RUST_LOG` is unset.
const DEFAULT_FILTER: &str = "info";

const DEV_DIRECTIVES: [&str; 3] = ["imbi_core=debug", "imbi_graph=debug", "imbi_blueprint=debug"];

/// Install the global `tracing` subscriber.
///
/// Production output is JSON. In `dev` mode output is human-readable and
/// the `imbi` targets log at debug level. Returns `false` when a global
/// subscriber was already installed.
pub fn configure_logging(dev: bool) -> bool {
    let filter = build_filter(dev);
    let installed = if dev {
        fmt().with_env_filter(filter).try_init()
    } else {
        fmt().with_env_filter(filter).json().try_init()
    };
    installed.is_ok()
}

fn build_filter(dev: bool) -> EnvFilter {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    if !dev {
        return filter;
    }
    DEV_DIRECTIVES
        .iter()
        .filter_map(|d| d.parse::<Directive>().ok())
        .fold(filter, EnvFilter::add_directive)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dev_filter_raises_imbi_targets() {
        let rendered = build_filter(true).to_string();
        assert!(rendered.contains("imbi_graph=debug"));
    }

    #[test]
    fn test_second_install_is_harmless() {
        let _ = configure_logging(false);
        assert!(!configure_logging(true));
    }
}
