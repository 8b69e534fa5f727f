use tracing_subscriber::EnvFilter;

const DEFAULT_DIRECTIVES: [&str; 2] = ["usage_service=info", "portal_client=info"];

/// Installs the fmt subscriber: `RUST_LOG` plus info level for the workspace crates.
pub fn init_tracing() {
    let mut filter = EnvFilter::from_default_env();
    for directive in DEFAULT_DIRECTIVES {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
