use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub fn init_logging(json: bool) {
    let filter_layer = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter_layer);

    if json {
        registry
            .with(fmt::layer().with_target(false).json())
            .init();
    } else {
        registry.with(fmt::layer().with_target(false)).init();
    }
}
