use time::format_description::FormatItem;
use time::macros::format_description;
use time::UtcOffset;
use tracing_subscriber::fmt::time::OffsetTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

const CRATES: &[&str] = &["todogate", "todogate_core", "todogate_protocol_http"];

static FULL_TIMESTAMP: &[FormatItem<'static>] =
    format_description!("[day].[month].[year] [hour]:[minute]:[second]");
static SHORT_TIMESTAMP: &[FormatItem<'static>] = format_description!("[hour]:[minute]:[second]");

/// Filter directives used when `RUST_LOG` is not set.
///
/// `-d` raises our own crates to debug, which includes rate limit denials.
/// `-dd` also lets the HTTP server and the ORM through at debug.
fn default_directives(verbosity: u8) -> String {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let mut directives = CRATES
        .iter()
        .map(|name| format!("{name}={level}"))
        .collect::<Vec<_>>();
    if verbosity >= 2 {
        directives.push("poem=debug".into());
        directives.push("sea_orm=debug".into());
    }
    directives.join(",")
}

fn env_filter(verbosity: u8) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives(verbosity)))
}

/// Interactive sessions get a compact format, services get full timestamps
pub fn init_logging(verbosity: u8) {
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    let attended = console::user_attended();

    let fmt_layer = if attended {
        tracing_subscriber::fmt::layer()
            .compact()
            .with_ansi(true)
            .with_target(false)
            .with_timer(OffsetTime::new(offset, SHORT_TIMESTAMP))
            .with_filter(env_filter(verbosity))
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_timer(OffsetTime::new(offset, FULL_TIMESTAMP))
            .with_filter(env_filter(verbosity))
            .boxed()
    };

    let r = tracing_subscriber::registry();

    #[cfg(all(debug_assertions, feature = "tokio-console"))]
    let r = r.with(console_subscriber::spawn());

    r.with(fmt_layer).init();
}
