//! listing-watch: binary entrypoint
//! One batch run: fetch every configured source, notify new listings, persist state.
//! Scheduling (cron, systemd timer) is left to the caller.

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use listing_watch::config::{load_denylist, Settings};
use listing_watch::ingest::providers::build_adapters;
use listing_watch::metrics::Metrics;
use listing_watch::notify::telegram::TelegramTransport;
use listing_watch::notify::{DryRunTransport, Notifier, NotifierCfg, Transport};
use listing_watch::{run_all, RunContext, StateStore};

/// `RUST_LOG` wins; default is info for this crate, warn elsewhere.
/// `LOG_FORMAT=json` switches to one JSON object per line.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("listing_watch=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let settings = Settings::load_default().context("loading settings")?;

    let denylist = load_denylist(&settings).context("loading denylist")?;

    let metrics = match settings.metrics_textfile {
        Some(_) => Some(Metrics::install()?),
        None => None,
    };

    let ctx = RunContext::from_settings(settings)?;

    let (transport, destination): (Box<dyn Transport>, String) =
        match TelegramTransport::from_env(ctx.http.client()) {
            Some((t, chat_id)) => (Box::new(t), chat_id),
            None => {
                tracing::warn!("TELEGRAM_BOT_TOKEN / TELEGRAM_CHAT_ID not set, dry run");
                (Box::new(DryRunTransport), "stdout".to_string())
            }
        };
    let mut notifier = Notifier::new(
        transport,
        destination,
        NotifierCfg::from_settings(&ctx.settings),
    );

    let mut adapters = build_adapters(&ctx.settings.sources)?;
    let store = StateStore::new(ctx.settings.state_path.clone());

    tracing::info!(
        sources = adapters.len(),
        denylist = denylist.len(),
        transport = notifier.transport_name(),
        state = %store.path().display(),
        "run starting"
    );

    let summary = run_all(&ctx, &mut adapters, &denylist, &mut notifier, &store).await?;

    tracing::info!(
        new_detected = summary.total_new(),
        sent = summary.total_sent(),
        state_saved = summary.saved,
        "run finished"
    );

    if let (Some(m), Some(path)) = (&metrics, &ctx.settings.metrics_textfile) {
        if let Err(e) = m.write_textfile(path).await {
            tracing::warn!(error = ?e, "metrics textfile not written");
        }
    }
    Ok(())
}
