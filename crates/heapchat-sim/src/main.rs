//! Heapchat simulator entry point.
//!
//! Usage: heapchat-sim --api-key <key> [--user-id <id>] [--load-delay-ms <ms>]
//!
//! Mounts the widget on an in-memory host, runs the configured calls, waits
//! for delivery to settle and prints every envelope the surface received as
//! one JSON object per line on stdout. Logs go to stderr.

use anyhow::{bail, Context};
use clap::Parser;
use heapchat::{
    ChannelConfig, CustomerData, DeliveryEvent, HeadlessHost, Heapchat, Position, Theme,
    ThemeMode, WidgetConfig, WidgetRegistry,
};
use heapchat_outbox::RetryPlacement;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::time::Instant;
use tracing::{info, warn};

/// Simulate a page embedding the Heapchat widget.
#[derive(Parser, Debug)]
#[command(name = "heapchat-sim")]
#[command(about = "Drive the Heapchat widget against an in-memory surface")]
struct Args {
    /// API key sent with INIT.
    #[arg(long, env = "HEAPCHAT_API_KEY")]
    api_key: String,

    /// Log this user in after configuring.
    #[arg(long)]
    user_id: Option<String>,

    #[arg(long)]
    name: Option<String>,

    #[arg(long)]
    email: Option<String>,

    #[arg(long)]
    phone: Option<String>,

    /// Launcher corner (bottom-right, bottom-left).
    #[arg(long)]
    position: Option<Position>,

    #[arg(long)]
    support_image: Option<String>,

    /// Hide the launcher button.
    #[arg(long)]
    hide_toggle_button: bool,

    /// Primary color sent as a theme patch.
    #[arg(long)]
    theme_primary: Option<String>,

    /// light, dark or system.
    #[arg(long)]
    theme_mode: Option<ThemeMode>,

    #[arg(long)]
    device_token: Option<String>,

    /// How long the surface takes to load.
    #[arg(long, default_value = "500")]
    load_delay_ms: u64,

    /// Number of sends the surface rejects before accepting. Forces the
    /// dispatch delay to zero so each rejection fails the attempt and the
    /// command is retried.
    #[arg(long, default_value = "0")]
    reject_first: usize,

    /// Deferred dispatch delay (overrides HEAPCHAT_DISPATCH_DELAY_MS).
    #[arg(long)]
    dispatch_delay_ms: Option<u64>,

    /// Keep failing commands at the head of the queue for at most this long
    /// instead of moving them to the tail.
    #[arg(long)]
    head_retry_stall_ms: Option<u64>,

    /// Surface URL (overrides HEAPCHAT_SURFACE_URL).
    #[arg(long)]
    surface_url: Option<String>,

    /// Give up waiting for delivery after this long.
    #[arg(long, default_value = "30")]
    timeout_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Also write JSONL logs to this file.
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl Args {
    fn channel_config(&self) -> anyhow::Result<ChannelConfig> {
        let mut config = ChannelConfig::from_env().context("Invalid HEAPCHAT_* environment")?;

        if let Some(url) = &self.surface_url {
            config.surface_url = url.clone();
        }
        if let Some(ms) = self.dispatch_delay_ms {
            config.dispatch_delay = Duration::from_millis(ms);
        }
        if self.reject_first > 0 && !config.dispatch_delay.is_zero() {
            // A deferred rejection lands after the attempt already counted
            // as delivered; only inline sends feed back into retry.
            warn!(
                reject_first = self.reject_first,
                "Scripted rejections need inline sends, dispatch delay set to 0"
            );
            config.dispatch_delay = Duration::ZERO;
        }
        if let Some(ms) = self.head_retry_stall_ms {
            config.retry_placement = RetryPlacement::Head {
                max_stall: Duration::from_millis(ms),
            };
        }

        config.validate().context("Invalid channel configuration")?;
        Ok(config)
    }

    fn widget_config(&self) -> WidgetConfig {
        let mut config = WidgetConfig::new(self.api_key.clone());
        config.position = self.position;
        config.support_image = self.support_image.clone();
        if self.hide_toggle_button {
            config.show_toggle_button = Some(false);
        }
        config
    }

    fn customer_data(&self) -> Option<CustomerData> {
        let data = CustomerData {
            name: self.name.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
        };
        (data != CustomerData::default()).then_some(data)
    }
}

/// Delivery events seen during the run.
#[derive(Debug, Default)]
struct Outcome {
    delivered: usize,
    retried: usize,
    exhausted: usize,
}

fn run_calls(widget: &Heapchat, args: &Args) {
    widget.configure(args.widget_config());

    if let Some(user_id) = &args.user_id {
        widget.login(user_id);
    }
    if let Some(data) = args.customer_data() {
        widget.set_customer_data(&data);
    }
    if let Some(primary) = &args.theme_primary {
        widget.set_theme(&Theme {
            primary_color: Some(primary.clone()),
            ..Default::default()
        });
    }
    if let Some(mode) = args.theme_mode {
        widget.set_theme_mode(mode);
    }
    if let Some(token) = &args.device_token {
        widget.set_device_token(token);
    }
}

/// Wait until the channel has nothing queued and no drain running.
async fn wait_idle(widget: &Heapchat, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        let channel = widget.channel();
        if channel.pending() == 0 && !channel.is_draining() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    observability::init_with_config(observability::LogConfig {
        service_name: "heapchat-sim".into(),
        default_level: args.log_level.clone(),
        also_stderr: true,
        jsonl: args.log_file.is_some(),
        log_path: args.log_file.clone(),
    });

    let config = args.channel_config()?;
    info!(
        surface_url = %config.surface_url,
        max_attempts = config.max_attempts,
        retry_delay_ms = config.retry_delay.as_millis() as u64,
        dispatch_delay_ms = config.dispatch_delay.as_millis() as u64,
        load_delay_ms = args.load_delay_ms,
        reject_first = args.reject_first,
        "Configuration loaded"
    );

    let host = Arc::new(HeadlessHost::with_load_delay(Duration::from_millis(
        args.load_delay_ms,
    )));
    let widget = WidgetRegistry::global()
        .create(host.clone(), &config)
        .context("Failed to create widget")?;
    let surface = host
        .transport()
        .context("Host did not mount a surface")?;
    surface.reject_next(args.reject_first);

    let mut events = widget.subscribe();
    run_calls(&widget, &args);

    // Give the surface time to load before judging the queue idle.
    tokio::time::sleep(Duration::from_millis(args.load_delay_ms)).await;
    let idle = wait_idle(&widget, Duration::from_secs(args.timeout_secs)).await;
    // Deferred sends land one dispatch delay after the channel lets go.
    tokio::time::sleep(config.dispatch_delay + Duration::from_millis(50)).await;

    let mut outcome = Outcome::default();
    loop {
        match events.try_recv() {
            Ok(DeliveryEvent::Delivered { .. }) => outcome.delivered += 1,
            Ok(DeliveryEvent::Retrying { .. }) => outcome.retried += 1,
            Ok(DeliveryEvent::Exhausted { .. }) => outcome.exhausted += 1,
            Err(TryRecvError::Lagged(skipped)) => {
                warn!(skipped, "Delivery events dropped from the summary");
            }
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }

    for envelope in surface.received() {
        println!("{}", serde_json::to_string(&envelope)?);
    }

    info!(
        delivered = outcome.delivered,
        retried = outcome.retried,
        exhausted = outcome.exhausted,
        attempts = surface.attempt_count(),
        "Simulation finished"
    );
    widget.destroy();

    if !idle {
        bail!("Channel still busy after {}s", args.timeout_secs);
    }
    Ok(())
}
