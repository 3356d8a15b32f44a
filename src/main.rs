use anyhow::{anyhow, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use facility_monitor::config::Config;
use facility_monitor::notify::{NotificationSink, TracingSink};
use facility_monitor::simulate::SimulatedProvider;
use facility_monitor::{
    ControlCommand, Dashboard, RefreshScheduler, SessionContext, SharedControls,
};

/// One line typed at the console.
#[derive(Debug, PartialEq, Eq)]
enum Input {
    Refresh,
    Control(ControlCommand),
    Quit,
}

fn parse_input(line: &str) -> Result<Option<Input>> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let input = match words.as_slice() {
        [] => return Ok(None),
        ["refresh"] => Input::Refresh,
        ["reset"] => Input::Control(ControlCommand::Reset),
        ["quit"] | ["exit"] => Input::Quit,
        [channel, "on"] => Input::Control(ControlCommand::toggle(channel, true)?),
        [channel, "off"] => Input::Control(ControlCommand::toggle(channel, false)?),
        [channel, value] => {
            let value: i64 = value
                .parse()
                .map_err(|_| anyhow!("expected on, off or a number, got '{}'", value))?;
            Input::Control(ControlCommand::parameter(channel, value)?)
        }
        _ => return Err(anyhow!("unrecognized command '{}'", line.trim())),
    };
    Ok(Some(input))
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,facility_monitor=info"));
    if config.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_target(true).with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    init_tracing(&config);
    tracing::info!(?config, "facility monitor starting");

    let overrides = Config::load_overrides(&Config::config_file_path())?;
    let bands = overrides.band_table()?;
    let settings = config.refresh_settings(&overrides)?;

    let sink: Arc<dyn NotificationSink> = Arc::new(TracingSink);
    let provider = SimulatedProvider::new(Duration::from_millis(config.simulated_latency_ms))
        .with_failure_rate(config.simulated_failure_rate);
    let scheduler = RefreshScheduler::new(provider, bands, settings, Arc::clone(&sink))?;
    let controls = SharedControls::new(sink);

    let session = SessionContext::signed_in(config.operator_name.clone().unwrap_or_default());
    let dashboard = Dashboard::open(session, scheduler, controls)?;
    tracing::info!(facility = %config.facility_id, "{}", dashboard.greeting());

    let periodic = dashboard.scheduler().spawn_periodic(config.refresh_interval())?;
    let mut snapshots = dashboard.scheduler().subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupt received, shutting down");
                break;
            }
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = dashboard.environment();
                for card in &view.cards {
                    tracing::info!(
                        metric = card.title,
                        reading = %card.reading,
                        status = card.severity.map(|s| s.label()).unwrap_or("-"),
                        gauge = card.gauge_percent,
                        "reading"
                    );
                }
                if let (Some(overall), Some(updated)) = (view.overall, view.last_updated) {
                    tracing::info!(%overall, last_updated = %updated, "{}", overall.summary());
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                match parse_input(&line) {
                    Ok(None) => {}
                    Ok(Some(Input::Quit)) => break,
                    Ok(Some(Input::Refresh)) => {
                        let scheduler = dashboard.scheduler().clone();
                        tokio::spawn(async move {
                            if let Err(e) = scheduler.refresh_now().await {
                                tracing::warn!(error = %e, "manual refresh failed");
                            }
                        });
                    }
                    Ok(Some(Input::Control(command))) => {
                        if let Err(e) = dashboard.controls().execute(command) {
                            tracing::warn!(error = %e, "control command rejected");
                        }
                        for card in dashboard.control_panel() {
                            tracing::info!(
                                channel = %card.channel,
                                status = card.status,
                                parameter = card.parameter.as_deref().unwrap_or("-"),
                                "{}",
                                card.summary
                            );
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "ignoring input"),
                }
            }
        }
    }

    periodic.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use facility_monitor::Channel;

    #[test]
    fn parses_console_commands() {
        assert_eq!(parse_input("  ").unwrap(), None);
        assert_eq!(parse_input("refresh").unwrap(), Some(Input::Refresh));
        assert_eq!(
            parse_input("lighting off").unwrap(),
            Some(Input::Control(ControlCommand::SetEnabled(Channel::Lighting, false)))
        );
        assert_eq!(
            parse_input("ventilation 65").unwrap(),
            Some(Input::Control(ControlCommand::SetParameter(Channel::Ventilation, 65)))
        );
        assert!(parse_input("ventilation 63").is_err());
        assert!(parse_input("garage on").is_err());
        assert!(parse_input("lighting dim").is_err());
    }
}
