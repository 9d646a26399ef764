/*!
Status observer.

The tick driver publishes a [`MountSnapshot`] per device after every tick.
A dedicated thread keeps the newest snapshot of each device and prints them
at a fixed period, either as a text block or as JSON lines. Rendering never
touches the live mount state.
*/

use crate::mount::MountSnapshot;
use chrono::Local;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::io::{self, Write};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Command history lines included in a snapshot
pub const STATUS_LOG_LINES: usize = 10;

/// Output flavour of the status renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StatusFormat {
    Text,
    Json,
}

/// One snapshot tagged with the device it came from
#[derive(Debug, Clone, Serialize)]
pub struct StatusUpdate {
    pub device: u16,
    pub snapshot: MountSnapshot,
}

fn degrees(fraction: f64) -> f64 {
    fraction * 360.0
}

fn arcsec_per_sec(rate: f64) -> f64 {
    rate * 360.0 * 3600.0
}

/// Human-readable block for one device
pub fn render_text(update: &StatusUpdate) -> String {
    let s = &update.snapshot;
    let mut out = String::new();

    let _ = writeln!(out, "── mount {} [{}] {}", update.device, s.mode, Local::now().format("%H:%M:%S"));
    let _ = writeln!(
        out,
        "   ALT {:>9.4}°  target {:>9.4}°  rate {:>10.2}\"/s  guide {:>8.2}\"/s",
        degrees(s.altitude),
        degrees(s.target_altitude),
        arcsec_per_sec(s.altitude_rate),
        arcsec_per_sec(s.altitude_guide_rate),
    );
    let _ = writeln!(
        out,
        "   AZM {:>9.4}°  target {:>9.4}°  rate {:>10.2}\"/s  guide {:>8.2}\"/s",
        degrees(s.azimuth),
        degrees(s.target_azimuth),
        arcsec_per_sec(s.azimuth_rate),
        arcsec_per_sec(s.azimuth_guide_rate),
    );
    let _ = writeln!(
        out,
        "   slewing={} goto={} guiding={} last={}",
        s.slewing,
        s.goto,
        s.guiding,
        if s.last_command.is_empty() { "-" } else { &s.last_command },
    );
    for entry in &s.command_log {
        let _ = writeln!(out, "   · {}", entry);
    }
    out
}

/// Single-line JSON object for one device
pub fn render_json(update: &StatusUpdate) -> serde_json::Result<String> {
    let value = serde_json::json!({
        "time": Local::now().to_rfc3339(),
        "device": update.device,
        "status": update.snapshot,
    });
    serde_json::to_string(&value)
}

fn render(update: &StatusUpdate, format: StatusFormat) -> String {
    match format {
        StatusFormat::Text => render_text(update),
        StatusFormat::Json => match render_json(update) {
            Ok(line) => line + "\n",
            Err(e) => {
                warn!("Failed to serialize status: {}", e);
                String::new()
            }
        },
    }
}

/// Status renderer thread - prints the newest snapshot of each device.
///
/// Runs until every sender of `updates` has been dropped.
pub fn status_renderer_thread(updates: Receiver<StatusUpdate>, format: StatusFormat, interval: Duration) -> io::Result<()> {
    info!("📺 Status renderer started ({:?}, every {:?})", format, interval);

    let mut latest: BTreeMap<u16, StatusUpdate> = BTreeMap::new();
    let mut last_render = Instant::now();
    let stdout = io::stdout();

    loop {
        match updates.recv_timeout(interval) {
            Ok(update) => {
                latest.insert(update.device, update);
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        if last_render.elapsed() >= interval && !latest.is_empty() {
            let mut handle = stdout.lock();
            for update in latest.values() {
                handle.write_all(render(update, format).as_bytes())?;
            }
            handle.flush()?;
            last_render = Instant::now();
        }
    }

    info!("📺 Status renderer stopped");
    Ok(())
}
