use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use lightsync_lib::audio;
use lightsync_lib::config::Settings;
use lightsync_lib::device::{ConsoleDevice, DeviceHub};
use lightsync_lib::engine::{ExecutionEvent, ExecutionSettings, PresetDefinition, StartRequest};
use lightsync_lib::Pipeline;

#[derive(Parser)]
#[command(name = "lightsync")]
#[command(about = "Drive smart lights from live audio analysis")]
struct Args {
    /// Settings file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Capture source id (see --list-sources); defaults to system audio
    #[arg(short, long)]
    source: Option<String>,

    /// List capture sources and exit
    #[arg(long)]
    list_sources: bool,

    /// Preset id from the settings file, or a built-in effect name
    #[arg(short, long, default_value = "beatsync")]
    preset: String,

    /// Extra console devices to register, comma separated
    #[arg(short, long, value_delimiter = ',')]
    devices: Vec<String>,

    /// Stop after this many seconds
    #[arg(long)]
    duration: Option<u64>,

    /// Restart the preset when --duration elapses instead of exiting
    #[arg(long = "loop")]
    looping: bool,

    /// Short preview run
    #[arg(long)]
    preview: bool,

    /// Device-native effect to select on the lights at start
    #[arg(long)]
    effect: Option<String>,
}

fn duration_ms(secs: Option<u64>) -> Option<u64> {
    secs.map(|secs| secs.saturating_mul(1000))
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if args.list_sources {
        for source in audio::list_sources()? {
            println!("{:<40} {}", source.id, source.name);
        }
        return Ok(());
    }

    let settings = match &args.config {
        Some(path) => Settings::load(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => Settings::default(),
    };

    let hub = Arc::new(DeviceHub::new(settings.engine.command_timeout()));
    for device in &settings.devices {
        hub.register(device.id.clone(), Arc::new(ConsoleDevice::new(device.id.clone())));
        if !device.address.is_empty() {
            hub.connect(&device.id, &device.address).await;
        }
    }
    let mut extra = args.devices.clone();
    if extra.is_empty() && settings.devices.is_empty() {
        extra.push("console".to_string());
    }
    for id in &extra {
        hub.register(id.clone(), Arc::new(ConsoleDevice::new(id.clone())));
    }
    for (group, members) in &settings.groups {
        hub.set_group(group.clone(), members.clone());
    }

    let mut preset = settings
        .preset(&args.preset)
        .cloned()
        .unwrap_or_else(|| PresetDefinition::new(args.preset.clone()));
    if preset.target_devices.is_empty() && preset.target_groups.is_empty() {
        preset.target_devices = hub.device_ids();
    }

    info!("LightSync starting with preset {}", preset.id);
    let pipeline = Pipeline::start(&settings, hub.clone(), args.source.clone(), true)?;

    let mut events = pipeline.engine().subscribe();
    let request = StartRequest::new(preset).with_settings(ExecutionSettings {
        duration_ms: duration_ms(args.duration),
        looping: args.looping,
        preview: args.preview,
        effect: args.effect.clone(),
        ..Default::default()
    });
    let id = pipeline.engine().start(request).await?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
            event = events.recv() => match event {
                Ok(ExecutionEvent::Stopped { id: stopped, reason, .. }) if stopped == id => {
                    info!("Preset finished ({:?})", reason);
                    break;
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            }
        }
    }

    pipeline.shutdown().await;
    hub.disconnect_all().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_converts_and_saturates() {
        assert_eq!(duration_ms(None), None);
        assert_eq!(duration_ms(Some(3)), Some(3_000));
        assert_eq!(duration_ms(Some(u64::MAX)), Some(u64::MAX));
    }

    #[test]
    fn cli_parses_effect_and_devices() {
        let args = Args::parse_from([
            "lightsync", "--preset", "party", "--devices", "a,b", "--effect", "candle", "--loop",
        ]);
        assert_eq!(args.preset, "party");
        assert_eq!(args.devices, vec!["a", "b"]);
        assert_eq!(args.effect.as_deref(), Some("candle"));
        assert!(args.looping);
    }
}
