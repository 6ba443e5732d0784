//! Console harness for moving a source around a binaural listener.

use anyhow::{Context, Result};
use clap::Parser;
use hrtf_sweep::app::config::Config;
use hrtf_sweep::audio::{AudioDriver, CpalDriver};
use hrtf_sweep::{render_to_wav, App};
use log::{debug, info};
use std::path::PathBuf;

/// hrtf-sweep - real-time HRTF rendering test harness
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Configuration file; defaults are used when it does not exist
    #[clap(short, long, default_value = "hrtf_sweep.toml")]
    config: PathBuf,

    /// Frames per audio callback
    #[clap(long)]
    buffer_size: Option<usize>,

    /// Output device, by index or name
    #[clap(long)]
    device: Option<String>,

    /// Mono source recording (white noise when omitted)
    #[clap(long)]
    wav: Option<PathBuf>,

    /// List output devices and exit
    #[clap(long)]
    list_devices: bool,

    /// Render to a WAV file instead of the sound card
    #[clap(long, value_name = "PATH")]
    render: Option<PathBuf>,

    /// Length of the rendered file in seconds
    #[clap(long, default_value_t = 10.0)]
    seconds: f32,

    /// Write the effective configuration back to the config file and exit
    #[clap(long)]
    write_config: bool,

    /// Enable debug logging
    #[clap(short, long)]
    debug: bool,
}

impl Args {
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(buffer_size) = self.buffer_size {
            config.audio.buffer_size = buffer_size;
        }
        if let Some(device) = &self.device {
            config.audio.output_device = device.clone();
        }
        if let Some(wav) = &self.wav {
            config.source.wav_file = Some(wav.clone());
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Configure logging based on debug flag
    if args.debug {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
        debug!("Debug logging enabled");
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    let mut config = Config::load_or_default(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    args.apply_overrides(&mut config);
    config.validate()?;

    if args.write_config {
        config.save(&args.config)?;
        info!("Configuration written to {}", args.config.display());
        return Ok(());
    }

    if args.list_devices {
        for device in CpalDriver::new().output_devices()? {
            println!("{}", device);
        }
        return Ok(());
    }

    if let Some(path) = &args.render {
        let summary = render_to_wav(config, path, args.seconds)?;
        info!(
            "Rendered {} frames in {} blocks",
            summary.frames, summary.blocks
        );
        return Ok(());
    }

    info!("Starting hrtf-sweep");
    App::new(config).run(CpalDriver::new()).await
}
