pub mod commands;
pub mod config;
pub mod monitor;
pub mod render;
pub mod session;

use std::io::{self, BufRead, Write};
use std::time::Duration;

use log::{error, info, warn};
use tokio::sync::mpsc;

use crate::audio::AudioDriver;
use commands::{Menu, MenuReply};
use config::Config;
use monitor::StatusMonitor;
use session::{Flow, Session};

const MONITOR_PERIOD: Duration = Duration::from_millis(250);

/// Interactive harness: console menu in front of a [`Session`].
pub struct App {
    config: Config,
}

impl App {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Open the stream on `driver` and serve the menu until the user exits
    /// or stdin closes.
    pub async fn run<D: AudioDriver>(&self, driver: D) -> anyhow::Result<()> {
        let mut session = Session::new(self.config.clone(), driver)?;
        let monitor = StatusMonitor::spawn(session.status(), MONITOR_PERIOD);
        let mut lines = spawn_stdin_reader();
        let mut menu = Menu::new();

        show_prompt(&menu, session.resampling_step());
        while let Some(line) = lines.recv().await {
            match menu.handle_line(&line) {
                MenuReply::Command(command) => match session.apply(command) {
                    Ok(Flow::Quit) => break,
                    Ok(Flow::Continue) => {}
                    Err(e) if e.is_fatal() => {
                        error!("{}", e);
                        session.close();
                        monitor.shutdown().await;
                        return Err(e.into());
                    }
                    Err(e) => warn!("{}", e),
                },
                MenuReply::Prompt => {}
                MenuReply::Invalid => println!("Invalid option, try again."),
            }
            show_prompt(&menu, session.resampling_step());
        }

        if let Some(mode) = menu.in_test() {
            info!("Input closed during the {} test", mode);
            if let Err(e) = session.stop_test() {
                warn!("{}", e);
            }
        }
        info!("Closing audio stream");
        session.close();
        monitor.shutdown().await;
        Ok(())
    }
}

fn show_prompt(menu: &Menu, resampling_step: f32) {
    print!("{}", menu.prompt(resampling_step));
    let _ = io::stdout().flush();
}

/// Stdin lines, read on a plain thread so a pending read never blocks
/// runtime shutdown.
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel::<String>(16);
    std::thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}
