//! Line-oriented control console on stdin.

use crate::config::Config;
use crate::engine::{EngineError, EngineEvent, EngineHandle};
use clap::{Parser, Subcommand};
use facetag_core::{CaptureOutcome, LoopExit, LoopMode, RunReport, SharedRegistry};
use facetag_hw::Camera;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

#[derive(Parser, Debug, PartialEq)]
#[command(name = "facetag", no_binary_name = true, disable_version_flag = true)]
struct Line {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Capture one frame, save it, and enroll the face under NAME
    Capture {
        /// Person's name (several words are joined with spaces)
        name: Vec<String>,
    },
    /// Start live recognition
    Test,
    /// Start the plain video loop
    Preview,
    /// Stop the current loop
    Stop,
    /// List enrolled names
    List,
    /// Show engine status as JSON
    Status,
    /// List V4L2 capture devices
    Devices,
    /// Shut down and exit
    #[command(alias = "exit")]
    Quit,
}

/// Parse one input line. Blank lines yield `Ok(None)`.
pub fn parse_line(line: &str) -> Result<Option<Command>, clap::Error> {
    let words: Vec<&str> = line.split_whitespace().collect();
    if words.is_empty() {
        return Ok(None);
    }
    Line::try_parse_from(words).map(|l| Some(l.command))
}

enum Flow {
    Continue,
    Quit,
}

/// The loop the user asked for, and the engine run currently serving it.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Wanted {
    mode: LoopMode,
    generation: u64,
}

pub struct Console {
    engine: EngineHandle,
    registry: SharedRegistry,
    config: Config,
    /// Loop to resume after a capture preempts it.
    wanted: Option<Wanted>,
}

impl Console {
    pub fn new(engine: EngineHandle, registry: SharedRegistry, config: Config) -> Self {
        Self {
            engine,
            registry,
            config,
            wanted: None,
        }
    }

    /// Start a loop and remember it so captures can resume it.
    pub async fn start(&mut self, mode: LoopMode) -> Result<(), EngineError> {
        let generation = self.engine.run(mode).await?;
        self.wanted = Some(Wanted { mode, generation });
        Ok(())
    }

    /// Serve stdin until `quit` or end of input, printing loop reports as
    /// they arrive. Returns the engine handle for shutdown.
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<EngineEvent>) -> EngineHandle {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        println!("commands: capture [NAME], test, preview, stop, list, status, devices, quit");

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let line = match line {
                        Ok(Some(line)) => line,
                        Ok(None) => break,
                        Err(e) => {
                            tracing::error!(error = %e, "stdin read failed");
                            break;
                        }
                    };
                    match parse_line(&line) {
                        Ok(None) => {}
                        Ok(Some(cmd)) => {
                            if let Flow::Quit = self.handle(cmd).await {
                                break;
                            }
                        }
                        Err(e) => println!("{e}"),
                    }
                }
                Some(event) = events.recv() => self.on_event(event),
            }
        }

        self.engine
    }

    async fn handle(&mut self, cmd: Command) -> Flow {
        match cmd {
            Command::Capture { name } => {
                let name = name.join(" ");
                let name = (!name.is_empty()).then_some(name);
                match self.engine.capture(name).await {
                    Ok(outcome) => println!("{}", describe_outcome(&outcome)),
                    Err(e) => println!("error: {e}"),
                }
                if let Some(Wanted { mode, .. }) = self.wanted {
                    if let Err(e) = self.start(mode).await {
                        println!("error: {e}");
                    }
                }
            }
            Command::Test => {
                if self.registry.lock().is_empty() {
                    println!("warning: nobody enrolled yet; run `capture NAME` first");
                } else if let Err(e) = self.start(LoopMode::Recognize).await {
                    println!("error: {e}");
                }
            }
            Command::Preview => {
                if let Err(e) = self.start(LoopMode::Preview).await {
                    println!("error: {e}");
                }
            }
            Command::Stop => {
                self.wanted = None;
                self.engine.stop();
            }
            Command::List => {
                let registry = self.registry.lock();
                if registry.is_empty() {
                    println!("(no enrollments)");
                }
                for (i, name) in registry.names().enumerate() {
                    println!("{:>3}  {name}", i + 1);
                }
            }
            Command::Status => {
                let status = serde_json::json!({
                    "version": env!("CARGO_PKG_VERSION"),
                    "state": self.engine.state(),
                    "mode": self.wanted.map(|w| w.mode),
                    "entries": self.registry.lock().len(),
                    "camera": self.config.camera_device,
                    "output_dir": self.config.output_dir,
                    "match": self.config.match_policy,
                });
                match serde_json::to_string_pretty(&status) {
                    Ok(text) => println!("{text}"),
                    Err(e) => println!("error: {e}"),
                }
            }
            Command::Devices => {
                let devices = Camera::list_devices();
                if devices.is_empty() {
                    println!("no V4L2 capture devices found");
                }
                for d in devices {
                    println!("{}  {} ({}, {})", d.path, d.name, d.driver, d.bus);
                }
            }
            Command::Quit => return Flow::Quit,
        }
        Flow::Continue
    }

    fn on_event(&mut self, event: EngineEvent) {
        let EngineEvent::RunFinished { generation, report } = event;
        // A failed run is not resumed; reports from replaced runs change nothing.
        let current = self.wanted.is_some_and(|w| w.generation == generation);
        if current && !matches!(report.exit, LoopExit::Stopped) {
            self.wanted = None;
        }
        println!("{}", describe_report(&report));
    }
}

fn describe_outcome(outcome: &CaptureOutcome) -> String {
    match outcome {
        CaptureOutcome::Enrolled {
            name,
            path,
            entries,
        } => format!(
            "image captured and name '{name}' added ({entries} enrolled); saved {}",
            path.display()
        ),
        CaptureOutcome::NoNameProvided { path } => format!(
            "warning: no name entered; image saved without labeling at {}",
            path.display()
        ),
        CaptureOutcome::NoFaceDetected { path } => format!(
            "warning: no face detected in the image; saved {}",
            path.display()
        ),
    }
}

fn describe_report(report: &RunReport) -> String {
    let mode = match report.mode {
        LoopMode::Preview => "preview",
        LoopMode::Recognize => "recognition",
    };
    match &report.exit {
        LoopExit::Stopped => format!("{mode} stopped after {} frames", report.frames_shown),
        LoopExit::DeviceReadFailure(e) => format!(
            "error: {mode} halted after {} frames: failed to read from camera: {e}",
            report.frames_shown
        ),
        LoopExit::AnalysisFailed(e) => format!(
            "error: {mode} halted after {} frames: {e}",
            report.frames_shown
        ),
    }
}
