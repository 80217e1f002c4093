//! Replay a recorded telemetry trace against a fresh handover engine.
//!
//! The trace is JSONL, one timestamped event per line, in the same shape
//! `budswap::events::TimedEvent` serializes to. Events are fed through a
//! channel the way a host message loop would deliver them, with the
//! out-of-ear grace timer simulated from the event timestamps. Decisions
//! go to stdout as they happen; `--report` appends the final engine state
//! as JSON.

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::unbounded;

use budswap::telemetry;
use budswap::{
    EngineConfig, HandoverNotification, HandoverObserver, HandoverService, StateSnapshot,
    TimedEvent, TimerDriver,
};

#[derive(Parser, Debug)]
#[command(
    name = "handover_replay",
    about = "Replay earbud telemetry traces against the handover engine"
)]
struct ReplayArgs {
    /// JSONL trace file, one timestamped event per line.
    trace: PathBuf,

    /// TOML engine configuration; defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// TOML starting-state snapshot; everything unknown when omitted.
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Write the engine's JSON trace log while replaying.
    #[arg(long, env = "BUDSWAP_REPLAY_LOGS")]
    logs: bool,

    /// Print the final engine state report as JSON.
    #[arg(long)]
    report: bool,
}

/// Prints each decision as it happens.
struct StdoutObserver;

impl HandoverObserver for StdoutObserver {
    fn handover_recommended(&mut self, notification: HandoverNotification) {
        println!(
            "{:>10} handover reason={:?} urgency={:?}",
            notification.timestamp, notification.reason, notification.urgency
        );
    }

    fn handover_cancelled(&mut self) {
        println!("{:>10} cancel", "-");
    }
}

#[derive(Debug, Clone, Copy)]
enum TimerCommand {
    Arm(u32),
    Cancel,
}

/// Records arm/cancel requests so the replay loop can fire the grace
/// timer at the right point between events.
#[derive(Clone, Default)]
struct SimulatedTimer {
    commands: Rc<RefCell<Vec<TimerCommand>>>,
}

impl SimulatedTimer {
    fn drain(&self) -> Vec<TimerCommand> {
        self.commands.borrow_mut().drain(..).collect()
    }
}

impl TimerDriver for SimulatedTimer {
    fn arm(&mut self, delay_ms: u32) {
        self.commands.borrow_mut().push(TimerCommand::Arm(delay_ms));
    }

    fn cancel(&mut self) {
        self.commands.borrow_mut().push(TimerCommand::Cancel);
    }
}

/// Fold any timer requests made since the last event into the deadline,
/// anchoring arm delays at `now` in trace time.
fn apply_timer_commands(timer: &SimulatedTimer, deadline: &mut Option<u32>, now: u32) {
    for command in timer.drain() {
        match command {
            TimerCommand::Arm(delay_ms) => *deadline = Some(now.wrapping_add(delay_ms)),
            TimerCommand::Cancel => *deadline = None,
        }
    }
}

fn load_toml<T: serde::de::DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("read {what} file {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("parse {what} file {}", path.display()))
}

fn parse_trace(path: &Path) -> Result<Vec<TimedEvent>> {
    let text =
        fs::read_to_string(path).with_context(|| format!("read trace {}", path.display()))?;
    let mut events = Vec::new();
    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let event: TimedEvent = serde_json::from_str(line)
            .with_context(|| format!("parse trace line {}", number + 1))?;
        events.push(event);
    }
    Ok(events)
}

fn main() -> Result<()> {
    let args = ReplayArgs::parse();
    telemetry::init_tracing(args.logs);

    let config = match &args.config {
        Some(path) => load_toml::<EngineConfig>(path, "engine config")?,
        None => EngineConfig::default(),
    };
    let snapshot = match &args.snapshot {
        Some(path) => load_toml::<StateSnapshot>(path, "snapshot")?,
        None => StateSnapshot::default(),
    };
    let events = parse_trace(&args.trace)?;

    let timer = SimulatedTimer::default();
    let mut service = HandoverService::new(config, Box::new(timer.clone()));
    service
        .init(Box::new(StdoutObserver), snapshot)
        .context("initialise handover service")?;

    // Feed the trace through a channel like a host message queue would.
    let (sender, receiver) = unbounded();
    let first_timestamp = events.first().map_or(0, |event| event.timestamp);
    for event in events {
        sender.send(event).context("queue trace event")?;
    }
    drop(sender);

    // The startup kick from init anchors at the start of the trace.
    let mut deadline = None;
    apply_timer_commands(&timer, &mut deadline, first_timestamp);

    let mut replayed = 0_usize;
    while let Ok(event) = receiver.try_recv() {
        if let Some(due) = deadline {
            if due <= event.timestamp {
                service.handle_timer(due).context("fire grace timer")?;
                deadline = None;
            }
        }
        let timestamp = event.timestamp;
        service.handle_event(event).context("replay trace event")?;
        apply_timer_commands(&timer, &mut deadline, timestamp);
        replayed += 1;
    }
    if let Some(due) = deadline {
        service.handle_timer(due).context("fire grace timer")?;
    }

    eprintln!("replayed {replayed} events from {}", args.trace.display());
    if args.report {
        let report = service.report().context("final state report")?;
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("serialize report")?
        );
    }
    Ok(())
}
