use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use preemptive_sim::{
    BlockedPolicy, EventSource, Kernel, KernelConfig, Program, ProgramEvaluator, StatsSnapshot,
    StopPolicy, StopReason, Workload,
};
use std::time::{Duration, Instant};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Drive the preemptive kernel simulator from the command line.
#[derive(Parser)]
#[command(name = "procsim")]
#[command(about = "Round-robin process scheduler simulator", long_about = None)]
struct Cli {
    #[command(flatten)]
    kernel: KernelArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct KernelArgs {
    /// Worker threads executing quanta
    #[arg(short, long, default_value_t = 4)]
    workers: usize,

    /// Process table capacity
    #[arg(short, long, default_value_t = 64)]
    capacity: usize,

    /// Wall-clock time each quantum burns, in microseconds
    #[arg(long, default_value_t = 100)]
    quantum_us: u64,

    /// How workers treat blocked processes when nothing is ready
    #[arg(long, value_enum, default_value_t = BlockedMode::Wait)]
    blocked: BlockedMode,

    /// Interval between external events, in milliseconds; 0 disables them
    #[arg(long, default_value_t = 1)]
    event_interval_ms: u64,
}

#[derive(Subcommand)]
enum Commands {
    /// Create, kill, wait for and reap batches of processes
    Workload {
        /// Threads creating processes
        #[arg(short, long, default_value_t = 4)]
        drivers: usize,
        /// Threads killing and reaping processes
        #[arg(short, long)]
        reapers: Option<usize>,
        /// Batches per driver
        #[arg(short, long, default_value_t = 100)]
        iterations: usize,
        /// Processes per batch
        #[arg(short, long, default_value_t = 8)]
        batch_size: usize,
        #[arg(long, value_enum, default_value_t = ProgramKind::Mixed)]
        program: ProgramKind,
        /// Retries per creation while the process table is full
        #[arg(long, default_value_t = 100)]
        retries: u32,
    },
    /// Seed the table, run until every process terminates, then exit
    Drain {
        /// Processes to seed
        #[arg(short, long, default_value_t = 16)]
        processes: usize,
        /// Quanta each process expires before terminating
        #[arg(short, long, default_value_t = 10)]
        bursts: u32,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum BlockedMode {
    /// Idle until an event unblocks a process
    Wait,
    /// Run the oldest blocked process instead of idling
    Fallback,
}

impl From<BlockedMode> for BlockedPolicy {
    fn from(mode: BlockedMode) -> Self {
        match mode {
            BlockedMode::Wait => BlockedPolicy::IdleWaitForEvent,
            BlockedMode::Fallback => BlockedPolicy::RunBlockedAsFallback,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ProgramKind {
    /// Programs that never finish
    Loop,
    /// Programs that finish after a few quanta
    Bursts,
    /// Programs that block on events
    Blocking,
    /// A rotation of all of the above
    Mixed,
}

impl ProgramKind {
    fn build(self, seed: usize) -> Program {
        let kind = match self {
            ProgramKind::Mixed => [ProgramKind::Loop, ProgramKind::Bursts, ProgramKind::Blocking][seed % 3],
            other => other,
        };
        match kind {
            ProgramKind::Loop | ProgramKind::Mixed => Program::InfiniteLoop,
            ProgramKind::Bursts => Program::Bursts((seed % 5) as u32),
            ProgramKind::Blocking => Program::script([
                StopReason::QuantumExpired,
                StopReason::Blocked,
                StopReason::QuantumExpired,
            ]),
        }
    }
}

impl KernelArgs {
    fn config(&self, stop_policy: StopPolicy) -> KernelConfig {
        KernelConfig::new(self.workers, self.capacity)
            .stop_policy(stop_policy)
            .blocked_policy(self.blocked.into())
    }

    fn evaluator(&self) -> ProgramEvaluator {
        ProgramEvaluator::with_quantum(Duration::from_micros(self.quantum_us))
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Workload {
            drivers,
            reapers,
            iterations,
            batch_size,
            program,
            retries,
        } => {
            let kernel = Kernel::launch(cli.kernel.config(StopPolicy::RunUntilStopped), cli.kernel.evaluator())
                .context("failed to start kernel")?;
            let events = start_events(&cli.kernel, &kernel)?;

            let workload = Workload::new(drivers, iterations, batch_size)
                .reapers(reapers.unwrap_or(drivers))
                .retries(retries);
            let report = workload
                .run(&kernel.handle(), |driver, iteration, index| {
                    program.build(driver + iteration + index)
                })
                .context("workload aborted")?;

            if let Some(events) = events {
                events.stop();
            }
            let stats = kernel.stats();
            kernel.stop();

            info!(
                created = report.created,
                rejected = report.rejected,
                reaped = report.reaped,
                elapsed_ms = report.elapsed.as_millis() as u64,
                "workload report"
            );
            log_stats(&stats);
        }
        Commands::Drain { processes, bursts } => {
            let mut kernel = Kernel::new(cli.kernel.config(StopPolicy::DrainAndExit), cli.kernel.evaluator())
                .context("invalid kernel configuration")?;
            for _ in 0..processes {
                kernel
                    .create_process(Program::Bursts(bursts))
                    .context("failed to seed process table")?;
            }
            let handle = kernel.handle();

            let started = Instant::now();
            kernel.start().context("failed to start kernel")?;
            kernel.drain().context("failed to drain kernel")?;

            info!(
                processes,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "all processes terminated"
            );
            log_stats(&handle.stats());
        }
    }

    Ok(())
}

fn start_events(args: &KernelArgs, kernel: &Kernel<ProgramEvaluator>) -> Result<Option<EventSource>> {
    if args.event_interval_ms == 0 {
        return Ok(None);
    }
    let handle = kernel.handle();
    let source = EventSource::start(Duration::from_millis(args.event_interval_ms), move || {
        handle.event();
    })
    .context("failed to start event source")?;
    Ok(Some(source))
}

fn log_stats(stats: &StatsSnapshot) {
    info!(
        dispatched = stats.dispatched,
        expired = stats.expired,
        blocked = stats.blocked,
        terminated = stats.terminated,
        killed = stats.killed,
        events = stats.events,
        promoted = stats.promoted,
        discarded = stats.discarded,
        "scheduler stats"
    );
}
