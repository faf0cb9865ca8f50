//! Conformo CLI: run conformance-suite queries
//!
//! ## Usage
//!
//! ```bash
//! conformo run unittests:*                       # Run the built-in suite
//! conformo run 'unittests:query:*' -v --format tap
//! conformo list unittests:* --collapse           # Minimal query list
//! ```

use clap::Parser;
use conformo::SuiteRegistry;
use conformo_cli::{
    selftest, Cli, CliConfig, CliResult, ColorChoice, Commands, TestRunner, Verbosity,
};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Returns whether every selected case succeeded
fn run() -> CliResult<bool> {
    let cli = Cli::parse();
    let config = build_config(&cli);
    init_tracing(config.verbosity);

    let registry = SuiteRegistry::global();
    selftest::register(&registry)?;
    let runner = TestRunner::new(config, registry);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;
    runtime.block_on(execute(&cli.command, &runner))
}

async fn execute(command: &Commands, runner: &TestRunner) -> CliResult<bool> {
    match command {
        Commands::Run(args) => Ok(runner.run(args).await?.is_success()),
        Commands::List(args) => {
            let lines = runner.list(args).await?;
            TestRunner::print_list(&lines);
            Ok(true)
        }
    }
}

fn build_config(cli: &Cli) -> CliConfig {
    let color: ColorChoice = cli.color.clone().into();
    let config = CliConfig::new().with_color(color);
    match &cli.command {
        Commands::Run(args) => config
            .with_verbosity(Verbosity::from_flags(args.verbose, cli.quiet))
            .with_jobs(args.jobs)
            .with_format(args.format.clone().into())
            .with_timeout_ms(args.timeout)
            .with_debug(args.debug)
            .with_fail_fast(args.fail_fast)
            .with_print_json(args.print_json),
        Commands::List(_) => config.with_verbosity(Verbosity::from_flags(0, cli.quiet)),
    }
}

/// Diagnostics go to stderr, filtered by `CONFORMO_LOG`
fn init_tracing(verbosity: Verbosity) {
    let filter = EnvFilter::try_from_env("CONFORMO_LOG")
        .unwrap_or_else(|_| EnvFilter::new(verbosity.default_filter()));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
