use clap::{Parser, Subcommand};
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use pc_runner::config;
use pc_runner::controller::{
    PcClient, RetryPolicy, RunPlan, TestInstanceSelection, ThreadSleeper, TrendReportSelection,
};
use pc_runner::gateway::{PostRunAction, RestGateway, TimeslotDuration};
use pc_runner::runner::RunSummary;
use pc_runner::session::Session;
use pc_runner::trend_data::{DataType, Measurement, PctType};

/// PC Runner - Drive load tests on a remote performance-testing service
#[derive(Parser, Debug)]
#[command(
    name = "pc-runner",
    about = "Start, monitor and report on remote load-test runs",
    after_help = "ENVIRONMENT VARIABLES:\n\
        PC_RUNNER_SERVER             Service host, optionally with port\n\
        PC_RUNNER_HTTPS              Use HTTPS (true/false)\n\
        PC_RUNNER_DOMAIN             Domain holding the project\n\
        PC_RUNNER_PROJECT            Project name\n\
        PC_RUNNER_USER               Login user\n\
        PC_RUNNER_PASSWORD           Login password\n\
        PC_RUNNER_PROXY_URL          Outgoing proxy URL\n\
        PC_RUNNER_CONNECT_TIMEOUT    Connection timeout (seconds)\n\
        PC_RUNNER_POLL_INTERVAL_MS   Run state poll interval (ms)\n\
        PC_RUNNER_RETRY_DELAY        Seconds between start retries\n\
        PC_RUNNER_RETRY_OCCURRENCES  Start retries after a failure\n\
        PC_RUNNER_REPORT_DIR         Where reports are written\n\
        RUST_LOG                     Log filter (default: info)"
)]
struct Args {
    #[command(flatten)]
    server: ServerArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Overrides for the environment-provided connection settings
#[derive(clap::Args, Debug)]
struct ServerArgs {
    /// Service host, optionally with port
    #[arg(long, global = true)]
    server: Option<String>,

    /// Use HTTPS
    #[arg(long, global = true)]
    https: bool,

    #[arg(long, global = true)]
    domain: Option<String>,

    #[arg(long, global = true)]
    project: Option<String>,

    /// Login user (the password is only read from PC_RUNNER_PASSWORD)
    #[arg(long, short = 'u', global = true)]
    user: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start a run and follow it to completion
    Run {
        /// Test to run
        #[arg(short, long)]
        test_id: u32,

        /// Test instance id, or "auto" to reuse or create one
        #[arg(short, long, default_value = "auto")]
        instance: String,

        /// Timeslot hours
        #[arg(long, default_value = "0")]
        hours: u32,

        /// Timeslot minutes
        #[arg(long, default_value = "30")]
        minutes: u32,

        /// Post-run action: do-nothing, collate, collate-and-analyze
        #[arg(short, long, default_value = "collate-and-analyze")]
        post_run_action: String,

        /// Run in VUDs mode
        #[arg(long)]
        vuds: bool,

        /// Retry the start when the service refuses it
        #[arg(long)]
        retry: bool,

        /// Seconds between start retries
        #[arg(long, env = "PC_RUNNER_RETRY_DELAY")]
        retry_delay: Option<String>,

        /// Start retries after the first failure
        #[arg(long, env = "PC_RUNNER_RETRY_OCCURRENCES")]
        retry_occurrences: Option<String>,

        /// Trend report: none, associated, or an explicit id
        #[arg(long, default_value = "none")]
        trend_report: String,

        /// Also download the trend report as PDF
        #[arg(long)]
        trend_pdf: bool,

        /// Run state poll interval in milliseconds
        #[arg(long, env = "PC_RUNNER_POLL_INTERVAL_MS")]
        poll_interval_ms: Option<u64>,

        /// Directory for reports
        #[arg(short, long, env = "PC_RUNNER_REPORT_DIR")]
        output: Option<PathBuf>,

        /// Output the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Stop a running run
    Stop {
        #[arg(short, long)]
        run_id: u32,
    },

    /// Print the event log of a run
    EventLog {
        #[arg(short, long)]
        run_id: u32,

        /// Output the log as JSON
        #[arg(long)]
        json: bool,
    },

    /// Download a trend report as PDF
    TrendPdf {
        #[arg(short, long)]
        trend_report_id: String,

        /// Directory for the PDF
        #[arg(short, long, env = "PC_RUNNER_REPORT_DIR")]
        output: Option<PathBuf>,
    },

    /// Print one measurement slice of a trended run
    TrendData {
        #[arg(short, long)]
        trend_report_id: String,

        #[arg(short, long)]
        run_id: u32,

        /// transaction, monitor or regular
        #[arg(long, default_value = "transaction")]
        data_type: String,

        /// TRT, TPS, TRS, UDP, VU or WEB
        #[arg(long, default_value = "TRT")]
        pct_type: String,

        /// e.g. average, maximum, p90
        #[arg(short, long, default_value = "average")]
        measurement: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = interrupted.clone();
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })?;
    let mut client = build_client(&args.server, ThreadSleeper::with_cancel_flag(interrupted.clone()))?;

    match args.command {
        Commands::Run {
            test_id,
            instance,
            hours,
            minutes,
            post_run_action,
            vuds,
            retry,
            retry_delay,
            retry_occurrences,
            trend_report,
            trend_pdf,
            poll_interval_ms,
            output,
            json,
        } => {
            let run_config = &config::get().run;
            let retry = if retry {
                RetryPolicy::resolve(
                    true,
                    retry_delay.as_deref().unwrap_or(run_config.retry_delay.as_str()),
                    retry_occurrences.as_deref().unwrap_or(run_config.retry_occurrences.as_str()),
                )
            } else {
                RetryPolicy::disabled()
            };

            let mut plan = RunPlan::new(test_id, instance.parse::<TestInstanceSelection>()?);
            plan.timeslot = TimeslotDuration::new(hours, minutes);
            plan.post_run_action = post_run_action.parse::<PostRunAction>()?;
            plan.vuds_mode = vuds;
            plan.retry = retry;
            plan.trend_report = trend_report.parse::<TrendReportSelection>()?;
            plan.download_trend_pdf = trend_pdf;
            plan.poll_interval =
                Duration::from_millis(poll_interval_ms.unwrap_or_else(config::poll_interval_ms));
            plan.report_dir = output.unwrap_or_else(|| PathBuf::from(config::report_dir()));

            let summary = client.execute(&plan)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_summary(&summary);
            }

            if interrupted.load(Ordering::SeqCst) && summary.run_id != 0 {
                tracing::warn!(
                    run_id = summary.run_id,
                    "Interrupted; the run keeps going on the server. Use `pc-runner stop --run-id {}` to end it",
                    summary.run_id
                );
            }

            if !summary.success {
                return Err(format!("run {} did not complete successfully", summary.run_id).into());
            }
        }

        Commands::Stop { run_id } => {
            let stopped = logged_in(&mut client, |c| Ok(c.stop_run(run_id)))?;
            if !stopped {
                return Err(format!("run {} could not be stopped", run_id).into());
            }
            println!("Stop requested for run {}", run_id);
        }

        Commands::EventLog { run_id, json } => {
            let log = logged_in(&mut client, |c| Ok(c.run_event_log(run_id)))?
                .ok_or_else(|| format!("event log of run {} is unavailable", run_id))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&log)?);
            } else {
                println!("Event log of run {}:", run_id);
                for record in &log.records {
                    println!(
                        "  {} [{}] {}: {}",
                        record.time, record.event_type, record.name, record.description
                    );
                }
            }
        }

        Commands::TrendPdf {
            trend_report_id,
            output,
        } => {
            let dir = output.unwrap_or_else(|| PathBuf::from(config::report_dir()));
            let path = logged_in(&mut client, |c| {
                Ok(c.download_trend_report_as_pdf(&trend_report_id, &dir)?)
            })?;
            println!("Trend report saved: {}", path.display());
        }

        Commands::TrendData {
            trend_report_id,
            run_id,
            data_type,
            pct_type,
            measurement,
            json,
        } => {
            let data_type = data_type.parse::<DataType>()?;
            let pct_type = pct_type.parse::<PctType>()?;
            let measurement = measurement.parse::<Measurement>()?;

            let measurements = logged_in(&mut client, |c| {
                Ok(c.trend_report_measurements(&trend_report_id, run_id, data_type, pct_type, measurement)?)
            })?;
            if json {
                let map: serde_json::Map<String, serde_json::Value> = measurements
                    .entries()
                    .iter()
                    .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&map)?);
            } else {
                for (name, value) in measurements.entries() {
                    println!("{}\t{}", name, value);
                }
            }
        }
    }

    Ok(())
}

fn build_client(
    overrides: &ServerArgs,
    sleeper: ThreadSleeper,
) -> Result<PcClient<RestGateway>, Box<dyn Error>> {
    let config = config::get();

    let mut server = config.server.clone();
    if let Some(host) = &overrides.server {
        server.server = host.clone();
    }
    if overrides.https {
        server.https = true;
    }
    if let Some(domain) = &overrides.domain {
        server.domain = domain.clone();
    }
    if let Some(project) = &overrides.project {
        server.project = project.clone();
    }

    let mut credentials = config.credentials.clone();
    if let Some(user) = &overrides.user {
        credentials.user = user.clone();
    }

    let settings = server.to_settings();
    let gateway = RestGateway::new(&settings, server.connect_timeout())?;
    Ok(PcClient::with_sleeper(gateway, Session::new(settings, credentials), sleeper))
}

/// Run `f` inside a logged-in session, logging out afterwards
fn logged_in<T>(
    client: &mut PcClient<RestGateway>,
    f: impl FnOnce(&PcClient<RestGateway>) -> Result<T, Box<dyn Error>>,
) -> Result<T, Box<dyn Error>> {
    if !client.login() {
        return Err(format!("login to {} failed", client.session().settings.base_url()).into());
    }
    let result = f(&*client);
    client.logout();
    result
}

fn print_summary(summary: &RunSummary) {
    println!("Run: {}", summary.run_id);
    if let Some(name) = &summary.test_name {
        println!("  Test: {}", name);
    }
    println!("  Test instance: {}", summary.test_instance_id);
    println!("  Final state: {}", summary.final_state);
    println!("  Success: {}", summary.success);
    if let Some(reason) = &summary.degraded {
        println!("  Stopped short: {}", reason);
    }
    if let Some(error) = &summary.error {
        println!("  Error: {}", error);
    }
    if let Some(path) = &summary.report_path {
        println!("  Report: {}", path.display());
    }
    if let Some(id) = &summary.trend_report_id {
        let status = summary
            .trend_status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "n/a".to_string());
        println!("  Trend report {}: {}", id, status);
    }
    if let Some(path) = &summary.trend_pdf_path {
        println!("  Trend PDF: {}", path.display());
    }
    if let (Some(start), Some(end)) = (summary.started_at, summary.finished_at) {
        println!("  Duration: {}s", (end - start).num_seconds());
    }
}
