use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use faultline_config::FaultlineConfig;
use faultline_logging::LogLevel;
use std::path::PathBuf;
use std::process::ExitCode;

mod ai;
mod junit;
mod run;

#[derive(Parser, Debug)]
#[command(name = "faultline")]
#[command(about = "Run tests with deduplicated Jira failure tickets and Xray executions.", long_about = None)]
struct Cli {
    /// Config file (YAML or JSON). Defaults to ./faultline.yaml when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// More logging; repeat for trace output.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum DataKind {
    User,
    Api,
    Form,
    Dataset,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum TestKind {
    Api,
    Ui,
    Db,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an execution, run the test command in N workers, import their JUnit reports.
    Run {
        #[arg(long, default_value_t = 1)]
        workers: usize,
        /// JUnit report path per worker; `{worker}` is replaced by the worker id.
        #[arg(long)]
        junit: Option<String>,
        /// Don't create a test execution.
        #[arg(long)]
        no_execution: bool,
        /// Directory scanned for `test_key = "KEY-1"` markers.
        #[arg(long, default_value = "tests")]
        keys_from: PathBuf,
        /// Test command; `{worker}` in any argument is replaced by the worker id.
        #[arg(trailing_var_arg = true, required = true, num_args = 1..)]
        command: Vec<String>,
    },

    /// Push a JUnit report's results to an execution.
    ImportJunit {
        #[arg(long)]
        file: PathBuf,
        /// Existing execution; a new one is created when omitted.
        #[arg(long)]
        execution: Option<String>,
    },

    /// File tickets for the failing cases of a JUnit report.
    ReportJunit {
        #[arg(long)]
        file: PathBuf,
        /// Execution to link tickets and report results to.
        #[arg(long)]
        execution: Option<String>,
    },

    /// Generate test data with AI.
    GenerateData {
        #[arg(long = "type", value_enum)]
        kind: DataKind,
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long, default_value_t = 1)]
        count: usize,
        /// API endpoint (api).
        #[arg(long)]
        endpoint: Option<String>,
        #[arg(long, default_value = "POST")]
        method: String,
        /// Form name (form).
        #[arg(long)]
        form_name: Option<String>,
        /// Comma-separated field names (form), or the object kind (dataset).
        #[arg(long)]
        fields: Option<String>,
        /// JSON object of constraints.
        #[arg(long)]
        constraints: Option<String>,
    },

    /// Generate a test with AI.
    GenerateTest {
        #[arg(long = "type", value_enum)]
        kind: TestKind,
        #[arg(long)]
        description: String,
        /// Output file; defaults to tests/<generated name>.rs.
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long)]
        endpoint: Option<String>,
        #[arg(long, default_value = "GET")]
        method: String,
        #[arg(long)]
        page_name: Option<String>,
        /// Comma-separated steps (ui).
        #[arg(long)]
        steps: Option<String>,
        #[arg(long)]
        db_type: Option<String>,
        #[arg(long)]
        query: Option<String>,
    },

    /// Review a test file and suggest improvements.
    AnalyzeTest {
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Explain a test failure.
    AnalyzeFailure {
        #[arg(long)]
        test_name: String,
        #[arg(long)]
        error: String,
        #[arg(long)]
        test_file: PathBuf,
        #[arg(long)]
        screenshot: Option<PathBuf>,
        /// File with the response body of a failing API call.
        #[arg(long)]
        response: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn load_config(cli: &Cli) -> Result<FaultlineConfig> {
    let mut config = FaultlineConfig::load(cli.config.as_deref()).context("load configuration")?;
    match cli.verbose {
        0 => {}
        1 => config.logging.level = LogLevel::Debug,
        _ => config.logging.level = LogLevel::Trace,
    }
    Ok(config)
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    faultline_logging::init(&config.logging);

    match cli.cmd {
        Command::Run {
            workers,
            junit,
            no_execution,
            keys_from,
            command,
        } => run::run(
            &config,
            &run::RunArgs {
                workers,
                junit,
                no_execution,
                keys_from,
                command,
            },
        ),
        Command::ImportJunit { file, execution } => {
            junit::import(&config, &file, execution.as_deref())?;
            Ok(ExitCode::SUCCESS)
        }
        Command::ReportJunit { file, execution } => {
            junit::report(&config, &file, execution.as_deref())?;
            Ok(ExitCode::SUCCESS)
        }
        Command::GenerateData {
            kind,
            output,
            count,
            endpoint,
            method,
            form_name,
            fields,
            constraints,
        } => {
            ai::generate_data(
                &config,
                &ai::DataArgs {
                    kind,
                    output,
                    count,
                    endpoint,
                    method,
                    form_name,
                    fields,
                    constraints,
                },
            )?;
            Ok(ExitCode::SUCCESS)
        }
        Command::GenerateTest {
            kind,
            description,
            output,
            endpoint,
            method,
            page_name,
            steps,
            db_type,
            query,
        } => {
            ai::generate_test(
                &config,
                &ai::TestArgs {
                    kind,
                    description,
                    output,
                    endpoint,
                    method,
                    page_name,
                    steps,
                    db_type,
                    query,
                },
            )?;
            Ok(ExitCode::SUCCESS)
        }
        Command::AnalyzeTest { file, output } => {
            ai::analyze_test(&config, &file, output.as_deref())?;
            Ok(ExitCode::SUCCESS)
        }
        Command::AnalyzeFailure {
            test_name,
            error,
            test_file,
            screenshot,
            response,
            output,
        } => {
            ai::analyze_failure(
                &config,
                &ai::FailureArgs {
                    test_name,
                    error,
                    test_file,
                    screenshot,
                    response,
                    output,
                },
            )?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
