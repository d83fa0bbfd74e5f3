#![cfg(not(tarpaulin_include))]

use clap::{Args, Parser, Subcommand};
use excel_analytics::chart::ChartKind;
use excel_analytics::config::ClientConfig;
use excel_analytics::loader::CandidateFile;
use excel_analytics::pipeline::{AUTOSAVE_PERIOD, Workspace};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "excel-analytics")]
#[command(about = "Spreadsheet analytics: upload, chart, insights and history", long_about = None)]
struct Cli {
    /// REST backend base URL
    #[arg(long, env = "EXCEL_ANALYTICS_API", global = true)]
    api: Option<String>,

    /// Local storage directory
    #[arg(long, env = "EXCEL_ANALYTICS_HOME", global = true)]
    home: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

/// Where chart, insight and analysis commands take their data from. Inside
/// the shell both may be omitted to use the dataset already loaded.
#[derive(Args, Debug, Default)]
struct DataArgs {
    /// Load this spreadsheet first
    #[arg(long)]
    file: Option<PathBuf>,

    /// Load the built-in sample data first
    #[arg(long)]
    sample: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest one or more spreadsheets
    Upload {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Load the built-in sample business data
    Sample,
    /// Show the first rows of the current dataset
    Preview,
    /// Draw a chart and optionally write it as PNG
    Chart {
        x: String,
        y: String,
        /// bar, line, pie, area, 3d-scatter or 3d-surface
        #[arg(default_value = "bar")]
        kind: ChartKind,
        #[arg(short, long)]
        out: Option<PathBuf>,
        #[command(flatten)]
        data: DataArgs,
    },
    /// Descriptive statistics of the current dataset
    Insights {
        #[command(flatten)]
        data: DataArgs,
    },
    /// Save an axis selection as an analysis of the newest upload
    Save {
        x: String,
        y: String,
        #[arg(default_value = "bar")]
        kind: ChartKind,
        #[command(flatten)]
        data: DataArgs,
    },
    /// List past uploads
    History,
    /// Remove one history entry
    Delete { id: i64 },
    /// Forget all history and counters
    Clear,
    /// Counters and the most recent uploads
    Dashboard,
    Register {
        name: String,
        email: String,
        password: String,
    },
    Login {
        email: String,
        password: String,
    },
    Logout,
    Profile,
    /// Local stats, plus the user list for admins
    Admin,
    /// Promote a user to admin (admins only)
    Promote { id: String },
    /// Interactive session keeping the dataset between commands
    Shell,
}

/// One line typed into the shell.
#[derive(Parser)]
#[command(no_binary_name = true, disable_help_flag = true)]
struct ShellLine {
    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut config = ClientConfig::from_env();
    if let Some(api) = cli.api {
        config.api_url = api;
    }
    if let Some(home) = cli.home {
        config.home = home;
    }

    let mut workspace = Workspace::open(&config)?;

    match cli.command.unwrap_or(Command::Shell) {
        Command::Shell => shell(&mut workspace).await?,
        command => execute(&mut workspace, command).await,
    }

    workspace.wait_for_sync().await;
    workspace.persist();
    Ok(())
}

async fn shell(workspace: &mut Workspace) -> io::Result<()> {
    let _autosave = workspace.spawn_autosave(AUTOSAVE_PERIOD);
    println!("Type 'help' for commands, 'quit' to exit.");

    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        match line {
            "" => continue,
            "quit" | "exit" | "q" => break,
            _ => {}
        }

        match ShellLine::try_parse_from(line.split_whitespace()) {
            Ok(ShellLine {
                command: Command::Shell,
            }) => println!("Already in the shell"),
            Ok(parsed) => execute(workspace, parsed.command).await,
            Err(e) => println!("{}", e),
        }
    }

    Ok(())
}

async fn load_data(workspace: &mut Workspace, data: DataArgs) {
    if data.sample {
        workspace.load_sample_data();
    }
    if let Some(path) = data.file {
        upload(workspace, vec![path]).await;
    }
}

async fn upload(workspace: &mut Workspace, paths: Vec<PathBuf>) {
    let mut files = Vec::new();
    for path in paths {
        match CandidateFile::from_path(&path) {
            Ok(file) => files.push(file),
            Err(e) => println!("Cannot read {}: {}", path.display(), e),
        }
    }

    let report = workspace.process_files(files).await;
    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(entry) => println!(
                "Loaded {}: {} rows, columns: {}",
                entry.file_name,
                entry.row_count,
                entry.columns.join(", ")
            ),
            Err(e) => println!("{}", e),
        }
    }
}

async fn execute(workspace: &mut Workspace, command: Command) {
    match command {
        Command::Upload { files } => upload(workspace, files).await,
        Command::Sample => {
            let entry = workspace.load_sample_data();
            println!("Loaded {} ({} rows)", entry.file_name, entry.row_count);
        }
        Command::Preview => {
            let preview = workspace.preview();
            println!("{}", preview.columns.join("\t"));
            for row in &preview.rows {
                println!("{}", row.join("\t"));
            }
            if preview.truncated {
                println!("... {} rows in total", preview.total_rows);
            }
        }
        Command::Chart {
            x,
            y,
            kind,
            out,
            data,
        } => {
            load_data(workspace, data).await;
            match workspace.generate_chart(&x, &y, kind) {
                Ok(chart) => println!("{}", chart.spec.title()),
                Err(e) => {
                    println!("{}", e);
                    return;
                }
            }
            if let Some(path) = out {
                let written = workspace
                    .download_chart()
                    .map_err(|e| e.to_string())
                    .and_then(|png| std::fs::write(&path, png).map_err(|e| e.to_string()));
                match written {
                    Ok(()) => println!("Chart written to {}", path.display()),
                    Err(e) => println!("Download failed: {}", e),
                }
            }
        }
        Command::Insights { data } => {
            load_data(workspace, data).await;
            for insight in workspace.generate_insights() {
                println!("• {}", insight);
            }
        }
        Command::Save { x, y, kind, data } => {
            load_data(workspace, data).await;
            workspace.wait_for_sync().await;
            let outcome = workspace.save_analysis(&x, &y, kind).await;
            println!("{}", outcome.message());
        }
        Command::History => {
            for entry in workspace.history() {
                println!(
                    "{}  {}  {} rows  {} analyses  {}",
                    entry.id,
                    entry.file_name,
                    entry.row_count,
                    entry.analyses().len(),
                    entry.server_id.as_deref().unwrap_or("local only")
                );
            }
        }
        Command::Delete { id } => {
            if workspace.delete_history_item(id) {
                println!("Deleted {}", id);
            } else {
                println!("No history entry {}", id);
            }
        }
        Command::Clear => {
            workspace.clear_all();
            println!("All data cleared successfully!");
        }
        Command::Dashboard => {
            let dashboard = workspace.dashboard();
            let a = dashboard.analytics;
            println!(
                "Files: {}  Charts: {}  Rows: {}  Insights: {}",
                a.files, a.charts, a.rows, a.insights
            );
            for entry in dashboard.recent {
                println!("  {}  {} ({} rows)", entry.upload_date, entry.file_name, entry.row_count);
            }
        }
        Command::Register {
            name,
            email,
            password,
        } => match workspace.session_mut().register(&name, &email, &password).await {
            Ok(user) => println!("Registered as {} <{}>", user.name, user.email),
            Err(e) => println!("Registration failed: {}", e),
        },
        Command::Login { email, password } => {
            match workspace.session_mut().login(&email, &password).await {
                Ok(user) => println!("Signed in as {} <{}>", user.name, user.email),
                Err(e) => println!("Login failed: {}", e),
            }
        }
        Command::Logout => {
            workspace.session_mut().logout();
            println!("Signed out");
        }
        Command::Profile => match workspace.session().profile().await {
            Ok(user) => println!("{} <{}> role: {:?}", user.name, user.email, user.role),
            Err(e) => println!("{}", e),
        },
        Command::Admin => {
            let panel = workspace.admin_panel().await;
            println!(
                "Storage: {:.2}  Insights generated: {}",
                panel.storage_estimate, panel.insights
            );
            match panel.account.and_then(|account| account.users) {
                Some(users) => {
                    for user in users {
                        println!("  {}  {} <{}> {:?}", user.id, user.name, user.email, user.role);
                    }
                }
                None => println!("User management requires an admin account"),
            }
        }
        Command::Promote { id } => match workspace.session().promote(&id).await {
            Ok(user) => println!("{} is now {:?}", user.email, user.role),
            Err(e) => println!("Promote failed: {}", e),
        },
        Command::Shell => {}
    }
}
