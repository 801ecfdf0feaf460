//! HomeGlow - Entry Point
//!
//! Command-line client for HomeGlow lights. Without a command it keeps the
//! local state in sync with the light service until interrupted.

use std::collections::HashMap;
use std::env;

use colored::Colorize;
use homeglow::app::options::AppOptions;
use homeglow::app::run::run;
use homeglow::app::state::AppState;
use homeglow::errors::ClientError;
use homeglow::logs::{init_logging, LogOptions};
use homeglow::models::light::{LightId, PowerStatus};
use homeglow::models::schedule::format_time_of_day;
use homeglow::models::snapshot::{FieldView, Snapshot};
use homeglow::storage::layout::StorageLayout;
use homeglow::storage::settings::Settings;
use homeglow::utils::version_info;
use secrecy::SecretString;
use tracing::{error, info};

const PASSWORD_ENV: &str = "HOMEGLOW_PASSWORD";

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    let version = version_info();
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version) {
            Ok(json) => println!("{}", json),
            Err(_) => println!("{}", version.version),
        }
        return;
    }

    let layout = match cli_args.get("dir") {
        Some(dir) => StorageLayout::new(dir),
        None => StorageLayout::default(),
    };

    // Retrieve the settings file
    let settings = match Settings::load(&layout.settings_file()).await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Unable to read settings file: {}", e);
            return;
        }
    };

    // Initialize logging
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        json_format: settings.log_json,
        log_dir: settings.log_to_file.then(|| layout.logs_dir()),
        ..Default::default()
    };
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            println!("Failed to initialize logging: {e}");
            None
        }
    };

    let options = AppOptions::from_settings(&settings, layout);

    if let Some(command) = Command::parse(&cli_args) {
        if let Err(e) = run_command(command, &options).await {
            eprintln!("{} {}", "error:".red().bold(), e);
            std::process::exit(1);
        }
        return;
    }

    info!("Running HomeGlow {} with options: {:?}", version.version, options);
    if let Err(e) = run(options, await_shutdown_signal()).await {
        error!("Failed to run the client: {e}");
    }
}

/// One-shot commands
enum Command {
    SignIn { email: String, password: SecretString },
    SignUp { email: String, password: SecretString },
    ResetPassword(String),
    SignOut,
    Status,
    Toggle(LightId),
    VerifyEmail,
    Pair(String),
    Energy,
}

impl Command {
    fn parse(cli_args: &HashMap<String, String>) -> Option<Self> {
        if let Some(email) = cli_args.get("email") {
            let password = cli_args
                .get("password")
                .cloned()
                .or_else(|| env::var(PASSWORD_ENV).ok())
                .unwrap_or_default();
            let email = email.clone();
            let password = SecretString::from(password);
            if cli_args.contains_key("sign-up") {
                return Some(Command::SignUp { email, password });
            }
            return Some(Command::SignIn { email, password });
        }
        if let Some(email) = cli_args.get("reset-password") {
            return Some(Command::ResetPassword(email.clone()));
        }
        if cli_args.contains_key("sign-out") {
            return Some(Command::SignOut);
        }
        if let Some(light) = cli_args.get("toggle") {
            return Some(Command::Toggle(LightId::from(light.as_str())));
        }
        if let Some(device) = cli_args.get("pair") {
            return Some(Command::Pair(device.clone()));
        }
        if cli_args.contains_key("verify-email") {
            return Some(Command::VerifyEmail);
        }
        if cli_args.contains_key("energy") {
            return Some(Command::Energy);
        }
        if cli_args.contains_key("status") {
            return Some(Command::Status);
        }
        None
    }
}

async fn run_command(command: Command, options: &AppOptions) -> Result<(), ClientError> {
    let state = AppState::init(options).await?;

    match command {
        Command::SignIn { email, password } => {
            let credential = state.session.sign_in(&email, &password).await?;
            println!(
                "{} {} (until {})",
                "Signed in as".green(),
                credential.email().unwrap_or(credential.subject()),
                credential.expires_at()
            );
        }
        Command::SignUp { email, password } => {
            let credential = state.session.sign_up(&email, &password).await?;
            println!(
                "{} {}, check your inbox to verify the address",
                "Account created for".green(),
                credential.email().unwrap_or(&email)
            );
        }
        Command::ResetPassword(email) => {
            state.session.send_password_reset(&email).await?;
            println!("{} {}", "Password reset email sent to".green(), email.trim());
        }
        Command::SignOut => {
            state.session.sign_out().await;
            println!("{}", "Signed out".green());
        }
        Command::Status => {
            state.poller.poll_now().await;
            print_snapshot(&state.snapshot());
        }
        Command::Toggle(light) => {
            state.poller.poll_now().await;
            let status = state.mutations.request_toggle(&light).await?;
            println!("Light {} switched {}", light, status_label(Some(status), false));
        }
        Command::VerifyEmail => {
            if state.session.send_email_verification().await? {
                println!("{}", "Verification email sent".green());
            } else {
                println!("Email address is already verified");
            }
        }
        Command::Pair(device) => {
            state.mutations.pair_device(&device).await?;
            println!("{} {}", "Paired device".green(), device);
        }
        Command::Energy => {
            let data = state.mutations.fetch_energy().await?;
            println!("{}", "Energy".bold());
            for (name, value) in &data.readings {
                println!("  {:<24} {}", name, value);
            }
        }
    }

    state.shutdown().await
}

fn print_snapshot(snapshot: &Snapshot) {
    if !snapshot.authenticated {
        println!("{}", "Not signed in".yellow());
        return;
    }

    println!("{}", "Lights".bold());
    if snapshot.lights.is_empty() {
        println!("  (none)");
    }
    for (id, view) in &snapshot.lights {
        println!("  {:<24} {}", id.to_string(), status_label(view.value, view.is_pending()));
    }

    let schedule = &snapshot.schedule;
    println!("{}", "Schedule".bold());
    println!(
        "  wake up  {} on {}",
        field_label(&schedule.wake_up, format_time_of_day),
        field_label(&schedule.wake_up_light, |l| l.to_string())
    );
    println!(
        "  sleep    {} on {}",
        field_label(&schedule.sleep, format_time_of_day),
        field_label(&schedule.sleep_light, |l| l.to_string())
    );

    println!("{}", "Timer".bold());
    println!(
        "  duration {}  auto timeout {}",
        field_label(&snapshot.timer.duration, |d| d.to_string()),
        field_label(&snapshot.timer.auto_timeout_enabled, |e| (if *e { "on" } else { "off" }).to_string())
    );
    println!(
        "  notify after {}",
        field_label(&snapshot.notify_duration, |s| format!("{} sec", s))
    );

    if let Some(at) = snapshot.last_polled_at {
        println!("{}", format!("Last updated {}", at).dimmed());
    }
}

fn status_label(status: Option<PowerStatus>, pending: bool) -> String {
    let label = match status {
        Some(PowerStatus::On) => "ON".green().bold().to_string(),
        Some(PowerStatus::Off) => "OFF".dimmed().to_string(),
        None => "unknown".yellow().to_string(),
    };
    if pending {
        format!("{} {}", label, "(pending)".yellow())
    } else {
        label
    }
}

fn field_label<T>(view: &FieldView<T>, format: impl Fn(&T) -> String) -> String {
    let value = match &view.value {
        Some(value) => format(value),
        None => "-".to_string(),
    };
    if view.is_pending() {
        format!("{} {}", value, "(pending)".yellow())
    } else {
        value
    }
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let (mut sigterm, mut sigint) = match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
            _ => {
                error!("Failed to install signal handlers, waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
        info!("Ctrl+C received, shutting down...");
    }
}
