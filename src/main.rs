//! CareBook CLI - a command-line client for the CareBook appointment
//! booking service.
//!
//! Wraps the session layer in a handful of account commands (login,
//! logout, register, status) and authenticated queries (me, doctors).

use std::io::{self, Write};

use anyhow::{bail, Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use carebook::auth::{user_message, SessionEvent, SessionService, SessionState, TokenStore};
use carebook::config::Config;
use carebook::models::{DoctorQuery, OtpChannel, RegisterRequest, UserRole};

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Set up logging with environment-based filter
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();
    info!("CareBook CLI starting");

    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(String::as_str).unwrap_or("status");

    match command {
        "login" => cmd_login(args.get(2).map(String::as_str)).await,
        "logout" => cmd_logout().await,
        "register" => cmd_register().await,
        "status" => cmd_status().await,
        "me" => cmd_me().await,
        "doctors" => cmd_doctors(&args[2..]).await,
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            print_usage();
            bail!("Unknown command: {other}");
        }
    }
}

fn print_usage() {
    eprintln!("CareBook - appointment service client");
    eprintln!();
    eprintln!("Usage: carebook <command> [options]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  login [email]     Sign in (prompts for anything missing)");
    eprintln!("  logout            Sign out and forget the saved session");
    eprintln!("  register          Create an account with OTP verification");
    eprintln!("  status            Show who is signed in (default)");
    eprintln!("  me                Show the signed-in profile");
    eprintln!("  doctors [flags]   List verified doctors");
    eprintln!();
    eprintln!("Doctors flags:");
    eprintln!("  --specialty <name>        Filter by specialty");
    eprintln!("  --min-fee <amount>        Minimum consultation fee");
    eprintln!("  --max-fee <amount>        Maximum consultation fee");
    eprintln!("  --min-experience <years>  Minimum years of experience");
    eprintln!("  --sort <field>            Sort field; prefix with - to reverse");
    eprintln!();
    eprintln!("Environment: CAREBOOK_API_URL, CAREBOOK_EMAIL, CAREBOOK_PASSWORD,");
    eprintln!("CAREBOOK_DEBUG_OTP (set to 1 to surface server debug OTP codes)");
}

fn build_service(config: Config) -> Result<SessionService> {
    let store = TokenStore::new(Config::session_path()?);
    SessionService::new(config, store).context("Could not set up the API client")
}

/// Print any session events the service produced (a revoked session tells
/// the user to sign in again).
fn report_events(service: &SessionService) {
    for event in service.process_events() {
        if let SessionEvent::LoginRequired { reason } = event {
            eprintln!("{reason}");
        }
    }
}

fn prompt(label: &str, default: Option<&str>) -> Result<String> {
    match default {
        Some(default) => eprint!("{label} [{default}]: "),
        None => eprint!("{label}: "),
    }
    io::stderr().flush()?;

    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    let value = line.trim();
    if value.is_empty() {
        if let Some(default) = default {
            return Ok(default.to_string());
        }
        bail!("{label} is required");
    }
    Ok(value.to_string())
}

fn optional_prompt(label: &str) -> Result<Option<String>> {
    eprint!("{label} (optional): ");
    io::stderr().flush()?;

    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    let value = line.trim();
    Ok(if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    })
}

async fn cmd_login(email_arg: Option<&str>) -> Result<()> {
    let mut config = Config::load()?;
    let service = build_service(config.clone())?;

    let email = match email_arg {
        Some(email) => email.to_string(),
        None => match std::env::var("CAREBOOK_EMAIL") {
            Ok(email) if !email.trim().is_empty() => email,
            _ => prompt("Email", config.last_email.as_deref())?,
        },
    };
    let password = match std::env::var("CAREBOOK_PASSWORD") {
        Ok(password) if !password.is_empty() => password,
        _ => rpassword::prompt_password("Password: ")?,
    };

    let outcome = service.login(&email, &password).await;
    if !outcome.success {
        bail!(
            "{}",
            outcome.error.unwrap_or_else(|| "Sign-in failed".to_string())
        );
    }

    config.last_email = Some(email.trim().to_string());
    if let Err(e) = config.save() {
        warn!(error = %e, "Could not save config");
    }

    let user = service.user().context("Signed in but no user is available")?;
    println!("Signed in as {} ({})", user.email, user.role);
    Ok(())
}

async fn cmd_logout() -> Result<()> {
    let config = Config::load()?;
    let service = build_service(config)?;
    service.logout();
    println!("Signed out");
    Ok(())
}

async fn cmd_register() -> Result<()> {
    let config = Config::load()?;
    let service = build_service(config)?;

    let email = prompt("Email", None)?;
    let sent = service.send_otp(&email, OtpChannel::Email).await;
    if !sent.success {
        bail!(
            "{}",
            sent.error
                .unwrap_or_else(|| "Could not send the verification code".to_string())
        );
    }
    println!("A verification code was sent to {email}");
    if let Some(code) = sent.debug_code {
        println!("Debug code: {code}");
    }

    // The register endpoint checks the code itself. Verifying it first
    // would mark it used server-side and registration would then find no
    // pending code.
    let otp_code = prompt("Verification code", None)?;

    let password = rpassword::prompt_password("Password: ")?;
    let confirm = rpassword::prompt_password("Confirm password: ")?;
    if password != confirm {
        bail!("Passwords do not match");
    }

    let role_input = prompt("Role (patient/doctor)", Some("patient"))?;
    let user_type = UserRole::parse(role_input.trim().to_lowercase().as_str())
        .context("Role must be 'patient' or 'doctor'")?;

    let first_name = optional_prompt("First name")?;
    let last_name = optional_prompt("Last name")?;
    let phone_number = optional_prompt("Phone number")?;

    let outcome = service
        .register(RegisterRequest {
            email: email.clone(),
            password,
            user_type,
            otp_code,
            first_name,
            last_name,
            phone_number,
        })
        .await;
    if !outcome.success {
        bail!(
            "{}",
            outcome
                .error
                .unwrap_or_else(|| "Registration failed".to_string())
        );
    }

    println!("Account created; signed in as {email}");
    Ok(())
}

async fn cmd_status() -> Result<()> {
    let config = Config::load()?;
    let service = build_service(config)?;
    service.init().await;
    report_events(&service);

    match service.state() {
        SessionState::Authenticated(user) => {
            println!("Signed in as {} ({})", user.email, user.role);
        }
        _ => println!("Not signed in"),
    }
    Ok(())
}

async fn cmd_me() -> Result<()> {
    let config = Config::load()?;
    let service = build_service(config)?;
    service.init().await;
    report_events(&service);

    if !service.state().is_authenticated() {
        bail!("Not signed in. Run `carebook login` first.");
    }

    let profile = match service.api().fetch_profile().await {
        Ok(profile) => profile,
        Err(e) => {
            report_events(&service);
            bail!("{}", user_message(&e));
        }
    };

    println!("{}", profile.display_name());
    println!(
        "  Email: {} ({})",
        profile.email,
        if profile.is_email_verified {
            "verified"
        } else {
            "unverified"
        }
    );
    if let Some(ref phone) = profile.phone_number {
        println!(
            "  Phone: {} ({})",
            phone,
            if profile.is_phone_verified {
                "verified"
            } else {
                "unverified"
            }
        );
    }
    println!("  Role:  {}", profile.user_type);
    if let Some(joined) = profile.date_joined {
        println!("  Since: {}", joined.format("%Y-%m-%d"));
    }
    Ok(())
}

async fn cmd_doctors(args: &[String]) -> Result<()> {
    let query = parse_doctor_flags(args)?;

    let config = Config::load()?;
    let service = build_service(config)?;
    // The directory is public; init still runs so a saved session gets
    // validated and its bearer attached when one is held.
    service.init().await;
    report_events(&service);

    let doctors = match service.api().fetch_doctors(&query).await {
        Ok(doctors) => doctors,
        Err(e) => {
            report_events(&service);
            bail!("{}", user_message(&e));
        }
    };

    if doctors.is_empty() {
        println!("No doctors matched the given filters");
        return Ok(());
    }
    for doctor in &doctors {
        let specialty = doctor.specialty.as_deref().unwrap_or("general");
        let fee = doctor.consultation_fee.as_deref().unwrap_or("-");
        let rating = doctor.average_rating.as_deref().unwrap_or("-");
        println!(
            "{:<32} {:<20} fee {:>8}  rating {}",
            doctor.name(),
            specialty,
            fee,
            rating
        );
    }
    Ok(())
}

fn parse_doctor_flags(args: &[String]) -> Result<DoctorQuery> {
    let mut query = DoctorQuery::default();
    let mut iter = args.iter();
    while let Some(flag) = iter.next() {
        match flag.as_str() {
            "--specialty" => query.specialty = Some(take_value(&mut iter, flag)?),
            "--min-fee" => {
                query.min_fee = Some(
                    take_value(&mut iter, flag)?
                        .parse()
                        .with_context(|| format!("{flag} must be a number"))?,
                )
            }
            "--max-fee" => {
                query.max_fee = Some(
                    take_value(&mut iter, flag)?
                        .parse()
                        .with_context(|| format!("{flag} must be a number"))?,
                )
            }
            "--min-experience" => {
                query.min_experience = Some(
                    take_value(&mut iter, flag)?
                        .parse()
                        .with_context(|| format!("{flag} must be a whole number"))?,
                )
            }
            "--sort" => query.sort = Some(take_value(&mut iter, flag)?),
            other => bail!("Unknown doctors flag: {other}"),
        }
    }
    Ok(query)
}

fn take_value(iter: &mut std::slice::Iter<'_, String>, flag: &str) -> Result<String> {
    iter.next()
        .map(|value| value.to_string())
        .with_context(|| format!("{flag} requires a value"))
}
