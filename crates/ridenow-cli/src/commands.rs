use std::future::Future;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tracing::warn;

use ridenow_core::models::user::display_name;
use ridenow_core::models::{BookingRequest, DocumentKind, ProfileUpdate, SearchQuery, Vehicle};
use ridenow_core::utils::format::format_window;
use ridenow_core::utils::{format_date, format_price, truncate_string};
use ridenow_core::{validation, ApiClient, ApiError, Config, KeyringStore, RequestSlot, SessionStore};

use crate::args::Args;

/// Column width for vehicle models in listings
const MODEL_WIDTH: usize = 24;

pub async fn run(command: &str, args: Args) -> Result<()> {
    if command == "config" {
        return config(args);
    }

    let app = App::connect().await?;
    match command {
        "login" => login(&app, args).await,
        "logout" => logout(&app).await,
        "register" => register(&app, args).await,
        "verify-otp" => verify_otp(&app, args).await,
        "whoami" => whoami(&app).await,
        "profile" => profile(&app, args).await,
        "documents" => documents(&app, args).await,
        "search" => search(&app, args).await,
        "vehicle" => vehicle(&app, args).await,
        "price" => price(&app, args).await,
        "book" => book(&app, args).await,
        "bookings" => bookings(&app).await,
        "end-booking" => end_booking(&app, args).await,
        other => bail!("Unknown command '{}'. Run `ridenow help` for usage.", other),
    }
}

/// Session and client for one command run
struct App {
    session: Arc<SessionStore>,
    listener: JoinHandle<()>,
}

impl App {
    async fn connect() -> Result<Self> {
        let config = Config::load()?;
        let credentials = Arc::new(KeyringStore::new(config.keyring_service.clone()));
        let client = ApiClient::from_config(&config, credentials)
            .context("Failed to create API client")?;
        let session = Arc::new(SessionStore::new(client));
        session.load_from_storage().await;
        let listener = session.spawn_auth_listener();
        Ok(Self { session, listener })
    }

    fn require_login(&self) -> Result<()> {
        if self.session.is_authenticated() {
            Ok(())
        } else {
            bail!("Not logged in. Run `ridenow login` first.")
        }
    }

    /// Wrap an endpoint call in a request slot bound to this client
    fn slot<P, T, F, Fut>(&self, op: F) -> RequestSlot<P, T>
    where
        T: Clone,
        F: Fn(ApiClient, P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        let client = self.session.client().clone();
        RequestSlot::new(move |params| op(client.clone(), params))
    }

    /// Trigger a slot and turn a failure into its display message
    async fn run<P, T: Clone>(&self, slot: &RequestSlot<P, T>, params: P) -> Result<T> {
        match slot.trigger(params).await {
            Ok(data) => Ok(data),
            Err(e) => {
                let message = slot.state().error.unwrap_or_else(|| e.user_message());
                if e.is_session_expired() {
                    // The listener does this too, but may not get to run before exit
                    if let Err(e) = self.session.logout().await {
                        warn!(error = %e, "Failed to clear expired session");
                    }
                    bail!("{} Please log in again with `ridenow login`.", message);
                }
                Err(anyhow!(message))
            }
        }
    }
}

impl Drop for App {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line).context("Failed to read input")?;
    Ok(line.trim().to_string())
}

// ===== Account =====

async fn login(app: &App, mut args: Args) -> Result<()> {
    let email = match args.next_positional() {
        Some(email) => email,
        None => prompt("Email: ")?,
    };
    let password = rpassword::prompt_password("Password: ")?;

    let slot = app.slot(|client, (email, password): (String, String)| async move {
        client.login(&email, &password).await
    });
    let payload = app.run(&slot, (email, password)).await?;
    let name = display_name(&payload.user).unwrap_or("rider").to_string();

    if let Err(e) = app.session.login(payload).await {
        eprintln!("Logged in, but the session could not be saved: {}", e);
    }
    println!("Logged in as {}", name);
    Ok(())
}

async fn logout(app: &App) -> Result<()> {
    app.session.logout().await.context("Failed to clear stored credentials")?;
    println!("Logged out");
    Ok(())
}

async fn register(app: &App, mut args: Args) -> Result<()> {
    let email = args.required("email")?;
    let password = rpassword::prompt_password("Choose a password: ")?;
    let confirm = rpassword::prompt_password("Confirm password: ")?;
    if password != confirm {
        bail!("Passwords do not match.");
    }

    let slot = app.slot(|client, (email, password): (String, String)| async move {
        client.register(&email, &password).await
    });
    let env = app.run(&slot, (email.clone(), password)).await?;
    println!("{}", env.message_or("Account created."));
    println!("Confirm it with: ridenow verify-otp {} <otp>", email);
    Ok(())
}

async fn verify_otp(app: &App, mut args: Args) -> Result<()> {
    let email = args.required("email")?;
    let otp = args.required("otp")?;

    let slot = app.slot(|client, (email, otp): (String, String)| async move {
        client.verify_otp(&email, &otp).await
    });
    let env = app.run(&slot, (email, otp)).await?;
    println!("{}", env.message_or("Email verified. You can now log in."));
    Ok(())
}

/// Fetch the current user and keep the session's copy in step
async fn refresh_user(app: &App) -> Result<Value> {
    let slot = app.slot(|client, ()| async move { client.current_user().await });
    let user = app.run(&slot, ()).await?;
    if let Err(e) = app.session.update_user(user.clone()).await {
        warn!(error = %e, "Failed to store refreshed user record");
    }
    Ok(user)
}

fn print_user(user: &Value) {
    println!("{}", display_name(user).unwrap_or("(no name)"));
    for (label, key) in [("Email", "email"), ("Phone", "phone"), ("Date of birth", "dob")] {
        if let Some(value) = user.get(key).and_then(Value::as_str) {
            println!("  {:<14} {}", label, value);
        }
    }
    if user.get("isBookedVehicle").and_then(Value::as_bool) == Some(true) {
        println!("  Currently renting a vehicle");
    }
    for kind in [DocumentKind::Aadhar, DocumentKind::DrivingLicence] {
        println!("  {:<14} {}", kind.label(), kind.status_in(user));
    }
}

async fn whoami(app: &App) -> Result<()> {
    app.require_login()?;
    let user = refresh_user(app).await?;
    print_user(&user);
    Ok(())
}

async fn profile(app: &App, args: Args) -> Result<()> {
    app.require_login()?;

    let dob = match args.flag("dob")? {
        Some(raw) => Some(
            NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
                .with_context(|| format!("Invalid date of birth '{}', use YYYY-MM-DD", raw))?,
        ),
        None => None,
    };
    let update = ProfileUpdate {
        name: args.flag("name")?,
        phone: args.flag("phone")?,
        dob,
    };
    let photo = args.flag("photo")?.map(PathBuf::from);

    if update.is_empty() && photo.is_none() {
        let user = refresh_user(app).await?;
        print_user(&user);
        return Ok(());
    }

    if !update.is_empty() {
        let slot = app.slot(|client, update: ProfileUpdate| async move {
            client.update_profile(&update).await
        });
        let updated = app.run(&slot, update).await?;
        app.session.merge_user(&updated).await?;
        println!("Profile updated");
    }

    if let Some(path) = photo {
        let slot = app.slot(|client, path: PathBuf| async move {
            client.upload_profile_photo(&path).await
        });
        let env = app.run(&slot, path).await?;
        match env.data.as_ref().and_then(|d| d.get("photo")).cloned() {
            Some(url) => {
                app.session.merge_user(&json!({ "profile": { "photo": url } })).await?;
                println!("{}", env.message_or("Profile photo updated"));
            }
            None => println!("{}", env.message_or("Photo uploaded")),
        }
    }
    Ok(())
}

fn parse_kind(raw: &str) -> Result<DocumentKind> {
    match raw.to_ascii_lowercase().as_str() {
        "aadhar" | "aadhaar" => Ok(DocumentKind::Aadhar),
        "dl" | "licence" | "license" => Ok(DocumentKind::DrivingLicence),
        other => bail!("Unknown document '{}'. Use aadhar or dl.", other),
    }
}

async fn documents(app: &App, mut args: Args) -> Result<()> {
    app.require_login()?;
    match args.next_positional().as_deref() {
        None => {
            let user = refresh_user(app).await?;
            for kind in [DocumentKind::Aadhar, DocumentKind::DrivingLicence] {
                println!("{:<16} {}", kind.label(), kind.status_in(&user));
            }
        }
        Some("files") => {
            let slot = app.slot(|client, ()| async move { client.documents().await });
            let docs = app.run(&slot, ()).await?;
            println!("{}", serde_json::to_string_pretty(&docs)?);
        }
        Some("upload") => {
            let kind = parse_kind(&args.required("aadhar|dl")?)?;
            let path = PathBuf::from(args.required("pdf")?);
            let slot = app.slot(|client, (kind, path): (DocumentKind, PathBuf)| async move {
                client.verify_document(kind, &path).await
            });
            let env = app.run(&slot, (kind, path)).await?;
            println!("{}", env.message_or("Document submitted for verification"));
            // Pick up the new verification status
            refresh_user(app).await?;
        }
        Some(other) => bail!("Unknown documents action '{}'", other),
    }
    Ok(())
}

// ===== Rentals =====

fn vehicle_line(vehicle: &Vehicle) -> String {
    format!(
        "{:<26} {:<width$} {:<16} host: {}",
        vehicle.id,
        truncate_string(vehicle.model_display(), MODEL_WIDTH),
        truncate_string(vehicle.location.as_deref().unwrap_or("-"), 16),
        vehicle.host_name(),
        width = MODEL_WIDTH,
    )
}

async fn search(app: &App, mut args: Args) -> Result<()> {
    let query = SearchQuery::new(
        &args.required("city")?,
        &args.required("pickup")?,
        &args.required("drop")?,
    )?;

    let slot = app.slot(|client, query: SearchQuery| async move {
        client.search_vehicles(&query).await
    });
    let vehicles = app.run(&slot, query.clone()).await?;
    if vehicles.is_empty() {
        println!("No vehicles available in {} for that window", query.city);
        return Ok(());
    }
    println!(
        "{} vehicle(s) in {}, {} to {}",
        vehicles.len(),
        query.city,
        format_window(&query.pickup),
        format_window(&query.drop)
    );
    for vehicle in &vehicles {
        println!("{}", vehicle_line(vehicle));
    }
    Ok(())
}

async fn vehicle(app: &App, mut args: Args) -> Result<()> {
    let id = args.required("id")?;
    let slot = app.slot(|client, id: String| async move { client.vehicle_details(&id).await });
    let vehicle = app.run(&slot, id).await?;

    println!("{}", vehicle.model_display());
    println!("  Id        {}", vehicle.id);
    println!("  Location  {}", vehicle.location.as_deref().unwrap_or("-"));
    println!("  Host      {}", vehicle.host_name());
    if let Some(photo) = vehicle.cover_photo() {
        println!("  Photo     {}", photo);
    }
    Ok(())
}

async fn price(app: &App, mut args: Args) -> Result<()> {
    let id = args.required("id")?;
    let pickup = validation::parse_datetime(&args.required("pickup")?)?;
    let drop = validation::parse_datetime(&args.required("drop")?)?;

    let slot = app.slot(|client, (id, pickup, drop): (String, NaiveDateTime, NaiveDateTime)| async move {
        client.vehicle_pricing(&id, &pickup, &drop).await
    });
    let pricing = app.run(&slot, (id, pickup, drop)).await?;
    println!("{}", pricing.vehicle_details.model_display());
    println!("  {} to {}", format_window(&pickup), format_window(&drop));
    println!("  Estimated total: {}", format_price(pricing.total_estimate()));
    Ok(())
}

async fn book(app: &App, mut args: Args) -> Result<()> {
    app.require_login()?;
    let id = args.required("id")?;
    let pickup = validation::parse_datetime(&args.required("pickup")?)?;
    let drop = validation::parse_datetime(&args.required("drop")?)?;

    let quote = app.slot(|client, (id, pickup, drop): (String, NaiveDateTime, NaiveDateTime)| async move {
        client.vehicle_pricing(&id, &pickup, &drop).await
    });
    let pricing = app.run(&quote, (id.clone(), pickup, drop)).await?;
    let request = BookingRequest::new(&id, pickup, drop, pricing.total_estimate())?;

    let slot = app.slot(|client, request: BookingRequest| async move {
        client.book_vehicle(&request).await
    });
    let env = app.run(&slot, request).await?;
    println!("{}", env.message_or("Booking confirmed"));
    println!(
        "  {} for {}",
        pricing.vehicle_details.model_display(),
        format_price(pricing.total_estimate())
    );
    Ok(())
}

async fn bookings(app: &App) -> Result<()> {
    app.require_login()?;
    let slot = app.slot(|client, ()| async move { client.my_bookings().await });
    let bookings = app.run(&slot, ()).await?;
    if bookings.is_empty() {
        println!("No bookings yet");
        return Ok(());
    }
    for booking in &bookings {
        println!(
            "{:<26} {:<width$} {} - {}  {:<10} {}",
            booking.vehicle_id,
            truncate_string(booking.scooty_model.as_deref().unwrap_or("Unknown model"), MODEL_WIDTH),
            booking.start_date.as_deref().map(format_date).unwrap_or_default(),
            booking.end_date.as_deref().map(format_date).unwrap_or_default(),
            booking.booking_status.as_deref().unwrap_or("unknown"),
            format_price(booking.total_price),
            width = MODEL_WIDTH,
        );
    }
    Ok(())
}

async fn end_booking(app: &App, mut args: Args) -> Result<()> {
    app.require_login()?;
    let id = args.required("id")?;
    let slot = app.slot(|client, id: String| async move { client.end_booking(&id).await });
    let env = app.run(&slot, id).await?;
    println!("{}", env.message_or("Booking ended"));
    // The server clears the user's active-rental flag
    if let Err(e) = refresh_user(app).await {
        warn!(error = %e, "Failed to refresh user after ending booking");
    }
    Ok(())
}

// ===== Settings =====

fn config(args: Args) -> Result<()> {
    let mut config = Config::load()?;
    let api_url = args.flag("api-url")?;
    let timeout = args.flag("timeout")?;
    if api_url.is_none() && timeout.is_none() {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    if let Some(url) = api_url {
        config.api_url = url;
    }
    if let Some(raw) = timeout {
        config.timeout_secs = raw
            .parse::<u64>()
            .ok()
            .filter(|secs| *secs > 0)
            .with_context(|| format!("Invalid timeout '{}'", raw))?;
    }
    config.save()?;
    println!("Configuration saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kind() {
        assert_eq!(parse_kind("Aadhaar").expect("kind"), DocumentKind::Aadhar);
        assert_eq!(parse_kind("dl").expect("kind"), DocumentKind::DrivingLicence);
        assert!(parse_kind("passport").is_err());
    }

    #[test]
    fn test_vehicle_line_truncates_model() {
        let vehicle: Vehicle = serde_json::from_value(json!({
            "_id": "veh_01",
            "scootyModel": "Ather 450X Gen 3 Pro Pack Long Range",
            "location": "Koregaon Park",
            "host": {"name": "Ravi"}
        }))
        .expect("vehicle");
        let line = vehicle_line(&vehicle);
        assert!(line.starts_with("veh_01"));
        assert!(line.contains("..."));
        assert!(line.ends_with("host: Ravi"));
    }
}
