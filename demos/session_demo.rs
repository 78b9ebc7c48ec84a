//! Session walkthrough against a running backend
//!
//! Usage:
//!   RBAC_USERNAME=alice RBAC_PASSWORD=secret cargo run --example session_demo

use rbac_rs_client::{ClientConfig, FileStorage, SessionClient, SessionEvent};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Configuration
    let config = ClientConfig::from_env();
    let username = std::env::var("RBAC_USERNAME").unwrap_or_else(|_| "admin".to_string());
    let password = std::env::var("RBAC_PASSWORD").unwrap_or_else(|_| "admin".to_string());
    let session_file = std::env::var("RBAC_SESSION_FILE")
        .unwrap_or_else(|_| ".rbac-session.json".to_string());

    println!("=== RBAC Session Demo ===");
    println!("API: {}", config.base_url);
    println!("Session file: {}", session_file);
    println!();

    let client = SessionClient::new(config, FileStorage::open(&session_file)?)?;

    let mut events = client.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let SessionEvent::LoggedOut { reason } = event {
                println!("! Session ended ({:?}), back to the login screen", reason);
            }
        }
    });

    if client.is_authenticated() {
        println!("✓ Restored session for role {:?}", client.current_role());
    } else {
        println!("Logging in as {}...", username);
        let profile = client.login(&username, &password).await?;
        println!("✓ Logged in as {}", profile.display_name());
        if let Some(role) = profile.role {
            println!("  Landing route: {}", role.landing_route());
        }
    }
    println!();

    println!("Visible navigation:");
    for link in client.visible_links() {
        println!("  - {} ({})", link.label, link.to);
    }
    println!();

    for route in ["/Admin-Dashboard", "/Manager-Dashboard", "/my-tasks"] {
        println!("{:<20} -> {:?}", route, client.guard_route(route));
    }
    println!();

    // Expired access tokens are refreshed behind this call
    match client.api().get("/tasks/auth/active-users/").await {
        Ok(response) => println!("Active users request: {}", response.status),
        Err(e) => println!("! Active users request failed: {}", e),
    }

    Ok(())
}
