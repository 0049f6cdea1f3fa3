//! Development token issuer for Hostgate
//!
//! Signs a management API bearer token for an owner ID with `JWT_SECRET`,
//! so tenants and domains can be managed without an identity provider.
//!
//! Usage:
//!   cargo run --bin issue-token
//!   cargo run --bin issue-token 6f1c2a9e-0d1b-4a59-9d6e-2f3c8e7b5a10
//!
//! With no argument a fresh owner ID is generated.

use hostgate_api::auth::JwtManager;
use std::env;
use uuid::Uuid;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let secret = env::var("JWT_SECRET").map_err(|_| "JWT_SECRET must be set")?;
    if secret.len() < 32 {
        eprintln!("Error: JWT_SECRET must be at least 32 characters");
        std::process::exit(1);
    }

    let expiry_hours = env::var("JWT_EXPIRY_HOURS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(168);

    let owner_id = match env::args().nth(1) {
        Some(arg) => Uuid::parse_str(arg.trim()).map_err(|e| format!("Invalid owner ID: {}", e))?,
        None => Uuid::new_v4(),
    };

    let token = JwtManager::new(&secret, expiry_hours).generate_token(owner_id)?;

    println!("\n===========================================");
    println!("Owner ID: {}", owner_id);
    println!("Expires in: {} hours", expiry_hours);
    println!("===========================================");
    println!("{}", token);
    println!("===========================================\n");

    println!("Usage:");
    println!("curl -H 'Authorization: Bearer {}' http://localhost:3000/api/v1/tenants", token);

    Ok(())
}
