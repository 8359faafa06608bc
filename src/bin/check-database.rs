//! Probe the required tables without changing anything.

use soloflow::config::SupabaseConfig;
use soloflow::db::provision::{self, REQUIRED_TABLES};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let _log_guards = soloflow::logging::init();

    let endpoint = provision::endpoint_from_env(&SupabaseConfig::default()).await?;
    println!("Checking tables at {}", endpoint.describe());

    let outcomes = provision::check_tables(endpoint.as_ref(), REQUIRED_TABLES).await;
    let mut missing = Vec::new();
    for outcome in &outcomes {
        match &outcome.error {
            None => println!("  {:<22} ok", outcome.name),
            Some(e) => {
                println!("  {:<22} {}", outcome.name, e);
                missing.push(outcome.name.as_str());
            }
        }
    }

    if missing.is_empty() {
        println!("\nAll {} tables are accessible.", outcomes.len());
        Ok(())
    } else {
        anyhow::bail!("{} table(s) unavailable: {}", missing.len(), missing.join(", "))
    }
}
