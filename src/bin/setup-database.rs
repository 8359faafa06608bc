//! Apply the schema statements one by one, then probe every required table.
//! Failing statements are reported and skipped.

use soloflow::config::SupabaseConfig;
use soloflow::db::provision;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let _log_guards = soloflow::logging::init();

    let endpoint = provision::endpoint_from_env(&SupabaseConfig::default()).await?;
    println!("Setting up database at {}", endpoint.describe());

    let report = provision::run_setup(endpoint.as_ref()).await;

    for step in &report.statements {
        match &step.error {
            None => println!("  ok      {}", step.name),
            Some(e) => println!("  failed  {}: {}", step.name, e),
        }
    }
    println!();
    for table in &report.tables {
        match &table.error {
            None => println!("  table {} accessible", table.name),
            Some(e) => println!("  table {} unavailable: {}", table.name, e),
        }
    }

    let missing = report.missing_tables();
    if missing.is_empty() {
        println!(
            "\nSetup finished ({} statement(s) failed).",
            report.failed_statements()
        );
        Ok(())
    } else {
        anyhow::bail!("missing tables after setup: {}", missing.join(", "))
    }
}
