use storefront_core::config::LoadOptions;
use storefront_db::{DemoCatalog, SeedResult};

use crate::commands::{open_migrated, prepare, CommandResult, Failure};

pub fn run(options: &LoadOptions) -> CommandResult {
    let (config, runtime) = match prepare("seed", options) {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = open_migrated(&config).await?;

        let seed_result = DemoCatalog::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

        let verification = DemoCatalog::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

        pool.close().await;
        if !verification.all_present {
            return Err(("seed_verification", missing_message(&verification.missing), 6u8));
        }
        Ok::<SeedResult, Failure>(seed_result)
    });

    match result {
        Ok(seed_result) => CommandResult::success("seed", summary(&seed_result)),
        Err(failure) => CommandResult::from_failure("seed", failure),
    }
}

fn summary(result: &SeedResult) -> String {
    let mut lines = vec![format!(
        "demo catalog ready: {} inserted, {} already present",
        result.inserted.len(),
        result.skipped.len()
    )];
    lines.extend(result.inserted.iter().map(|name| format!("  + {name}")));
    lines.join("\n")
}

fn missing_message(missing: &[String]) -> String {
    if missing.is_empty() {
        "Some seed data failed to load".to_string()
    } else {
        format!("Seed verification failed for products: {}", missing.join(", "))
    }
}
