//! `harbor doctor` — Diagnose system health.

use std::path::Path;

use super::bootstrap;

pub async fn run(config_path: Option<&Path>) -> anyhow::Result<()> {
    println!("🩺 Harbor Doctor — System Diagnostics");
    println!("=====================================\n");

    let mut issues = 0;

    let config = match bootstrap::load_config(config_path) {
        Ok(config) => {
            println!("  ✅ Config valid");
            config
        }
        Err(e) => {
            println!("  ❌ Config invalid: {e:#}");
            println!("\n  Run `harbor init` to create a default config.");
            return Ok(());
        }
    };

    if config.has_api_key() {
        println!("  ✅ API key configured");
    } else {
        println!("  ⚠️  No API key — set GEMINI_API_KEY or api_key in config.toml");
        issues += 1;
    }

    let router = harbor_providers::build_from_config(&config);
    match router.default() {
        Some(provider) => match provider.health_check().await {
            Ok(true) => println!("  ✅ Model provider '{}' reachable", config.default_provider),
            Ok(false) => {
                println!("  ⚠️  Model provider '{}' unhealthy", config.default_provider);
                issues += 1;
            }
            Err(e) => {
                println!("  ❌ Model provider '{}': {e}", config.default_provider);
                issues += 1;
            }
        },
        None => {
            println!("  ❌ Provider '{}' is not configured", config.default_provider);
            issues += 1;
        }
    }

    match bootstrap::build_store(&config, &router).await {
        Ok(store) => match store.health_check().await {
            Ok(true) => println!("  ✅ Document store '{}' reachable", store.name()),
            Ok(false) => {
                println!("  ⚠️  Document store '{}' unhealthy", store.name());
                issues += 1;
            }
            Err(e) => {
                println!("  ❌ Document store '{}': {e}", store.name());
                issues += 1;
            }
        },
        Err(e) => {
            println!("  ❌ Document store: {e:#}");
            issues += 1;
        }
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
