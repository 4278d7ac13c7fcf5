//! `relayclaw doctor` — Diagnose configuration and provider health.

use std::path::Path;

use relayclaw_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("RelayClaw Doctor - System Diagnostics");
    println!("=====================================\n");

    let mut issues = 0;

    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("  [ok] Config file present");
    } else {
        println!("  [--] No config file at {} (defaults in effect)", config_path.display());
    }

    match AppConfig::load() {
        Ok(config) => {
            println!("  [ok] Config valid");

            if config.has_api_key() {
                println!("  [ok] Completion API key configured");
            } else {
                println!("  [!!] No completion API key - set GEMINI_API_KEY");
                issues += 1;
            }

            let providers: Vec<_> = config.enabled_providers().collect();
            if providers.is_empty() {
                println!("  [--] No tool providers configured - agent will run tool-less");
            }
            for provider in providers {
                if command_on_path(&provider.command) {
                    println!("  [ok] Provider '{}' command found: {}", provider.id, provider.command);
                } else {
                    println!(
                        "  [!!] Provider '{}' command not on PATH: {}",
                        provider.id, provider.command
                    );
                    issues += 1;
                }
                if provider.credential_env.is_some() && std::env::var("GITHUB_TOKEN").is_err() {
                    println!(
                        "  [--] Provider '{}' expects a credential; GITHUB_TOKEN is unset",
                        provider.id
                    );
                }
            }
        }
        Err(e) => {
            println!("  [!!] Config invalid: {e}");
            issues += 1;
        }
    }

    println!();
    if issues == 0 {
        println!("  All checks passed.");
    } else {
        println!("  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}

/// Whether `command` resolves to an executable, either as a path or via PATH.
fn command_on_path(command: &str) -> bool {
    let direct = Path::new(command);
    if direct.components().count() > 1 {
        return direct.is_file();
    }
    std::env::var_os("PATH")
        .map(|paths| {
            std::env::split_paths(&paths).any(|dir| {
                let candidate = dir.join(command);
                candidate.is_file() || candidate.with_extension("cmd").is_file()
            })
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_path_resolution() {
        assert!(command_on_path("/bin/sh"));
        assert!(!command_on_path("/bin/definitely-not-a-real-binary"));
    }

    #[test]
    fn bare_name_searches_path() {
        assert!(command_on_path("sh"));
        assert!(!command_on_path("definitely-not-a-real-binary"));
    }
}
