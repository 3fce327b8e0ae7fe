//! `miniluma tools`: list the registered tools.

use miniluma_config::AppConfig;
use std::sync::Arc;

pub fn run(config: &AppConfig) {
    let providers = Arc::new(miniluma_providers::build_from_config(config));
    let registry = miniluma_tools::registry_with_providers(&config.tools, providers);
    let definitions = registry.definitions();

    println!("{} tools available:", definitions.len());
    println!();
    let width = definitions.iter().map(|d| d.name.len()).max().unwrap_or(0);
    for def in definitions {
        println!("  {:<width$}  {}", def.name, def.description);
    }
}
