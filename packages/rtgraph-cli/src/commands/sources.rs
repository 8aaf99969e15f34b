use crate::cli::SourcesArgs;
use crate::exit_codes;
use crate::output;
use rtgraph::{available_rates, SourceType};
use serde::Serialize;

#[derive(Serialize)]
struct SourceInfo {
    name: &'static str,
    needs_endpoint: bool,
    rates: Vec<u32>,
}

pub fn execute(args: SourcesArgs) -> i32 {
    let sources: Vec<SourceInfo> = SourceType::ALL
        .iter()
        .map(|source_type| SourceInfo {
            name: source_type.name(),
            needs_endpoint: source_type.needs_endpoint(),
            rates: available_rates(*source_type),
        })
        .collect();

    if args.json {
        return output::print_json(&sources, false);
    }

    println!("{:<12} {:<10} RATES", "SOURCE", "ENDPOINT");
    println!("{}", "-".repeat(60));
    for source in &sources {
        let rates: Vec<String> = source.rates.iter().map(|r| r.to_string()).collect();
        println!(
            "{:<12} {:<10} {}",
            source.name,
            if source.needs_endpoint { "required" } else { "none" },
            rates.join(", ")
        );
    }

    exit_codes::SUCCESS
}
