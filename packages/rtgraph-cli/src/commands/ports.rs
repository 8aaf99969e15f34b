use crate::cli::PortsArgs;
use crate::exit_codes;
use crate::output;
use rtgraph::{available_endpoints, SourceType};

pub fn execute(args: PortsArgs) -> i32 {
    let source_type = SourceType::from(args.source);
    let endpoints = available_endpoints(source_type);

    if args.json {
        return output::print_json(&endpoints, false);
    }

    if endpoints.is_empty() {
        if source_type.needs_endpoint() {
            println!("No {} ports found", source_type);
        } else {
            println!("The {} source takes no endpoint", source_type);
        }
    } else {
        for endpoint in &endpoints {
            println!("{}", endpoint);
        }
    }

    exit_codes::SUCCESS
}
