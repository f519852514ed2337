use clap::Parser;
use std::process;

mod cli;
mod logging;

use cli::Cli;
use colony::{
    Result, Runner,
    task::{WithInterrupt, config::Settings, load_tasks},
};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    logging::init(args.verbose);

    match run_colony(args).await {
        Ok(()) => Ok(()),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

async fn run_colony(args: Cli) -> Result<()> {
    let config = load_tasks(&args.file)?;

    let settings = Settings {
        default_timeout: args.timeout.clone().or(config.default_timeout.clone()),
        output: args.output.or(config.output).unwrap_or_default(),
    };

    let mut runner = if args.no_interrupt {
        Runner::new()
    } else {
        Runner::new().with_resolver(WithInterrupt::new())
    };

    for spec in &config.tasks {
        let deps: Vec<&str> = spec.dependencies.iter().map(String::as_str).collect();
        runner.register(&spec.id, spec.unit(&settings)?, &deps);
    }

    let targets = if !args.targets.is_empty() {
        args.targets.clone()
    } else if let Some(default) = &config.default_task {
        vec![default.clone()]
    } else {
        runner.graph().names()
    };
    let targets: Vec<&str> = targets.iter().map(String::as_str).collect();

    if args.dry_run {
        let order = runner.resolve(&targets)?;
        println!("Dry run mode - execution order:");
        for name in &order {
            if let Some(spec) = config.tasks.iter().find(|t| &t.id == name) {
                println!("  {} would {}", spec.id, spec.describe());
            }
        }
        return Ok(());
    }

    runner.start(&targets).await
}
