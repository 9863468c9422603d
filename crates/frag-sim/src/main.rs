use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use frag_sim::{explain, run_simulator, SimulatorConfig};
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("frag-sim")
        .version(frag_sim::VERSION)
        .about("Fragment coalescing simulator")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("simulate")
                .about("Run a synthetic search and compare coalesced against verbatim evaluation")
                .arg(
                    Arg::new("generations")
                        .long("generations")
                        .default_value("20")
                        .value_parser(value_parser!(u64))
                        .help("Number of generations to run"),
                )
                .arg(
                    Arg::new("population")
                        .long("population")
                        .default_value("50")
                        .value_parser(value_parser!(usize))
                        .help("Tests per generation"),
                )
                .arg(
                    Arg::new("survivors")
                        .long("survivors")
                        .default_value("25")
                        .value_parser(value_parser!(usize))
                        .help("Best tests kept for the next generation"),
                )
                .arg(seed_arg())
                .arg(max_len_arg())
                .arg(
                    Arg::new("capacity")
                        .long("capacity")
                        .default_value("10000")
                        .value_parser(value_parser!(usize))
                        .help("Fragment cache capacity"),
                )
                .arg(observer_merging_arg())
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print the report as JSON"),
                ),
        )
        .subcommand(
            Command::new("canonicalize")
                .about("Generate one test and show its fragments and canonical forms")
                .arg(seed_arg())
                .arg(max_len_arg())
                .arg(observer_merging_arg()),
        )
}

fn seed_arg() -> Arg {
    Arg::new("seed")
        .long("seed")
        .default_value("42")
        .value_parser(value_parser!(u64))
        .help("Random seed for reproducibility")
}

fn max_len_arg() -> Arg {
    Arg::new("max-len")
        .long("max-len")
        .default_value("16")
        .value_parser(value_parser!(usize))
        .help("Longest generated test")
}

fn observer_merging_arg() -> Arg {
    Arg::new("observer-merging")
        .long("observer-merging")
        .action(ArgAction::SetTrue)
        .help("Merge repeated read-only calls while splitting")
}

fn arg<T: Clone + Send + Sync + 'static>(args: &ArgMatches, name: &str) -> Result<T> {
    args.get_one::<T>(name)
        .cloned()
        .with_context(|| format!("missing --{name}"))
}

async fn simulate(args: &ArgMatches) -> Result<bool> {
    let config = SimulatorConfig {
        seed: arg(args, "seed")?,
        generations: arg(args, "generations")?,
        population: arg(args, "population")?,
        survivors: arg(args, "survivors")?,
        max_len: arg(args, "max-len")?,
        observer_merging: args.get_flag("observer-merging"),
        cache_capacity: arg(args, "capacity")?,
    };
    tracing::info!(
        seed = config.seed,
        generations = config.generations,
        population = config.population,
        "starting simulation"
    );

    let report = run_simulator(config).await?;
    if args.get_flag("json") {
        let json = serde_json::to_string_pretty(&report).context("serializing report")?;
        println!("{json}");
    } else {
        println!("{}", report.generate_text());
    }
    Ok(report.passed())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let matches = cli().get_matches();
    match matches.subcommand() {
        Some(("simulate", args)) => {
            let passed = simulate(args).await?;
            std::process::exit(if passed { 0 } else { 1 });
        }
        Some(("canonicalize", args)) => {
            let text = explain(
                arg(args, "seed")?,
                args.get_flag("observer-merging"),
                arg(args, "max-len")?,
            )?;
            println!("{text}");
            Ok(())
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_is_well_formed() {
        cli().debug_assert();
    }

    #[test]
    fn simulate_defaults_parse() {
        let matches = cli().get_matches_from(["frag-sim", "simulate", "--json"]);
        let (name, args) = matches.subcommand().unwrap();
        assert_eq!(name, "simulate");
        assert_eq!(arg::<u64>(args, "generations").unwrap(), 20);
        assert_eq!(arg::<usize>(args, "capacity").unwrap(), 10_000);
        assert!(args.get_flag("json"));
        assert!(!args.get_flag("observer-merging"));
    }
}
