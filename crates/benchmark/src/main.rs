use std::process::exit;

use anyhow::Result;
use clap::{App, Arg, SubCommand};
use gw_fee_benchmark::generate_config_file;

const EXIT_FAILURE: i32 = 1;

fn config_path_arg<'a, 'b>() -> Arg<'a, 'b> {
    Arg::with_name("config-path")
        .takes_value(true)
        .short("p")
        .help("The path of generated config file.")
}

#[tokio::main(flavor = "multi_thread")]
pub async fn main() -> Result<()> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));
    let m = App::new("gw fee benchmark")
        .subcommand(
            SubCommand::with_name("generate").arg(
                Arg::with_name("path")
                    .takes_value(true)
                    .short("p")
                    .help("The path of generated config file. This is optional."),
            ),
        )
        .subcommand(
            SubCommand::with_name("run")
                .about("Send one transfer per account at tiered gas prices")
                .arg(config_path_arg()),
        )
        .subcommand(
            SubCommand::with_name("rounds")
                .about("Send rows of low, even and high tier transfers one after another")
                .arg(config_path_arg()),
        )
        .subcommand(
            SubCommand::with_name("probe")
                .about("Send read-only balanceOf calls")
                .arg(config_path_arg()),
        )
        .get_matches();

    if let Some(generate) = m.subcommand_matches("generate") {
        let path = generate.value_of("path");
        if let Err(err) = generate_config_file(path) {
            log::error!("generate config file failed: {}", err);
            exit(EXIT_FAILURE);
        }
    }

    if let Some(run) = m.subcommand_matches("run") {
        let path = run.value_of("config-path");
        if let Err(err) = gw_fee_benchmark::run(path).await {
            log::error!("Fee benchmark error: {:?}", err);
            exit(EXIT_FAILURE);
        }
    }

    if let Some(rounds) = m.subcommand_matches("rounds") {
        let path = rounds.value_of("config-path");
        if let Err(err) = gw_fee_benchmark::run_rounds(path).await {
            log::error!("Fee rounds error: {:?}", err);
            exit(EXIT_FAILURE);
        }
    }

    if let Some(probe) = m.subcommand_matches("probe") {
        let path = probe.value_of("config-path");
        if let Err(err) = gw_fee_benchmark::probe(path).await {
            log::error!("Call probe error: {:?}", err);
            exit(EXIT_FAILURE);
        }
    }

    Ok(())
}
