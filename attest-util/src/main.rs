/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use log::info;
use quote_verify::{extract_endorsements, result, verify_quote_internal};
use std::fs;

fn get_endorsements(args: &ArgMatches<'_>) -> Result<(), anyhow::Error> {
    let input = args.value_of("input").unwrap();
    let out = args.value_of("out").unwrap();
    let evidence =
        fs::read(input).with_context(|| format!("failed to read evidence from {}", input))?;
    let endorsements = extract_endorsements(&evidence)
        .with_context(|| format!("no endorsement section in {}", input))?;
    fs::write(out, &endorsements)
        .with_context(|| format!("failed to write endorsements to {}", out))?;
    info!(
        "extracted {} endorsement bytes from {} into {}",
        endorsements.len(),
        input,
        out
    );
    Ok(())
}

fn verify(args: &ArgMatches<'_>) -> Result<(), anyhow::Error> {
    let evidence_path = args.value_of("evidence").unwrap();
    let evidence = fs::read(evidence_path)
        .with_context(|| format!("failed to read evidence from {}", evidence_path))?;
    let endorsements = match args.value_of("endorsements") {
        Some(path) => {
            fs::read(path).with_context(|| format!("failed to read endorsements from {}", path))?
        }
        None => Vec::new(),
    };
    let time = match args.value_of("time") {
        Some(t) => Some(
            DateTime::parse_from_rfc3339(t)
                .with_context(|| format!("invalid RFC 3339 time: {}", t))?
                .with_timezone(&Utc),
        ),
        None => None,
    };

    let outcome = verify_quote_internal(&evidence, &endorsements, time)?;
    println!("result code: {}", outcome.result_code);
    if outcome.result_code != result::OK {
        bail!("evidence verification failed ({})", outcome.result_code);
    }
    Ok(())
}

fn main() -> Result<(), anyhow::Error> {
    env_logger::init();

    let args = App::new("attest-util")
        .about("Inspects and verifies serialized attestation evidence.")
        .setting(AppSettings::SubcommandRequired)
        .subcommand(
            SubCommand::with_name("get-endorsements")
                .about("Extract the endorsement section embedded in an evidence file")
                .arg(
                    Arg::with_name("input")
                        .short("i")
                        .long("input")
                        .value_name("FILE")
                        .required(true)
                        .help("Evidence file to read"),
                )
                .arg(
                    Arg::with_name("out")
                        .short("o")
                        .long("out")
                        .value_name("FILE")
                        .required(true)
                        .help("Where to write the extracted endorsements"),
                ),
        )
        .subcommand(
            SubCommand::with_name("verify")
                .about("Verify an evidence file against endorsements")
                .arg(
                    Arg::with_name("evidence")
                        .long("evidence")
                        .value_name("FILE")
                        .required(true)
                        .help("Evidence file to verify"),
                )
                .arg(
                    Arg::with_name("endorsements")
                        .long("endorsements")
                        .value_name("FILE")
                        .help("Endorsements to verify against (defaults to the embedded section)"),
                )
                .arg(
                    Arg::with_name("time")
                        .long("time")
                        .value_name("RFC3339")
                        .help("Validation time (defaults to now)"),
                ),
        )
        .get_matches();

    match args.subcommand() {
        ("get-endorsements", Some(sub)) => get_endorsements(sub),
        ("verify", Some(sub)) => verify(sub),
        _ => unreachable!(),
    }
}
