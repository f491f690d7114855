//! A command-line voter: fetches the ballot from an intermediary, authenticates
//! at the advertised auth server, and casts one encrypted, signed ballot.

use std::io::{self, BufRead, Write};

use clap::{Arg, ArgAction, ArgMatches, Command};
use reqwest::Client;
use thiserror::Error;

use anonvote_backend::model::{
    api::{AuthResponse, InitResponse, MessageResponse},
    ballot::{present_options, BallotOption},
    client::Voter,
    crypto::CryptoError,
};

const PROGRAM_NAME: &str = "voter-cli";

const ABOUT_TEXT: &str = "Cast an anonymous ballot.

EXIT CODES:
     0: Ballot accepted.
     1: Ballot rejected, or an error occurred.";

const INTERMEDIARY: &str = "INTERMEDIARY";
const EID: &str = "EID";
const CHOICE: &str = "CHOICE";
const BLANK: &str = "BLANK";

/// Construct the CLI configuration.
fn cli() -> Command {
    // Make the build dirty when the toml changes.
    include_str!("../Cargo.toml");

    clap::command!(PROGRAM_NAME)
        .about(ABOUT_TEXT)
        .arg(
            Arg::new(INTERMEDIARY)
                .long("intermediary")
                .help("Base URL of the intermediary server")
                .default_value("http://127.0.0.1:8000")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new(EID)
                .long("eid")
                .help("Your electronic identity, e.g. BE-63963937392")
                .default_value("BE-63963937392")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new(CHOICE)
                .long("choice")
                .help("Number of the option to vote for; prompts if omitted")
                .value_parser(clap::value_parser!(usize))
                .conflicts_with(BLANK)
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new(BLANK)
                .long("blank")
                .help("Cast a blank ballot without prompting")
                .action(ArgAction::SetTrue),
        )
}

/// Errors that this program may produce.
#[derive(Debug, Error)]
enum Error {
    #[error("could not reach server: {0}")]
    Http(#[from] reqwest::Error),
    #[error("authentication refused: {0}")]
    Refused(String),
    #[error("could not build ballot: {0}")]
    Crypto(#[from] CryptoError),
    #[error("{0}")]
    Input(String),
    #[error("ballot rejected: {0}")]
    Rejected(String),
}

/// How the voter's selection was given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Selection {
    Prompt,
    Blank,
    Option(usize),
}

impl Selection {
    fn from_args(args: &ArgMatches) -> Self {
        if args.get_flag(BLANK) {
            Self::Blank
        } else if let Some(choice) = args.get_one::<usize>(CHOICE) {
            Self::Option(*choice)
        } else {
            Self::Prompt
        }
    }
}

/// Interpret a 1-based option number; empty input is a blank vote.
fn parse_choice(input: &str, count: usize) -> Result<Option<usize>, String> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(None);
    }
    let number = input
        .parse::<usize>()
        .map_err(|_| "could not cast the input to a number".to_string())?;
    if number == 0 || number > count {
        return Err(format!("choose a number between 1 and {count}"));
    }
    Ok(Some(number - 1))
}

fn print_options(options: &[BallotOption]) {
    println!("{:^5} {:^25} Party", "Nr", "Name");
    for (i, option) in options.iter().enumerate() {
        println!("{:>5}. {:<25} {}", i + 1, option.name, option.party);
    }
    println!("\ncast your vote (leave empty to vote blank, press enter to confirm)");
}

fn prompt(options: &[BallotOption]) -> Result<Option<BallotOption>, Error> {
    print_options(options);
    let stdin = io::stdin();
    loop {
        print!("Number: ");
        io::stdout()
            .flush()
            .map_err(|e| Error::Input(e.to_string()))?;
        let mut line = String::new();
        if stdin
            .lock()
            .read_line(&mut line)
            .map_err(|e| Error::Input(e.to_string()))?
            == 0
        {
            return Err(Error::Input("no selection made".to_string()));
        }
        match parse_choice(&line, options.len()) {
            Ok(choice) => return Ok(choice.map(|i| options[i].clone())),
            Err(msg) => println!("[ERROR]: {msg}"),
        }
    }
}

async fn run(args: &ArgMatches) -> Result<String, Error> {
    let http = Client::new();
    let intermediary = args
        .get_one::<String>(INTERMEDIARY)
        .map(|url| url.trim_end_matches('/').to_string())
        .unwrap_or_default();
    let eid = args.get_one::<String>(EID).cloned().unwrap_or_default();

    let init: InitResponse = http
        .get(format!("{intermediary}/init"))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    let voter = Voter::generate();
    let auth: AuthResponse = http
        .post(format!("{}/login", init.auth_server.url()))
        .json(&voter.identity(eid))
        .send()
        .await?
        .json()
        .await?;
    let token = auth.voter_token.ok_or(Error::Refused(auth.message))?;

    let options = present_options(&init.parties);
    let selection = match Selection::from_args(args) {
        Selection::Blank => None,
        Selection::Option(number) => parse_choice(&number.to_string(), options.len())
            .map_err(Error::Input)?
            .map(|i| options[i].clone()),
        Selection::Prompt => prompt(&options)?,
    };

    let submission = voter.cast(token, selection, &init.backend_key)?;
    let response = http
        .post(format!("{intermediary}/vote"))
        .json(&submission)
        .send()
        .await?;
    let success = response.status().is_success();
    let body: MessageResponse = response.json().await?;
    if success {
        Ok(body.message)
    } else {
        Err(Error::Rejected(body.message))
    }
}

fn main() {
    let args = cli().get_matches();
    let runtime = match rocket::tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("[ERROR]: {e}");
            std::process::exit(1)
        }
    };
    match runtime.block_on(run(&args)) {
        Ok(message) => println!("{message}"),
        Err(e) => {
            eprintln!("[ERROR]: {e}");
            std::process::exit(1)
        }
    }
}
