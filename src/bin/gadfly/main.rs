//! gadfly: command-line client for the meeting-summary API.
//! Every read goes through the dependent query cache; `session` keeps one
//! dashboard alive across many commands.
#![deny(clippy::all, clippy::pedantic)]

mod context;
mod handlers;
mod print;
mod session;

use std::process;

use gadfly::{
    config::{self, Command},
    infra::telemetry,
};
use tokio::io::BufReader;
use tracing::{Dispatch, Level, dispatcher, error};
use tracing_subscriber::fmt as tracing_fmt;

use context::{CliError, Ctx};

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &CliError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "command failed");
        return;
    }

    let subscriber = tracing_fmt()
        .with_writer(std::io::stderr)
        .with_max_level(Level::ERROR)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "command failed");
    });
}

async fn run() -> Result<(), CliError> {
    let (cli_args, settings) = config::load_with_cli()?;
    telemetry::init(&settings.logging)?;

    let ctx = Ctx::new(&settings)?;

    match cli_args.command {
        Command::Health => handlers::health(&ctx).await,
        Command::Jurisdictions => handlers::jurisdictions(&ctx).await,
        Command::Meetings {
            jurisdiction,
            search,
        } => handlers::meetings(&ctx, jurisdiction.as_deref(), search.as_deref()).await,
        Command::Summaries { meeting } => handlers::summaries(&ctx, &meeting).await,
        Command::Summarize { meeting, no_force } => {
            handlers::summarize(&ctx, meeting, no_force).await
        }
        Command::Upload { file, jurisdiction } => {
            handlers::upload(&ctx, &file, jurisdiction).await
        }
        Command::Session => {
            let input = BufReader::new(tokio::io::stdin());
            let mut output = tokio::io::stdout();
            session::run(&ctx, input, &mut output).await
        }
    }
}
