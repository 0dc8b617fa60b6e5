//! Line-driven dashboard session.
//!
//! Reads one command per line and answers each with a single JSON line, so
//! the session can be scripted or piped into other tools. Selection, search
//! and cached data persist for the lifetime of the session.

use std::path::PathBuf;

use gadfly::{
    application::{dashboard::Dashboard, fetch::Mutation},
    cache::{Endpoint, MutationOutcome, SelectionField},
};
use serde_json::{Map, Value, json};
use time::format_description::well_known::Rfc3339;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::context::{CliError, Ctx};
use crate::handlers::{item_count, read_upload};
use crate::print::{json_line, snapshot_view};

const HELP: [&str; 12] = [
    "jurisdictions                 list jurisdictions",
    "jurisdiction [NAME]           select a jurisdiction (blank clears)",
    "meetings                      list meetings of the selected jurisdiction",
    "meeting [ID]                  select a meeting (blank clears)",
    "summaries                     list summaries of the selected meeting",
    "search [TEXT]                 filter meetings by title",
    "summarize                     regenerate summaries of the selected meeting",
    "upload PATH [JURISDICTION]    upload a meeting document",
    "refresh                       resolve active queries, retrying failed ones",
    "state                         show selection and cache status",
    "help                          show this list",
    "quit                          end the session",
];

#[derive(Debug, Clone, PartialEq, Eq)]
enum SessionCommand {
    Help,
    State,
    List(Endpoint),
    Select(SelectionField, Option<String>),
    Search(String),
    Summarize,
    Upload {
        path: PathBuf,
        jurisdiction: Option<String>,
    },
    Refresh,
    Quit,
}

fn parse(line: &str) -> Result<SessionCommand, String> {
    let line = line.trim();
    let (word, rest) = line
        .split_once(char::is_whitespace)
        .map_or((line, ""), |(word, rest)| (word, rest.trim()));
    let argument = (!rest.is_empty()).then(|| rest.to_string());

    let command = match word {
        "help" => SessionCommand::Help,
        "state" => SessionCommand::State,
        "jurisdictions" => SessionCommand::List(Endpoint::Jurisdictions),
        "meetings" => SessionCommand::List(Endpoint::Meetings),
        "summaries" => SessionCommand::List(Endpoint::Summaries),
        "jurisdiction" => SessionCommand::Select(SelectionField::Jurisdiction, argument),
        "meeting" => SessionCommand::Select(SelectionField::Meeting, argument),
        "search" => SessionCommand::Search(rest.to_string()),
        "summarize" => SessionCommand::Summarize,
        "upload" => {
            let Some(argument) = argument else {
                return Err("usage: upload PATH [JURISDICTION]".to_string());
            };
            let (path, jurisdiction) = argument
                .split_once(char::is_whitespace)
                .map_or((argument.as_str(), None), |(path, jurisdiction)| {
                    (path, Some(jurisdiction.trim().to_string()))
                });
            SessionCommand::Upload {
                path: PathBuf::from(path),
                jurisdiction,
            }
        }
        "refresh" => SessionCommand::Refresh,
        "quit" | "exit" => SessionCommand::Quit,
        other => return Err(format!("unknown command `{other}`; try `help`")),
    };
    Ok(command)
}

/// Run the session until `quit` or end of input.
pub async fn run<R, W>(ctx: &Ctx, input: R, output: &mut W) -> Result<(), CliError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let reply = match parse(trimmed) {
            Ok(SessionCommand::Quit) => break,
            Ok(command) => {
                debug!(command = ?command, "Session command");
                execute(ctx, command)
                    .await
                    .unwrap_or_else(|err| json!({ "error": err.to_string() }))
            }
            Err(message) => json!({ "error": message }),
        };

        output.write_all(json_line(&reply)?.as_bytes()).await?;
        output.flush().await?;
    }
    Ok(())
}

async fn execute(ctx: &Ctx, command: SessionCommand) -> Result<Value, CliError> {
    let dashboard = &ctx.dashboard;
    let reply = match command {
        SessionCommand::Help => json!({ "help": HELP }),
        SessionCommand::State => state_view(dashboard),
        SessionCommand::List(endpoint) => list_view(dashboard, endpoint).await,
        SessionCommand::Select(field, value) => {
            dashboard.set_selection(field, value.as_deref());
            state_view(dashboard)
        }
        SessionCommand::Search(query) => {
            dashboard.set_search(&query);
            json!({
                "search": query.trim(),
                "items": dashboard.filtered_meetings(),
            })
        }
        SessionCommand::Summarize => mutation_view(&dashboard.summarize_selected().await?),
        SessionCommand::Upload { path, jurisdiction } => {
            let file = read_upload(&path, jurisdiction.unwrap_or_default()).await?;
            mutation_view(&dashboard.mutate(Mutation::Upload(file)).await?)
        }
        SessionCommand::Refresh => {
            let refreshed: Vec<Value> = dashboard
                .refresh()
                .into_iter()
                .map(|(endpoint, snapshot)| {
                    json!({ "endpoint": endpoint, "status": snapshot.status })
                })
                .collect();
            json!({ "refreshed": refreshed })
        }
        SessionCommand::Quit => json!({}),
    };
    Ok(reply)
}

async fn list_view(dashboard: &Dashboard, endpoint: Endpoint) -> Value {
    let key = dashboard.key(endpoint);
    let snapshot = dashboard.settled(endpoint).await;
    let mut view = snapshot_view(endpoint, &key, &snapshot);
    view["count"] = json!(item_count(snapshot.payload()));

    if endpoint == Endpoint::Meetings {
        let filtered = dashboard.filtered_meetings();
        view["search"] = json!(dashboard.view().search);
        view["count"] = json!(filtered.len());
        view["items"] = json!(filtered);
    }
    view
}

fn state_view(dashboard: &Dashboard) -> Value {
    let view = dashboard.view();
    let entries: Map<String, Value> = view
        .keys
        .iter()
        .map(|(endpoint, key)| {
            let snapshot = dashboard.cache().peek(key);
            (
                endpoint.as_str().to_string(),
                json!({
                    "key": key.to_string(),
                    "status": snapshot.status,
                    "version": snapshot.version,
                }),
            )
        })
        .collect();

    json!({
        "selection": view.selection,
        "search": view.search,
        "queries": entries,
    })
}

fn mutation_view(outcome: &MutationOutcome) -> Value {
    json!({
        "mutation": outcome.event.mutation,
        "event_id": outcome.event.id,
        "epoch": outcome.event.epoch,
        "timestamp": outcome.event.timestamp.format(&Rfc3339).ok(),
        "invalidates": outcome.event.set.to_string(),
        "invalidated": outcome.invalidated,
        "response": outcome.response,
    })
}
