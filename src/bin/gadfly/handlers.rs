use std::path::Path;

use gadfly::{
    application::fetch::{Mutation, UploadFile},
    application::filter::filter_meetings,
    cache::{Endpoint, Payload, SelectionField},
};
use tracing::info;

use crate::context::{CliError, Ctx};
use crate::print::print_json;

pub async fn health(ctx: &Ctx) -> Result<(), CliError> {
    let status = ctx.api.health().await?;
    print_json(&status)
}

pub async fn jurisdictions(ctx: &Ctx) -> Result<(), CliError> {
    let payload = ctx.load(Endpoint::Jurisdictions).await?;
    print_json(&*payload)
}

pub async fn meetings(
    ctx: &Ctx,
    jurisdiction: Option<&str>,
    search: Option<&str>,
) -> Result<(), CliError> {
    ctx.dashboard
        .set_selection(SelectionField::Jurisdiction, jurisdiction);
    let payload = ctx.load(Endpoint::Meetings).await?;
    let meetings = payload.meetings().unwrap_or_default();
    let filtered = filter_meetings(meetings, search.unwrap_or_default());
    print_json(&filtered)
}

pub async fn summaries(ctx: &Ctx, meeting: &str) -> Result<(), CliError> {
    ctx.dashboard.set_selection(SelectionField::Meeting, Some(meeting));
    let payload = ctx.load(Endpoint::Summaries).await?;
    print_json(&*payload)
}

pub async fn summarize(ctx: &Ctx, meeting: String, no_force: bool) -> Result<(), CliError> {
    let outcome = ctx
        .dashboard
        .mutate(Mutation::Summarize {
            meeting_id: meeting,
            force: !no_force,
        })
        .await?;
    print_json(&outcome.response)
}

pub async fn upload(ctx: &Ctx, file: &Path, jurisdiction: String) -> Result<(), CliError> {
    let upload = read_upload(file, jurisdiction).await?;
    info!(
        file = %file.display(),
        bytes = upload.contents.len(),
        jurisdiction = %upload.jurisdiction,
        "Uploading meeting document"
    );
    let outcome = ctx.dashboard.mutate(Mutation::Upload(upload)).await?;
    print_json(&outcome.response)
}

pub async fn read_upload(path: &Path, jurisdiction: String) -> Result<UploadFile, CliError> {
    let contents = tokio::fs::read(path)
        .await
        .map_err(|source| CliError::InputFile {
            path: path.display().to_string(),
            source,
        })?;
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("upload.pdf")
        .to_string();
    Ok(UploadFile {
        file_name,
        contents,
        jurisdiction,
    })
}

/// Count of items in a payload, for summaries printed by the session.
pub fn item_count(payload: Option<&Payload>) -> usize {
    payload.map_or(0, Payload::len)
}
