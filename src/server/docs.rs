use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use log::info;
use serde::Deserialize;
use serde_json::Value;

use super::{generate_text, generated, require, SharedState};
use crate::errors::ApiResult;
use crate::llm::GenerationOptions;
use crate::prompts;

fn default_timeline_weeks() -> u32 {
    4
}

fn default_team_size() -> u32 {
    3
}

fn default_duration_minutes() -> u32 {
    15
}

fn default_sections() -> Vec<String> {
    prompts::DEFAULT_REPORT_SECTIONS
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[derive(Debug, Deserialize)]
pub struct ProjectPlanRequest {
    pub project_title: String,
    pub project_description: String,
    #[serde(default = "default_timeline_weeks")]
    pub timeline_weeks: u32,
    #[serde(default = "default_team_size")]
    pub team_size: u32,
}

#[derive(Debug, Deserialize)]
pub struct ReportTemplateRequest {
    pub report_type: String,
    pub report_topic: String,
    #[serde(default = "default_sections")]
    pub sections: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct PresentationOutlineRequest {
    pub presentation_title: String,
    pub audience: String,
    #[serde(default = "default_duration_minutes")]
    pub duration_minutes: u32,
}

pub async fn project_plan(
    State(state): State<SharedState>,
    request: Result<Json<ProjectPlanRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(request) = request?;
    require("project_title", &request.project_title)?;
    require("project_description", &request.project_description)?;

    info!("Generating project plan for '{}'", request.project_title);
    let prompt = prompts::project_plan(
        &request.project_title,
        &request.project_description,
        request.timeline_weeks,
        request.team_size,
    );
    let plan = generate_text(state.llm.as_ref(), &prompt, GenerationOptions::LONG_FORM).await?;
    Ok(generated("project_plan", plan))
}

pub async fn report_template(
    State(state): State<SharedState>,
    request: Result<Json<ReportTemplateRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(request) = request?;
    require("report_type", &request.report_type)?;
    require("report_topic", &request.report_topic)?;

    let sections = if request.sections.is_empty() {
        default_sections()
    } else {
        request.sections
    };
    let prompt = prompts::report_template(&request.report_type, &request.report_topic, &sections);
    let template = generate_text(state.llm.as_ref(), &prompt, GenerationOptions::LONG_FORM).await?;
    Ok(generated("report_template", template))
}

pub async fn presentation_outline(
    State(state): State<SharedState>,
    request: Result<Json<PresentationOutlineRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(request) = request?;
    require("presentation_title", &request.presentation_title)?;
    require("audience", &request.audience)?;

    let prompt = prompts::presentation_outline(
        &request.presentation_title,
        &request.audience,
        request.duration_minutes,
    );
    let outline = generate_text(state.llm.as_ref(), &prompt, GenerationOptions::LONG_FORM).await?;
    Ok(generated("presentation_outline", outline))
}
