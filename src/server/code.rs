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

fn default_review_focus() -> String {
    "general".to_string()
}

fn default_detail_level() -> String {
    "medium".to_string()
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub code: String,
    pub language: String,
    /// general, security, performance or readability
    #[serde(default = "default_review_focus")]
    pub review_focus: String,
}

#[derive(Debug, Deserialize)]
pub struct RefactorRequest {
    pub code: String,
    pub language: String,
    pub refactoring_goal: String,
}

#[derive(Debug, Deserialize)]
pub struct ExplainRequest {
    pub code: String,
    pub language: String,
    /// basic, medium or detailed
    #[serde(default = "default_detail_level")]
    pub detail_level: String,
}

pub async fn review(
    State(state): State<SharedState>,
    request: Result<Json<ReviewRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(request) = request?;
    require("code", &request.code)?;
    require("language", &request.language)?;

    info!(
        "Reviewing {} chars of {} ({} focus)",
        request.code.chars().count(),
        request.language,
        request.review_focus
    );
    let prompt = prompts::code_review(&request.code, &request.language, &request.review_focus);
    let review = generate_text(state.llm.as_ref(), &prompt, GenerationOptions::LONG_FORM).await?;
    Ok(generated("code_review", review))
}

pub async fn suggest_refactoring(
    State(state): State<SharedState>,
    request: Result<Json<RefactorRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(request) = request?;
    require("code", &request.code)?;
    require("language", &request.language)?;
    require("refactoring_goal", &request.refactoring_goal)?;

    let prompt = prompts::refactoring(&request.code, &request.language, &request.refactoring_goal);
    let suggestions =
        generate_text(state.llm.as_ref(), &prompt, GenerationOptions::LONG_FORM).await?;
    Ok(generated("refactoring_suggestions", suggestions))
}

pub async fn explain(
    State(state): State<SharedState>,
    request: Result<Json<ExplainRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(request) = request?;
    require("code", &request.code)?;
    require("language", &request.language)?;

    let prompt = prompts::code_explanation(&request.code, &request.language, &request.detail_level);
    let explanation =
        generate_text(state.llm.as_ref(), &prompt, GenerationOptions::LONG_FORM).await?;
    Ok(generated("code_explanation", explanation))
}
