//! Model listing handler.

use axum::{extract::State, Json};

use crate::models::{ModelInfo, ModelList};
use crate::state::AppState;

pub async fn handle_list_models(State(state): State<AppState>) -> Json<ModelList> {
    let data = state
        .engine
        .model_names()
        .iter()
        .filter_map(|name| state.engine.model_spec(name))
        .map(ModelInfo::from)
        .collect();
    Json(ModelList {
        object: "list".to_string(),
        data,
    })
}
