//! API route handlers.

use axum::extract::{Path, State};
use axum::Json;
use tracing::{debug, info};

use dolilink_core::rules::RuleSet;

use crate::error::Result;
use crate::models::{
    ClearResponse, SaveSettingsRequest, SaveSettingsResponse, SettingsResponse, StatusResponse,
    TestRulesResponse, UnpatchResponse,
};
use crate::settings::StoredSettings;
use crate::state::AppState;

/// GET /api/settings - Current rules for the content-script collaborator.
pub async fn get_settings(State(state): State<AppState>) -> Result<Json<SettingsResponse>> {
    let settings = state.settings.current();
    Ok(Json(SettingsResponse {
        status: "success".to_string(),
        rules: settings.rules,
        enabled: settings.enabled,
    }))
}

/// POST /api/settings - Validate, persist, and apply a new rule set.
///
/// Malformed rules are reported in-band as `status: "error"` and change
/// nothing; a valid save swaps the engine's rule set and rescans.
pub async fn save_settings(
    State(state): State<AppState>,
    Json(req): Json<SaveSettingsRequest>,
) -> Result<Json<SaveSettingsResponse>> {
    let rules = match RuleSet::from_wire(&req.rules, req.enabled) {
        Ok(rules) => rules,
        Err(e) => {
            debug!("rejected settings save: {}", e);
            return Ok(Json(SaveSettingsResponse {
                status: "error".to_string(),
                message: Some(format!("invalid rules: {}", e)),
            }));
        }
    };

    state.settings.save(StoredSettings {
        rules: req.rules,
        enabled: req.enabled,
    })?;
    state.engine.set_rule_set(rules);
    let outcome = state.engine.scan();

    info!(
        newly_patched = outcome.newly_patched,
        "settings saved and applied"
    );
    Ok(Json(SaveSettingsResponse {
        status: "success".to_string(),
        message: None,
    }))
}

/// GET /api/status - Engine status snapshot with patched-link details.
pub async fn get_status(State(state): State<AppState>) -> Result<Json<StatusResponse>> {
    Ok(Json(state.engine.status().into()))
}

/// POST /api/links/{index}/unpatch - Unpatch a single link by index.
pub async fn unpatch_link(
    State(state): State<AppState>,
    Path(index): Path<usize>,
) -> Result<Json<UnpatchResponse>> {
    let success = state.engine.unpatch_link(index);
    debug!(index, success, "unpatch requested");
    Ok(Json(UnpatchResponse { success }))
}

/// POST /api/links/clear - Unpatch every patched link.
pub async fn clear_links(State(state): State<AppState>) -> Result<Json<ClearResponse>> {
    state.engine.clear_all_patched();
    Ok(Json(ClearResponse { success: true }))
}

/// POST /api/rules/test - Dry-run the rules without changing patch state.
pub async fn test_rules(State(state): State<AppState>) -> Result<Json<TestRulesResponse>> {
    let outcome = state.engine.test_rules_with_revert();
    Ok(Json(TestRulesResponse {
        count: outcome.count,
        links: outcome.matched,
    }))
}
