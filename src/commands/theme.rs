// Theme Commands
// Maps invoke command names and JSON payloads onto theme engine operations

use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::models::{
    shades_for, ColorToken, DraftSession, EditorTab, PaletteSection, SaveMode, ThemeError,
    COLOR_FAMILIES,
};
use crate::services::ThemeEngine;

/// Run a theme command; errors are returned as user-facing text
pub async fn invoke_theme_command(
    engine: &ThemeEngine,
    command: &str,
    payload: Value,
) -> Result<Value, String> {
    match command {
        "list_themes" => Ok(json!(engine.list_themes())),
        "get_theme_state" => Ok(json!(engine.snapshot())),
        "get_effective_palette" => Ok(json!(engine.effective_palette())),
        "validate_color" => {
            let token: String = get_arg(&payload, "token")?;
            let valid = ColorToken::parse(&token).is_ok();
            Ok(json!({ "token": token, "valid": valid }))
        }
        "list_color_families" => {
            let families: Vec<Value> = COLOR_FAMILIES
                .iter()
                .map(|(family, shades)| json!({ "family": family, "shades": shades }))
                .collect();
            Ok(json!(families))
        }
        "get_color_shades" => {
            let family: String = get_arg(&payload, "family")?;
            let shades =
                shades_for(&family).ok_or_else(|| format!("Unknown color family '{family}'"))?;
            Ok(json!({ "family": family, "shades": shades }))
        }
        "apply_preset" => {
            let theme_id: String = get_arg(&payload, "themeId")?;
            let palette = engine
                .apply_preset(&theme_id)
                .await
                .map_err(|e| e.to_string())?;
            Ok(json!(palette))
        }
        "preview_theme" => {
            let theme_id: String = get_arg(&payload, "themeId")?;
            let palette = engine.preview_theme(&theme_id).map_err(|e| e.to_string())?;
            Ok(json!(palette))
        }
        "copy_theme" => {
            let theme_id: String = get_arg(&payload, "themeId")?;
            let session = engine.copy_theme(&theme_id).map_err(|e| e.to_string())?;
            Ok(json!(session))
        }
        "start_blank_customization" => {
            let session = engine.start_blank_customization().map_err(|e| e.to_string())?;
            Ok(json!(session))
        }
        "set_draft_color" => {
            let section = get_section(&payload)?;
            let property: String = get_arg(&payload, "property")?;
            let token: String = get_arg(&payload, "token")?;
            let draft = engine
                .set_draft_color(section, &property, &token)
                .map_err(|e| e.to_string())?;
            Ok(json!(draft))
        }
        "reset_color" => {
            let section = get_section(&payload)?;
            let property: String = get_arg(&payload, "property")?;
            let draft = engine
                .reset_color(section, &property)
                .map_err(|e| e.to_string())?;
            Ok(json!(draft))
        }
        "reset_section" => {
            let section = get_section(&payload)?;
            let draft = engine.reset_section(section).map_err(|e| e.to_string())?;
            Ok(json!(draft))
        }
        "reset_all" => {
            let draft = engine.reset_all().map_err(|e| e.to_string())?;
            Ok(json!(draft))
        }
        "save_custom_theme" => {
            let name: String = get_arg(&payload, "name")?;
            let description: Option<String> = get_opt_arg(&payload, "description")?;
            let exit: Option<bool> = get_opt_arg(&payload, "exit")?;
            let mode = if exit.unwrap_or(true) {
                SaveMode::Exit
            } else {
                SaveMode::Continue
            };

            let theme = engine
                .save_custom_theme(&name, description.as_deref().unwrap_or_default(), mode)
                .await
                .map_err(|e| e.to_string())?;
            Ok(json!(theme))
        }
        "get_draft_changes" => {
            let session = engine
                .session()
                .ok_or_else(|| ThemeError::NotCustomizing.to_string())?;
            Ok(draft_changes(&session))
        }
        "cancel_customization" => {
            let palette = engine.cancel_customization().map_err(|e| e.to_string())?;
            Ok(json!(palette))
        }
        "resume_session" => {
            let session = engine.resume_session().map_err(|e| e.to_string())?;
            Ok(json!(session))
        }
        "delete_custom_theme" => {
            let theme_id: String = get_arg(&payload, "themeId")?;
            let deleted = engine
                .delete_custom_theme(&theme_id)
                .map_err(|e| e.to_string())?;
            Ok(json!({ "deleted": deleted }))
        }
        "set_active_tab" => {
            let tab: EditorTab = get_arg(&payload, "tab")?;
            engine.set_active_tab(tab).map_err(|e| e.to_string())?;
            Ok(json!({ "activeTab": tab.as_str() }))
        }
        "flush_pending" => {
            engine.flush_pending();
            Ok(Value::Null)
        }
        _ => Err(format!("Unknown command: {command}")),
    }
}

/// Per-property diff of the draft against its session-start snapshot
fn draft_changes(session: &DraftSession) -> Value {
    let changes: Vec<Value> = session
        .draft
        .changed_properties(&session.original)
        .into_iter()
        .map(|(section, property)| {
            json!({
                "section": section.as_str(),
                "property": property,
                "original": session.original.get(section, property).ok(),
                "draft": session.draft.get(section, property).ok(),
            })
        })
        .collect();

    json!({ "dirty": session.is_dirty(), "changes": changes })
}

// ============================================================================
// Argument Parsing
// ============================================================================

fn get_section(payload: &Value) -> Result<PaletteSection, String> {
    let section: String = get_arg(payload, "section")?;
    section.parse().map_err(|e: ThemeError| e.to_string())
}

fn get_arg<T: DeserializeOwned>(payload: &Value, key: &str) -> Result<T, String> {
    let obj = payload
        .as_object()
        .ok_or_else(|| "Invalid payload".to_string())?;
    let value = obj
        .get(key)
        .ok_or_else(|| format!("Missing argument: {key}"))?;
    serde_json::from_value(value.clone()).map_err(|e| format!("Invalid {key}: {e}"))
}

fn get_opt_arg<T: DeserializeOwned>(payload: &Value, key: &str) -> Result<Option<T>, String> {
    let obj = match payload {
        Value::Null => return Ok(None),
        Value::Object(obj) => obj,
        _ => return Err("Invalid payload".to_string()),
    };
    let value = match obj.get(key) {
        Some(value) => value.clone(),
        None => return Ok(None),
    };

    if value.is_null() {
        return Ok(None);
    }

    serde_json::from_value(value)
        .map(Some)
        .map_err(|e| format!("Invalid {key}: {e}"))
}
