use gatewarden_core::{AppError, AppResult};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};

/// Returns the authorization model written into every tenant store.
///
/// Relations mirror the built-in roles; scope objects carry a `parent`
/// relation so the engine can follow the hierarchy for group-expanded
/// subjects. The model is version-tagged by content fingerprint, not by a
/// hand-maintained counter.
#[must_use]
pub fn authorization_model() -> Value {
    json!({
        "schema_version": "1.1",
        "type_definitions": [
            { "type": "user" },
            { "type": "service_account" },
            {
                "type": "group",
                "relations": {
                    "member": { "this": {} }
                },
                "metadata": {
                    "relations": {
                        "member": {
                            "directly_related_user_types": [
                                { "type": "user" },
                                { "type": "service_account" }
                            ]
                        }
                    }
                }
            },
            {
                "type": "scope",
                "relations": {
                    "parent": { "this": {} },
                    "owner": { "this": {} },
                    "editor": { "this": {} },
                    "viewer": { "this": {} }
                },
                "metadata": {
                    "relations": {
                        "parent": {
                            "directly_related_user_types": [{ "type": "scope" }]
                        },
                        "owner": {
                            "directly_related_user_types": [
                                { "type": "user" },
                                { "type": "group", "relation": "member" },
                                { "type": "service_account" }
                            ]
                        },
                        "editor": {
                            "directly_related_user_types": [
                                { "type": "user" },
                                { "type": "group", "relation": "member" },
                                { "type": "service_account" }
                            ]
                        },
                        "viewer": {
                            "directly_related_user_types": [
                                { "type": "user" },
                                { "type": "group", "relation": "member" },
                                { "type": "service_account" }
                            ]
                        }
                    }
                }
            }
        ]
    })
}

/// Returns the hex-encoded content fingerprint of an authorization model.
pub fn model_fingerprint(model: &Value) -> AppResult<String> {
    let canonical = serde_json::to_string(model).map_err(|error| {
        AppError::Internal(format!(
            "failed to serialize authorization model for fingerprinting: {error}"
        ))
    })?;

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::{authorization_model, model_fingerprint};

    #[test]
    fn fingerprint_is_stable_for_unchanged_model() {
        let first = model_fingerprint(&authorization_model());
        let second = model_fingerprint(&authorization_model());
        assert!(first.is_ok());
        assert_eq!(first.ok(), second.ok());
    }

    #[test]
    fn fingerprint_changes_with_model_content() {
        let model = authorization_model();
        let mut altered = model.clone();
        altered["schema_version"] = serde_json::json!("1.2");

        assert_ne!(
            model_fingerprint(&model).ok(),
            model_fingerprint(&altered).ok()
        );
    }
}
