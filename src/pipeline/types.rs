//! Shared types for the email lookup pipeline.

use serde::{Deserialize, Serialize};

/// One email the user can pick from to continue a lookup task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedChoice {
    /// Provider message id.
    pub id: String,
    /// Display text: subject plus received date.
    pub text: String,
}

/// Outcome of a lookup run.
///
/// Either the pipeline resolved to a single context string (no candidates,
/// or none relevant), or it needs the user to disambiguate between ranked
/// choices. Field names match the front-end contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupOutcome {
    pub needs_selection: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<RankedChoice>>,
}

impl LookupOutcome {
    /// A resolved outcome carrying only a context string.
    pub fn resolved(context: impl Into<String>) -> Self {
        Self {
            needs_selection: false,
            context: Some(context.into()),
            choices: None,
        }
    }

    /// An outcome that needs the user to pick one of the choices.
    pub fn selection(choices: Vec<RankedChoice>) -> Self {
        Self {
            needs_selection: true,
            context: None,
            choices: Some(choices),
        }
    }
}

/// Structured fields plus optional phone number pulled from a chosen email.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailDetails {
    /// Extracted field map (or `{"Raw Text": ...}` when parsing failed).
    pub context: serde_json::Value,
    /// E.164 phone number found in the email, if any.
    pub phone_number_from_email: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolved_outcome_serializes_without_choices() {
        let outcome = LookupOutcome::resolved("nothing found");
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["needsSelection"], false);
        assert_eq!(json["context"], "nothing found");
        assert!(json.get("choices").is_none());
    }

    #[test]
    fn selection_outcome_serializes_without_context() {
        let outcome = LookupOutcome::selection(vec![RankedChoice {
            id: "m1".into(),
            text: "Order Confirmation (from 3/2/2026)".into(),
        }]);
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["needsSelection"], true);
        assert!(json.get("context").is_none());
        assert_eq!(json["choices"][0]["id"], "m1");
    }

    #[test]
    fn email_details_field_names_match_contract() {
        let details = EmailDetails {
            context: serde_json::json!({"order_number": "A-1"}),
            phone_number_from_email: Some("+15551234567".into()),
        };
        let json = serde_json::to_value(&details).unwrap();
        assert_eq!(json["phoneNumberFromEmail"], "+15551234567");
        assert_eq!(json["context"]["order_number"], "A-1");
    }
}
