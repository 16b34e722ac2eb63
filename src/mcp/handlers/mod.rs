//! Tool handlers for the MCP server.

use crate::assist::AssistError;
use crate::backend::BackendError;
use crate::billing::BillingError;
use crate::processing::ProcessingError;
use crate::service::ServiceError;
use rmcp::{ErrorData as McpError, model::JsonObject};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

pub mod assist;
pub mod extract;
pub mod metrics;
pub mod usage;

/// Parse structured arguments supplied to a tool invocation.
pub(crate) fn parse_arguments<T: DeserializeOwned>(
    arguments: Option<JsonObject>,
) -> Result<T, McpError> {
    let value = arguments
        .map(Value::Object)
        .unwrap_or_else(|| Value::Object(JsonObject::new()));
    serde_json::from_value(value)
        .map_err(|err| McpError::invalid_params(format!("Invalid arguments: {err}"), None))
}

/// Map a service failure onto an MCP error.
///
/// Caller mistakes become `invalid_params`, a used-up quota or a missing sign-in becomes
/// `invalid_request` (the quota notice rides along as data), and the rest is internal.
pub(crate) fn service_error(error: ServiceError) -> McpError {
    let message = error.to_string();
    match error {
        ServiceError::Processing(ProcessingError::LimitReached(notice))
        | ServiceError::Assist(AssistError::LimitReached(notice)) => {
            McpError::invalid_request(message, Some(json!(notice)))
        }
        ServiceError::Validation(_)
        | ServiceError::Export(_)
        | ServiceError::Assist(AssistError::EmptyText | AssistError::EmptyLanguage)
        | ServiceError::Processing(
            ProcessingError::NotFound(_)
            | ProcessingError::Rejected(_)
            | ProcessingError::NotCroppable
            | ProcessingError::InvalidDataUri(_),
        ) => McpError::invalid_params(message, None),
        ServiceError::Billing(BillingError::SignInRequired)
        | ServiceError::Processing(ProcessingError::Busy(_) | ProcessingError::AlreadyProcessed(_))
        | ServiceError::Backend(BackendError::Unauthorized(_) | BackendError::InvalidCredentials) => {
            McpError::invalid_request(message, None)
        }
        _ => McpError::internal_error(message, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plans::PlanId;
    use crate::processing::LimitNotice;
    use rmcp::model::ErrorCode;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    #[serde(deny_unknown_fields)]
    struct TextArgs {
        text: String,
    }

    #[test]
    fn missing_arguments_parse_as_empty_object() {
        let err = parse_arguments::<TextArgs>(None).expect_err("text is required");
        assert_eq!(err.code, ErrorCode::INVALID_PARAMS);

        let args: TextArgs =
            parse_arguments(json!({ "text": "hi" }).as_object().cloned()).expect("args");
        assert_eq!(args.text, "hi");
    }

    #[test]
    fn quota_errors_carry_the_notice() {
        let error = service_error(ServiceError::Assist(AssistError::LimitReached(
            LimitNotice::new(PlanId::Free, 3),
        )));
        assert_eq!(error.code, ErrorCode::INVALID_REQUEST);
        let data = error.data.expect("notice data");
        assert_eq!(data["plan"], "free");
        assert_eq!(data["limit"], 3);
    }

    #[test]
    fn remote_failures_are_internal() {
        let error = service_error(ServiceError::Assist(AssistError::Remote(
            crate::genai::GenAiError::ProviderUnavailable("down".into()),
        )));
        assert_eq!(error.code, ErrorCode::INTERNAL_ERROR);
    }
}
