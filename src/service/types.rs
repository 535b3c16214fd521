use serde::{Deserialize, Serialize};

use crate::store::lenient;
use crate::store::{Amount, UserId};

/// Status reply shared by the mutating operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Ack {
    Ok {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
    Error {
        message: String,
    },
}

impl Ack {
    pub fn ok() -> Self {
        Ack::Ok { id: None }
    }

    pub fn created(id: impl Into<String>) -> Self {
        Ack::Ok {
            id: Some(id.into()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Ack::Error {
            message: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Ack::Ok { .. })
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            Ack::Ok { id } => id.as_deref(),
            Ack::Error { .. } => None,
        }
    }
}

/// Both predicates apply together when present.
#[derive(Debug, Clone, Default)]
pub struct QuestionFilter {
    pub user_id: Option<UserId>,
    pub include_admin: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnswerRequest {
    pub user_id: UserId,
    #[serde(default, deserialize_with = "lenient::string")]
    pub answer: String,
}

/// Invoice input; every field is optional and defaulted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvoiceRequest {
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub username: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub tariff: Option<String>,
    #[serde(default)]
    pub amount: Option<Amount>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub method: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub data: InvoiceData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceData {
    pub url: String,
    #[serde(rename = "invoiceId")]
    pub invoice_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub file_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ack_wire_shapes() {
        assert_eq!(serde_json::to_value(Ack::ok()).unwrap(), json!({"status": "ok"}));
        assert_eq!(
            serde_json::to_value(Ack::created("17")).unwrap(),
            json!({"status": "ok", "id": "17"})
        );
        assert_eq!(
            serde_json::to_value(Ack::error("Question not found")).unwrap(),
            json!({"status": "error", "message": "Question not found"})
        );
    }

    #[test]
    fn invoice_uses_camel_case_id() {
        let inv = Invoice {
            data: InvoiceData {
                url: "u".into(),
                invoice_id: "lava_1".into(),
            },
        };
        assert_eq!(
            serde_json::to_value(inv).unwrap(),
            json!({"data": {"url": "u", "invoiceId": "lava_1"}})
        );
    }

    #[test]
    fn invoice_request_tolerates_nulls_and_strings() {
        let req: InvoiceRequest = serde_json::from_value(json!({
            "user_id": null,
            "email": null,
            "amount": "1500",
            "username": 5,
        }))
        .unwrap();
        assert_eq!(req.user_id, None);
        assert_eq!(req.email, None);
        assert_eq!(req.amount, Some(Amount::from(1500)));
        assert_eq!(req.username.as_deref(), Some("5"));
    }
}
