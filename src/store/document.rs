use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::fmt;

use super::lenient;

/// Identifies a chat user. Clients send it either as a JSON number or as a
/// string (query parameters are always strings), so equality is defined on
/// the textual form: `42 == "42"`.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum UserId {
    Number(i64),
    Text(String),
}

impl<'de> Deserialize<'de> for UserId {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        match Value::deserialize(d)? {
            Value::Null => Err(serde::de::Error::custom("user id must not be null")),
            Value::Number(n) => Ok(match n.as_i64() {
                Some(i) => UserId::Number(i),
                None => UserId::Text(n.to_string()),
            }),
            other => Ok(UserId::Text(lenient::text(other).unwrap_or_default())),
        }
    }
}

impl UserId {
    pub fn as_key(&self) -> String {
        match self {
            UserId::Number(n) => n.to_string(),
            UserId::Text(s) => s.trim().to_string(),
        }
    }
}

impl Default for UserId {
    fn default() -> Self {
        UserId::Number(0)
    }
}

impl PartialEq for UserId {
    fn eq(&self, other: &Self) -> bool {
        self.as_key() == other.as_key()
    }
}

impl Eq for UserId {}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_key())
    }
}

impl From<i64> for UserId {
    fn from(v: i64) -> Self {
        UserId::Number(v)
    }
}

impl From<&str> for UserId {
    fn from(v: &str) -> Self {
        UserId::Text(v.to_string())
    }
}

/// A money amount exactly as the client sent it. Integers stay integers and
/// fractional values survive a load/save cycle; numeric strings are parsed,
/// anything else counts as zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Amount(Number);

impl Amount {
    pub fn as_i64(&self) -> Option<i64> {
        self.0.as_i64()
    }
}

impl Default for Amount {
    fn default() -> Self {
        Amount(Number::from(0))
    }
}

impl From<i64> for Amount {
    fn from(v: i64) -> Self {
        Amount(Number::from(v))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let number = match Value::deserialize(d)? {
            Value::Number(n) => Some(n),
            Value::String(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .map(Number::from)
                    .or_else(|| s.parse::<f64>().ok().and_then(Number::from_f64))
            }
            _ => None,
        };
        Ok(number.map(Amount).unwrap_or_default())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tariff {
    pub key: String,
    pub label: String,
    pub amount: i64,
}

/// The static `settings` entry of the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub tariffs: Vec<Tariff>,
}

impl Default for Catalog {
    fn default() -> Self {
        let tariff = |key: &str, label: &str, amount| Tariff {
            key: key.to_string(),
            label: label.to_string(),
            amount,
        };
        Self {
            tariffs: vec![
                tariff("1m", "1 месяц — 1500₽", 1500),
                tariff("6m", "6 месяцев — 8000₽", 8000),
                tariff("12m", "12 месяцев — 10000₽", 10000),
            ],
        }
    }
}

impl Catalog {
    pub fn find(&self, key: &str) -> Option<&Tariff> {
        self.tariffs.iter().find(|t| t.key == key)
    }
}

/// A subscription keeps whatever the caller sent next to the fields the
/// service assigns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    #[serde(default, deserialize_with = "lenient::string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub created_at: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub status: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

// Every field tolerates `null` and the wrong JSON type; see `lenient`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    #[serde(default, deserialize_with = "lenient::string")]
    pub id: String,
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub username: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub email: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub tariff: String,
    #[serde(default)]
    pub amount: Amount,
    #[serde(default, deserialize_with = "lenient::string")]
    pub method: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub status: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub created_at: String,
    #[serde(
        default,
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub payment_url: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub invoice_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Question {
    #[serde(default, deserialize_with = "lenient::string")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub username: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub message: String,
    #[serde(
        default,
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub file_url: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub is_admin: bool,
    #[serde(default, deserialize_with = "lenient::string")]
    pub created_at: String,
    // Always serialized so clients see an explicit `null` while open.
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub answer: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub answered_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Question {
    pub fn belongs_to(&self, user: &UserId) -> bool {
        self.user_id.as_ref().is_some_and(|u| u == user)
    }

    pub fn is_open(&self) -> bool {
        self.answer.as_deref().is_none_or(str::is_empty)
    }
}

/// The single aggregate persisted in the storage slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub subscriptions: Vec<Subscription>,
    #[serde(default)]
    pub payments: Vec<Payment>,
    #[serde(default)]
    pub questions: Vec<Question>,
    #[serde(default)]
    pub users: BTreeMap<String, Value>,
    #[serde(default)]
    pub settings: Catalog,
}

impl Document {
    pub fn with_catalog(settings: Catalog) -> Self {
        Self {
            subscriptions: Vec::new(),
            payments: Vec::new(),
            questions: Vec::new(),
            users: BTreeMap::new(),
            settings,
        }
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::with_catalog(Catalog::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn user_id_compares_numbers_and_strings() {
        assert_eq!(UserId::from(42), UserId::from("42"));
        assert_ne!(UserId::from(42), UserId::from("43"));
        let parsed: UserId = serde_json::from_value(json!("7")).unwrap();
        assert_eq!(parsed, UserId::Number(7));
    }

    #[test]
    fn open_question_serializes_null_answer() {
        let q = Question {
            id: "1".into(),
            user_id: Some(UserId::from(1)),
            message: "hi".into(),
            ..Default::default()
        };
        let v = serde_json::to_value(&q).unwrap();
        assert!(v["answer"].is_null());
        assert!(v.get("answered_at").is_none());
        assert_eq!(v["is_admin"], json!(false));
    }

    #[test]
    fn subscription_keeps_caller_fields() {
        let sub: Subscription = serde_json::from_value(json!({
            "user_id": 5,
            "tariff": "6m",
        }))
        .unwrap();
        assert_eq!(sub.fields["tariff"], json!("6m"));
        let back = serde_json::to_value(&sub).unwrap();
        assert_eq!(back["user_id"], json!(5));
    }

    #[test]
    fn missing_collections_default_to_empty() {
        let doc: Document = serde_json::from_value(json!({ "questions": [] })).unwrap();
        assert!(doc.subscriptions.is_empty());
        assert!(doc.users.is_empty());
        assert_eq!(doc.settings.find("12m").map(|t| t.amount), Some(10000));
    }

    #[test]
    fn records_from_older_clients_keep_their_values() {
        let p: Payment = serde_json::from_value(json!({
            "id": 7,
            "user_id": null,
            "email": null,
            "amount": 1500.5,
            "username": 12,
        }))
        .unwrap();
        assert_eq!(p.id, "7");
        assert_eq!(p.user_id, None);
        assert_eq!(p.email, "");
        assert_eq!(p.username, "12");

        let back = serde_json::to_value(&p).unwrap();
        assert_eq!(back["amount"], json!(1500.5));
        assert!(back["user_id"].is_null());
    }

    #[test]
    fn amount_accepts_numeric_strings() {
        let p: Payment = serde_json::from_value(json!({ "amount": " 8000 " })).unwrap();
        assert_eq!(p.amount, Amount::from(8000));
        let p: Payment = serde_json::from_value(json!({ "amount": "n/a" })).unwrap();
        assert_eq!(p.amount.as_i64(), Some(0));
    }

    #[test]
    fn fractional_user_id_is_kept_as_text() {
        let q: Question = serde_json::from_value(json!({ "user_id": 1.5 })).unwrap();
        assert_eq!(q.user_id, Some(UserId::from("1.5")));
        assert!(serde_json::from_value::<UserId>(Value::Null).is_err());
    }
}
