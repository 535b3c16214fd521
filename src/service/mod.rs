//! In-process stand-in for the club backend.
//!
//! Every operation goes through [`Store`]: reads load the whole document,
//! writes run inside `Store::modify`. Operations are `async` so a real HTTP
//! backend can replace this one without touching callers.

mod ids;
mod notify;
mod types;

pub use ids::IdGenerator;
pub use notify::{LogNotifier, NoopNotifier, Notifier, WebhookNotifier, notifier_from_config};
pub use types::{
    Ack, AnswerRequest, Invoice, InvoiceData, InvoiceRequest, QuestionFilter, UploadedFile,
};

use serde_json::Value;
use std::sync::Arc;

use crate::config::{PaymentsConfig, Settings, UploadsConfig};
use crate::error::Result;
use crate::logging::time::now_iso8601;
use crate::store::{Catalog, Change, Payment, Question, Store, Subscription, UserId};

pub struct MockService {
    store: Arc<Store>,
    ids: IdGenerator,
    notifier: Arc<dyn Notifier>,
    payments: PaymentsConfig,
    uploads: UploadsConfig,
}

impl MockService {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            ids: IdGenerator::new(),
            notifier: Arc::new(NoopNotifier),
            payments: PaymentsConfig::default(),
            uploads: UploadsConfig::default(),
        }
    }

    pub fn from_settings(settings: &Settings, store: Arc<Store>) -> Result<Self> {
        let notifier = notifier_from_config(&settings.notifications)?;
        Ok(Self::new(store)
            .with_notifier(notifier)
            .with_payments(settings.payments.clone())
            .with_uploads(settings.uploads.clone()))
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_payments(mut self, payments: PaymentsConfig) -> Self {
        self.payments = payments;
        self
    }

    pub fn with_uploads(mut self, uploads: UploadsConfig) -> Self {
        self.uploads = uploads;
        self
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    // --- Subscriptions ---

    pub async fn list_subscriptions(&self) -> Result<Vec<Subscription>> {
        Ok(self.store.load().await.subscriptions)
    }

    pub async fn add_subscription(&self, mut subscription: Subscription) -> Result<Ack> {
        let id = self
            .store
            .modify(|doc| {
                let id = self
                    .ids
                    .fresh_id(|c| doc.subscriptions.iter().any(|s| s.id == c));
                subscription.id = id.clone();
                subscription.created_at = now_iso8601();
                subscription.status = "active".to_string();
                doc.subscriptions.push(subscription);
                Change::Commit(id)
            })
            .await?;
        tracing::debug!("Subscription {} created", id);
        Ok(Ack::created(id))
    }

    // --- Payments ---

    pub async fn list_payments(&self) -> Result<Vec<Payment>> {
        Ok(self.store.load().await.payments)
    }

    pub async fn add_payment(&self, mut payment: Payment) -> Result<Ack> {
        let id = self
            .store
            .modify(|doc| {
                let id = self.ids.fresh_id(|c| doc.payments.iter().any(|p| p.id == c));
                payment.id = id.clone();
                payment.created_at = now_iso8601();
                payment.status = "pending".to_string();
                doc.payments.push(payment);
                Change::Commit(id)
            })
            .await?;
        tracing::debug!("Payment {} created", id);
        Ok(Ack::created(id))
    }

    // --- Questions ---

    pub async fn list_questions(&self, filter: &QuestionFilter) -> Result<Vec<Question>> {
        let doc = self.store.load().await;
        Ok(doc
            .questions
            .into_iter()
            .filter(|q| filter.user_id.as_ref().is_none_or(|u| q.belongs_to(u)))
            .filter(|q| filter.include_admin || !q.is_admin)
            .collect())
    }

    pub async fn add_question(&self, mut question: Question) -> Result<Ack> {
        let created = self
            .store
            .modify(|doc| {
                question.id = self.ids.fresh_id(|c| doc.questions.iter().any(|q| q.id == c));
                question.created_at = now_iso8601();
                question.answer = None;
                question.answered_at = None;
                question.is_admin = false;
                doc.questions.push(question.clone());
                Change::Commit(question)
            })
            .await?;

        self.notifier.question_created(&created).await;
        Ok(Ack::created(created.id))
    }

    /// Attaches `answer` to the oldest open question of `user_id`. Newer open
    /// questions of the same user stay open.
    pub async fn answer_question(&self, user_id: &UserId, answer: &str) -> Result<Ack> {
        if answer.trim().is_empty() {
            return Ok(Ack::error("Answer must not be empty"));
        }

        let ack = self
            .store
            .modify(|doc| {
                match doc
                    .questions
                    .iter_mut()
                    .find(|q| q.belongs_to(user_id) && q.is_open())
                {
                    Some(question) => {
                        question.answer = Some(answer.to_string());
                        question.answered_at = Some(now_iso8601());
                        Change::Commit(Ack::ok())
                    }
                    None => Change::Discard(Ack::error("Question not found")),
                }
            })
            .await?;

        if ack.is_ok() {
            self.notifier.question_answered(user_id, answer).await;
        } else {
            tracing::debug!("No open question for user {}", user_id);
        }
        Ok(ack)
    }

    // --- Uploads ---

    /// Synthesizes a storage path; the file content is not kept.
    pub async fn upload_file(&self, file_name: &str) -> Result<UploadedFile> {
        let base = file_name
            .rsplit(['/', '\\'])
            .next()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or("upload");
        let token = uuid::Uuid::new_v4().simple();
        let file_url = format!("{}file_{}_{}", self.uploads.url_prefix, token, base);
        tracing::debug!("File accepted: {}", file_url);
        Ok(UploadedFile { file_url })
    }

    // --- Invoices ---

    pub async fn create_invoice(&self, request: InvoiceRequest) -> Result<Invoice> {
        let invoice_id = format!("{}{}", self.payments.invoice_prefix, self.ids.next_token());
        let url = format!("{}{}", self.payments.checkout_base_url, invoice_id);

        let payment = Payment {
            user_id: Some(request.user_id.unwrap_or_default()),
            username: request.username.unwrap_or_default(),
            email: request.email.unwrap_or_default(),
            tariff: request.tariff.unwrap_or_default(),
            amount: request.amount.unwrap_or_default(),
            method: request
                .method
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| self.payments.default_method.clone()),
            payment_url: Some(url.clone()),
            invoice_id: Some(invoice_id.clone()),
            ..Default::default()
        };
        self.add_payment(payment).await?;

        tracing::info!("Invoice {} created", invoice_id);
        Ok(Invoice {
            data: InvoiceData { url, invoice_id },
        })
    }

    // --- Settings & users ---

    pub async fn get_settings(&self) -> Result<Catalog> {
        Ok(self.store.load().await.settings)
    }

    pub async fn get_user(&self, user_id: &UserId) -> Result<Option<Value>> {
        Ok(self.store.load().await.users.remove(&user_id.as_key()))
    }

    /// Upserts the profile under its `id` field.
    pub async fn save_user(&self, user: Value) -> Result<Ack> {
        let Some(key) = user
            .get("id")
            .and_then(|v| serde_json::from_value::<UserId>(v.clone()).ok())
            .map(|id| id.as_key())
            .filter(|k| !k.is_empty())
        else {
            return Ok(Ack::error("User id is required"));
        };

        self.store
            .modify(|doc| {
                doc.users.insert(key, user);
                Change::Commit(Ack::ok())
            })
            .await
    }
}
