//! In-process [`BoardStore`] for tests and local runs.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::BoardStore;
use crate::error::StoreError;
use crate::models::{Automation, Card, CardField, FormSubmission, MessageLog, NewFormSubmission, Pipe};

#[derive(Default)]
pub struct MemoryStore {
    pipes: RwLock<HashMap<String, Pipe>>,
    cards: RwLock<HashMap<String, Card>>,
    messages: RwLock<Vec<MessageLog>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a pipe, replacing any pipe with the same id.
    pub async fn put_pipe(&self, pipe: Pipe) {
        self.pipes.write().await.insert(pipe.id.clone(), pipe);
    }

    /// Seed a card, replacing any card with the same id.
    pub async fn put_card(&self, card: Card) {
        self.cards.write().await.insert(card.id.clone(), card);
    }

    pub async fn card(&self, card_id: &str) -> Option<Card> {
        self.cards.read().await.get(card_id).cloned()
    }

    pub async fn pipe(&self, pipe_id: &str) -> Option<Pipe> {
        self.pipes.read().await.get(pipe_id).cloned()
    }

    /// Every message logged so far, in order.
    pub async fn messages(&self) -> Vec<MessageLog> {
        self.messages.read().await.clone()
    }
}

fn missing(what: &str, id: &str) -> StoreError {
    StoreError::NotFound(format!("{what} {id}"))
}

#[async_trait]
impl BoardStore for MemoryStore {
    async fn get_pipe_with_automations(&self, pipe_id: &str) -> Result<Option<Pipe>, StoreError> {
        Ok(self.pipes.read().await.get(pipe_id).cloned())
    }

    async fn get_card(&self, card_id: &str) -> Result<Option<Card>, StoreError> {
        Ok(self.cards.read().await.get(card_id).cloned())
    }

    async fn update_card_stage(&self, card_id: &str, stage_id: &str) -> Result<DateTime<Utc>, StoreError> {
        let mut cards = self.cards.write().await;
        let card = cards.get_mut(card_id).ok_or_else(|| missing("card", card_id))?;
        card.stage_id = stage_id.to_string();
        card.updated_at = Utc::now();
        Ok(card.updated_at)
    }

    async fn upsert_card_field(&self, card_id: &str, key: &str, value: &Value) -> Result<CardField, StoreError> {
        let mut cards = self.cards.write().await;
        let card = cards.get_mut(card_id).ok_or_else(|| missing("card", card_id))?;
        Ok(card.set_field(key, value.clone()).clone())
    }

    async fn create_form_submission(&self, submission: &NewFormSubmission) -> Result<FormSubmission, StoreError> {
        // Both locks are held for the whole check-and-insert.
        let pipes = self.pipes.read().await;
        let mut cards = self.cards.write().await;

        let card = cards
            .get_mut(&submission.card_id)
            .ok_or_else(|| missing("card", &submission.card_id))?;
        let form = pipes
            .get(&card.pipe_id)
            .and_then(|p| p.form(&submission.form_id))
            .ok_or_else(|| missing("form", &submission.form_id))?;

        if card.form_submissions.iter().any(|s| s.form_id == submission.form_id) {
            return Err(StoreError::Conflict(format!(
                "form {} already submitted for card {}",
                submission.form_id, submission.card_id
            )));
        }

        let stored = FormSubmission {
            id: Uuid::new_v4().to_string(),
            card_id: submission.card_id.clone(),
            form_id: form.id.clone(),
            form_name: form.name.clone(),
            responses: submission.responses.clone(),
            submitted_at: Utc::now(),
            submitter_email: submission.submitter_email.clone(),
        };
        card.form_submissions.insert(0, stored.clone());
        Ok(stored)
    }

    async fn log_message(&self, log: &MessageLog) -> Result<(), StoreError> {
        self.messages.write().await.push(log.clone());
        Ok(())
    }

    async fn list_messages(&self, card_id: &str) -> Result<Vec<MessageLog>, StoreError> {
        Ok(self
            .messages
            .read()
            .await
            .iter()
            .filter(|m| m.card_id == card_id)
            .cloned()
            .collect())
    }

    async fn save_automation(&self, pipe_id: &str, automation: &Automation) -> Result<(), StoreError> {
        let mut pipes = self.pipes.write().await;
        let pipe = pipes.get_mut(pipe_id).ok_or_else(|| missing("pipe", pipe_id))?;
        match pipe.automations.iter_mut().find(|a| a.id == automation.id) {
            Some(existing) => *existing = automation.clone(),
            None => pipe.automations.push(automation.clone()),
        }
        Ok(())
    }

    async fn delete_automation(&self, pipe_id: &str, automation_id: &str) -> Result<(), StoreError> {
        let mut pipes = self.pipes.write().await;
        let pipe = pipes.get_mut(pipe_id).ok_or_else(|| missing("pipe", pipe_id))?;
        let before = pipe.automations.len();
        pipe.automations.retain(|a| a.id != automation_id);
        if pipe.automations.len() == before {
            return Err(missing("automation", automation_id));
        }
        Ok(())
    }

    async fn insert_pipe(&self, pipe: &Pipe) -> Result<(), StoreError> {
        let mut pipes = self.pipes.write().await;
        if pipes.contains_key(&pipe.id) {
            return Err(StoreError::Conflict(format!("pipe {} already exists", pipe.id)));
        }
        pipes.insert(pipe.id.clone(), pipe.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FieldType, Form};
    use serde_json::{json, Map};

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        let mut pipe = Pipe::new("p1", "Sales");
        pipe.forms.push(Form { id: "f1".into(), name: "Intake".into(), stage_id: None });
        store.put_pipe(pipe).await;
        store.put_card(Card::new("c1", "p1", "s1", "Deal")).await;
        store
    }

    fn submission() -> NewFormSubmission {
        NewFormSubmission {
            card_id: "c1".into(),
            form_id: "f1".into(),
            responses: Map::new(),
            submitter_email: Some("x@y.z".into()),
        }
    }

    #[tokio::test]
    async fn second_submission_of_same_form_conflicts() {
        let store = seeded().await;
        let first = store.create_form_submission(&submission()).await.unwrap();
        assert_eq!(first.form_name, "Intake");

        let second = store.create_form_submission(&submission()).await;
        assert!(matches!(second, Err(StoreError::Conflict(_))));
        assert_eq!(store.card("c1").await.unwrap().form_submissions.len(), 1);
    }

    #[tokio::test]
    async fn form_of_another_pipe_is_not_found() {
        let store = seeded().await;
        let mut other = Pipe::new("p2", "Hiring");
        other.forms.push(Form { id: "f2".into(), name: "Referral".into(), stage_id: None });
        store.put_pipe(other).await;

        let foreign = NewFormSubmission { form_id: "f2".into(), ..submission() };
        assert!(matches!(
            store.create_form_submission(&foreign).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(store.card("c1").await.unwrap().form_submissions.is_empty());
    }

    #[tokio::test]
    async fn upsert_retypes_an_existing_field() {
        let store = seeded().await;
        store.upsert_card_field("c1", "score", &json!("low")).await.unwrap();
        let field = store.upsert_card_field("c1", "score", &json!(7)).await.unwrap();

        assert_eq!(field.field_type, FieldType::Number);
        let card = store.card("c1").await.unwrap();
        assert_eq!(card.field("score").unwrap().field_type, FieldType::Number);
    }

    #[tokio::test]
    async fn stage_update_bumps_updated_at() {
        let store = seeded().await;
        let before = store.card("c1").await.unwrap().updated_at;
        let after = store.update_card_stage("c1", "s2").await.unwrap();
        assert!(after >= before);
        assert_eq!(store.card("c1").await.unwrap().stage_id, "s2");
        assert!(matches!(
            store.update_card_stage("ghost", "s2").await,
            Err(StoreError::NotFound(_))
        ));
    }
}
