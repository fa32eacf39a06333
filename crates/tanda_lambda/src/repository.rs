//! Typed access to the tanda tables on top of [`KeyValueStore`].

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tanda_core::contract::{
    record_from_attributes, record_to_attributes, Notification, Participant, Payment,
    RegistrationLink, ResetToken, Tanda, User,
};
use tanda_core::rotation::{renumber, SlotAssignment};

use crate::adapters::kv_store::{key, Item, KeyValueStore, Query};
use crate::config::TableNames;
use crate::http::ApiError;

pub const ADMIN_INDEX: &str = "adminId-index";
pub const EMAIL_INDEX: &str = "email-index";
pub const TANDA_INDEX: &str = "tandaId-index";

pub struct Repository<'a> {
    store: &'a dyn KeyValueStore,
    tables: &'a TableNames,
}

fn decode<T: DeserializeOwned>(item: Item) -> Result<T, ApiError> {
    Ok(record_from_attributes(item)?)
}

fn decode_all<T: DeserializeOwned>(items: Vec<Item>) -> Result<Vec<T>, ApiError> {
    items.into_iter().map(decode).collect()
}

fn encode(record: &impl Serialize) -> Result<Item, ApiError> {
    Ok(record_to_attributes(record)?)
}

impl<'a> Repository<'a> {
    pub fn new(store: &'a dyn KeyValueStore, tables: &'a TableNames) -> Self {
        Self { store, tables }
    }

    pub fn tables(&self) -> &TableNames {
        self.tables
    }

    fn get<T: DeserializeOwned>(&self, table: &str, key: &Item) -> Result<Option<T>, ApiError> {
        self.store.get_item(table, key)?.map(decode).transpose()
    }

    // tandas

    pub fn tanda(&self, tanda_id: &str) -> Result<Option<Tanda>, ApiError> {
        self.get(&self.tables.tandas, &key(&[("id", tanda_id)]))
    }

    /// The tanda when `user_id` administers it: 404 when missing, 403 when
    /// owned by someone else.
    pub fn owned_tanda(&self, tanda_id: &str, user_id: &str) -> Result<Tanda, ApiError> {
        let tanda = self.tanda(tanda_id)?.ok_or_else(ApiError::tanda_not_found)?;
        if tanda.admin_id != user_id {
            return Err(ApiError::forbidden());
        }
        Ok(tanda)
    }

    pub fn put_tanda(&self, tanda: &Tanda) -> Result<(), ApiError> {
        Ok(self.store.put_item(&self.tables.tandas, &encode(tanda)?)?)
    }

    pub fn update_tanda(&self, tanda_id: &str, changes: &Item) -> Result<Item, ApiError> {
        Ok(self
            .store
            .update_item(&self.tables.tandas, &key(&[("id", tanda_id)]), changes)?)
    }

    pub fn delete_tanda(&self, tanda_id: &str) -> Result<(), ApiError> {
        Ok(self
            .store
            .delete_item(&self.tables.tandas, &key(&[("id", tanda_id)]))?)
    }

    pub fn tandas_by_admin(&self, admin_id: &str) -> Result<Vec<Tanda>, ApiError> {
        let query = Query::on_index(ADMIN_INDEX, "adminId", admin_id);
        decode_all(self.store.query(&self.tables.tandas, &query)?)
    }

    // users

    pub fn user(&self, user_id: &str) -> Result<Option<User>, ApiError> {
        self.get(&self.tables.usuarios, &key(&[("id", user_id)]))
    }

    pub fn user_by_email(&self, email: &str) -> Result<Option<User>, ApiError> {
        let query = Query::on_index(EMAIL_INDEX, "email", email);
        let mut users: Vec<User> = decode_all(self.store.query(&self.tables.usuarios, &query)?)?;
        Ok((!users.is_empty()).then(|| users.swap_remove(0)))
    }

    pub fn put_user(&self, user: &User) -> Result<(), ApiError> {
        Ok(self.store.put_item(&self.tables.usuarios, &encode(user)?)?)
    }

    pub fn update_user(&self, user_id: &str, changes: &Item) -> Result<Item, ApiError> {
        Ok(self
            .store
            .update_item(&self.tables.usuarios, &key(&[("id", user_id)]), changes)?)
    }

    pub fn delete_user(&self, user_id: &str) -> Result<(), ApiError> {
        Ok(self
            .store
            .delete_item(&self.tables.usuarios, &key(&[("id", user_id)]))?)
    }

    // participants

    pub fn participants(&self, tanda_id: &str) -> Result<Vec<Participant>, ApiError> {
        let query = Query::partition("id", tanda_id);
        decode_all(self.store.query(&self.tables.participantes, &query)?)
    }

    pub fn participant(
        &self,
        tanda_id: &str,
        participant_id: &str,
    ) -> Result<Option<Participant>, ApiError> {
        self.get(
            &self.tables.participantes,
            &key(&[("id", tanda_id), ("participanteId", participant_id)]),
        )
    }

    pub fn put_participant(&self, participant: &Participant) -> Result<(), ApiError> {
        Ok(self
            .store
            .put_item(&self.tables.participantes, &encode(participant)?)?)
    }

    pub fn update_participant(
        &self,
        tanda_id: &str,
        participant_id: &str,
        changes: &Item,
    ) -> Result<Item, ApiError> {
        Ok(self.store.update_item(
            &self.tables.participantes,
            &key(&[("id", tanda_id), ("participanteId", participant_id)]),
            changes,
        )?)
    }

    pub fn delete_participant(&self, tanda_id: &str, participant_id: &str) -> Result<(), ApiError> {
        Ok(self.store.delete_item(
            &self.tables.participantes,
            &key(&[("id", tanda_id), ("participanteId", participant_id)]),
        )?)
    }

    /// Re-derives the birthday order of a tanda and writes the slots that
    /// moved. Returns every assignment, changed or not.
    pub fn renumber_participants(
        &self,
        tanda_id: &str,
        updated_at: &str,
    ) -> Result<Vec<SlotAssignment>, ApiError> {
        let participants = self.participants(tanda_id)?;
        let assignments = renumber(&participants);
        let mut moved = 0usize;
        for assignment in assignments.iter().filter(|assignment| assignment.changed()) {
            let mut changes = Item::new();
            changes.insert("numeroAsignado".to_string(), Value::from(assignment.slot));
            changes.insert("updatedAt".to_string(), Value::from(updated_at));
            self.update_participant(tanda_id, &assignment.participant_id, &changes)?;
            moved += 1;
        }
        tracing::info!(
            component = "rotation",
            event = "renumbered",
            tanda_id,
            ranked = assignments.len(),
            moved
        );
        Ok(assignments)
    }

    // payments

    pub fn payments(&self, tanda_id: &str) -> Result<Vec<Payment>, ApiError> {
        let query = Query::partition("id", tanda_id);
        decode_all(self.store.query(&self.tables.pagos, &query)?)
    }

    pub fn payments_with_prefix(&self, tanda_id: &str, prefix: &str) -> Result<Vec<Payment>, ApiError> {
        let query = Query::partition("id", tanda_id).with_sort_prefix("pagoId", prefix);
        decode_all(self.store.query(&self.tables.pagos, &query)?)
    }

    pub fn payment(&self, tanda_id: &str, payment_id: &str) -> Result<Option<Item>, ApiError> {
        Ok(self.store.get_item(
            &self.tables.pagos,
            &key(&[("id", tanda_id), ("pagoId", payment_id)]),
        )?)
    }

    pub fn put_payment(&self, payment: &Payment) -> Result<(), ApiError> {
        Ok(self.store.put_item(&self.tables.pagos, &encode(payment)?)?)
    }

    pub fn update_payment(&self, tanda_id: &str, payment_id: &str, changes: &Item) -> Result<Item, ApiError> {
        Ok(self.store.update_item(
            &self.tables.pagos,
            &key(&[("id", tanda_id), ("pagoId", payment_id)]),
            changes,
        )?)
    }

    pub fn delete_payment(&self, tanda_id: &str, payment_id: &str) -> Result<(), ApiError> {
        Ok(self.store.delete_item(
            &self.tables.pagos,
            &key(&[("id", tanda_id), ("pagoId", payment_id)]),
        )?)
    }

    // notifications

    pub fn notifications(&self, tanda_id: &str) -> Result<Vec<Notification>, ApiError> {
        let query = Query::partition("id", tanda_id);
        decode_all(self.store.query(&self.tables.notificaciones, &query)?)
    }

    pub fn put_notification(&self, notification: &Notification) -> Result<(), ApiError> {
        Ok(self
            .store
            .put_item(&self.tables.notificaciones, &encode(notification)?)?)
    }

    pub fn delete_notification(&self, tanda_id: &str, notification_id: &str) -> Result<(), ApiError> {
        Ok(self.store.delete_item(
            &self.tables.notificaciones,
            &key(&[("id", tanda_id), ("notificacionId", notification_id)]),
        )?)
    }

    // registration links

    pub fn link(&self, token: &str) -> Result<Option<RegistrationLink>, ApiError> {
        self.get(&self.tables.links, &key(&[("token", token)]))
    }

    pub fn links_for_tanda(&self, tanda_id: &str) -> Result<Vec<RegistrationLink>, ApiError> {
        let query = Query::on_index(TANDA_INDEX, "tandaId", tanda_id);
        decode_all(self.store.query(&self.tables.links, &query)?)
    }

    pub fn put_link(&self, link: &RegistrationLink) -> Result<(), ApiError> {
        Ok(self.store.put_item(&self.tables.links, &encode(link)?)?)
    }

    pub fn delete_link(&self, token: &str) -> Result<(), ApiError> {
        Ok(self
            .store
            .delete_item(&self.tables.links, &key(&[("token", token)]))?)
    }

    // password reset tokens

    pub fn reset_token(&self, token: &str) -> Result<Option<ResetToken>, ApiError> {
        self.get(&self.tables.reset_tokens, &key(&[("token", token)]))
    }

    pub fn put_reset_token(&self, token: &ResetToken) -> Result<(), ApiError> {
        Ok(self
            .store
            .put_item(&self.tables.reset_tokens, &encode(token)?)?)
    }

    pub fn delete_reset_token(&self, token: &str) -> Result<(), ApiError> {
        Ok(self
            .store
            .delete_item(&self.tables.reset_tokens, &key(&[("token", token)]))?)
    }
}
